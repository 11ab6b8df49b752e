//! Parsing BMC source into a token tree.
//!
//! The grammar is recursive descent built from the matchers in [`comb`]:
//!
//! ```text
//! Segment     = (Statement | Operator | Number | Reference | Whitespace)*
//! Statement   = IfElse | If | FunctionDef | ConstantDef
//! Block       = "{" Segment "}"
//! IfElse      = "?" Block ":" Block
//! If          = "?" Block
//! FunctionDef = "fn" "(" Name* ")" Block
//! ConstantDef = "is" Name
//! Number      = 0 | [1-9][0-9]{0,2}
//! Operator    = + - * / % = . @ ! ~ void
//! Name        = [A-Za-z_][A-Za-z0-9_]*
//! ```
//!
//! Alternatives are tried in order and the first match wins.
//! Whitespace is allowed between the parts of a statement.
//!
//! The main entry point is [`parse_tokens`].

pub mod comb;

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::ast::{Operator, Token};
use comb::{alt, delimited, keyword, many, map, map_opt, opt, pair, pattern, preceded, symbol, terminated, Matcher, Step};

/// Parses BMC source into its token tree.
///
/// # Example
/// ```
/// use bmc_ensemble::ast::{Operator, Token};
/// use bmc_ensemble::parse::parse_tokens;
///
/// let tokens = parse_tokens("5 3 -").unwrap();
/// assert_eq!(tokens, [
///     Token::Number(5), Token::NoOp,
///     Token::Number(3), Token::NoOp,
///     Token::Operator(Operator::Sub),
/// ]);
/// ```
pub fn parse_tokens(src: &str) -> Result<Vec<Token>, ParseErr> {
    let (tokens, rest) = segment(src).unwrap_or((vec![], src));

    if let Some(found) = rest.chars().next() {
        let kind = match tokens.is_empty() {
            true  => ParseErrKind::NoMatch,
            false => ParseErrKind::TrailingInput,
        };
        return Err(ParseErr { kind, offset: src.len() - rest.len(), found });
    }

    log::debug!("parsed {} top-level tokens", tokens.len());
    Ok(tokens)
}

/// Kinds of errors that can occur while parsing BMC source.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ParseErrKind {
    /// Nothing at the start of the source matched any token.
    NoMatch,
    /// Some of the source parsed, but input remained after the last token.
    TrailingInput,
}

/// A syntax error in BMC source.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct ParseErr {
    #[allow(missing_docs)]
    pub kind: ParseErrKind,
    /// The offset into the source where parsing stopped.
    pub offset: usize,
    /// The character found at the offset.
    pub found: char,
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ParseErrKind::NoMatch       => write!(f, "no match found for {:?} at offset {}", self.found, self.offset),
            ParseErrKind::TrailingInput => write!(f, "expected end of input, found {:?} at offset {}", self.found, self.offset),
        }
    }
}
impl std::error::Error for ParseErr {}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        Some(crate::err::ErrSpan::Offset(self.offset))
    }

    fn help(&self) -> Option<Cow<str>> {
        match self.found {
            '}' => Some("this brace does not close any block".into()),
            ':' => Some("':' can only appear between the two blocks of a '? {...} : {...}'".into()),
            '?' | '{' => Some("check that every block is closed with '}'".into()),
            c if c.is_ascii_digit() => Some("numbers are in [0, 999] and have no leading zeroes".into()),
            _ => None
        }
    }
}

macro_rules! lazy_regex {
    ($($name:ident = $pat:literal;)+) => {
        $(
            fn $name() -> &'static Regex {
                static RE: OnceLock<Regex> = OnceLock::new();
                RE.get_or_init(|| Regex::new($pat).expect("grammar pattern should be valid"))
            }
        )+
    }
}
lazy_regex! {
    number_re = r"^(0|[1-9][0-9]{0,2})";
    name_re   = r"^[A-Za-z_][A-Za-z0-9_]*";
    ws_re     = r"^[ \t\r\n]*";
    ws1_re    = r"^[ \t\r\n]+";
}

fn segment(src: &str) -> Step<'_, Vec<Token>> {
    many(alt((statement, operator, number, reference, whitespace))).run(src)
}

fn block(src: &str) -> Step<'_, Vec<Token>> {
    delimited(symbol("{"), segment, symbol("}")).run(src)
}

fn statement(src: &str) -> Step<'_, Token> {
    alt((conditional, function_def, constant_def)).run(src)
}

fn conditional(src: &str) -> Step<'_, Token> {
    let then = preceded(pair(symbol("?"), pattern(ws_re())), block);
    let otherwise = preceded(delimited(pattern(ws_re()), symbol(":"), pattern(ws_re())), block);

    map(pair(then, opt(otherwise)), |(t, e)| match e {
        Some(e) => Token::IfElse(t, e),
        None => Token::If(t),
    }).run(src)
}

fn function_def(src: &str) -> Step<'_, Token> {
    let params = delimited(
        pair(symbol("("), pattern(ws_re())),
        many(terminated(pattern(name_re()), pattern(ws_re()))),
        symbol(")")
    );
    let def = pair(
        preceded(pair(keyword("fn"), pattern(ws_re())), params),
        preceded(pattern(ws_re()), block)
    );

    map(def, |(params, body)| Token::Function {
        params: params.into_iter().map(String::from).collect(),
        body
    }).run(src)
}

fn constant_def(src: &str) -> Step<'_, Token> {
    let def = preceded(pair(keyword("is"), pattern(ws1_re())), pattern(name_re()));
    map(def, |name| Token::Constant(name.to_string())).run(src)
}

fn operator(src: &str) -> Step<'_, Token> {
    Operator::ALL.iter().find_map(|&op| {
        let (_, rest) = match op {
            Operator::Void => keyword("void").run(src),
            _ => symbol(op.symbol()).run(src),
        }?;
        Some((Token::Operator(op), rest))
    })
}

fn number(src: &str) -> Step<'_, Token> {
    let (n, rest) = map_opt(pattern(number_re()), |s: &str| s.parse::<u16>().ok()).run(src)?;

    // 1000 and 012 are not split into two numbers
    match rest.starts_with(|c: char| c.is_ascii_digit()) {
        true  => None,
        false => Some((Token::Number(n), rest)),
    }
}

fn reference(src: &str) -> Step<'_, Token> {
    map(pattern(name_re()), |name: &str| Token::Reference(name.to_string())).run(src)
}

fn whitespace(src: &str) -> Step<'_, Token> {
    map(pattern(ws1_re()), |_| Token::NoOp).run(src)
}

#[cfg(test)]
mod tests {
    use crate::ast::Operator::*;
    use crate::ast::Token::{self, *};

    use super::{parse_tokens, ParseErr, ParseErrKind};

    fn strip(tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .filter(|t| t != &NoOp)
            .map(|t| match t {
                If(b) => If(strip(b)),
                IfElse(t, e) => IfElse(strip(t), strip(e)),
                Function { params, body } => Function { params, body: strip(body) },
                t => t
            })
            .collect()
    }
    fn parse_stripped(src: &str) -> Vec<Token> {
        strip(parse_tokens(src).unwrap())
    }
    fn assert_parse_fail(src: &str, kind: ParseErrKind, offset: usize) {
        let ParseErr { kind: k, offset: o, .. } = parse_tokens(src).unwrap_err();
        assert_eq!((k, o), (kind, offset), "wrong error for {src:?}");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_stripped("0 7 42 999"), [Number(0), Number(7), Number(42), Number(999)]);

        assert_parse_fail("1000", ParseErrKind::NoMatch, 0);
        assert_parse_fail("1 05", ParseErrKind::TrailingInput, 2);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            parse_stripped("+ - * / % = . @ ! ~ void"),
            [Add, Sub, Mul, Div, Mod, Eq, Print, Peek, Call, Not, Void].map(Operator)
        );

        // operators need no whitespace between them
        assert_eq!(parse_stripped("1 2+."), [Number(1), Number(2), Operator(Add), Operator(Print)]);

        // `void` is a keyword, not a prefix
        assert_eq!(parse_stripped("voidable"), [Reference("voidable".to_string())]);
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(
            parse_tokens("1 \t\n2").unwrap(),
            [Number(1), NoOp, Number(2)]
        );
        assert!(parse_tokens("").unwrap().is_empty());
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(
            parse_stripped("1 ? { 9 . }"),
            [Number(1), If(vec![Number(9), Operator(Print)])]
        );
        assert_eq!(
            parse_stripped("0 ?{1.}:{2.}"),
            [Number(0), IfElse(vec![Number(1), Operator(Print)], vec![Number(2), Operator(Print)])]
        );
        assert_eq!(
            parse_stripped("1 ? { 2 ? { 3 } : { 4 } }"),
            [Number(1), If(vec![Number(2), IfElse(vec![Number(3)], vec![Number(4)])])]
        );
        // without an else branch, the whitespace after the block is left to the segment
        assert_eq!(
            parse_tokens("1 ? { 2 } 3").unwrap(),
            [Number(1), NoOp, If(vec![NoOp, Number(2), NoOp]), NoOp, Number(3)]
        );
    }

    #[test]
    fn test_function_def() {
        assert_eq!(
            parse_stripped("fn (a b) { a b + }"),
            [Function {
                params: vec!["a".to_string(), "b".to_string()],
                body: vec![Reference("a".to_string()), Reference("b".to_string()), Operator(Add)]
            }]
        );
        assert_eq!(
            parse_stripped("fn(){1}"),
            [Function { params: vec![], body: vec![Number(1)] }]
        );
        // `fnord` is just a name
        assert_eq!(parse_stripped("fnord"), [Reference("fnord".to_string())]);
    }

    #[test]
    fn test_constant_def() {
        assert_eq!(
            parse_stripped("5 is five five"),
            [Number(5), Constant("five".to_string()), Reference("five".to_string())]
        );
        assert_eq!(parse_stripped("island"), [Reference("island".to_string())]);
    }

    #[test]
    fn test_errors() {
        assert_parse_fail("$", ParseErrKind::NoMatch, 0);
        assert_parse_fail("1 2 + $", ParseErrKind::TrailingInput, 6);
        assert_parse_fail("1 }", ParseErrKind::TrailingInput, 2);
        // unclosed block fails at the start of the statement
        assert_parse_fail("1 ? { 2", ParseErrKind::TrailingInput, 2);
        assert_parse_fail("? { 1 } :", ParseErrKind::TrailingInput, 8);
    }
}
