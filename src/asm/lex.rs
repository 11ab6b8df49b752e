//! Tokenizing one line of LMC assembly.
//!
//! The lexer runs after macro expansion, so it only ever sees plain instructions.
//! The key data structure is the [`Token`] enum.

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

use crate::ast::mach::Mode;

/// A unit of information in a line of LMC assembly.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t\r]+", error = LexErr)]
pub enum Token {
    // Like the identifier pattern, this spans over tokens which are technically invalid
    // (e.g., `12ab`) so that they're reported as one bad literal.

    /// A decimal literal (e.g., `0`, `17`).
    #[regex(r"[0-9][A-Za-z0-9_]*", lex_unsigned_dec)]
    Unsigned(u16),

    /// An addressing mode prefix (`#`, `&`, or `~`).
    #[regex(r"[#&~]", lex_mode)]
    Prefix(Mode),

    /// An identifier.
    ///
    /// This can refer to either a mnemonic (e.g., `LDA`) or a label (e.g., `loop`).
    /// Which one is decided by position when the line is parsed.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lx| lx.slice().to_string())]
    Ident(String),

    /// A comment, which starts with `--` and spans the remaining part of the line.
    #[regex(r"--[^\n]*")]
    Comment,
}

/// Any errors raised in attempting to tokenize a line.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal cannot fit within the range of a u16.
    DoesNotFitU16,
    /// Numeric literal has characters which are not decimal digits.
    InvalidNumeric,
    /// A symbol was used which is not allowed in LMC assembly.
    #[default]
    InvalidSymbol
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFitU16  => f.write_str("numeric token does not fit 16-bit unsigned integer"),
            LexErr::InvalidNumeric => f.write_str("invalid decimal literal"),
            LexErr::InvalidSymbol  => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::DoesNotFitU16  => Some(format!("the range for a 16-bit unsigned integer is [{}, {}]", u16::MIN, u16::MAX).into()),
            LexErr::InvalidNumeric => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::InvalidSymbol  => Some("this char does not occur in any token in LMC assembly (was a macro placeholder left unexpanded?)".into()),
        }
    }
}

fn lex_unsigned_dec(lx: &Lexer<'_, Token>) -> Result<u16, LexErr> {
    lx.slice()
        .parse::<u16>()
        .map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow => LexErr::DoesNotFitU16,
            _ => LexErr::InvalidNumeric,
        })
}

fn lex_mode(lx: &Lexer<'_, Token>) -> Option<Mode> {
    match lx.slice() {
        "#" => Some(Mode::Immediate),
        "&" => Some(Mode::Direct),
        "~" => Some(Mode::Indirect),
        _ => None
    }
}

/// Tokenizes a line, dropping comments.
pub fn tokenize(line: &str) -> Result<Vec<Token>, LexErr> {
    Token::lexer(line)
        .filter(|t| t != &Ok(Token::Comment))
        .collect()
}

#[cfg(test)]
mod tests {
    use logos::Logos;

    use crate::ast::mach::Mode;
    use crate::err::LexErr;

    use super::{tokenize, Token};

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    #[test]
    fn test_instruction_line() {
        assert_eq!(
            tokenize("loop LDA &counter -- next").unwrap(),
            [ident("loop"), ident("LDA"), Token::Prefix(Mode::Direct), ident("counter")]
        );
        assert_eq!(
            tokenize("\tADD #1\r").unwrap(),
            [ident("ADD"), Token::Prefix(Mode::Immediate), Token::Unsigned(1)]
        );
        assert_eq!(
            tokenize("STA ~_sp").unwrap(),
            [ident("STA"), Token::Prefix(Mode::Indirect), ident("_sp")]
        );
        assert!(tokenize("-- only a comment").unwrap().is_empty());
    }

    #[test]
    fn test_numeric() {
        let mut tokens = Token::lexer("0 255 65535 65536 12ab");
        assert_eq!(tokens.next(), Some(Ok(Token::Unsigned(0))));
        assert_eq!(tokens.next(), Some(Ok(Token::Unsigned(255))));
        assert_eq!(tokens.next(), Some(Ok(Token::Unsigned(65535))));
        assert_eq!(tokens.next(), Some(Err(LexErr::DoesNotFitU16)));
        assert_eq!(tokens.next(), Some(Err(LexErr::InvalidNumeric)));
        assert_eq!(tokens.next(), None);
    }

    #[test]
    fn test_invalid_symbol() {
        assert_eq!(tokenize("LDA $"), Err(LexErr::InvalidSymbol));
        assert_eq!(tokenize("ADD #-1"), Err(LexErr::InvalidSymbol));
    }
}
