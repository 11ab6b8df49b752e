//! Higher-order matchers for building recursive-descent grammars.
//!
//! A matcher is anything implementing [`Matcher`]. It takes the remaining input
//! and returns the matched value along with the input left over,
//! or `None` if it does not match. Matchers hold no mutable state,
//! so one can be run any number of times on any input.
//!
//! Any `fn(&str) -> Step<T>` (or closure of that shape) is a matcher,
//! which means recursive grammar rules can be written as plain functions
//! that refer to each other by name:
//!
//! ```
//! use bmc_ensemble::parse::comb::{delimited, many, symbol, Matcher, Step};
//!
//! // nest = "(" nest* ")"
//! fn nest(src: &str) -> Step<'_, usize> {
//!     let inner = delimited(symbol("("), many(nest), symbol(")"));
//!     inner.run(src).map(|(kids, rest)| (1 + kids.iter().sum::<usize>(), rest))
//! }
//!
//! assert_eq!(nest("(()())"), Some((3, "")));
//! assert_eq!(nest("(()"), None);
//! ```

use regex::Regex;

/// The result of running a matcher: the matched value and the remaining input.
pub type Step<'s, T> = Option<(T, &'s str)>;

/// A grammar rule that matches the start of some input.
pub trait Matcher<'s, T> {
    /// Tries to match the start of `src`.
    fn run(&self, src: &'s str) -> Step<'s, T>;
}
impl<'s, T, F: Fn(&'s str) -> Step<'s, T>> Matcher<'s, T> for F {
    fn run(&self, src: &'s str) -> Step<'s, T> {
        self(src)
    }
}

/// Matches an exact string.
pub fn symbol<'s>(sym: &'static str) -> impl Matcher<'s, &'s str> {
    move |src: &'s str| {
        let rest = src.strip_prefix(sym)?;
        Some((&src[..sym.len()], rest))
    }
}

/// Matches an exact word which is not immediately followed by another identifier character.
///
/// This prevents `void` from matching the start of `voided`.
pub fn keyword<'s>(word: &'static str) -> impl Matcher<'s, &'s str> {
    move |src: &'s str| {
        let (kw, rest) = symbol(word).run(src)?;
        match rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            true  => None,
            false => Some((kw, rest)),
        }
    }
}

/// Matches a regular expression at the start of the input.
///
/// The expression should be anchored with `^`.
pub fn pattern<'s>(re: &'static Regex) -> impl Matcher<'s, &'s str> {
    move |src: &'s str| {
        let m = re.find(src).filter(|m| m.start() == 0)?;
        Some(src.split_at(m.end()))
    }
}

/// Transforms the value of a successful match.
pub fn map<'s, A, B>(m: impl Matcher<'s, A>, f: impl Fn(A) -> B) -> impl Matcher<'s, B> {
    move |src: &'s str| m.run(src).map(|(a, rest)| (f(a), rest))
}

/// Transforms the value of a successful match, failing the match if the transformation fails.
pub fn map_opt<'s, A, B>(m: impl Matcher<'s, A>, f: impl Fn(A) -> Option<B>) -> impl Matcher<'s, B> {
    move |src: &'s str| {
        let (a, rest) = m.run(src)?;
        Some((f(a)?, rest))
    }
}

/// Matches `a` then `b`, keeping both values.
pub fn pair<'s, A, B>(a: impl Matcher<'s, A>, b: impl Matcher<'s, B>) -> impl Matcher<'s, (A, B)> {
    move |src: &'s str| {
        let (x, rest) = a.run(src)?;
        let (y, rest) = b.run(rest)?;
        Some(((x, y), rest))
    }
}

/// Matches `a` then `b`, keeping only `b`'s value.
pub fn preceded<'s, A, B>(a: impl Matcher<'s, A>, b: impl Matcher<'s, B>) -> impl Matcher<'s, B> {
    map(pair(a, b), |(_, y)| y)
}

/// Matches `a` then `b`, keeping only `a`'s value.
pub fn terminated<'s, A, B>(a: impl Matcher<'s, A>, b: impl Matcher<'s, B>) -> impl Matcher<'s, A> {
    map(pair(a, b), |(x, _)| x)
}

/// Matches `open`, `m`, then `close`, keeping only `m`'s value.
pub fn delimited<'s, A, B, C>(
    open: impl Matcher<'s, A>,
    m: impl Matcher<'s, B>,
    close: impl Matcher<'s, C>
) -> impl Matcher<'s, B> {
    preceded(open, terminated(m, close))
}

/// Matches `m` zero or more times.
///
/// This always succeeds. Repetition stops at the first failed match
/// (or at a match which consumed nothing).
pub fn many<'s, T>(m: impl Matcher<'s, T>) -> impl Matcher<'s, Vec<T>> {
    move |mut src: &'s str| {
        let mut out = vec![];
        while let Some((t, rest)) = m.run(src) {
            if rest.len() == src.len() {
                break;
            }
            out.push(t);
            src = rest;
        }
        Some((out, src))
    }
}

/// Matches `m` or nothing.
pub fn opt<'s, T>(m: impl Matcher<'s, T>) -> impl Matcher<'s, Option<T>> {
    move |src: &'s str| match m.run(src) {
        Some((t, rest)) => Some((Some(t), rest)),
        None => Some((None, src)),
    }
}

/// An ordered set of alternatives (implemented for tuples of matchers).
pub trait Choice<'s, T> {
    /// Runs each alternative in order, returning the first successful match.
    fn choose(&self, src: &'s str) -> Step<'s, T>;
}
macro_rules! impl_choice {
    ($($M:ident),+) => {
        impl<'s, T, $($M: Matcher<'s, T>),+> Choice<'s, T> for ($($M,)+) {
            #[allow(non_snake_case)]
            fn choose(&self, src: &'s str) -> Step<'s, T> {
                let ($($M,)+) = self;
                $(
                    if let Some(hit) = $M.run(src) {
                        return Some(hit);
                    }
                )+
                None
            }
        }
    }
}
impl_choice!(A, B);
impl_choice!(A, B, C);
impl_choice!(A, B, C, D);
impl_choice!(A, B, C, D, E);
impl_choice!(A, B, C, D, E, F);

/// Ordered choice. The first alternative that matches wins,
/// and later alternatives are never tried once one has succeeded.
pub fn alt<'s, T>(choices: impl Choice<'s, T>) -> impl Matcher<'s, T> {
    move |src: &'s str| choices.choose(src)
}
