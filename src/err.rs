//! Error interface for this crate.
//!
//! Each pipeline stage reports failure with its own error type:
//! - [`ParseErr`]: BMC source could not be parsed
//! - [`InterpErr`]: the tree interpreter failed at runtime
//! - [`CompileErr`]: the token tree could not be translated to assembly
//! - [`AsmErr`]: assembly text could not be expanded or assembled
//! - [`EmuErr`]: the emulated machine failed at runtime
//!
//! All of them implement [`Error`], which extends [`std::error::Error`]
//! with an optional location in source ([`ErrSpan`]) and an optional help message.
//! [`report`] renders any of these errors against the source it came from.

use std::borrow::Cow;
use std::ops::Range;

pub use crate::asm::lex::LexErr;
pub use crate::asm::{AsmErr, AsmErrKind};
pub use crate::compile::CompileErr;
pub use crate::emu::EmuErr;
pub use crate::interp::InterpErr;
pub use crate::parse::{ParseErr, ParseErrKind};

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The location in source where this error occurred (if there is one).
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A help message for this error (if there is one).
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

/// A location in source code.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ErrSpan {
    /// A character offset into BMC source.
    Offset(usize),
    /// A (zero-indexed) line of assembly source.
    Line(usize),
}
impl std::fmt::Display for ErrSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrSpan::Offset(i) => write!(f, "offset {i}"),
            ErrSpan::Line(l)   => write!(f, "line {}", l + 1),
        }
    }
}

/// Struct holding the source string and contains helpers
/// to index lines and to query position information from a source string.
#[derive(PartialEq, Eq, Clone)]
pub struct SourceInfo {
    src: String,
    /// The index of each new line in source code.
    nl_indices: Vec<usize>
}
impl std::fmt::Debug for SourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceInfo")
            .field("nl_indices", &self.nl_indices)
            .finish_non_exhaustive()
    }
}
impl SourceInfo {
    /// Computes the source info from a given string.
    pub fn new(src: &str) -> Self {
        let nl_indices = src
            .match_indices('\n')
            .map(|(i, _)| i)
            .chain([src.len()])
            .collect();

        Self { src: src.to_string(), nl_indices }
    }

    /// Returns the entire source.
    pub fn source(&self) -> &str {
        &self.src
    }

    /// Counts the number of lines in the source string.
    pub fn count_lines(&self) -> usize {
        self.nl_indices.len()
    }

    /// Gets the character range for the provided line, including the newline character.
    fn raw_line_span(&self, line: usize) -> Option<Range<usize>> {
        if line >= self.count_lines() {
            return None;
        }

        let start = match line {
            0 => 0,
            _ => self.nl_indices[line - 1] + 1
        };
        let end = (self.nl_indices[line] + 1).min(self.src.len());

        Some(start..end)
    }

    /// Reads a line from source, excluding any trailing whitespace.
    ///
    /// This returns None if line is not in the interval `[0, number of lines)`.
    pub fn read_line(&self, line: usize) -> Option<&str> {
        self.raw_line_span(line).map(|r| self.src[r].trim_end())
    }

    /// Calculates the (zero-indexed) line and character number for a given character index.
    ///
    /// Indices past the end of the source are reported relative to the start of the last line.
    pub fn get_pos_pair(&self, index: usize) -> (usize, usize) {
        let lno = self.nl_indices.partition_point(|&start| start < index)
            .min(self.count_lines() - 1);

        let lstart = self.raw_line_span(lno).map_or(0, |r| r.start);
        (lno, index.saturating_sub(lstart))
    }
}

/// A displayable rendering of an error against its source.
///
/// This is created with [`report`].
pub struct Report<'a, E: ?Sized> {
    err: &'a E,
    src: SourceInfo
}
impl<E: Error + ?Sized> std::fmt::Display for Report<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "error: {}", self.err)?;

        let (lno, caret) = match self.err.span() {
            Some(ErrSpan::Offset(i)) => {
                let (lno, cno) = self.src.get_pos_pair(i);
                (Some(lno), Some(cno))
            },
            Some(ErrSpan::Line(lno)) => (Some(lno), None),
            None => (None, None),
        };

        if let Some(lno) = lno {
            let text = self.src.read_line(lno).unwrap_or("");
            let gutter = (lno + 1).to_string();
            let pad = " ".repeat(gutter.len());

            match caret {
                Some(cno) => writeln!(f, "{pad}--> {}:{}", lno + 1, cno + 1)?,
                None      => writeln!(f, "{pad}--> line {}", lno + 1)?,
            }
            writeln!(f, "{pad} |")?;
            writeln!(f, "{gutter} | {text}")?;
            if let Some(cno) = caret {
                writeln!(f, "{pad} | {}^", " ".repeat(cno))?;
            }
        }
        if let Some(help) = self.err.help() {
            writeln!(f, "help: {help}")?;
        }
        Ok(())
    }
}

/// Renders an error with the source line it occurred on and its help message.
///
/// # Example
/// ```
/// use bmc_ensemble::err::report;
/// use bmc_ensemble::parse::parse_tokens;
///
/// let src = "1 2 + $";
/// let err = parse_tokens(src).unwrap_err();
/// let rendered = report(&err, src).to_string();
/// assert!(rendered.contains("1:7"));
/// ```
pub fn report<'a, E: Error + ?Sized>(err: &'a E, src: &str) -> Report<'a, E> {
    Report { err, src: SourceInfo::new(src) }
}

#[cfg(test)]
mod tests {
    use super::SourceInfo;

    #[test]
    fn test_pos_pair() {
        let src = SourceInfo::new("ab\ncd\n\nef");
        assert_eq!(src.count_lines(), 4);
        assert_eq!(src.get_pos_pair(0), (0, 0));
        assert_eq!(src.get_pos_pair(1), (0, 1));
        assert_eq!(src.get_pos_pair(3), (1, 0));
        assert_eq!(src.get_pos_pair(6), (2, 0));
        assert_eq!(src.get_pos_pair(8), (3, 1));
        // past the end
        assert_eq!(src.get_pos_pair(20), (3, 13));
    }

    #[test]
    fn test_read_line() {
        let src = SourceInfo::new("LDA #1  \r\nOUT\n");
        assert_eq!(src.read_line(0), Some("LDA #1"));
        assert_eq!(src.read_line(1), Some("OUT"));
        assert_eq!(src.read_line(2), Some(""));
        assert_eq!(src.read_line(3), None);
    }
}
