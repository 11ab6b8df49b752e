//! Macro expansion, the first stage of assembly.
//!
//! A macro is defined by a region of lines:
//!
//! ```text
//! macro PUSH
//!     LDA $
//!     PUSHACC
//! end
//! ```
//!
//! and is invoked by name, with an optional label before it
//! and an optional operand after it (`ret_0 PUSH #ret_0`).
//! Every `$` in the body is replaced with the operand (or removed, if there is none),
//! and a label on the invocation is attached to the first line the invocation expands to.
//!
//! Macros may invoke other macros, but not (directly or indirectly) themselves.
//! The whole invocation graph is checked before anything is expanded.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::ast::asm::Mnemonic;
use crate::err::ErrSpan;

use super::{AsmErr, AsmErrKind};

/// The placeholder for a macro's operand.
pub const PLACEHOLDER: char = '$';

/// A macro definition.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MacroDef {
    /// The lines of the body (comments and blank lines removed).
    pub body: Vec<String>,
    /// The line of the `macro` header.
    pub line: usize,
}

/// Source split into its macro definitions and the lines outside of them.
#[derive(Debug, Default)]
pub struct MacroSource {
    /// Macro definitions, by name.
    pub macros: BTreeMap<String, MacroDef>,
    /// Non-empty lines outside of any macro region, with their line numbers.
    pub lines: Vec<(usize, String)>,
}

/// A line which invokes a macro.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct Invocation<'a> {
    label: Option<&'a str>,
    name: &'a str,
    arg: Option<&'a str>,
}

fn macro_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("macro name pattern should be valid"))
}

fn strip_comment(line: &str) -> &str {
    line.split_once("--").map_or(line, |(code, _)| code)
}

/// Expands all macros in the source, returning the remaining lines and their source line numbers.
///
/// # Example
/// ```
/// use bmc_ensemble::asm::macros::expand;
///
/// let src = "
/// macro TWICE
///     OUT
///     OUT
/// end
/// start TWICE
/// ";
/// let lines: Vec<_> = expand(src).unwrap()
///     .into_iter()
///     .map(|(_, text)| text)
///     .collect();
/// assert_eq!(lines, ["start\tOUT", "OUT"]);
/// ```
pub fn expand(src: &str) -> Result<Vec<(usize, String)>, AsmErr> {
    let MacroSource { macros, lines } = extract(src)?;
    check_cycles(&macros)?;

    let mut out = Vec::with_capacity(lines.len());
    for (lno, text) in &lines {
        expand_line(text, *lno, &macros, &mut out);
    }

    log::debug!("expanded {} macro definitions: {} lines became {}", macros.len(), lines.len(), out.len());
    Ok(out)
}

/// Splits macro regions out of the source.
pub fn extract(src: &str) -> Result<MacroSource, AsmErr> {
    let mut result = MacroSource::default();
    // The macro currently being defined.
    let mut open: Option<(String, MacroDef)> = None;

    for (lno, raw) in src.lines().enumerate() {
        let text = strip_comment(raw).trim();
        let mut words = text.split_whitespace();

        match (words.next(), open.is_some()) {
            (None, _) => {},
            (Some("macro"), true) => return Err(AsmErr::new(AsmErrKind::NestedMacro, ErrSpan::Line(lno))),
            (Some("macro"), false) => {
                let name = words.next().unwrap_or("");
                if !macro_name_re().is_match(name) || words.next().is_some() {
                    return Err(AsmErr::new(AsmErrKind::InvalidMacroName(text.to_string()), ErrSpan::Line(lno)));
                }
                if name.parse::<Mnemonic>().is_ok() {
                    return Err(AsmErr::new(AsmErrKind::ReservedMacroName(name.to_string()), ErrSpan::Line(lno)));
                }
                if result.macros.contains_key(name) {
                    return Err(AsmErr::new(AsmErrKind::DuplicateMacro(name.to_string()), ErrSpan::Line(lno)));
                }
                open = Some((name.to_string(), MacroDef { body: vec![], line: lno }));
            },
            (Some("end"), _) if text == "end" => match open.take() {
                Some((name, def)) => { result.macros.insert(name, def); },
                None => return Err(AsmErr::new(AsmErrKind::UnmatchedEnd, ErrSpan::Line(lno))),
            },
            (Some(_), _) => match open.as_mut() {
                Some((_, def)) => def.body.push(text.to_string()),
                None => result.lines.push((lno, text.to_string())),
            },
        }
    }

    match open {
        Some((_, def)) => Err(AsmErr::new(AsmErrKind::UnclosedMacro, ErrSpan::Line(def.line))),
        None => Ok(result),
    }
}

/// Determines whether a line invokes one of the given macros.
fn parse_invocation<'a>(text: &'a str, macros: &BTreeMap<String, MacroDef>) -> Option<Invocation<'a>> {
    let is_macro = |s: &str| macros.contains_key(s);
    let words: Vec<_> = text.split_whitespace().collect();

    match words[..] {
        [name] if is_macro(name) => Some(Invocation { label: None, name, arg: None }),
        [name, arg] if is_macro(name) => Some(Invocation { label: None, name, arg: Some(arg) }),
        [label, name] if is_macro(name) => Some(Invocation { label: Some(label), name, arg: None }),
        [label, name, arg] if is_macro(name) => Some(Invocation { label: Some(label), name, arg: Some(arg) }),
        _ => None
    }
}

/// Verifies the macro invocation graph has no cycles.
fn check_cycles(macros: &BTreeMap<String, MacroDef>) -> Result<(), AsmErr> {
    #[derive(PartialEq, Eq, Clone, Copy)]
    enum Visit { InProgress, Done }

    // For every macro, the macros its body invokes (in body order, without repeats).
    let graph: BTreeMap<&str, Vec<&str>> = macros.iter()
        .map(|(name, def)| {
            let mut seen = BTreeSet::new();
            let deps = def.body.iter()
                .filter_map(|line| parse_invocation(line, macros))
                .map(|inv| inv.name)
                .filter(|&n| seen.insert(n))
                .collect();
            (name.as_str(), deps)
        })
        .collect();

    let mut state: BTreeMap<&str, Visit> = BTreeMap::new();
    for &root in graph.keys() {
        if state.contains_key(root) {
            continue;
        }

        // Iterative DFS: (node, index of the next dependency to visit).
        let mut path: Vec<(&str, usize)> = vec![(root, 0)];
        state.insert(root, Visit::InProgress);

        while let Some((node, next)) = path.last_mut() {
            let deps = graph.get(*node).map_or(&[][..], Vec::as_slice);
            let Some(&dep) = deps.get(*next) else {
                state.insert(*node, Visit::Done);
                path.pop();
                continue;
            };
            *next += 1;

            match state.get(dep) {
                Some(Visit::Done) => {},
                Some(Visit::InProgress) => {
                    let start = path.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let chain: Vec<String> = path[start..].iter()
                        .map(|&(n, _)| n.to_string())
                        .chain([dep.to_string()])
                        .collect();

                    let line = macros.get(dep).map_or(0, |d| d.line);
                    return Err(AsmErr::new(AsmErrKind::MacroCycle(chain), ErrSpan::Line(line)));
                },
                None => {
                    state.insert(dep, Visit::InProgress);
                    path.push((dep, 0));
                },
            }
        }
    }

    Ok(())
}

/// Expands one line into `out`. The macro graph must be acyclic.
fn expand_line(text: &str, lno: usize, macros: &BTreeMap<String, MacroDef>, out: &mut Vec<(usize, String)>) {
    let Some(inv) = parse_invocation(text, macros) else {
        out.push((lno, text.to_string()));
        return;
    };
    let Some(def) = macros.get(inv.name) else { return };

    let start = out.len();
    let arg = inv.arg.unwrap_or("");
    for line in &def.body {
        let substituted = line.replace(PLACEHOLDER, arg);
        expand_line(substituted.trim(), lno, macros, out);
    }

    if let Some(label) = inv.label {
        match out.get_mut(start) {
            Some((_, first)) => *first = format!("{label}\t{first}"),
            None => out.push((lno, format!("{label}\tNOP"))),
        }
    }
}
