//! Compiling a token tree to LMC assembly.
//!
//! The compiled program keeps the BMC evaluation stack in memory.
//! The stack discipline (the `PUSH`, `POP`, and `PUSHACC` macros),
//! the multiply/divide subroutines, and the scratch cells are not generated here.
//! They are looked up from a [`Stdlib`] and spliced around the translated program:
//!
//! ```text
//! <macros>
//! <program>
//! HLT
//! <functions>
//! <data>
//! ```
//!
//! The bundled implementation is [`stdlib::BundledStdlib`].
//!
//! # Calling convention
//!
//! A call pushes the return label and the caller's frame pointer,
//! then sets the frame pointer to the stack pointer:
//!
//! ```text
//!            ... | arg 0 | ... | arg N-1 | ret | old fp |
//!                                                        ^ _fp
//! ```
//!
//! so parameter `i` of `N` is found at `_fp - (N - i + 2)`.
//! On entry, a function branches to `std_fail` if the stack is shallower than `N + 2`.
//! On return, the function pops its result, its bookkeeping cells, and its arguments,
//! restores the frame pointer, and pushes the result back.

pub mod stdlib;

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use crate::ast::{Operator, Token};

/// The keys a [`Stdlib`] has to provide, in the order they appear in compiled output.
pub const STDLIB_KEYS: [&str; 3] = ["macros", "functions", "data"];

/// A store of assembly snippets that compiled programs depend on.
///
/// It must provide every key in [`STDLIB_KEYS`]:
/// - `macros`: macro definitions, including `PUSH`, `POP`, and `PUSHACC`
/// - `functions`: subroutines, including `std_mul`, `std_div`, and the `std_fail` trap
/// - `data`: cells, including the scratch cells, `_fp`, `_sp`, and `_stack`
pub trait Stdlib {
    /// Gets the snippet with the given key, if it exists.
    fn snippet(&self, key: &str) -> Option<Cow<'_, str>>;
}
impl Stdlib for HashMap<String, String> {
    fn snippet(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).map(|s| Cow::Borrowed(s.as_str()))
    }
}
impl Stdlib for HashMap<&str, &str> {
    fn snippet(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).map(|&s| Cow::Borrowed(s))
    }
}

/// Compiles a token tree into LMC assembly.
///
/// # Example
/// ```
/// use bmc_ensemble::compile::compile;
/// use bmc_ensemble::compile::stdlib::BundledStdlib;
/// use bmc_ensemble::parse::parse_tokens;
///
/// let tokens = parse_tokens("5 3 - .").unwrap();
/// let asm = compile(&tokens, &BundledStdlib).unwrap();
/// assert!(asm.contains("SUB &_a"));
/// ```
pub fn compile(tokens: &[Token], stdlib: &(impl Stdlib + ?Sized)) -> Result<String, CompileErr> {
    let snippet = |key: &'static str| stdlib.snippet(key).ok_or(CompileErr::MissingStdlibEntry(key));
    let [macros, functions, data] = STDLIB_KEYS;
    let (macros, functions, data) = (snippet(macros)?, snippet(functions)?, snippet(data)?);

    let mut compiler = Compiler::new(tokens);
    compiler.translate_seq(tokens, &[])?;
    log::debug!("compiled {} top-level tokens into {} lines", tokens.len(), compiler.lines.len());

    let program = compiler.lines.join("\n");
    let mut out = String::new();
    for part in [&*macros, &*program, "HLT", &*functions, &*data] {
        out.push_str(part);
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

/// Errors that can occur while compiling a token tree.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum CompileErr {
    /// A name is neither a parameter of the enclosing function nor bound by any `is`.
    UndefinedName(String),
    /// The stdlib is missing one of the required snippets.
    MissingStdlibEntry(&'static str),
}
impl std::fmt::Display for CompileErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileErr::UndefinedName(n)      => write!(f, "undefined name '{n}'"),
            CompileErr::MissingStdlibEntry(k) => write!(f, "stdlib is missing '{k}'"),
        }
    }
}
impl std::error::Error for CompileErr {}
impl crate::err::Error for CompileErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            CompileErr::UndefinedName(_) => Some("compiled functions can only refer to their own parameters and to names bound with 'is'".into()),
            CompileErr::MissingStdlibEntry(_) => Some(format!("the stdlib must provide all of {STDLIB_KEYS:?}").into()),
        }
    }
}

/// The translation state of one compilation.
struct Compiler {
    /// Counter for minting unique labels.
    label_count: usize,
    /// Every name bound by `is` anywhere in the program.
    globals: HashSet<String>,
    /// Names whose cell has already been emitted.
    reserved: HashSet<String>,
    lines: Vec<String>,
}

impl Compiler {
    fn new(tokens: &[Token]) -> Self {
        let mut globals = HashSet::new();
        collect_globals(tokens, &mut globals);

        Self {
            label_count: 0,
            globals,
            reserved: HashSet::new(),
            lines: vec![],
        }
    }

    fn next_label(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}_{}", self.label_count);
        self.label_count += 1;
        label
    }

    fn emit(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
    fn emit_all(&mut self, lines: &[&str]) {
        self.lines.extend(lines.iter().map(|&l| l.to_string()));
    }

    /// Translates a sequence, where `params` are the parameters of the innermost function.
    fn translate_seq(&mut self, tokens: &[Token], params: &[String]) -> Result<(), CompileErr> {
        tokens.iter().try_for_each(|t| self.translate(t, params))
    }

    fn translate(&mut self, token: &Token, params: &[String]) -> Result<(), CompileErr> {
        match token {
            Token::NoOp => {},
            Token::Number(n) => self.emit(format!("PUSH #{}", n % 255)),
            Token::Operator(op) => self.translate_op(*op),
            Token::If(body) => {
                let end = self.next_label("end");
                self.emit("POP");
                self.emit(format!("BRZ {end}"));
                self.translate_seq(body, params)?;
                self.emit(format!("{end} NOP"));
            },
            Token::IfElse(then, otherwise) => {
                let other = self.next_label("else");
                let end = self.next_label("end");
                self.emit("POP");
                self.emit(format!("BRZ {other}"));
                self.translate_seq(then, params)?;
                self.emit(format!("BRA {end}"));
                self.emit(format!("{other} NOP"));
                self.translate_seq(otherwise, params)?;
                self.emit(format!("{end} NOP"));
            },
            Token::Function { params: own, body } => {
                let entry = self.next_label("fn");
                let skip = self.next_label("fnend");
                self.emit(format!("BRA {skip}"));
                self.emit(format!("{entry} NOP"));
                self.emit_frame_check(own.len());
                self.translate_seq(body, own)?;

                self.emit_all(&[
                    "POP", "STA &_rv",
                    "POP", "STA &_rf",
                    "POP", "STA &_ra",
                ]);
                for _ in own {
                    self.emit("POP");
                }
                self.emit_all(&[
                    "LDA &_rf", "STA &_fp",
                    "LDA &_rv", "PUSHACC",
                    "BRA &_ra",
                ]);
                self.emit(format!("{skip} PUSH #{entry}"));
            },
            Token::Constant(name) => {
                let cell = cell_label(name);
                if self.reserved.insert(name.clone()) {
                    let skip = self.next_label("skip");
                    self.emit(format!("BRA {skip}"));
                    self.emit(format!("{cell} DAT"));
                    self.emit(format!("{skip} POP"));
                } else {
                    self.emit("POP");
                }
                self.emit(format!("STA &{cell}"));
            },
            Token::Reference(name) => {
                if let Some(i) = params.iter().rposition(|p| p == name) {
                    let dist = params.len() - i + 2;
                    self.emit("LDA &_fp");
                    self.emit(format!("SUB #{dist}"));
                    self.emit_all(&["STA &_a", "LDA ~_a", "PUSHACC"]);
                } else if self.globals.contains(name) {
                    self.emit(format!("PUSH &{}", cell_label(name)));
                } else {
                    return Err(CompileErr::UndefinedName(name.clone()));
                }
            },
        }

        Ok(())
    }

    fn translate_op(&mut self, op: Operator) {
        match op {
            Operator::Add => self.emit_all(&["POP", "STA &_a", "POP", "ADD &_a", "PUSHACC"]),
            Operator::Sub => self.emit_all(&["POP", "STA &_a", "POP", "SUB &_a", "PUSHACC"]),
            Operator::Mul | Operator::Div | Operator::Mod => {
                let ret = self.next_label("ret");
                let routine = match op {
                    Operator::Mul => "std_mul",
                    _ => "std_div",
                };
                self.emit(format!("PUSH #{ret}"));
                self.emit(format!("BRA {routine}"));
                match op {
                    Operator::Mod => {
                        self.emit(format!("{ret} LDA &_b"));
                        self.emit("PUSHACC");
                    },
                    _ => self.emit(format!("{ret} PUSHACC")),
                }
            },
            Operator::Eq => {
                self.emit_all(&["POP", "STA &_a", "POP", "SUB &_a"]);
                self.emit_flag();
            },
            Operator::Not => {
                self.emit("POP");
                self.emit_flag();
            },
            Operator::Print => self.emit_all(&["POP", "OUT"]),
            Operator::Void => self.emit("POP"),
            Operator::Peek => self.emit_all(&[
                "POP", "STA &_a",
                "LDA &_sp", "SUB #1", "SUB &_a", "STA &_a",
                "LDA ~_a", "PUSHACC",
            ]),
            Operator::Call => {
                let ret = self.next_label("ret");
                self.emit_all(&["POP", "STA &_c"]);
                self.emit(format!("PUSH #{ret}"));
                self.emit_all(&["PUSH &_fp", "LDA &_sp", "STA &_fp", "BRA &_c"]);
                self.emit(format!("{ret} NOP"));
            },
        }
    }

    /// Faults unless the stack holds the arguments and the two bookkeeping cells of this call.
    fn emit_frame_check(&mut self, arity: usize) {
        let ok = self.next_label("frame");
        self.emit_all(&["LDA &_fp", "SUB #_stack"]);
        self.emit(format!("SUB #{}", arity + 2));
        self.emit(format!("BRP {ok}"));
        self.emit(format!("BRZ {ok}"));
        self.emit("BRA std_fail");
        self.emit(format!("{ok} NOP"));
    }

    /// Pushes 1 if the accumulator is zero, else 0.
    fn emit_flag(&mut self) {
        let eq = self.next_label("eq");
        let end = self.next_label("end");
        self.emit(format!("BRZ {eq}"));
        self.emit("PUSH #0");
        self.emit(format!("BRA {end}"));
        self.emit(format!("{eq} PUSH #1"));
        self.emit(format!("{end} NOP"));
    }
}

fn cell_label(name: &str) -> String {
    format!("const_{name}")
}

fn collect_globals(tokens: &[Token], out: &mut HashSet<String>) {
    for token in tokens {
        match token {
            Token::Constant(name) => { out.insert(name.clone()); },
            Token::If(body) | Token::Function { body, .. } => collect_globals(body, out),
            Token::IfElse(then, otherwise) => {
                collect_globals(then, out);
                collect_globals(otherwise, out);
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::parse::parse_tokens;

    use super::stdlib::BundledStdlib;
    use super::{compile, CompileErr, Compiler};

    /// Translates the source without any stdlib, returning just the program lines.
    fn translate(src: &str) -> Result<Vec<String>, CompileErr> {
        let tokens = parse_tokens(src).unwrap();
        let mut compiler = Compiler::new(&tokens);
        compiler.translate_seq(&tokens, &[])?;
        Ok(compiler.lines)
    }

    #[test]
    fn test_literal_wraps() {
        assert_eq!(translate("7").unwrap(), ["PUSH #7"]);
        assert_eq!(translate("300").unwrap(), ["PUSH #45"]);
        assert_eq!(translate("255").unwrap(), ["PUSH #0"]);
    }

    #[test]
    fn test_operand_order() {
        // right operand is popped first and stored in scratch
        assert_eq!(
            translate("5 3 -").unwrap(),
            ["PUSH #5", "PUSH #3", "POP", "STA &_a", "POP", "SUB &_a", "PUSHACC"]
        );
    }

    #[test]
    fn test_unique_labels() {
        let lines = translate("1 2 * 3 4 / 5 6 %").unwrap();
        let labels: Vec<_> = lines.iter()
            .filter_map(|l| l.split_once(' '))
            .filter(|(label, _)| label.starts_with("ret_"))
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, ["ret_0", "ret_1", "ret_2"]);

        // the counter belongs to the compilation
        let lines = translate("1 2 *").unwrap();
        assert_eq!(&lines[2..], ["PUSH #ret_0", "BRA std_mul", "ret_0 PUSHACC"]);
    }

    #[test]
    fn test_mod_reads_remainder() {
        let lines = translate("7 2 %").unwrap();
        assert_eq!(&lines[2..], ["PUSH #ret_0", "BRA std_div", "ret_0 LDA &_b", "PUSHACC"]);
    }

    #[test]
    fn test_params_frame_relative() {
        let lines = translate("fn (a b) { a b }").unwrap();
        // a is the first of two parameters
        assert!(lines.windows(2).any(|w| w == ["LDA &_fp", "SUB #4"]));
        assert!(lines.windows(2).any(|w| w == ["LDA &_fp", "SUB #3"]));
        // both argument cells are popped by the epilogue
        let pops = lines.iter()
            .skip_while(|l| *l != "STA &_ra")
            .take_while(|l| *l != "LDA &_rf")
            .filter(|l| *l == "POP")
            .count();
        assert_eq!(pops, 2);
        assert_eq!(lines.last().map(String::as_str), Some("fnend_1 PUSH #fn_0"));
    }

    #[test]
    fn test_frame_check() {
        // the body starts only once the stack holds 2 arguments, the return label, and the old fp
        let lines = translate("fn (a b) { a }").unwrap();
        assert_eq!(
            &lines[..9],
            [
                "BRA fnend_1", "fn_0 NOP",
                "LDA &_fp", "SUB #_stack", "SUB #4",
                "BRP frame_2", "BRZ frame_2", "BRA std_fail",
                "frame_2 NOP",
            ]
        );
    }

    #[test]
    fn test_constants() {
        let lines = translate("4 is x 5 is x x").unwrap();
        // the cell is only reserved once
        assert_eq!(lines.iter().filter(|l| l.ends_with("DAT")).count(), 1);
        assert_eq!(lines.iter().filter(|l| *l == "STA &const_x").count(), 2);
        assert_eq!(lines.last().map(String::as_str), Some("PUSH &const_x"));

        // globals are visible in function bodies, even when bound later
        assert!(translate("fn () { g } is f 1 is g").is_ok());
    }

    #[test]
    fn test_undefined_name() {
        assert_eq!(translate("x"), Err(CompileErr::UndefinedName("x".to_string())));
        // outer parameters are not visible to inner functions
        assert_eq!(
            translate("fn (a) { fn () { a } }"),
            Err(CompileErr::UndefinedName("a".to_string()))
        );
    }

    #[test]
    fn test_output_layout() {
        let tokens = parse_tokens("1 .").unwrap();
        let stdlib: HashMap<&str, &str> = [
            ("macros", "-- M"),
            ("functions", "-- F"),
            ("data", "-- D"),
        ].into_iter().collect();

        let asm = compile(&tokens, &stdlib).unwrap();
        assert_eq!(asm, "-- M\nPUSH #1\nPOP\nOUT\nHLT\n-- F\n-- D\n");

        let full = compile(&tokens, &BundledStdlib).unwrap();
        assert!(full.contains("macro PUSHACC"));
        assert!(full.contains("std_div"));
    }

    #[test]
    fn test_missing_stdlib_entry() {
        let tokens = parse_tokens("1").unwrap();
        let stdlib: HashMap<String, String> = [
            ("macros".to_string(), String::new()),
            ("data".to_string(), String::new()),
        ].into_iter().collect();

        assert_eq!(compile(&tokens, &stdlib), Err(CompileErr::MissingStdlibEntry("functions")));
    }
}
