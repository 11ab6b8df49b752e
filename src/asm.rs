//! Assembling LMC assembly source into object files.
//!
//! Assembly happens in three stages:
//! 1. [`macros::expand`] strips comments, extracts macro definitions, and expands every invocation.
//! 2. Each remaining line is tokenized ([`lex`]) and parsed into a [`Stmt`].
//! 3. Two passes over the statements: the first builds the [`SymbolTable`],
//!    and the second resolves each operand and packs it into a word of the [`ObjectFile`].
//!
//! The assembler module notably consists of:
//! - [`assemble`]: The main function, which assembles source text into an object file.
//! - [`SymbolTable`]: a struct holding the address of every label after the first pass
//! - [`ObjectFile`]: a struct holding the encoded words, which can be loaded into the emulator
//!
//! [`Stmt`]: crate::ast::asm::Stmt

pub mod encoding;
pub mod lex;
pub mod macros;

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::ast::asm::{Mnemonic, Operand, Stmt, Target};
use crate::ast::mach::{Instr, Mode};
use crate::ast::{Addr, AddrRangeErr};
use crate::err::ErrSpan;
use lex::{LexErr, Token};

/// Assembles LMC assembly source into an object file.
///
/// # Example
/// ```
/// use bmc_ensemble::asm::assemble;
///
/// let src = "
///     LDA #5
///     OUT
///     HLT
/// ";
/// let obj = assemble(src).unwrap();
/// assert_eq!(obj.words(), [0b010100_00_00000101, 0b100110_00_00000000, 0]);
/// ```
pub fn assemble(src: &str) -> Result<ObjectFile, AsmErr> {
    let stmts = parse_stmts(src)?;
    assemble_stmts(&stmts)
}

/// Expands macros in the source, then parses each remaining line into a statement.
pub fn parse_stmts(src: &str) -> Result<Vec<Stmt>, AsmErr> {
    macros::expand(src)?
        .iter()
        .filter_map(|(line, text)| parse_stmt(text, *line).transpose())
        .collect()
}

/// Assembles already parsed statements into an object file.
pub fn assemble_stmts(stmts: &[Stmt]) -> Result<ObjectFile, AsmErr> {
    let sym = SymbolTable::new(stmts)?;
    log::debug!("assembler pass 1: {} labels", sym.label_map.len());

    let obj = ObjectFile::new(stmts, sym)?;
    log::debug!("assembler pass 2: {} words", obj.len());
    Ok(obj)
}

/// Kinds of errors that can occur from assembling given assembly code.
///
/// See [`AsmErr`] for this error type with span information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum AsmErrKind {
    /// A line could not be tokenized.
    Lex(LexErr),
    /// A line does not start with a mnemonic or a label.
    ExpectedMnemonic,
    /// A word in mnemonic position is not a known mnemonic or macro.
    UnknownInstruction(String),
    /// A mode prefix is not followed by a literal or label.
    InvalidOperand,
    /// There is something after the operand.
    UnexpectedToken,
    /// The instruction needs an operand, but none was given.
    MissingOperand,
    /// The operand has no mode prefix, and there is no sensible default.
    AmbiguousMode,
    /// There were multiple labels of the same name (pass 1).
    DuplicateLabel(String),
    /// An operand names a label which is not defined (pass 2).
    UnresolvedLabel(String),
    /// An operand does not fit in the address field (pass 2).
    OperandOutOfRange(AddrRangeErr),
    /// Macros invoke each other in a cycle. This holds the chain of invocations.
    MacroCycle(Vec<String>),
    /// A macro was defined inside another macro's definition.
    NestedMacro,
    /// There was an `end` with no corresponding `macro`.
    UnmatchedEnd,
    /// There was a `macro` with no corresponding `end`.
    UnclosedMacro,
    /// There were multiple macros of the same name.
    DuplicateMacro(String),
    /// A macro has the name of a mnemonic.
    ReservedMacroName(String),
    /// A `macro` header does not have exactly one valid name.
    InvalidMacroName(String),
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lex(e)                  => e.fmt(f),
            Self::ExpectedMnemonic        => f.write_str("expected mnemonic"),
            Self::UnknownInstruction(s)   => write!(f, "unknown instruction '{s}'"),
            Self::InvalidOperand          => f.write_str("invalid operand"),
            Self::UnexpectedToken         => f.write_str("unexpected token after operand"),
            Self::MissingOperand          => f.write_str("instruction is missing its operand"),
            Self::AmbiguousMode           => f.write_str("cannot determine addressing mode of operand"),
            Self::DuplicateLabel(l)       => write!(f, "label '{l}' was defined multiple times"),
            Self::UnresolvedLabel(l)      => write!(f, "label '{l}' could not be found"),
            Self::OperandOutOfRange(e)    => e.fmt(f),
            Self::MacroCycle(chain)       => write!(f, "macro cycle: {}", chain.join(" > ")),
            Self::NestedMacro             => f.write_str("cannot define a macro inside another macro"),
            Self::UnmatchedEnd            => f.write_str("'end' does not have an associated 'macro'"),
            Self::UnclosedMacro           => f.write_str("macro definition was never closed"),
            Self::DuplicateMacro(m)       => write!(f, "macro '{m}' was defined multiple times"),
            Self::ReservedMacroName(m)    => write!(f, "'{m}' is a mnemonic and cannot be a macro name"),
            Self::InvalidMacroName(line)  => write!(f, "invalid macro header '{line}'"),
        }
    }
}

/// Error from assembling given assembly code.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct AsmErr {
    /// The value with a span.
    pub kind: AsmErrKind,
    /// The span in the source associated with this value.
    pub span: ErrSpan
}
impl AsmErr {
    /// Creates a new [`AsmErr`].
    pub fn new<E: Into<ErrSpan>>(kind: AsmErrKind, span: E) -> Self {
        AsmErr { kind, span: span.into() }
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for AsmErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            AsmErrKind::Lex(e) => Some(e),
            AsmErrKind::OperandOutOfRange(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for AsmErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(self.span)
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            AsmErrKind::Lex(e)                => e.help(),
            AsmErrKind::ExpectedMnemonic      => Some("a line is an optional label, a mnemonic, then an optional operand".into()),
            AsmErrKind::UnknownInstruction(_) => Some("mnemonics are uppercase (e.g., LDA), and macros must be defined before assembly".into()),
            AsmErrKind::InvalidOperand        => Some("a mode prefix (#, &, ~) must be followed by a number or label".into()),
            AsmErrKind::UnexpectedToken       => Some("an instruction has at most one operand".into()),
            AsmErrKind::MissingOperand        => Some("add a number or label after this mnemonic".into()),
            AsmErrKind::AmbiguousMode         => Some("prefix the operand with # (immediate), & (direct), or ~ (indirect)".into()),
            AsmErrKind::DuplicateLabel(_)     => Some("labels must be unique within a file, try renaming one of the labels".into()),
            AsmErrKind::UnresolvedLabel(_)    => Some("try adding this label before an instruction".into()),
            AsmErrKind::OperandOutOfRange(e)  => e.help(),
            AsmErrKind::MacroCycle(_)         => Some("a macro cannot expand to itself, even through other macros".into()),
            AsmErrKind::NestedMacro           => Some("try adding an 'end' at the end of the outer macro".into()),
            AsmErrKind::UnmatchedEnd          => Some("try adding a 'macro NAME' header before this line".into()),
            AsmErrKind::UnclosedMacro         => Some("try adding an 'end' at the end of this macro".into()),
            AsmErrKind::DuplicateMacro(_)     => Some("macro names must be unique within a file".into()),
            AsmErrKind::ReservedMacroName(_)  => Some("try renaming the macro".into()),
            AsmErrKind::InvalidMacroName(_)   => Some("macro names are uppercase identifiers (e.g., 'macro PUSH')".into()),
        }
    }
}

/// Parses a single line into a statement.
///
/// This returns `None` if the line has no tokens.
fn parse_stmt(text: &str, line: usize) -> Result<Option<Stmt>, AsmErr> {
    let err = |kind| AsmErr::new(kind, ErrSpan::Line(line));

    let tokens = lex::tokenize(text).map_err(|e| err(AsmErrKind::Lex(e)))?;
    let mut tokens = tokens.into_iter();

    let first = match tokens.next() {
        Some(Token::Ident(id)) => id,
        Some(_) => return Err(err(AsmErrKind::ExpectedMnemonic)),
        None => return Ok(None),
    };

    let (label, mnemonic) = match first.parse::<Mnemonic>() {
        Ok(m) => (None, m),
        Err(()) => match tokens.next() {
            Some(Token::Ident(second)) => match second.parse::<Mnemonic>() {
                Ok(m) => (Some(first), m),
                Err(()) => return Err(err(AsmErrKind::UnknownInstruction(second))),
            },
            _ => return Err(err(AsmErrKind::UnknownInstruction(first))),
        },
    };

    let target = |t: Token| match t {
        Token::Unsigned(n) => Ok(Target::Literal(n)),
        Token::Ident(id) => Ok(Target::Label(id)),
        _ => Err(err(AsmErrKind::InvalidOperand)),
    };
    let operand = match tokens.next() {
        None => None,
        Some(Token::Prefix(mode)) => {
            let t = tokens.next().ok_or_else(|| err(AsmErrKind::InvalidOperand))?;
            Some(Operand { mode: Some(mode), target: target(t)? })
        },
        Some(t) => Some(Operand { mode: None, target: target(t)? }),
    };

    match tokens.next() {
        Some(_) => Err(err(AsmErrKind::UnexpectedToken)),
        None => Ok(Some(Stmt { label, mnemonic, operand, line })),
    }
}

/// The symbol table created in the first assembler pass,
/// which maps every label to its address.
#[derive(PartialEq, Eq, Clone, Default)]
pub struct SymbolTable {
    label_map: HashMap<String, u16>,
}

impl SymbolTable {
    /// Creates a new symbol table.
    ///
    /// This performs the first assembler pass:
    /// every statement occupies one word, and each label is assigned the address of its statement.
    pub fn new(stmts: &[Stmt]) -> Result<Self, AsmErr> {
        let mut label_map = HashMap::new();

        for (addr, stmt) in stmts.iter().enumerate() {
            let Some(label) = &stmt.label else { continue };

            match label_map.entry(label.clone()) {
                Entry::Occupied(_) => {
                    return Err(AsmErr::new(AsmErrKind::DuplicateLabel(label.clone()), ErrSpan::Line(stmt.line)));
                },
                Entry::Vacant(e) => { e.insert(addr as u16); },
            }
        }

        Ok(Self { label_map })
    }

    /// Creates a symbol table from label/address pairs.
    pub(crate) fn from_labels(labels: impl IntoIterator<Item = (String, u16)>) -> Self {
        Self { label_map: labels.into_iter().collect() }
    }

    /// Gets the address of a given label (if it exists).
    ///
    /// # Example
    /// ```
    /// use bmc_ensemble::asm::assemble;
    ///
    /// let obj = assemble("OUT\nLOOP_label BRA LOOP_label").unwrap();
    /// let sym = obj.symbol_table();
    /// assert_eq!(sym.lookup_label("LOOP_label"), Some(1));
    /// assert_eq!(sym.lookup_label("missing"), None);
    /// ```
    pub fn lookup_label(&self, label: &str) -> Option<u16> {
        self.label_map.get(label).copied()
    }

    /// Gets the label at a given address (if it exists).
    pub fn rev_lookup_label(&self, addr: u16) -> Option<&str> {
        self.label_map.iter()
            .find(|&(_, &a)| a == addr)
            .map(|(label, _)| label.as_str())
    }

    /// Gets an iterable of the mapping from labels to addresses, in address order.
    pub fn label_iter(&self) -> impl Iterator<Item = (&str, u16)> + '_ {
        let mut labels: Vec<_> = self.label_map.iter()
            .map(|(label, &addr)| (label.as_str(), addr))
            .collect();
        labels.sort_by_key(|&(label, addr)| (addr, label));
        labels.into_iter()
    }
}
impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.label_iter())
            .finish()
    }
}

/// An object file.
///
/// This is the final product after assembly source code is fully assembled.
/// This can be loaded into the emulator to run the assembled code.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ObjectFile {
    words: Vec<u16>,
    sym: SymbolTable,
    /// The source line of each word. Empty if the line info is unavailable.
    lines: Vec<usize>,
}

impl ObjectFile {
    /// Creates an object file by resolving and encoding every statement.
    ///
    /// This performs the second assembler pass.
    fn new(stmts: &[Stmt], sym: SymbolTable) -> Result<Self, AsmErr> {
        let words = stmts.iter()
            .map(|stmt| resolve(stmt, &sym).map(|i| i.encode()))
            .collect::<Result<_, _>>()?;
        let lines = stmts.iter().map(|s| s.line).collect();

        Ok(Self { words, sym, lines })
    }

    /// Creates an object file from raw words, with no labels or line info.
    ///
    /// ```
    /// use bmc_ensemble::asm::ObjectFile;
    ///
    /// let obj = ObjectFile::from_words(vec![0b100110_00_00000000, 0]);
    /// assert_eq!(obj.len(), 2);
    /// ```
    pub fn from_words(words: Vec<u16>) -> Self {
        Self { words, sym: SymbolTable::default(), lines: vec![] }
    }

    pub(crate) fn from_parts(words: Vec<u16>, sym: SymbolTable, lines: Vec<usize>) -> Option<Self> {
        match lines.is_empty() || lines.len() == words.len() {
            true  => Some(Self { words, sym, lines }),
            false => None,
        }
    }

    /// The encoded words, which are loaded starting at address 0.
    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// The number of words in this object file.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether this object file has no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Gets the symbol table.
    pub fn symbol_table(&self) -> &SymbolTable {
        &self.sym
    }

    /// Gets the source line the word at the given address was assembled from.
    ///
    /// For words expanded from a macro, this is the line of the invocation.
    pub fn line_of(&self, addr: u16) -> Option<usize> {
        self.lines.get(usize::from(addr)).copied()
    }

    pub(crate) fn lines(&self) -> &[usize] {
        &self.lines
    }
}

/// Resolves a statement's operand and mode into a machine instruction.
fn resolve(stmt: &Stmt, sym: &SymbolTable) -> Result<Instr, AsmErr> {
    let err = |kind| AsmErr::new(kind, ErrSpan::Line(stmt.line));

    let (mode, value) = match &stmt.operand {
        None if stmt.mnemonic.requires_operand() => return Err(err(AsmErrKind::MissingOperand)),
        None => (Mode::Immediate, 0),
        Some(Operand { mode, target }) => {
            let mode = mode.or_else(|| stmt.mnemonic.default_mode(target))
                .ok_or_else(|| err(AsmErrKind::AmbiguousMode))?;
            let value = match target {
                Target::Literal(n) => *n,
                Target::Label(label) => sym.lookup_label(label)
                    .ok_or_else(|| err(AsmErrKind::UnresolvedLabel(label.clone())))?,
            };
            (mode, value)
        },
    };

    let addr = Addr::new(value).map_err(|e| err(AsmErrKind::OperandOutOfRange(e)))?;
    Ok(Instr::new(stmt.mnemonic.opcode(), mode, addr))
}
