//! End-to-end runs of BMC source.
//!
//! Each function here chains the stages of this crate together:
//! - [`interpret_source`]: parse, then run the token tree directly
//! - [`compile_source`]: parse, then compile to LMC assembly
//! - [`emulate_source`]: assemble LMC assembly, then run it on the emulator
//! - [`run_compiled`]: compile, then assemble and emulate the result
//! - [`compare_source`]: run both paths and compare what they print
//!
//! Any stage's error is wrapped in a [`PipelineErr`].
//!
//! ```
//! use bmc_ensemble::compile::stdlib::BundledStdlib;
//! use bmc_ensemble::pipeline::compare_source;
//!
//! let cmp = compare_source("5 3 - . 7 2 % .", &BundledStdlib, Default::default()).unwrap();
//! assert_eq!(cmp.interpreted, [2, 1]);
//! assert!(cmp.agrees());
//! ```

use std::borrow::Cow;

use crate::asm::{assemble, AsmErr};
use crate::compile::{compile, CompileErr, Stdlib};
use crate::emu::mem::MemArray;
use crate::emu::{EmuErr, EmuFlags, Emulator};
use crate::err::ErrSpan;
use crate::interp::{interpret, InterpErr};
use crate::io::{AnyIO, BufferedIO};
use crate::parse::{parse_tokens, ParseErr};

/// An error from any stage of a run.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PipelineErr {
    #[allow(missing_docs)]
    Parse(ParseErr),
    #[allow(missing_docs)]
    Interp(InterpErr),
    #[allow(missing_docs)]
    Compile(CompileErr),
    #[allow(missing_docs)]
    Asm(AsmErr),
    #[allow(missing_docs)]
    Emu(EmuErr),
}
impl PipelineErr {
    fn inner(&self) -> &dyn crate::err::Error {
        match self {
            PipelineErr::Parse(e)   => e,
            PipelineErr::Interp(e)  => e,
            PipelineErr::Compile(e) => e,
            PipelineErr::Asm(e)     => e,
            PipelineErr::Emu(e)     => e,
        }
    }
}
impl std::fmt::Display for PipelineErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            PipelineErr::Parse(_)   => "parse",
            PipelineErr::Interp(_)  => "interpret",
            PipelineErr::Compile(_) => "compile",
            PipelineErr::Asm(_)     => "assemble",
            PipelineErr::Emu(_)     => "emulate",
        };
        write!(f, "{stage} error: {}", self.inner())
    }
}
impl std::error::Error for PipelineErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineErr::Parse(e)   => Some(e),
            PipelineErr::Interp(e)  => Some(e),
            PipelineErr::Compile(e) => Some(e),
            PipelineErr::Asm(e)     => Some(e),
            PipelineErr::Emu(e)     => Some(e),
        }
    }
}
impl crate::err::Error for PipelineErr {
    fn span(&self) -> Option<ErrSpan> {
        self.inner().span()
    }

    fn help(&self) -> Option<Cow<str>> {
        self.inner().help()
    }
}
macro_rules! impl_from_stage {
    ($($Err:ty => $variant:ident),+) => {
        $(
            impl From<$Err> for PipelineErr {
                fn from(value: $Err) -> Self {
                    PipelineErr::$variant(value)
                }
            }
        )+
    }
}
impl_from_stage! {
    ParseErr => Parse,
    InterpErr => Interp,
    CompileErr => Compile,
    AsmErr => Asm,
    EmuErr => Emu
}

/// Parses and interprets BMC source, returning the final evaluation stack.
pub fn interpret_source(src: &str, io: impl Into<AnyIO>) -> Result<Vec<i16>, PipelineErr> {
    let tokens = parse_tokens(src)?;
    Ok(interpret(&tokens, io)?)
}

/// Parses and compiles BMC source into LMC assembly.
pub fn compile_source(src: &str, stdlib: &(impl Stdlib + ?Sized)) -> Result<String, PipelineErr> {
    let tokens = parse_tokens(src)?;
    Ok(compile(&tokens, stdlib)?)
}

/// Assembles LMC assembly and runs it until it halts.
///
/// The returned emulator holds the final machine state (see [`MemArray::dump`]).
///
/// ```
/// use bmc_ensemble::io::BufferedIO;
/// use bmc_ensemble::pipeline::emulate_source;
///
/// let io = BufferedIO::with_input([20]);
/// let emu = emulate_source("INP\nADD #22\nOUT\nHLT", Default::default(), io.clone()).unwrap();
///
/// assert_eq!(io.output_values(), [42]);
/// assert_eq!(emu.acc, 42);
/// ```
pub fn emulate_source(asm: &str, flags: EmuFlags, io: impl Into<AnyIO>) -> Result<Emulator, PipelineErr> {
    let obj = assemble(asm)?;

    let mut emu = Emulator::new(flags);
    emu.io = io.into();
    emu.load_obj_file(&obj)?;
    emu.run()?;
    Ok(emu)
}

/// Compiles BMC source, then assembles and runs the result until it halts.
pub fn run_compiled(src: &str, stdlib: &(impl Stdlib + ?Sized), flags: EmuFlags, io: impl Into<AnyIO>) -> Result<Emulator, PipelineErr> {
    let asm = compile_source(src, stdlib)?;
    emulate_source(&asm, flags, io)
}

/// The results of running a program through both paths.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// What the interpreter printed.
    pub interpreted: Vec<i16>,
    /// What the compiled program printed.
    pub emulated: Vec<i16>,
    /// The interpreter's final evaluation stack.
    pub stack: Vec<i16>,
    /// The emulator's final memory image.
    pub memory: MemArray,
}
impl Comparison {
    /// Whether both paths printed the same values in the same order.
    pub fn agrees(&self) -> bool {
        self.interpreted == self.emulated
    }
}

/// Runs BMC source through the interpreter and through the compiler and emulator.
///
/// Neither run has any input.
pub fn compare_source(src: &str, stdlib: &(impl Stdlib + ?Sized), flags: EmuFlags) -> Result<Comparison, PipelineErr> {
    let tokens = parse_tokens(src)?;

    let interp_io = BufferedIO::new();
    let stack = interpret(&tokens, interp_io.clone())?;

    let asm = compile(&tokens, stdlib)?;
    let emu_io = BufferedIO::new();
    let mut emu = emulate_source(&asm, flags, emu_io.clone())?;

    let cmp = Comparison {
        interpreted: interp_io.output_values(),
        emulated: emu_io.output_values(),
        stack,
        memory: std::mem::take(&mut emu.mem),
    };
    if !cmp.agrees() {
        log::debug!("outputs differ: interpreted {:?}, emulated {:?}", cmp.interpreted, cmp.emulated);
    }
    Ok(cmp)
}
