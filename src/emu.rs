//! Emulating assembled LMC programs.
//!
//! This module is focused on executing fully assembled code (i.e., [`ObjectFile`]).
//!
//! This module consists of:
//! - [`Emulator`]: The struct that emulates assembled code.
//! - [`mem`]: The module handling the emulator's memory image.
//!
//! # Usage
//!
//! To run some code, create an `Emulator`, attach IO to it, and load an object file:
//!
//! ```
//! use bmc_ensemble::asm::assemble;
//! use bmc_ensemble::emu::Emulator;
//! use bmc_ensemble::io::BufferedIO;
//!
//! let obj_file = assemble("
//!             LDA #3
//!     loop    OUT
//!             SUB #1
//!             BRP loop
//!             HLT
//! ").unwrap();
//!
//! let io = BufferedIO::new();
//! let mut emu = Emulator::new(Default::default());
//! emu.io = io.clone().into();
//! emu.load_obj_file(&obj_file).unwrap();
//! emu.run().unwrap();
//!
//! assert!(emu.hit_halt());
//! assert_eq!(io.output_values(), [3, 2, 1]);
//! ```
//!
//! ## Flags
//!
//! The memory image is sized when an object file is loaded.
//! By default, it is the length of the program plus 32 zero-filled scratch words.
//! A fixed size can be requested through [`EmuFlags`]:
//!
//! ```
//! # use bmc_ensemble::emu::{Emulator, EmuFlags};
//! let mut emu = Emulator::new(EmuFlags { mem_size: Some(256) });
//! ```
//!
//! ## Execution
//!
//! Beyond the basic [`Emulator::run`] (which runs until halting),
//! there are also:
//! - [`Emulator::step_in`]: manual step-by-step emulation
//! - [`Emulator::run_while`], [`Emulator::run_with_limit`]: more advanced programmatic execution
//!
//! The machine halts when it executes `HLT` or when the PC steps past the end of memory.

pub mod mem;

use std::borrow::Cow;

use crate::asm::ObjectFile;
use crate::ast::mach::{fmt_word_fields, DecodeErr, Instr, Mode, Opcode};
use crate::io::{AnyIO, IODevice};

use self::mem::MemArray;

/// The number of scratch words appended to a program when [`EmuFlags::mem_size`] is not set.
pub const DEFAULT_SCRATCH: usize = 32;

/// Errors that can occur during emulation.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum EmuErr {
    /// Word had a valid opcode, but its mode bits are not one of the three defined modes.
    InvalidAddressMode {
        /// The word which could not be decoded.
        word: u16,
        /// Where the word was.
        pc: usize
    },
    /// `STA` was executed with immediate addressing.
    IllegalWrite,
    /// The opcode is defined, but the emulator does not support it.
    UnimplementedOpcode(Opcode),
    /// Word has no defined opcode.
    InvalidOpcode {
        /// The word which could not be decoded.
        word: u16,
        /// Where the word was.
        pc: usize
    },
    /// An address outside of the memory image was accessed or branched to.
    OutOfBounds(usize),
    /// `INP` was executed, but the input device had no value.
    InputUnavailable,
    /// `OUT` was executed, but the output device rejected the value.
    OutputUnavailable,
    /// The program has more words than the memory image.
    ProgramTooLarge {
        /// Length of the program.
        len: usize,
        /// Size of the memory image.
        size: usize
    },
}
impl std::fmt::Display for EmuErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmuErr::InvalidAddressMode { word, pc } => write!(f, "invalid address mode in word {} at address {pc}", fmt_word_fields(*word)),
            EmuErr::IllegalWrite                   => f.write_str("cannot store with immediate addressing"),
            EmuErr::UnimplementedOpcode(op)        => write!(f, "{op} is not implemented"),
            EmuErr::InvalidOpcode { word, pc }     => write!(f, "invalid instruction {} at address {pc}", fmt_word_fields(*word)),
            EmuErr::OutOfBounds(addr)              => write!(f, "address {addr} is out of bounds"),
            EmuErr::InputUnavailable               => f.write_str("no input available"),
            EmuErr::OutputUnavailable              => f.write_str("could not write to output"),
            EmuErr::ProgramTooLarge { len, size }  => write!(f, "program has {len} words, but memory only has {size}"),
        }
    }
}
impl std::error::Error for EmuErr {}
impl crate::err::Error for EmuErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            EmuErr::IllegalWrite           => Some("use & (direct) or ~ (indirect) to pick the cell to store to".into()),
            EmuErr::UnimplementedOpcode(_) => Some("character IO is not supported, use INP and OUT instead".into()),
            EmuErr::OutOfBounds(_)         => Some("try increasing the memory size".into()),
            EmuErr::ProgramTooLarge { .. } => Some("try increasing the memory size, or leave it unset to fit the program".into()),
            EmuErr::InputUnavailable       => Some("the emulator needs an IO device that provides input".into()),
            EmuErr::OutputUnavailable      => Some("the emulator needs an IO device that accepts output".into()),
            _ => None
        }
    }
}

/// Anything that can cause a step to abruptly fail to finish.
enum StepBreak {
    /// The machine halted.
    Halt,
    /// An emulation error occurred.
    Err(EmuErr),
}
impl From<EmuErr> for StepBreak {
    fn from(value: EmuErr) -> Self {
        Self::Err(value)
    }
}

/// Reason for why execution paused if it wasn't due to an error.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
enum PauseCondition {
    /// Program reached a halt.
    Halt,
    /// Program hit a tripwire condition.
    Tripwire,
    /// Program hit an error and did not pause successfully.
    #[default]
    Unsuccessful
}

/// Configuration flags for [`Emulator`].
///
/// These are read when an object file is loaded
/// and are preserved by [`Emulator::reset`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct EmuFlags {
    /// The number of words in the memory image.
    ///
    /// If `None`, the image is the program followed by [`DEFAULT_SCRATCH`] zero-filled words.
    /// If set, loading a program longer than this fails.
    ///
    /// By default, this is `None`.
    pub mem_size: Option<usize>,
}

/// Executes assembled code.
#[derive(Debug)]
pub struct Emulator {
    /// The memory image.
    pub mem: MemArray,

    /// The program counter.
    pub pc: usize,

    /// The accumulator.
    pub acc: i16,

    /// The number of instructions successfully run since this `Emulator` was initialized.
    ///
    /// This can be set to 0 to reset the counter.
    pub instructions_run: u64,

    /// Indicates whether the PC has yet to be incremented for the current instruction.
    ///
    /// This is just for error handling purposes. It's used to compute
    /// the PC of the instruction that caused an error. See [`Emulator::prefetch_pc`].
    prefetch: bool,

    /// Indicates the reason why the last execution (via [`Emulator::run_while`] and adjacent)
    /// had paused.
    pause_condition: PauseCondition,

    // ------------------ CONFIG STATE ------------------
    // Calling [`Emulator::reset`] does not reset these values.

    /// Configuration settings for the emulator.
    pub flags: EmuFlags,

    /// The device `INP` reads from and `OUT` writes to.
    pub io: AnyIO,
}

impl Emulator {
    /// Creates a new emulator with an empty memory image and no IO.
    pub fn new(flags: EmuFlags) -> Self {
        Self {
            mem: MemArray::new(0),
            pc: 0,
            acc: 0,
            instructions_run: 0,
            prefetch: true,
            pause_condition: Default::default(),

            flags,
            io: AnyIO::Empty,
        }
    }

    /// Resets the emulator.
    ///
    /// This clears the memory image and machine state,
    /// while preserving the flags and the IO device.
    /// Any object file has to be loaded again.
    pub fn reset(&mut self) {
        let io = std::mem::take(&mut self.io);
        *self = Emulator::new(self.flags);
        self.io = io;
    }

    /// Loads an object file into this emulator, replacing the memory image.
    pub fn load_obj_file(&mut self, obj: &ObjectFile) -> Result<(), EmuErr> {
        let size = self.flags.mem_size.unwrap_or(obj.len() + DEFAULT_SCRATCH);
        self.mem = MemArray::with_program(obj.words(), size)?;

        log::debug!("loaded {} words into a {size}-word memory image", obj.len());
        Ok(())
    }

    /// Gets the value of the prefetch PC.
    ///
    /// This function is useful as it returns the location of the currently
    /// executing instruction in memory.
    pub fn prefetch_pc(&self) -> usize {
        self.pc - usize::from(!self.prefetch)
    }

    /// Indicates whether the last execution of the emulator resulted in a halt successfully occurring.
    ///
    /// This is defined as:
    /// - `HLT` being executed
    /// - the PC stepping past the end of memory
    pub fn hit_halt(&self) -> bool {
        matches!(self.pause_condition, PauseCondition::Halt)
    }

    /// Reads the value of an operand.
    fn read_operand(&self, instr: Instr) -> Result<u16, EmuErr> {
        let addr = usize::from(instr.addr.get());
        match instr.mode {
            Mode::Immediate => Ok(instr.addr.get()),
            Mode::Direct    => self.mem.read(addr),
            Mode::Indirect  => {
                let ptr = self.mem.read(addr)?;
                self.mem.read(usize::from(ptr))
            },
        }
    }

    /// Writes a value to the cell an operand refers to.
    fn write_operand(&mut self, instr: Instr, value: u16) -> Result<(), EmuErr> {
        let addr = usize::from(instr.addr.get());
        match instr.mode {
            Mode::Immediate => Err(EmuErr::IllegalWrite),
            Mode::Direct    => self.mem.write(addr, value),
            Mode::Indirect  => {
                let ptr = self.mem.read(addr)?;
                self.mem.write(usize::from(ptr), value)
            },
        }
    }

    /// Jumps to the address an operand resolves to.
    fn branch(&mut self, instr: Instr) -> Result<(), EmuErr> {
        let target = usize::from(self.read_operand(instr)?);
        if target >= self.mem.len() {
            return Err(EmuErr::OutOfBounds(target));
        }

        self.pc = target;
        Ok(())
    }

    /// Runs until the tripwire condition returns false (or any of the typical breaks occur).
    ///
    /// The typical break conditions are:
    /// - `HLT` is executed
    /// - the PC steps past the end of memory
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Emulator) -> bool) -> Result<(), EmuErr> {
        std::mem::take(&mut self.pause_condition);

        // event loop
        // run until:
        // 1. the tripwire condition returns false
        // 2. the machine halts
        let result = loop {
            if !tripwire(self) {
                break Ok(PauseCondition::Tripwire);
            }

            match self.step() {
                Ok(()) => {},
                Err(StepBreak::Halt) => break Ok(PauseCondition::Halt),
                Err(StepBreak::Err(e)) => break Err(e)
            }
        };

        match &result {
            Ok(cond) => log::debug!("paused ({cond:?}) at {} after {} instructions", self.prefetch_pc(), self.instructions_run),
            Err(e)   => log::debug!("failed at {}: {e}", self.prefetch_pc()),
        }
        self.pause_condition = result?;
        Ok(())
    }

    /// Execute the program.
    ///
    /// This blocks until the program ends.
    /// If the program never halts, this never returns.
    pub fn run(&mut self) -> Result<(), EmuErr> {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    ///
    /// This blocks until the program ends or until the number of steps to execute has been hit.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<(), EmuErr> {
        let i = self.instructions_run;
        self.run_while(|emu| emu.instructions_run.wrapping_sub(i) < max_steps)
    }

    /// Emulate one step, executing one instruction.
    fn step(&mut self) -> Result<(), StepBreak> {
        self.prefetch = true;

        // Running past the end is a halt, not an error.
        if self.pc >= self.mem.len() {
            return Err(StepBreak::Halt);
        }

        let word = self.mem.read(self.pc)?;
        let instr = Instr::decode(word).map_err(|e| match e {
            DecodeErr::InvalidOpcode => EmuErr::InvalidOpcode { word, pc: self.pc },
            DecodeErr::InvalidMode   => EmuErr::InvalidAddressMode { word, pc: self.pc },
        })?;
        log::trace!("{:>4}: {instr} (acc={})", self.pc, self.acc);

        self.pc += 1;
        self.prefetch = false;

        match instr.opcode {
            Opcode::Hlt => return Err(StepBreak::Halt),
            Opcode::Add => {
                let val = self.read_operand(instr)?;
                self.acc = self.acc.wrapping_add(val as i16);
            },
            Opcode::Sub => {
                let val = self.read_operand(instr)?;
                self.acc = self.acc.wrapping_sub(val as i16);
            },
            Opcode::Sta => self.write_operand(instr, self.acc as u16)?,
            Opcode::Nop => {},
            Opcode::Lda => self.acc = self.read_operand(instr)? as i16,
            Opcode::Bra => self.branch(instr)?,
            Opcode::Brz => if self.acc == 0 {
                self.branch(instr)?;
            },
            Opcode::Brp => if self.acc > 0 {
                self.branch(instr)?;
            },
            Opcode::Inp => self.acc = self.io.read_int().ok_or(EmuErr::InputUnavailable)?,
            Opcode::Out => if !self.io.write_int(self.acc) {
                return Err(EmuErr::OutputUnavailable.into());
            },
            Opcode::Itc | Opcode::Otc => return Err(EmuErr::UnimplementedOpcode(instr.opcode).into()),
        }

        self.prefetch = true;
        self.instructions_run = self.instructions_run.wrapping_add(1);
        Ok(())
    }

    /// Emulate one step, executing one instruction.
    ///
    /// Halting is not an error here. Use [`Emulator::hit_halt`] after
    /// [`Emulator::run`] to check whether the machine has stopped.
    pub fn step_in(&mut self) -> Result<(), EmuErr> {
        match self.step() {
            Ok(()) => Ok(()),
            Err(StepBreak::Halt) => Ok(()),
            Err(StepBreak::Err(e)) => Err(e)
        }
    }
}
impl Default for Emulator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

#[cfg(test)]
mod tests {
    use crate::asm::{assemble, ObjectFile};
    use crate::ast::mach::Opcode;
    use crate::io::BufferedIO;

    use super::{EmuErr, EmuFlags, Emulator};

    fn load(src: &str, flags: EmuFlags, input: &[i16]) -> (Emulator, BufferedIO) {
        let obj = assemble(src).unwrap();
        load_obj(&obj, flags, input)
    }
    fn load_obj(obj: &ObjectFile, flags: EmuFlags, input: &[i16]) -> (Emulator, BufferedIO) {
        let io = BufferedIO::with_input(input.iter().copied());
        let mut emu = Emulator::new(flags);
        emu.io = io.clone().into();
        emu.load_obj_file(obj).unwrap();
        (emu, io)
    }
    fn run_output(src: &str, input: &[i16]) -> Vec<i16> {
        let (mut emu, io) = load(src, Default::default(), input);
        emu.run().unwrap();
        assert!(emu.hit_halt());
        io.output_values()
    }
    fn assert_emu_fail(src: &str, err: EmuErr) {
        let (mut emu, _) = load(src, Default::default(), &[]);
        assert_eq!(emu.run(), Err(err));
        assert!(!emu.hit_halt());
    }

    #[test]
    fn test_arith() {
        assert_eq!(run_output("LDA #5\nADD #3\nOUT\nSUB #10\nOUT\nHLT", &[]), [8, -2]);

        // negative values are stored as their two's complement
        let src = "
                LDA #0
                SUB #1
                STA &cell
                LDA &cell
                OUT
                HLT
            cell DAT 0
        ";
        let (mut emu, io) = load(src, Default::default(), &[]);
        emu.run().unwrap();
        assert_eq!(io.output_values(), [-1]);
        assert_eq!(emu.mem.read(6), Ok(u16::MAX));
    }

    #[test]
    fn test_modes() {
        let src = "
                LDA ~ptr
                OUT
                LDA &val
                ADD &val
                OUT
                LDA #ptr
                OUT
                HLT
            ptr DAT val
            val DAT 7
        ";
        assert_eq!(run_output(src, &[]), [7, 14, 8]);
    }

    #[test]
    fn test_store() {
        let src = "
                LDA #9
                STA &cell
                LDA #4
                STA ~ptr
                HLT
            ptr DAT other
            cell DAT 0
            other DAT 0
        ";
        let (mut emu, _) = load(src, Default::default(), &[]);
        emu.run().unwrap();
        assert_eq!(&emu.mem.as_slice()[5..8], [7, 9, 4]);
        assert_eq!(emu.mem.len(), 8 + super::DEFAULT_SCRATCH);

        assert_emu_fail("LDA #1\nSTA #3\nHLT", EmuErr::IllegalWrite);
    }

    #[test]
    fn test_branches() {
        let countdown = "
                    LDA #3
            loop    OUT
                    SUB #1
                    BRP loop
                    HLT
        ";
        assert_eq!(run_output(countdown, &[]), [3, 2, 1]);

        let zero = "
                    LDA #0
                    BRZ skip
                    OUT
            skip    LDA #1
                    BRZ skip
                    OUT
                    HLT
        ";
        assert_eq!(run_output(zero, &[]), [1]);

        // BRA through memory jumps to the stored address
        let indirect = "
                    BRA &target
                    OUT
            land    LDA #2
                    OUT
                    HLT
            target  DAT land
        ";
        assert_eq!(run_output(indirect, &[]), [2]);
    }

    #[test]
    fn test_input() {
        assert_eq!(run_output("INP\nADD #1\nOUT\nINP\nOUT\nHLT", &[41, -5]), [42, -5]);
        assert_emu_fail("INP\nHLT", EmuErr::InputUnavailable);
    }

    #[test]
    fn test_no_output_device() {
        let obj = assemble("OUT\nHLT").unwrap();
        let mut emu = Emulator::default();
        emu.load_obj_file(&obj).unwrap();
        assert_eq!(emu.run(), Err(EmuErr::OutputUnavailable));
        assert_eq!(emu.prefetch_pc(), 0);
    }

    #[test]
    fn test_implicit_halt() {
        let (mut emu, io) = load("LDA #1\nOUT", EmuFlags { mem_size: Some(2) }, &[]);
        emu.run().unwrap();
        assert!(emu.hit_halt());
        assert_eq!(emu.pc, 2);
        assert_eq!(emu.instructions_run, 2);
        assert_eq!(io.output_values(), [1]);

        // an empty memory image halts immediately
        let mut emu = Emulator::default();
        emu.run().unwrap();
        assert!(emu.hit_halt());
    }

    #[test]
    fn test_mem_size() {
        let obj = assemble("LDA #1\nOUT\nHLT").unwrap();

        let mut emu = Emulator::new(EmuFlags { mem_size: Some(2) });
        assert_eq!(emu.load_obj_file(&obj), Err(EmuErr::ProgramTooLarge { len: 3, size: 2 }));

        let mut emu = Emulator::new(EmuFlags { mem_size: Some(100) });
        emu.load_obj_file(&obj).unwrap();
        assert_eq!(emu.mem.len(), 100);
    }

    #[test]
    fn test_decode_errors() {
        let obj = ObjectFile::from_words(vec![0b010000_00_00000000, 0b111111_00_00000001]);
        let (mut emu, _) = load_obj(&obj, Default::default(), &[]);
        assert_eq!(emu.run(), Err(EmuErr::InvalidOpcode { word: 0b111111_00_00000001, pc: 1 }));
        assert_eq!(emu.prefetch_pc(), 1);

        let obj = ObjectFile::from_words(vec![0b010100_11_00000000]);
        let (mut emu, _) = load_obj(&obj, Default::default(), &[]);
        assert_eq!(emu.run(), Err(EmuErr::InvalidAddressMode { word: 0b010100_11_00000000, pc: 0 }));

        assert_emu_fail("ITC\nHLT", EmuErr::UnimplementedOpcode(Opcode::Itc));
        assert_emu_fail("LDA #1\nOTC\nHLT", EmuErr::UnimplementedOpcode(Opcode::Otc));
    }

    #[test]
    fn test_out_of_bounds() {
        assert_emu_fail("LDA &200\nHLT", EmuErr::OutOfBounds(200));
        assert_emu_fail("BRA 200\nHLT", EmuErr::OutOfBounds(200));

        // the pointer is in range, but the cell it points to is not
        let src = "
                LDA #1
                STA ~ptr
                HLT
            ptr DAT 255
        ";
        assert_emu_fail(src, EmuErr::OutOfBounds(255));
    }

    #[test]
    fn test_run_with_limit() {
        let (mut emu, _) = load("loop BRA loop", Default::default(), &[]);
        emu.run_with_limit(10).unwrap();
        assert!(!emu.hit_halt());
        assert_eq!(emu.instructions_run, 10);
        assert_eq!(emu.pc, 0);

        emu.run_with_limit(5).unwrap();
        assert_eq!(emu.instructions_run, 15);
    }

    #[test]
    fn test_step_in() {
        let (mut emu, io) = load("LDA #4\nOUT\nHLT", Default::default(), &[]);
        emu.step_in().unwrap();
        assert_eq!((emu.pc, emu.acc), (1, 4));
        emu.step_in().unwrap();
        assert_eq!(io.output_values(), [4]);
        emu.step_in().unwrap();
        assert_eq!(emu.prefetch_pc(), 2);
        assert_eq!(emu.instructions_run, 2);
    }

    #[test]
    fn test_reset() {
        let (mut emu, io) = load("LDA #4\nOUT\nHLT", EmuFlags { mem_size: Some(16) }, &[]);
        emu.run().unwrap();
        emu.reset();

        assert_eq!((emu.pc, emu.acc, emu.instructions_run), (0, 0, 0));
        assert!(emu.mem.is_empty());
        assert!(!emu.hit_halt());
        assert_eq!(emu.flags.mem_size, Some(16));

        // IO survives the reset
        emu.load_obj_file(&assemble("LDA #5\nOUT\nHLT").unwrap()).unwrap();
        emu.run().unwrap();
        assert_eq!(io.output_values(), [4, 5]);
    }

    #[test]
    fn test_deterministic() {
        let src = "
                    INP
                    STA &n
            loop    LDA &n
                    OUT
                    SUB #1
                    STA &n
                    BRP loop
                    HLT
            n       DAT 0
        ";
        let obj = assemble(src).unwrap();

        let run = || {
            let (mut emu, io) = load_obj(&obj, Default::default(), &[4]);
            emu.run().unwrap();
            (io.output_values(), emu.mem.clone())
        };
        let (out1, mem1) = run();
        let (out2, mem2) = run();

        assert_eq!(out1, [4, 3, 2, 1]);
        assert_eq!(out1, out2);
        assert_eq!(mem1, mem2);
    }
}
