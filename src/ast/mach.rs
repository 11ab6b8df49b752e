//! Encoded machine instructions.
//!
//! Every instruction is a 16-bit word laid out as:
//!
//! ```text
//! 15      10 9  8 7          0
//! | opcode  |mode| address   |
//! ```
//!
//! The [`Instr`] struct holds a decoded word
//! and converts between the two forms with [`Instr::encode`] and [`Instr::decode`].

use super::Addr;

macro_rules! opcode_enum {
    ($($(#[$m:meta])* $name:ident = $bits:literal),+) => {
        /// A 6-bit operation code.
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum Opcode {
            $($(#[$m])* $name),+
        }
        impl Opcode {
            /// The 6-bit encoding of this opcode.
            pub fn bits(self) -> u8 {
                match self {
                    $(Opcode::$name => $bits),+
                }
            }

            /// Finds the opcode with the given encoding.
            pub fn from_bits(bits: u8) -> Option<Self> {
                match bits {
                    $($bits => Some(Opcode::$name)),+,
                    _ => None
                }
            }
        }
    }
}
opcode_enum! {
    /// Halt. `DAT` cells share this encoding.
    Hlt = 0b000000,
    /// Add the operand to the accumulator.
    Add = 0b000100,
    /// Subtract the operand from the accumulator.
    Sub = 0b001000,
    /// Store the accumulator.
    Sta = 0b001100,
    /// Do nothing.
    Nop = 0b010000,
    /// Load the operand into the accumulator.
    Lda = 0b010100,
    /// Branch always.
    Bra = 0b011000,
    /// Branch if the accumulator is zero.
    Brz = 0b011100,
    /// Branch if the accumulator is positive.
    Brp = 0b100000,
    /// Read an integer into the accumulator.
    Inp = 0b100100,
    /// Read a character into the accumulator (not implemented by the emulator).
    Itc = 0b100101,
    /// Write the accumulator as an integer.
    Out = 0b100110,
    /// Write the accumulator as a character (not implemented by the emulator).
    Otc = 0b100111
}
impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Opcode::Hlt => "HLT",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Sta => "STA",
            Opcode::Nop => "NOP",
            Opcode::Lda => "LDA",
            Opcode::Bra => "BRA",
            Opcode::Brz => "BRZ",
            Opcode::Brp => "BRP",
            Opcode::Inp => "INP",
            Opcode::Itc => "ITC",
            Opcode::Out => "OUT",
            Opcode::Otc => "OTC",
        };
        f.write_str(name)
    }
}

/// An addressing mode, which determines how the address field is interpreted.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Mode {
    /// The address field is the value itself (`#`).
    Immediate,
    /// The value is the memory cell at the address (`&`).
    Direct,
    /// The value is the memory cell at the address stored at the address (`~`).
    Indirect,
}
impl Mode {
    /// The 2-bit encoding of this mode.
    pub fn bits(self) -> u8 {
        match self {
            Mode::Immediate => 0b00,
            Mode::Direct    => 0b01,
            Mode::Indirect  => 0b10,
        }
    }

    /// Finds the mode with the given encoding.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(Mode::Immediate),
            0b01 => Some(Mode::Direct),
            0b10 => Some(Mode::Indirect),
            _    => None
        }
    }

    /// The character which selects this mode in assembly source.
    pub fn prefix(self) -> char {
        match self {
            Mode::Immediate => '#',
            Mode::Direct    => '&',
            Mode::Indirect  => '~',
        }
    }
}

/// A decoded machine instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Instr {
    #[allow(missing_docs)]
    pub opcode: Opcode,
    #[allow(missing_docs)]
    pub mode: Mode,
    #[allow(missing_docs)]
    pub addr: Addr,
}

/// Errors raised when a word does not decode into an instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DecodeErr {
    /// The opcode bits have no defined meaning.
    InvalidOpcode,
    /// The mode bits are not one of the three defined modes.
    InvalidMode,
}

impl Instr {
    /// Creates a new instruction.
    pub fn new(opcode: Opcode, mode: Mode, addr: Addr) -> Self {
        Self { opcode, mode, addr }
    }

    /// Packs this instruction into a 16-bit word.
    ///
    /// ```
    /// use bmc_ensemble::ast::Addr;
    /// use bmc_ensemble::ast::mach::{Instr, Mode, Opcode};
    ///
    /// let instr = Instr::new(Opcode::Lda, Mode::Direct, Addr::new_trunc(3));
    /// assert_eq!(instr.encode(), 0b010100_01_00000011);
    /// ```
    pub fn encode(&self) -> u16 {
        let op = u16::from(self.opcode.bits()) << 10;
        let mode = u16::from(self.mode.bits()) << 8;
        op | mode | self.addr.get()
    }

    /// Unpacks a 16-bit word into an instruction.
    pub fn decode(word: u16) -> Result<Self, DecodeErr> {
        let opcode = Opcode::from_bits((word >> 10) as u8).ok_or(DecodeErr::InvalidOpcode)?;
        let mode = Mode::from_bits(((word >> 8) & 0b11) as u8).ok_or(DecodeErr::InvalidMode)?;
        let addr = Addr::new_trunc(word & 0xFF);

        Ok(Self { opcode, mode, addr })
    }
}
impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}{}", self.opcode, self.mode.prefix(), self.addr)
    }
}

/// Formats a word in its field-separated binary form (e.g., `010100_01 00000011`).
pub(crate) fn fmt_word_fields(word: u16) -> String {
    format!("{:06b}_{:02b} {:08b}", word >> 10, (word >> 8) & 0b11, word & 0xFF)
}

#[cfg(test)]
mod tests {
    use crate::ast::Addr;

    use super::{fmt_word_fields, DecodeErr, Instr, Mode, Opcode};

    #[test]
    fn test_encode_layout() {
        let instr = Instr::new(Opcode::Bra, Mode::Indirect, Addr::new_trunc(0xA5));
        assert_eq!(instr.encode(), 0b011000_10_10100101);
        assert_eq!(fmt_word_fields(instr.encode()), "011000_10 10100101");

        // address 255 survives
        let instr = Instr::new(Opcode::Out, Mode::Immediate, Addr::new_trunc(255));
        assert_eq!(Instr::decode(instr.encode()), Ok(instr));
    }

    #[test]
    fn test_decode_all_opcodes() {
        for bits in 0..64u8 {
            let word = u16::from(bits) << 10;
            match Opcode::from_bits(bits) {
                Some(op) => assert_eq!(Instr::decode(word).map(|i| i.opcode), Ok(op)),
                None => assert_eq!(Instr::decode(word), Err(DecodeErr::InvalidOpcode)),
            }
        }
    }

    #[test]
    fn test_decode_bad_mode() {
        assert_eq!(Instr::decode(0b000100_11_00000000), Err(DecodeErr::InvalidMode));
        assert_eq!(Opcode::from_bits(0b000001), None);
        assert_eq!(Opcode::from_bits(0b100111), Some(Opcode::Otc));
    }
}
