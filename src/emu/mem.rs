//! The emulator's memory image.
//!
//! Unlike a real machine, the image has no fixed size.
//! It is sized when a program is loaded (see [`EmuFlags::mem_size`]),
//! and every access outside of it is an [`EmuErr::OutOfBounds`] error.
//!
//! [`EmuFlags::mem_size`]: super::EmuFlags::mem_size

use crate::ast::mach::{fmt_word_fields, Instr};

use super::EmuErr;

/// A zero-filled, fixed-length array of words.
///
/// ```
/// use bmc_ensemble::emu::mem::MemArray;
///
/// let mut mem = MemArray::new(4);
/// mem.write(3, 0xBEEF).unwrap();
///
/// assert_eq!(mem.read(3), Ok(0xBEEF));
/// assert!(mem.read(4).is_err());
/// assert!(mem.write(4, 0).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct MemArray {
    data: Box<[u16]>
}
impl MemArray {
    /// Creates a zero-filled memory image with `size` words.
    pub fn new(size: usize) -> Self {
        Self { data: vec![0; size].into_boxed_slice() }
    }

    /// Creates a memory image of `size` words, with the program copied in at address 0.
    pub fn with_program(program: &[u16], size: usize) -> Result<Self, EmuErr> {
        if program.len() > size {
            return Err(EmuErr::ProgramTooLarge { len: program.len(), size });
        }

        let mut mem = Self::new(size);
        mem.data[..program.len()].copy_from_slice(program);
        Ok(mem)
    }

    /// The number of words in this image.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether this image has no words.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The image as a slice.
    pub fn as_slice(&self) -> &[u16] {
        &self.data
    }

    /// Reads the word at the provided address.
    pub fn read(&self, addr: usize) -> Result<u16, EmuErr> {
        self.data.get(addr)
            .copied()
            .ok_or(EmuErr::OutOfBounds(addr))
    }

    /// Writes a word to the provided address.
    pub fn write(&mut self, addr: usize, word: u16) -> Result<(), EmuErr> {
        let cell = self.data.get_mut(addr).ok_or(EmuErr::OutOfBounds(addr))?;
        *cell = word;
        Ok(())
    }

    /// Renders the image with one word per line.
    ///
    /// Each line holds the address, the signed value, the word's fields,
    /// and the instruction it decodes to (if it decodes to one).
    ///
    /// ```text
    ///   0 | 20485 | 010100_00 00000101 | LDA #5
    /// ```
    pub fn dump(&self) -> String {
        let width = self.len().saturating_sub(1).to_string().len();

        let mut buf = String::new();
        for (addr, &word) in self.data.iter().enumerate() {
            let fields = fmt_word_fields(word);
            let line = match Instr::decode(word) {
                Ok(instr) => format!("{addr:>width$} | {:>6} | {fields} | {instr}\n", word as i16),
                Err(_)    => format!("{addr:>width$} | {:>6} | {fields} |\n", word as i16),
            };
            buf.push_str(&line);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use crate::emu::EmuErr;

    use super::MemArray;

    #[test]
    fn test_with_program() {
        let mem = MemArray::with_program(&[1, 2, 3], 5).unwrap();
        assert_eq!(mem.as_slice(), [1, 2, 3, 0, 0]);

        assert_eq!(
            MemArray::with_program(&[1, 2, 3], 2),
            Err(EmuErr::ProgramTooLarge { len: 3, size: 2 })
        );
    }

    #[test]
    fn test_bounds() {
        let mut mem = MemArray::new(2);
        assert_eq!(mem.read(2), Err(EmuErr::OutOfBounds(2)));
        assert_eq!(mem.write(usize::MAX, 1), Err(EmuErr::OutOfBounds(usize::MAX)));
        assert!(MemArray::new(0).is_empty());
    }

    #[test]
    fn test_dump() {
        // LDA #5, OUT, and a word with mode bits 0b11
        let mem = MemArray::with_program(&[0b010100_00_00000101, 0b100110_00_00000000, 0b000000_11_00000000], 3).unwrap();
        let dump = mem.dump();
        let lines: Vec<_> = dump.lines().collect();

        assert_eq!(lines[0], "0 |  20485 | 010100_00 00000101 | LDA #5");
        assert_eq!(lines[1], "1 | -26624 | 100110_00 00000000 | OUT #0");
        assert_eq!(lines[2], "2 |    768 | 000000_11 00000000 |");
    }
}
