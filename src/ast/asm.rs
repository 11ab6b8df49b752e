//! Parsed lines of LMC assembly.
//!
//! After macro expansion, every remaining line of assembly is parsed into a [`Stmt`]:
//!
//! ```text
//! loop  LDA &counter   -- comment
//! ~~~~  ~~~ ~~~~~~~~
//! label  |   operand
//!     mnemonic
//! ```

use super::mach::{Mode, Opcode};

macro_rules! mnemonic_enum {
    ($($name:ident => $op:ident),+) => {
        /// An instruction mnemonic.
        ///
        /// Mnemonics are case-sensitive (e.g., `LDA` is a mnemonic, but `lda` is a label).
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum Mnemonic {
            $(
                #[allow(missing_docs)]
                $name
            ),+
        }

        impl std::str::FromStr for Mnemonic {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($name) => Ok(Self::$name)),+,
                    _ => Err(())
                }
            }
        }

        impl std::fmt::Display for Mnemonic {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$name => f.write_str(stringify!($name))),+
                }
            }
        }

        impl Mnemonic {
            /// The opcode this mnemonic assembles to.
            pub fn opcode(self) -> Opcode {
                match self {
                    $(Self::$name => Opcode::$op),+
                }
            }
        }
    };
}
mnemonic_enum! {
    HLT => Hlt, DAT => Hlt, ADD => Add, SUB => Sub, STA => Sta, NOP => Nop, LDA => Lda,
    BRA => Bra, BRZ => Brz, BRP => Brp, INP => Inp, ITC => Itc, OUT => Out, OTC => Otc
}

impl Mnemonic {
    /// Whether an instruction with this mnemonic is meaningless without an operand.
    pub fn requires_operand(self) -> bool {
        matches!(self,
            Mnemonic::ADD | Mnemonic::SUB | Mnemonic::STA | Mnemonic::LDA |
            Mnemonic::BRA | Mnemonic::BRZ | Mnemonic::BRP
        )
    }

    /// Whether this mnemonic reads or writes a memory cell through its operand.
    pub fn references_memory(self) -> bool {
        matches!(self, Mnemonic::ADD | Mnemonic::SUB | Mnemonic::STA | Mnemonic::LDA)
    }

    /// The addressing mode used for an operand without a mode prefix.
    ///
    /// Memory-referencing mnemonics default to direct mode for labels,
    /// but a bare numeric literal is ambiguous for them (it could either be
    /// a value or a cell), so this returns `None` in that case.
    /// Everything else defaults to immediate mode.
    pub fn default_mode(self, target: &Target) -> Option<Mode> {
        match (self.references_memory(), target) {
            (false, _) => Some(Mode::Immediate),
            (true, Target::Label(_)) => Some(Mode::Direct),
            (true, Target::Literal(_)) => None,
        }
    }
}

/// What an operand refers to.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Target {
    /// A decimal literal.
    Literal(u16),
    /// A label, resolved in the second assembler pass.
    Label(String),
}
impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Literal(n) => n.fmt(f),
            Target::Label(l) => l.fmt(f),
        }
    }
}

/// An operand, with its addressing mode prefix (if it was written).
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Operand {
    /// The explicit mode prefix, if present.
    pub mode: Option<Mode>,
    #[allow(missing_docs)]
    pub target: Target,
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = self.mode {
            write!(f, "{}", m.prefix())?;
        }
        self.target.fmt(f)
    }
}

/// A single parsed line of assembly.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Stmt {
    /// The label attached to this line.
    pub label: Option<String>,
    #[allow(missing_docs)]
    pub mnemonic: Mnemonic,
    #[allow(missing_docs)]
    pub operand: Option<Operand>,
    /// The source line this statement came from.
    ///
    /// For lines produced by macro expansion,
    /// this is the line of the outermost invocation.
    pub line: usize,
}
impl std::fmt::Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label} ")?;
        }
        self.mnemonic.fmt(f)?;
        if let Some(operand) = &self.operand {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::mach::{Mode, Opcode};

    use super::{Mnemonic, Target};

    #[test]
    fn test_mnemonic_case() {
        assert_eq!("LDA".parse::<Mnemonic>(), Ok(Mnemonic::LDA));
        assert_eq!("lda".parse::<Mnemonic>(), Err(()));
        assert_eq!(Mnemonic::DAT.opcode(), Opcode::Hlt);
        assert_eq!(Mnemonic::HLT.opcode(), Opcode::Hlt);
    }

    #[test]
    fn test_default_mode() {
        let lit = Target::Literal(5);
        let label = Target::Label("cell".to_string());

        assert_eq!(Mnemonic::DAT.default_mode(&lit), Some(Mode::Immediate));
        assert_eq!(Mnemonic::BRA.default_mode(&label), Some(Mode::Immediate));
        assert_eq!(Mnemonic::LDA.default_mode(&label), Some(Mode::Direct));
        assert_eq!(Mnemonic::STA.default_mode(&lit), None);
    }
}
