//! Components relating to the trees and instructions
//! passed between the stages of the pipeline.
//!
//! These components together are used to construct...
//! - [`Token`] (a node of the BMC token tree, produced by the parser),
//! - [`asm::Stmt`] (a data structure holding one line of LMC assembly),
//! - and [`mach::Instr`] (a data structure holding an encoded machine instruction).

pub mod asm;
pub mod mach;

/// A node of the BMC token tree.
///
/// Blocks (the bodies of conditionals and functions) own their nested tokens,
/// so a whole program is just a `Vec<Token>`.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Token {
    /// A decimal literal in `[0, 999]`.
    Number(u16),
    /// One of the built-in operators.
    Operator(Operator),
    /// Whitespace. This has no effect when executed.
    NoOp,
    /// `? { body }`
    If(Vec<Token>),
    /// `? { then } : { else }`
    IfElse(Vec<Token>, Vec<Token>),
    /// `fn (params...) { body }`
    Function {
        /// The parameter names, in declaration order.
        params: Vec<String>,
        /// The function body.
        body: Vec<Token>
    },
    /// `is name`, which binds the top of the stack to `name`.
    Constant(String),
    /// A name, which pushes the value bound to it.
    Reference(String),
}

macro_rules! operator_enum {
    ($($(#[$m:meta])* $name:ident = $sym:literal),+) => {
        /// A built-in BMC operator.
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum Operator {
            $($(#[$m])* $name),+
        }
        impl Operator {
            /// All operators, in the order the parser tries them.
            pub const ALL: &'static [Operator] = &[$(Operator::$name),+];

            /// The source symbol for this operator.
            pub fn symbol(self) -> &'static str {
                match self {
                    $(Operator::$name => $sym),+
                }
            }
        }
    }
}
operator_enum! {
    /// `void`: pops and discards the top of the stack.
    Void  = "void",
    /// `+`
    Add   = "+",
    /// `-`
    Sub   = "-",
    /// `*`
    Mul   = "*",
    /// `/` (floor division)
    Div   = "/",
    /// `%` (floor modulo)
    Mod   = "%",
    /// `=`: pushes 1 if the top two values are equal, else 0.
    Eq    = "=",
    /// `.`: pops and prints the top of the stack.
    Print = ".",
    /// `@`: pops a depth and pushes a copy of the value that many positions below the top.
    Peek  = "@",
    /// `!`: pops a function address and calls it.
    Call  = "!",
    /// `~`: pushes 1 if the popped value is zero, else 0.
    Not   = "~"
}
impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An unsigned 8-bit operand address.
///
/// ## Examples
///
/// ```text
/// LDA &_sp
///      ~~~
/// ADD #1
///      ~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct Addr(u8);
impl Addr {
    /// Creates a new address, failing if the value does not fit in 8 bits.
    ///
    /// ```
    /// # use bmc_ensemble::ast::Addr;
    /// #
    /// assert!(Addr::new(255).is_ok());
    /// assert!(Addr::new(256).is_err());
    /// ```
    pub fn new(n: u16) -> Result<Self, AddrRangeErr> {
        u8::try_from(n)
            .map(Addr)
            .map_err(|_| AddrRangeErr(n))
    }

    /// Creates a new address from the low 8 bits of the value.
    ///
    /// ```
    /// # use bmc_ensemble::ast::Addr;
    /// #
    /// assert_eq!(Addr::new_trunc(0x1FF).get(), 0xFF);
    /// ```
    pub fn new_trunc(n: u16) -> Self {
        Self(n as u8)
    }

    /// Gets the value of the address.
    pub fn get(&self) -> u16 {
        u16::from(self.0)
    }
}
impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A value was too large to be an [`Addr`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct AddrRangeErr(pub u16);
impl std::fmt::Display for AddrRangeErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} does not fit in an 8-bit address", self.0)
    }
}
impl std::error::Error for AddrRangeErr {}
impl crate::err::Error for AddrRangeErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        Some(format!("addresses range over [0, {}]", u8::MAX).into())
    }
}

#[cfg(test)]
mod tests {
    use super::{Addr, AddrRangeErr};

    #[test]
    fn test_addr_bounds() {
        assert_eq!(Addr::new(0).map(|a| a.get()), Ok(0));
        assert_eq!(Addr::new(255).map(|a| a.get()), Ok(255));
        assert_eq!(Addr::new(256), Err(AddrRangeErr(256)));
        assert_eq!(Addr::new(u16::MAX), Err(AddrRangeErr(u16::MAX)));
        assert_eq!(Addr::new_trunc(0x1A5).to_string(), "165");
    }
}
