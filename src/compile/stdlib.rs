//! The default runtime for compiled programs.
//!
//! [`BundledStdlib`] provides:
//! - `macros`: `PUSHACC`, `PUSH`, and `POP`, which keep the evaluation stack in memory
//! - `functions`: the `std_fail` trap, then `std_mul` and `std_div` (floor division, remainder left in `_b`)
//! - `data`: the scratch cells, the frame and stack pointers, and the stack base
//!
//! The data snippet must stay last in compiled output,
//! since the stack grows upward from `_stack` into the memory after the program.

use std::borrow::Cow;

use super::Stdlib;

const MACROS: &str = include_str!("stdlib/macros.lmc");
const FUNCTIONS: &str = include_str!("stdlib/functions.lmc");
const DATA: &str = include_str!("stdlib/data.lmc");

/// The stdlib bundled with this crate.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundledStdlib;

impl Stdlib for BundledStdlib {
    fn snippet(&self, key: &str) -> Option<Cow<'_, str>> {
        match key {
            "macros"    => Some(Cow::Borrowed(MACROS)),
            "functions" => Some(Cow::Borrowed(FUNCTIONS)),
            "data"      => Some(Cow::Borrowed(DATA)),
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::asm::assemble;
    use crate::compile::{Stdlib, STDLIB_KEYS};

    use super::BundledStdlib;

    #[test]
    fn test_all_keys() {
        for key in STDLIB_KEYS {
            assert!(BundledStdlib.snippet(key).is_some(), "missing {key}");
        }
        assert!(BundledStdlib.snippet("extra").is_none());
    }

    #[test]
    fn test_assembles_alone() {
        let src: String = STDLIB_KEYS.iter()
            .filter_map(|&k| BundledStdlib.snippet(k))
            .collect();

        let obj = assemble(&src).unwrap();
        let sym = obj.symbol_table();

        // the stack base is the last cell, and both pointers start there
        let stack = sym.lookup_label("_stack").unwrap();
        assert_eq!(usize::from(stack), obj.len() - 1);
        for ptr in ["_fp", "_sp"] {
            let addr = sym.lookup_label(ptr).unwrap();
            assert_eq!(obj.words()[usize::from(addr)], stack);
        }
    }
}
