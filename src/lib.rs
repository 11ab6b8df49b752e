//! A BMC parser, interpreter, and compiler, with an LMC macro assembler and emulator.
//!
//! BMC is a small stack language. A BMC program can either be run directly
//! (by the tree interpreter in [`interp`]) or compiled to LMC assembly ([`compile`]),
//! assembled into 16-bit words ([`asm`]), and run on an emulated
//! single-accumulator machine ([`emu`]). Both paths print the same values.
//!
//! # Usage
//!
//! To run BMC source directly, it must be parsed and interpreted:
//! ```
//! use bmc_ensemble::parse::parse_tokens;
//! use bmc_ensemble::interp::interpret;
//! use bmc_ensemble::io::BufferedIO;
//!
//! let tokens = parse_tokens("5 3 - .").unwrap();
//!
//! let io = BufferedIO::new();
//! let stack = interpret(&tokens, io.clone()).unwrap();
//! assert_eq!(io.output_values(), [2]);
//! assert!(stack.is_empty());
//! ```
//!
//! The same tokens can be compiled to assembly, assembled into an object file,
//! and executed with the emulator:
//! ```
//! # use bmc_ensemble::parse::parse_tokens;
//! # use bmc_ensemble::io::BufferedIO;
//! # let tokens = parse_tokens("5 3 - .").unwrap();
//! use bmc_ensemble::compile::compile;
//! use bmc_ensemble::compile::stdlib::BundledStdlib;
//! use bmc_ensemble::asm::assemble;
//! use bmc_ensemble::emu::Emulator;
//!
//! let asm = compile(&tokens, &BundledStdlib).unwrap();
//! let obj_file = assemble(&asm).unwrap();
//!
//! let io = BufferedIO::new();
//! let mut emulator = Emulator::new(Default::default());
//! emulator.io = io.clone().into();
//! emulator.load_obj_file(&obj_file).unwrap();
//! emulator.run().unwrap(); // <-- Result can be handled accordingly
//! assert_eq!(io.output_values(), [2]);
//! ```
//!
//! The [`pipeline`] module wraps these steps into single calls.
//! See the [`emu`] module for more granular execution.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod interp;
pub mod compile;
pub mod asm;
pub mod emu;
pub mod io;
pub mod pipeline;
pub mod err;
