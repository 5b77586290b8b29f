//! Cycle-accurate interpreter for the `.forthchan` stack processor.
//!
//! This crate models an abstract stack machine: an instruction pointer, two stacks (operand and
//! return), a flat data-memory image partitioned into handler table / handler code / variable
//! data / program code / stacks, two fast registers (`TOP`, `NEXT`), a per-instruction microstep
//! counter (`ISN`), and a handful of memory-mapped I/O ports driven by an interrupt-on-arrival
//! protocol. See the sibling `forthchan-compiler` crate for the compiler that produces the
//! instruction streams this crate runs.

extern crate num;
#[macro_use]
extern crate num_derive;

pub mod control;
pub mod datapath;
pub mod isa;
pub mod memory;
pub mod port;

pub use control::{ControlUnit, ExitCode, TickResult};
pub use datapath::DataPath;
pub use isa::{Cell, Instruction, Opcode, Term};
pub use port::{InterruptablePort, Port};
