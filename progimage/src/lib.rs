//! The textual JSON program image format (§6.1): a `Vec<Instruction>` serialized as one JSON
//! array, one object per instruction, reused unchanged as the wire format for port interrupt
//! handler files.
//!
//! Mirrors the donor `vexfile` crate's shape (`read`/`write`/`read_file`/`write_file` plus
//! `Read`/`Write`-extension traits) but serializes through `serde_json` instead of `vexfile`'s
//! packed `byteorder` framing — programs here are opcode/arg/term records, not raw bytes.

use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

use serde::de::{Error as DeError, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use forthchan::isa::{Instruction, Opcode, Term};

/// A program image: a flat, ordered sequence of instructions (§6.1). Handler files use the same
/// representation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Program {
        Program { instructions }
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl From<Vec<Instruction>> for Program {
    fn from(instructions: Vec<Instruction>) -> Program {
        Program::new(instructions)
    }
}

/// The on-disk record shape (§6.1). Carries its own `Serialize`/`Deserialize` so `Opcode` renders
/// as its wire string and `term` accepts both the current object form and the legacy 3-element
/// array a handful of older images still use.
#[derive(Serialize, Deserialize)]
struct WireInstruction {
    index: u32,
    #[serde(with = "opcode_as_str")]
    opcode: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arg: Option<i64>,
    term: WireTerm,
}

mod opcode_as_str {
    use super::*;

    pub fn serialize<S: Serializer>(opcode: &Opcode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&opcode.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Opcode, D::Error> {
        let s = String::deserialize(deserializer)?;
        Opcode::from_str(&s).map_err(|_| {
            D::Error::invalid_value(Unexpected::Str(&s), &"a known forthchan opcode")
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireTerm {
    Object {
        line_number: u32,
        line_position: u32,
        name: String,
    },
    /// `[line, pos, name]`, accepted for images written by older toolchains (§6.1).
    Tuple(u32, u32, String),
}

impl From<&Term> for WireTerm {
    fn from(term: &Term) -> WireTerm {
        WireTerm::Object {
            line_number: term.line_number,
            line_position: term.line_position,
            name: term.name.clone(),
        }
    }
}

impl From<WireTerm> for Term {
    fn from(wire: WireTerm) -> Term {
        match wire {
            WireTerm::Object { line_number, line_position, name } => {
                Term::new(line_number, line_position, name)
            }
            WireTerm::Tuple(line_number, line_position, name) => {
                Term::new(line_number, line_position, name)
            }
        }
    }
}

impl From<&Instruction> for WireInstruction {
    fn from(instr: &Instruction) -> WireInstruction {
        WireInstruction {
            index: instr.index,
            opcode: instr.opcode,
            arg: instr.arg,
            term: (&instr.term).into(),
        }
    }
}

impl From<WireInstruction> for Instruction {
    fn from(wire: WireInstruction) -> Instruction {
        Instruction::new(wire.index, wire.opcode, wire.arg, wire.term.into())
    }
}

/// Reads a program image from `reader` (§6.1).
pub fn read<R: Read>(reader: &mut R) -> serde_json::Result<Program> {
    let wire: Vec<WireInstruction> = serde_json::from_reader(reader)?;
    Ok(Program::new(wire.into_iter().map(Instruction::from).collect()))
}

/// Writes a program image to `writer`, one instruction object per line (§6.1).
pub fn write<W: Write>(writer: &mut W, program: &Program) -> serde_json::Result<()> {
    let wire: Vec<WireInstruction> = program.instructions.iter().map(WireInstruction::from).collect();
    serde_json::to_writer_pretty(writer, &wire)
}

pub trait ReadImageExt: Read + Sized {
    fn read_image(&mut self) -> serde_json::Result<Program> {
        read(self)
    }
}

impl<R: Read + Sized> ReadImageExt for R {}

pub trait WriteImageExt: Write + Sized {
    fn write_image(&mut self, program: &Program) -> serde_json::Result<()> {
        write(self, program)
    }
}

impl<W: Write + Sized> WriteImageExt for W {}

fn to_io_error(err: serde_json::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, err)
}

pub fn read_file<P: AsRef<Path>>(path: P) -> std::io::Result<Program> {
    read(&mut BufReader::new(File::open(path)?)).map_err(to_io_error)
}

pub fn write_file<P: AsRef<Path>>(path: P, program: &Program) -> std::io::Result<()> {
    write(&mut BufWriter::new(File::create(path)?), program).map_err(to_io_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forthchan::isa::Term;

    fn sample() -> Program {
        Program::new(vec![
            Instruction::new(0, Opcode::Number, Some(3), Term::new(1, 1, "3")),
            Instruction::new(1, Opcode::Halt, None, Term::new(2, 1, "halt")),
        ])
    }

    #[test]
    fn round_trips_through_json() {
        let program = sample();
        let mut buf = Vec::new();
        write(&mut buf, &program).unwrap();
        let parsed = read(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed, program);
    }

    #[test]
    fn arg_is_absent_rather_than_null_for_no_arg_opcodes() {
        let program = sample();
        let mut buf = Vec::new();
        write(&mut buf, &program).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("\"arg\": null"));
    }

    #[test]
    fn accepts_legacy_tuple_term_form() {
        let text = r#"[{"index":0,"opcode":"halt","term":[1,1,"halt"]}]"#;
        let parsed = read(&mut text.as_bytes()).unwrap();
        assert_eq!(parsed.instructions()[0].term.name, "halt");
        assert_eq!(parsed.instructions()[0].term.line_number, 1);
    }

    #[test]
    fn rejects_unknown_opcode_strings() {
        let text = r#"[{"index":0,"opcode":"frobnicate","term":{"line_number":1,"line_position":1,"name":"x"}}]"#;
        assert!(read(&mut text.as_bytes()).is_err());
    }
}
