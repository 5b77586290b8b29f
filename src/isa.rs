//! The instruction set: [`Opcode`], the per-instruction record [`Instruction`], the
//! source-origin breadcrumb [`Term`], and the tagged-variant data-memory cell [`Cell`].

use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt;
use std::str::FromStr;
use util::ParseEnumError;

/// One tag from the opcode universe. The `&str` each variant parses from/renders to is exactly
/// the wire string used by the textual program image (see `progimage`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, FromPrimitive, ToPrimitive)]
pub enum Opcode {
    Sum,
    Diff,
    Div,
    Mul,
    Mod,
    Eq,
    Neq,
    Less,
    Gr,
    Le,
    Ge,
    ShiftBack,
    ShiftBackRet,
    Put,
    PutAbsolute,
    Pick,
    PickAbsolute,
    Swap,
    PushToRet,
    PopToRet,
    PushToOd,
    PopToOd,
    Number,
    Jmp,
    ExecIf,
    ExecCondJmp,
    ExecCondJmpRet,
    DupRet,
    Dup,
    Dudup,
    IncrementRet,
    DecrementRet,
    JmpPopPraShp,
    PushIncIncIpToPraShp,
    EqNotConsumingRet,
    ReadVardata,
    WriteVardata,
    ReadVardataUserLink,
    WriteVardataUserLink,
    SumTopWithVdsp,
    WritePort,
    HasPortFilledWithCpu,
    ReadPort,
    HasPortFilledWithDevice,
    Halt,
}

impl Opcode {
    /// Whether this opcode carries an `arg`, per §6.1 ("`arg` MUST be `null` when the opcode
    /// takes no argument").
    pub fn takes_arg(self) -> bool {
        matches!(
            self,
            Opcode::Put
                | Opcode::PutAbsolute
                | Opcode::Number
                | Opcode::Jmp
                | Opcode::ExecCondJmp
                | Opcode::ExecCondJmpRet
                | Opcode::ReadVardata
                | Opcode::WriteVardata
                | Opcode::WritePort
                | Opcode::HasPortFilledWithCpu
                | Opcode::ReadPort
                | Opcode::HasPortFilledWithDevice
        )
    }

    /// Number of ticks the micro-sequence for this opcode takes (§4.3), independent of the
    /// `arg`/register values it is run with.
    pub fn tick_count(self) -> u32 {
        match self {
            Opcode::Sum
            | Opcode::Diff
            | Opcode::Div
            | Opcode::Mul
            | Opcode::Mod
            | Opcode::Eq
            | Opcode::Neq
            | Opcode::Less
            | Opcode::Gr
            | Opcode::Le
            | Opcode::Ge
            | Opcode::Put
            | Opcode::PutAbsolute
            | Opcode::Pick
            | Opcode::PickAbsolute
            | Opcode::Swap
            | Opcode::PopToRet
            | Opcode::Dudup
            | Opcode::JmpPopPraShp
            | Opcode::ReadVardata
            | Opcode::WriteVardata
            | Opcode::WriteVardataUserLink => 2,

            Opcode::PushToOd
            | Opcode::PopToOd
            | Opcode::DupRet
            | Opcode::IncrementRet
            | Opcode::DecrementRet
            | Opcode::EqNotConsumingRet => 3,

            _ => 1,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Opcode::Sum => "sum",
            Opcode::Diff => "diff",
            Opcode::Div => "div",
            Opcode::Mul => "mul",
            Opcode::Mod => "mod",
            Opcode::Eq => "eq",
            Opcode::Neq => "neq",
            Opcode::Less => "less",
            Opcode::Gr => "gr",
            Opcode::Le => "le",
            Opcode::Ge => "ge",
            Opcode::ShiftBack => "shift back",
            Opcode::ShiftBackRet => "shift back ret",
            Opcode::Put => "put",
            Opcode::PutAbsolute => "put absolute",
            Opcode::Pick => "pick",
            Opcode::PickAbsolute => "pick absolute",
            Opcode::Swap => "swap",
            Opcode::PushToRet => "push to ret",
            Opcode::PopToRet => "pop to ret",
            Opcode::PushToOd => "push to od",
            Opcode::PopToOd => "pop to od",
            Opcode::Number => "number",
            Opcode::Jmp => "jmp",
            Opcode::ExecIf => "exec if",
            Opcode::ExecCondJmp => "exec cond jmp",
            Opcode::ExecCondJmpRet => "exec cond jmp ret",
            Opcode::DupRet => "dup ret",
            Opcode::Dup => "dup",
            Opcode::Dudup => "dudup",
            Opcode::IncrementRet => "increment ret",
            Opcode::DecrementRet => "decrement ret",
            Opcode::JmpPopPraShp => "jmp pop pra shp",
            Opcode::PushIncIncIpToPraShp => "push inc inc ip to pra shp",
            Opcode::EqNotConsumingRet => "eq not consuming ret",
            Opcode::ReadVardata => "read vardata",
            Opcode::WriteVardata => "write vardata",
            Opcode::ReadVardataUserLink => "read vardata user link",
            Opcode::WriteVardataUserLink => "write vardata user link",
            Opcode::SumTopWithVdsp => "sum top with vdsp",
            Opcode::WritePort => "write port",
            Opcode::HasPortFilledWithCpu => "has port filled with cpu",
            Opcode::ReadPort => "read port",
            Opcode::HasPortFilledWithDevice => "has port filled with device",
            Opcode::Halt => "halt",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Opcode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Opcode, ParseEnumError> {
        let opcode = match s {
            "sum" => Opcode::Sum,
            "diff" => Opcode::Diff,
            "div" => Opcode::Div,
            "mul" => Opcode::Mul,
            "mod" => Opcode::Mod,
            "eq" => Opcode::Eq,
            "neq" => Opcode::Neq,
            "less" => Opcode::Less,
            "gr" => Opcode::Gr,
            "le" => Opcode::Le,
            "ge" => Opcode::Ge,
            "shift back" => Opcode::ShiftBack,
            "shift back ret" => Opcode::ShiftBackRet,
            "put" => Opcode::Put,
            "put absolute" => Opcode::PutAbsolute,
            "pick" => Opcode::Pick,
            "pick absolute" => Opcode::PickAbsolute,
            "swap" => Opcode::Swap,
            "push to ret" => Opcode::PushToRet,
            "pop to ret" => Opcode::PopToRet,
            "push to od" => Opcode::PushToOd,
            "pop to od" => Opcode::PopToOd,
            "number" => Opcode::Number,
            "jmp" => Opcode::Jmp,
            "exec if" => Opcode::ExecIf,
            "exec cond jmp" => Opcode::ExecCondJmp,
            "exec cond jmp ret" => Opcode::ExecCondJmpRet,
            "dup ret" => Opcode::DupRet,
            "dup" => Opcode::Dup,
            "dudup" => Opcode::Dudup,
            "increment ret" => Opcode::IncrementRet,
            "decrement ret" => Opcode::DecrementRet,
            "jmp pop pra shp" => Opcode::JmpPopPraShp,
            "push inc inc ip to pra shp" => Opcode::PushIncIncIpToPraShp,
            "eq not consuming ret" => Opcode::EqNotConsumingRet,
            "read vardata" => Opcode::ReadVardata,
            "write vardata" => Opcode::WriteVardata,
            "read vardata user link" => Opcode::ReadVardataUserLink,
            "write vardata user link" => Opcode::WriteVardataUserLink,
            "sum top with vdsp" => Opcode::SumTopWithVdsp,
            "write port" => Opcode::WritePort,
            "has port filled with cpu" => Opcode::HasPortFilledWithCpu,
            "read port" => Opcode::ReadPort,
            "has port filled with device" => Opcode::HasPortFilledWithDevice,
            "halt" => Opcode::Halt,
            _ => {
                return Err(ParseEnumError {
                    value: s.to_string(),
                    enum_name: "Opcode",
                })
            }
        };
        Ok(opcode)
    }
}

/// Diagnostic breadcrumb pointing back at the source term an instruction was lowered from.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Term {
    pub line_number: u32,
    pub line_position: u32,
    pub name: String,
}

impl Term {
    pub fn new(line_number: u32, line_position: u32, name: impl Into<String>) -> Term {
        Term {
            line_number,
            line_position,
            name: name.into(),
        }
    }
}

/// One instruction in the program image: an index (equal to its address), an opcode, an
/// optional argument, and the source term it was lowered from.
///
/// An `Instruction`'s `index` is assigned once by the compiler and never changes; `arg` may be
/// back-patched during compilation (forward jump targets, variable slot offsets) but never after
/// the image is assembled.
#[derive(Clone, PartialEq, Debug)]
pub struct Instruction {
    pub index: u32,
    pub opcode: Opcode,
    pub arg: Option<i64>,
    pub term: Term,
}

impl Instruction {
    pub fn new(index: u32, opcode: Opcode, arg: Option<i64>, term: Term) -> Instruction {
        Instruction {
            index,
            opcode,
            arg,
            term,
        }
    }

    /// The argument, or a fallback error describing which opcode needed one. Most `latch_*`
    /// helpers call this rather than `.arg.unwrap()` so a malformed image fails with a
    /// recognizable message instead of a panic.
    pub fn require_arg(&self) -> i64 {
        self.arg
            .unwrap_or_else(|| panic!("{} requires an arg but has none", self.opcode))
    }
}

/// A data-memory cell: either a plain signed integer or a compiled instruction.
///
/// Opcodes are only ever fetched from memory, never computed on arithmetically, so this is a
/// genuine tagged union rather than an integer overloaded to double as an opcode tag.
#[derive(Clone, PartialEq, Debug)]
pub enum Cell {
    Number(i64),
    Instr(Instruction),
}

impl Cell {
    pub fn as_number(&self) -> i64 {
        match self {
            Cell::Number(n) => *n,
            Cell::Instr(instr) => panic!(
                "expected a Number cell but found an instruction ({})",
                instr.opcode
            ),
        }
    }

    pub fn as_instruction(&self) -> &Instruction {
        match self {
            Cell::Instr(instr) => instr,
            Cell::Number(n) => panic!("expected an instruction cell but found a Number ({})", n),
        }
    }
}

impl Default for Cell {
    fn default() -> Cell {
        Cell::Number(0)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Cell {
        Cell::Number(n)
    }
}

impl From<Instruction> for Cell {
    fn from(instr: Instruction) -> Cell {
        Cell::Instr(instr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_OPCODES: &[Opcode] = &[
        Opcode::Sum,
        Opcode::Diff,
        Opcode::Div,
        Opcode::Mul,
        Opcode::Mod,
        Opcode::Eq,
        Opcode::Neq,
        Opcode::Less,
        Opcode::Gr,
        Opcode::Le,
        Opcode::Ge,
        Opcode::ShiftBack,
        Opcode::ShiftBackRet,
        Opcode::Put,
        Opcode::PutAbsolute,
        Opcode::Pick,
        Opcode::PickAbsolute,
        Opcode::Swap,
        Opcode::PushToRet,
        Opcode::PopToRet,
        Opcode::PushToOd,
        Opcode::PopToOd,
        Opcode::Number,
        Opcode::Jmp,
        Opcode::ExecIf,
        Opcode::ExecCondJmp,
        Opcode::ExecCondJmpRet,
        Opcode::DupRet,
        Opcode::Dup,
        Opcode::Dudup,
        Opcode::IncrementRet,
        Opcode::DecrementRet,
        Opcode::JmpPopPraShp,
        Opcode::PushIncIncIpToPraShp,
        Opcode::EqNotConsumingRet,
        Opcode::ReadVardata,
        Opcode::WriteVardata,
        Opcode::ReadVardataUserLink,
        Opcode::WriteVardataUserLink,
        Opcode::SumTopWithVdsp,
        Opcode::WritePort,
        Opcode::HasPortFilledWithCpu,
        Opcode::ReadPort,
        Opcode::HasPortFilledWithDevice,
        Opcode::Halt,
    ];

    #[test]
    fn every_opcode_round_trips_through_its_wire_string() {
        for &opcode in ALL_OPCODES {
            let wire = opcode.to_string();
            assert_eq!(Opcode::from_str(&wire).unwrap(), opcode, "round trip for {:?}", opcode);
        }
    }

    #[test]
    fn unknown_wire_string_is_a_parse_error() {
        assert!(Opcode::from_str("frobnicate").is_err());
    }

    #[test]
    fn tick_count_matches_the_micro_sequence_table() {
        // Representative samples from §4.3, one per tick-count bucket.
        assert_eq!(Opcode::Dup.tick_count(), 1);
        assert_eq!(Opcode::Number.tick_count(), 1);
        assert_eq!(Opcode::Halt.tick_count(), 1);
        assert_eq!(Opcode::Sum.tick_count(), 2);
        assert_eq!(Opcode::Swap.tick_count(), 2);
        assert_eq!(Opcode::Put.tick_count(), 2);
        assert_eq!(Opcode::PushToOd.tick_count(), 3);
        assert_eq!(Opcode::IncrementRet.tick_count(), 3);
        assert_eq!(Opcode::EqNotConsumingRet.tick_count(), 3);
    }

    #[test]
    fn takes_arg_matches_the_opcodes_that_carry_one() {
        assert!(Opcode::Number.takes_arg());
        assert!(Opcode::Jmp.takes_arg());
        assert!(Opcode::ReadPort.takes_arg());
        assert!(!Opcode::Dup.takes_arg());
        assert!(!Opcode::Halt.takes_arg());
        assert!(!Opcode::Sum.takes_arg());
    }

    #[test]
    fn cell_as_number_and_as_instruction_are_partitioned_by_variant() {
        let n = Cell::Number(7);
        assert_eq!(n.as_number(), 7);

        let instr = Instruction::new(0, Opcode::Halt, None, Term::new(1, 1, "halt"));
        let c = Cell::Instr(instr);
        assert_eq!(c.as_instruction().opcode, Opcode::Halt);
    }

    #[test]
    #[should_panic]
    fn cell_as_number_panics_on_an_instruction_cell() {
        let instr = Instruction::new(0, Opcode::Halt, None, Term::new(1, 1, "halt"));
        Cell::Instr(instr).as_number();
    }

    #[test]
    #[should_panic]
    fn require_arg_panics_with_no_arg() {
        let instr = Instruction::new(0, Opcode::Number, None, Term::new(1, 1, "n"));
        instr.require_arg();
    }
}
