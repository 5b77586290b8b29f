//! Single-pass emission of [`Instruction`]s from a desugared token stream (§4.5), the Rust
//! counterpart of the reference translator's `translate`/`*_append` family.
//!
//! Two kinds of back-patch survive to the end of the pass instead of being resolved inline:
//! forward word calls (`word_jmp_pcs`, resolved against `word_def_pc` once every definition has
//! been seen) and variable references (`vars_pcs`, resolved once every use has been seen and each
//! variable's final size — the max over all its `name-K` declarations — is known). Everything
//! else (`if`/`else`/`then`, `do`/`doi ... loop`/`mloop`, `begin ... until`, `leave`) closes its
//! jump as soon as the matching keyword is reached, via the `jmp_points`/`leaves_points` stacks.

use std::collections::HashMap;

use matches::debug_assert_matches;

use forthchan::isa::{Instruction, Opcode, Term};

use crate::error::LowerError;
use crate::token::{Comparator, Sign, Token, TokenKind, VariableOp};

/// One occurrence of a variable name. `pc` is `None` for a bare `name-K` array-size declaration,
/// which reserves no instruction slot of its own — it only feeds into the variable's `max(size)`.
struct VarUse {
    pc: Option<u32>,
    size: u32,
}

struct Lowerer {
    code: Vec<Instruction>,
    word_def_pc: HashMap<String, u32>,
    word_jmp_pcs: HashMap<String, Vec<u32>>,
    var_order: Vec<String>,
    vars_pcs: HashMap<String, Vec<VarUse>>,
    jmp_points: Vec<u32>,
    leaves_points: Vec<Vec<u32>>,
    word_def_jmp_pc: Option<u32>,
}

impl Lowerer {
    fn new() -> Lowerer {
        Lowerer {
            code: Vec::new(),
            word_def_pc: HashMap::new(),
            word_jmp_pcs: HashMap::new(),
            var_order: Vec::new(),
            vars_pcs: HashMap::new(),
            jmp_points: Vec::new(),
            leaves_points: Vec::new(),
            word_def_jmp_pc: None,
        }
    }

    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    fn emit(&mut self, opcode: Opcode, arg: Option<i64>, term: Term) -> u32 {
        let pc = self.here();
        self.code.push(Instruction::new(pc, opcode, arg, term));
        pc
    }

    fn patch(&mut self, pc: u32, arg: i64) {
        debug_assert_matches!(self.code[pc as usize].arg, None);
        self.code[pc as usize].arg = Some(arg);
    }

    fn register_var(&mut self, name: &str, use_: VarUse) {
        if !self.vars_pcs.contains_key(name) {
            self.var_order.push(name.to_string());
        }
        self.vars_pcs.entry(name.to_string()).or_default().push(use_);
    }

    fn append_term(&mut self, token: Token) {
        let term = token.term;
        match token.kind {
            TokenKind::Number(n) => {
                self.emit(Opcode::Number, Some(n), term);
            }
            TokenKind::Sign(sign) => {
                let opcode = match sign {
                    Sign::Plus => Opcode::Sum,
                    Sign::Minus => Opcode::Diff,
                    Sign::Star => Opcode::Mul,
                    Sign::Slash => Opcode::Div,
                };
                self.emit(opcode, None, term);
            }
            TokenKind::Comparator(cmp) => {
                let opcode = match cmp {
                    Comparator::Eq => Opcode::Eq,
                    Comparator::Neq => Opcode::Neq,
                    Comparator::Less => Opcode::Less,
                    Comparator::Gr => Opcode::Gr,
                    Comparator::Le => Opcode::Le,
                    Comparator::Ge => Opcode::Ge,
                };
                self.emit(opcode, None, term);
            }
            TokenKind::WordDefStart(name) => {
                let jmp_pc = self.emit(Opcode::Jmp, None, term);
                self.word_def_jmp_pc = Some(jmp_pc);
                self.word_def_pc.insert(name, self.here());
            }
            TokenKind::WordDefEnd => {
                self.emit(Opcode::JmpPopPraShp, None, term);
                let jmp_pc = self
                    .word_def_jmp_pc
                    .take()
                    .expect("validated: word definitions are balanced");
                let here = self.here();
                self.patch(jmp_pc, here as i64 - jmp_pc as i64);
            }
            TokenKind::StringImm(_) => {
                unreachable!("string literals are desugared before lowering")
            }
            TokenKind::VariableOp(op) => self.append_variable_op(op, term),
            TokenKind::Identifier(name) => self.append_word(&name, term),
        }
    }

    fn append_variable_op(&mut self, op: VariableOp, term: Term) {
        match op {
            VariableOp::Read(name) => {
                let pc = self.emit(Opcode::ReadVardata, None, term);
                self.register_var(&name, VarUse { pc: Some(pc), size: 1 });
            }
            VariableOp::Write(name) => {
                let pc = self.emit(Opcode::WriteVardata, None, term);
                self.register_var(&name, VarUse { pc: Some(pc), size: 1 });
            }
            VariableOp::Address(name) => {
                let pc = self.emit(Opcode::Number, None, term.clone());
                self.emit(Opcode::SumTopWithVdsp, None, term);
                self.register_var(&name, VarUse { pc: Some(pc), size: 1 });
            }
            VariableOp::ArraySlot { name, size } => {
                self.register_var(&name, VarUse { pc: None, size });
            }
        }
    }

    fn append_word(&mut self, name: &str, term: Term) {
        if let Some(opcode) = builtin_opcode(name) {
            self.emit(opcode, None, term);
            return;
        }
        if let Some(opcode) = port_opcode(name) {
            self.emit(opcode, Some(0), term);
            return;
        }
        if name == "cr" {
            self.emit(Opcode::Number, Some(13), term.clone());
            self.emit(Opcode::WritePort, Some(0), term);
            return;
        }

        match name {
            "do" | "doi" => {
                self.emit(Opcode::Swap, None, term.clone());
                self.emit(Opcode::PopToRet, None, term.clone());
                self.emit(Opcode::PopToRet, None, term.clone());
                self.jmp_points.push(self.here());
                if name == "doi" {
                    self.emit(Opcode::PushToOd, None, term);
                }
                self.leaves_points.push(Vec::new());
            }
            "begin" => {
                self.jmp_points.push(self.here());
                self.leaves_points.push(Vec::new());
            }
            "if" => {
                self.emit(Opcode::ExecIf, None, term.clone());
                self.jmp_points.push(self.here());
                self.emit(Opcode::Jmp, None, term);
            }
            "else" => {
                let if_false_jmp_pc = self
                    .jmp_points
                    .pop()
                    .expect("validated: else always follows an open if");
                self.jmp_points.push(self.here());
                self.emit(Opcode::Jmp, None, term);
                let here = self.here();
                self.patch(if_false_jmp_pc, here as i64 - if_false_jmp_pc as i64);
            }
            "then" => {
                let jmp_pc = self
                    .jmp_points
                    .pop()
                    .expect("validated: then always closes an open if");
                let here = self.here();
                self.patch(jmp_pc, here as i64 - jmp_pc as i64);
            }
            "leave" => {
                let leave_pc = self.emit(Opcode::Jmp, None, term);
                self.leaves_points
                    .last_mut()
                    .expect("validated: leave is always inside a loop")
                    .push(leave_pc);
            }
            "until" => {
                self.emit(Opcode::Number, Some(0), term.clone());
                self.emit(Opcode::Neq, None, term.clone());
                let begin_pc = self
                    .jmp_points
                    .pop()
                    .expect("validated: until always closes an open begin");
                let pc = self.here();
                self.emit(Opcode::ExecCondJmp, Some(begin_pc as i64 - pc as i64 - 1), term);
                let here = self.here();
                for leave_pc in self
                    .leaves_points
                    .pop()
                    .expect("validated: until always closes an open begin")
                {
                    self.patch(leave_pc, here as i64 - leave_pc as i64);
                }
            }
            "loop" | "mloop" => {
                let do_pc = self
                    .jmp_points
                    .pop()
                    .expect("validated: loop/mloop always closes an open do/doi");
                let opcode = if name == "loop" {
                    Opcode::IncrementRet
                } else {
                    Opcode::DecrementRet
                };
                self.emit(opcode, None, term.clone());
                self.emit(Opcode::EqNotConsumingRet, None, term.clone());
                let pc = self.here();
                self.emit(Opcode::ExecCondJmpRet, Some(do_pc as i64 - pc as i64 - 1), term.clone());
                self.emit(Opcode::ShiftBackRet, None, term.clone());
                self.emit(Opcode::ShiftBackRet, None, term);
                let here = self.here();
                for leave_pc in self
                    .leaves_points
                    .pop()
                    .expect("validated: loop/mloop always closes an open do/doi")
                {
                    self.patch(leave_pc, here as i64 - leave_pc as i64 - 2);
                }
            }
            _ => {
                self.emit(Opcode::PushIncIncIpToPraShp, None, term.clone());
                let jmp_pc = self.here();
                self.word_jmp_pcs
                    .entry(name.to_string())
                    .or_default()
                    .push(jmp_pc);
                self.emit(Opcode::Jmp, None, term);
            }
        }
    }

    fn resolve_word_calls(&mut self) -> Result<(), LowerError> {
        for (name, pcs) in std::mem::take(&mut self.word_jmp_pcs) {
            let def_pc = self.word_def_pc.get(&name).copied().ok_or_else(|| {
                let term = self.code[pcs[0] as usize].term.clone();
                LowerError::UndefinedWord {
                    name: name.clone(),
                    term,
                }
            })?;
            for pc in pcs {
                self.patch(pc, def_pc as i64 - pc as i64);
            }
        }
        Ok(())
    }

    fn resolve_variables(&mut self) {
        let mut offset = 0i64;
        for name in std::mem::take(&mut self.var_order) {
            let uses = self.vars_pcs.remove(&name).unwrap_or_default();
            let size = uses.iter().map(|u| u.size).max().unwrap_or(1) as i64;
            for use_ in uses {
                if let Some(pc) = use_.pc {
                    self.patch(pc, offset);
                }
            }
            offset += size;
        }
    }

    fn finish(mut self) -> Result<Vec<Instruction>, LowerError> {
        self.resolve_word_calls()?;
        self.resolve_variables();
        self.emit(Opcode::Halt, None, Term::new(0, 0, "halt"));
        Ok(self.code)
    }
}

fn builtin_opcode(name: &str) -> Option<Opcode> {
    Some(match name {
        "mod" => Opcode::Mod,
        "put" => Opcode::Put,
        "put_absolute" => Opcode::PutAbsolute,
        "pick" => Opcode::Pick,
        "pick_absolute" => Opcode::PickAbsolute,
        "sum_top_with_vdsp" => Opcode::SumTopWithVdsp,
        "swap" => Opcode::Swap,
        "drop" => Opcode::ShiftBack,
        "dup" => Opcode::Dup,
        "dudup" => Opcode::Dudup,
        _ => return None,
    })
}

fn port_opcode(name: &str) -> Option<Opcode> {
    Some(match name {
        "cant_emit" => Opcode::HasPortFilledWithCpu,
        "has_input" => Opcode::HasPortFilledWithDevice,
        "key" => Opcode::ReadPort,
        "emit" => Opcode::WritePort,
        _ => return None,
    })
}

pub fn lower(tokens: Vec<Token>) -> Result<Vec<Instruction>, LowerError> {
    let mut lowerer = Lowerer::new();
    for token in tokens {
        lowerer.append_term(token);
    }
    lowerer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use crate::lexer::tokenize;
    use crate::validate::validate;

    fn compile(src: &str) -> Vec<Instruction> {
        let tokens = tokenize(src).unwrap();
        validate(&tokens).unwrap();
        let tokens = desugar(tokens);
        lower(tokens).unwrap()
    }

    #[test]
    fn always_ends_in_halt() {
        let code = compile("1 2 +");
        assert_eq!(code.last().unwrap().opcode, Opcode::Halt);
    }

    #[test]
    fn arithmetic_lowers_in_source_order() {
        let code = compile("1 2 +");
        assert_eq!(code[0].opcode, Opcode::Number);
        assert_eq!(code[0].arg, Some(1));
        assert_eq!(code[1].opcode, Opcode::Number);
        assert_eq!(code[1].arg, Some(2));
        assert_eq!(code[2].opcode, Opcode::Sum);
    }

    #[test]
    fn if_then_patches_a_forward_jump_past_the_body() {
        let code = compile("1 if 2 then 3");
        // exec if; jmp <patched>; number 2; number 3; halt
        assert_eq!(code[0].opcode, Opcode::ExecIf);
        assert_eq!(code[1].opcode, Opcode::Jmp);
        let target = (1i64 + code[1].require_arg()) as usize;
        assert_eq!(code[target].opcode, Opcode::Number);
        assert_eq!(code[target].arg, Some(3));
    }

    #[test]
    fn if_else_then_patches_both_branches() {
        let code = compile("1 if 2 else 3 then 4");
        assert_eq!(code[0].opcode, Opcode::ExecIf);
        assert_eq!(code[1].opcode, Opcode::Jmp); // to else
        assert_eq!(code[3].opcode, Opcode::Jmp); // else's jmp to then
        let after_else_jmp = (3i64 + code[3].require_arg()) as usize;
        assert_eq!(code[after_else_jmp].opcode, Opcode::Number);
        assert_eq!(code[after_else_jmp].arg, Some(4));
    }

    #[test]
    fn word_call_and_definition_resolve_to_the_same_target() {
        let code = compile(":square dup mul ; 5 square");
        // jmp past def; dup; mul; jmp pop pra shp; push...; jmp <call>; halt
        assert_eq!(code[0].opcode, Opcode::Jmp);
        let def_pc = (0i64 + code[0].require_arg()) as usize;
        assert_eq!(code[def_pc].opcode, Opcode::Dup);
        let call_jmp = code
            .iter()
            .rposition(|i| i.opcode == Opcode::Jmp)
            .unwrap();
        let target = (call_jmp as i64 + code[call_jmp].require_arg()) as usize;
        assert_eq!(target, def_pc);
    }

    #[test]
    fn undefined_word_call_is_a_lowering_error() {
        let tokens = desugar(tokenize("missing_word").unwrap());
        assert!(matches!(
            lower(tokens),
            Err(LowerError::UndefinedWord { .. })
        ));
    }

    #[test]
    fn variable_write_then_read_share_one_slot() {
        let code = compile("10 counter! counter?");
        assert_eq!(code[1].opcode, Opcode::WriteVardata);
        assert_eq!(code[2].opcode, Opcode::ReadVardata);
        assert_eq!(code[1].arg, code[2].arg);
    }

    #[test]
    fn two_variables_get_distinct_offsets() {
        let code = compile("1 a! 2 b!");
        assert_ne!(code[1].arg, code[3].arg);
    }

    #[test]
    fn array_declaration_contributes_size_without_emitting_code() {
        // `buf-4` reserves 4 cells for `buf` but appends no instruction of its own; the next
        // term (`0 buf&`) should still be the very first `Number`/`SumTopWithVdsp` pair.
        let code = compile("buf-4 0 buf& 99 buf&");
        let addr_pcs: Vec<usize> = code
            .iter()
            .enumerate()
            .filter(|(_, i)| i.opcode == Opcode::SumTopWithVdsp)
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(addr_pcs.len(), 2);
        let offset_a = code[addr_pcs[0] - 1].arg;
        let offset_b = code[addr_pcs[1] - 1].arg;
        assert_eq!(offset_a, offset_b);
    }

    #[test]
    fn do_loop_counts_from_start_to_end() {
        let code = compile("5 0 do 1 loop");
        assert!(code.iter().any(|i| i.opcode == Opcode::IncrementRet));
        assert!(code.iter().any(|i| i.opcode == Opcode::ExecCondJmpRet));
    }

    #[test]
    fn leave_jumps_past_the_loop_close_not_into_it() {
        let code = compile("5 0 do 1 leave loop 9");
        let leave_pc = code.iter().position(|i| i.term.name == "leave").unwrap();
        let target = (leave_pc as i64 + code[leave_pc].require_arg()) as usize;
        assert_eq!(code[target].opcode, Opcode::Number);
        assert_eq!(code[target].arg, Some(9));
    }

    #[test]
    fn begin_until_leave_jumps_past_the_boolean_check() {
        let code = compile("begin 1 leave 0 until 9");
        let leave_pc = code.iter().position(|i| i.term.name == "leave").unwrap();
        let target = (leave_pc as i64 + code[leave_pc].require_arg()) as usize;
        assert_eq!(code[target].opcode, Opcode::Number);
        assert_eq!(code[target].arg, Some(9));
    }

    #[test]
    fn cr_emits_a_carriage_return_to_the_main_port() {
        let code = compile("cr");
        assert_eq!(code[0].opcode, Opcode::Number);
        assert_eq!(code[0].arg, Some(13));
        assert_eq!(code[1].opcode, Opcode::WritePort);
        assert_eq!(code[1].arg, Some(0));
    }

    #[test]
    fn string_literal_lowers_to_a_print_loop() {
        let code = compile("\"hi\"");
        assert!(code.iter().any(|i| i.opcode == Opcode::PutAbsolute));
        assert!(code.iter().any(|i| i.opcode == Opcode::WritePort));
    }
}
