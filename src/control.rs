//! The control unit: per-opcode micro-sequences (§4.3), the interrupt protocol (§4.4), and the
//! tick-driven simulation loop (§5).
//!
//! Every `latch_*` read below pulls from `self.data_path.cur_tick_regs_state`, a snapshot taken
//! fresh at the top of each tick (see [`crate::datapath::DataPath::snapshot`]) — this is what
//! makes a tick's register transfers commute regardless of the order they're written in here.

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace, warn};

use crate::datapath::DataPath;
use crate::isa::{Instruction, Opcode};
use crate::port::MAIN_PORT;

/// A runtime fault raised while executing an opcode's micro-sequence.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MachineError {
    DivisionByZero,
    ModuloByZero,
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MachineError::DivisionByZero => write!(f, "division by zero"),
            MachineError::ModuloByZero => write!(f, "modulo by zero"),
        }
    }
}

impl std::error::Error for MachineError {}

/// Why the driver loop in [`ControlUnit::run`] stopped.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExitCode {
    /// `HALT` reached outside any interrupt handler.
    Halted,
    /// `ticks_counter` reached the caller-supplied limit before `HALT`.
    TicksLimitExceeded,
}

/// What a single [`ControlUnit::next_tick_execute`] call accomplished.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TickResult {
    /// The instruction's micro-sequence is still mid-flight; `instruction_stage_number` advanced.
    Continue { is_last_instruction_tick: bool },
    /// `HALT` was reached outside any interrupt handler — the program is done.
    Halted,
}

fn floor_div(a: i64, b: i64) -> Result<i64, MachineError> {
    if b == 0 {
        return Err(MachineError::DivisionByZero);
    }
    let q = a / b;
    let r = a % b;
    Ok(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
}

fn floor_mod(a: i64, b: i64) -> Result<i64, MachineError> {
    if b == 0 {
        return Err(MachineError::ModuloByZero);
    }
    let r = a % b;
    Ok(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
}

/// Forth-inverted truth: 0 is true, -1 is false.
fn forth_bool(cond: bool) -> i64 {
    if cond {
        0
    } else {
        -1
    }
}

/// `base` offset by a (possibly negative) delta, as a memory address.
fn off(base: u32, delta: i64) -> u32 {
    (base as i64 + delta) as u32
}

/// A schedule of device-write events: tick index to the byte value deposited into the main port.
///
/// Duplicate tick indices resolve to the first one supplied (§5), mirroring the donor's own
/// first-write-wins `trimmed_input_tokens` construction.
#[derive(Clone, Debug, Default)]
pub struct InputSchedule {
    events: HashMap<u64, i64>,
}

impl InputSchedule {
    pub fn new() -> InputSchedule {
        InputSchedule::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (u64, i64)>) -> InputSchedule {
        let mut events = HashMap::new();
        for (tick, value) in entries {
            events.entry(tick).or_insert(value);
        }
        InputSchedule { events }
    }

    fn at(&self, tick: u64) -> Option<i64> {
        self.events.get(&tick).copied()
    }
}

/// The processor: a [`DataPath`] plus the interrupt/ticking bookkeeping on top of it.
pub struct ControlUnit {
    pub data_path: DataPath,
    pub is_in_interruption: bool,
    pub ticks_counter: u64,
}

impl ControlUnit {
    pub fn new(data_path: DataPath) -> ControlUnit {
        ControlUnit {
            data_path,
            is_in_interruption: false,
            ticks_counter: 0,
        }
    }

    /// Runs one tick of the micro-sequence of the instruction currently addressed by IP (§4.3).
    pub fn next_tick_execute(&mut self) -> Result<TickResult, MachineError> {
        let instr = self.data_path.current_instruction().clone();
        self.data_path.snapshot();
        self.ticks_counter += 1;

        let dp = &mut self.data_path;
        let s = dp.cur_tick_regs_state;
        let isn = dp.instruction_stage_number;
        let mut is_last = false;

        match instr.opcode {
            Opcode::Halt => {
                if !self.is_in_interruption {
                    return Ok(TickResult::Halted);
                }
                dp.instruction_stage_number = dp.read_cell_number(s.pra_shp) as u32;
                dp.pra_shp_pointer = s.pra_shp + 1;
                dp.instruction_pointer = dp.read_cell_number(s.pra_shp + 1) as u32;
                dp.pra_shp_pointer += 1;
                self.is_in_interruption = false;
                debug!("interrupt exit, resuming at ip={} isn={}", dp.instruction_pointer, dp.instruction_stage_number);
                return Ok(TickResult::Continue { is_last_instruction_tick: true });
            }

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
            | Opcode::Ge => match isn {
                1 => {
                    dp.top = match instr.opcode {
                        Opcode::Sum => s.next.wrapping_add(s.top),
                        Opcode::Diff => s.next.wrapping_sub(s.top),
                        Opcode::Div => floor_div(s.next, s.top)?,
                        Opcode::Mul => s.next.wrapping_mul(s.top),
                        Opcode::Mod => floor_mod(s.next, s.top)?,
                        Opcode::Eq => forth_bool(s.next == s.top),
                        Opcode::Neq => forth_bool(s.next != s.top),
                        Opcode::Less => forth_bool(s.next < s.top),
                        Opcode::Gr => forth_bool(s.next > s.top),
                        Opcode::Le => forth_bool(s.next <= s.top),
                        Opcode::Ge => forth_bool(s.next >= s.top),
                        _ => unreachable!(),
                    };
                    dp.next = dp.read_cell_number(off(s.od_shp, -2));
                    dp.od_sh_pointer = off(s.od_shp, -1);
                }
                2 => {
                    dp.write_cell_number(dp.cur_tick_regs_state.od_shp, dp.cur_tick_regs_state.top);
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::ShiftBack => {
                dp.top = s.next;
                dp.next = dp.read_cell_number(off(s.od_shp, -1));
                dp.od_sh_pointer = off(s.od_shp, -1);
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::ShiftBackRet => {
                dp.pra_shp_pointer = s.pra_shp + 1;
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::Put | Opcode::PutAbsolute => match isn {
                1 => {
                    let addr = match instr.opcode {
                        Opcode::Put => off(s.od_shp, -(s.top) - 2),
                        Opcode::PutAbsolute => s.top as u32,
                        _ => unreachable!(),
                    };
                    dp.write_cell_number(addr, s.next);
                    dp.od_sh_pointer = off(s.od_shp, -2);
                }
                2 => {
                    let new_shp = dp.cur_tick_regs_state.od_shp;
                    dp.top = dp.read_cell_number(new_shp);
                    dp.next = dp.read_cell_number(off(new_shp, -1));
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::Pick | Opcode::PickAbsolute => match isn {
                1 => {
                    dp.top = match instr.opcode {
                        Opcode::Pick => dp.read_cell_number(off(s.od_shp, -(s.top) - 1)),
                        Opcode::PickAbsolute => dp.read_cell_number(s.top as u32),
                        _ => unreachable!(),
                    };
                }
                2 => {
                    dp.write_cell_number(s.od_shp, dp.cur_tick_regs_state.top);
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::Swap => match isn {
                1 => {
                    dp.next = s.top;
                    dp.top = s.next;
                    dp.write_cell_number(off(s.od_shp, -1), s.top);
                }
                2 => {
                    dp.write_cell_number(s.od_shp, dp.cur_tick_regs_state.top);
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::PushToRet => {
                dp.write_cell_number(off(s.pra_shp, -1), s.top);
                dp.pra_shp_pointer = off(s.pra_shp, -1);
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::PopToRet => match isn {
                1 => {
                    dp.write_cell_number(off(s.pra_shp, -1), s.top);
                    dp.pra_shp_pointer = off(s.pra_shp, -1);
                    dp.top = s.next;
                    dp.od_sh_pointer = off(s.od_shp, -1);
                }
                2 => {
                    let new_shp = dp.cur_tick_regs_state.od_shp;
                    dp.next = dp.read_cell_number(off(new_shp, -1));
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::PushToOd | Opcode::PopToOd => match isn {
                1 => {
                    dp.top = dp.read_cell_number(s.pra_shp);
                    dp.od_sh_pointer = s.od_shp + 1;
                    if instr.opcode == Opcode::PopToOd {
                        dp.pra_shp_pointer = s.pra_shp + 1;
                    }
                }
                2 => {
                    dp.write_cell_number(dp.cur_tick_regs_state.od_shp, dp.cur_tick_regs_state.top);
                }
                3 => {
                    let new_shp = dp.cur_tick_regs_state.od_shp;
                    dp.next = dp.read_cell_number(off(new_shp, -1));
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::Number => {
                dp.next = s.top;
                dp.write_cell_number(off(s.od_shp, 1), instr.require_arg());
                dp.top = instr.require_arg();
                dp.od_sh_pointer = s.od_shp + 1;
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::Jmp => {
                dp.instruction_pointer = off(s.ip, instr.require_arg());
                is_last = true;
            }

            Opcode::ExecIf | Opcode::ExecCondJmp => {
                dp.next = dp.read_cell_number(off(s.od_shp, -2));
                let top_is_zero = s.top == 0;
                dp.instruction_pointer = off(
                    s.ip,
                    1 + match instr.opcode {
                        Opcode::ExecIf => {
                            if top_is_zero {
                                1
                            } else {
                                0
                            }
                        }
                        Opcode::ExecCondJmp => {
                            if top_is_zero {
                                0
                            } else {
                                instr.require_arg()
                            }
                        }
                        _ => unreachable!(),
                    },
                );
                dp.top = s.next;
                dp.od_sh_pointer = off(s.od_shp, -1);
                is_last = true;
            }

            Opcode::ExecCondJmpRet => {
                let pra_top_is_zero = dp.read_cell_number(s.pra_shp) == 0;
                dp.instruction_pointer = off(
                    s.ip,
                    1 + if pra_top_is_zero { 0 } else { instr.require_arg() },
                );
                dp.pra_shp_pointer = s.pra_shp + 1;
                is_last = true;
            }

            Opcode::DupRet => match isn {
                1 => {
                    dp.top = dp.read_cell_number(s.pra_shp);
                }
                2 => {
                    dp.write_cell_number(s.pra_shp + 1, dp.cur_tick_regs_state.top);
                    dp.pra_shp_pointer = s.pra_shp + 1;
                }
                3 => {
                    dp.top = dp.read_cell_number(dp.cur_tick_regs_state.od_shp);
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::Dup => {
                dp.next = s.top;
                dp.write_cell_number(off(s.od_shp, 1), s.top);
                dp.od_sh_pointer = s.od_shp + 1;
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::Dudup => match isn {
                1 => {
                    dp.write_cell_number(off(s.od_shp, 1), s.next);
                    dp.od_sh_pointer = s.od_shp + 1;
                }
                2 => {
                    let new_shp = dp.cur_tick_regs_state.od_shp;
                    dp.write_cell_number(off(new_shp, 1), dp.cur_tick_regs_state.top);
                    dp.od_sh_pointer = new_shp + 1;
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::IncrementRet | Opcode::DecrementRet => match isn {
                1 => {
                    dp.top = dp.read_cell_number(s.pra_shp);
                }
                2 => {
                    let delta = if instr.opcode == Opcode::IncrementRet { 1 } else { -1 };
                    dp.write_cell_number(s.pra_shp, s.top + delta);
                }
                3 => {
                    dp.top = dp.read_cell_number(dp.cur_tick_regs_state.od_shp);
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::JmpPopPraShp => match isn {
                1 => {
                    dp.top = dp.read_cell_number(s.pra_shp);
                    dp.pra_shp_pointer = s.pra_shp + 1;
                }
                2 => {
                    let fresh_top = dp.cur_tick_regs_state.top;
                    dp.instruction_pointer = fresh_top as u32;
                    dp.top = dp.read_cell_number(dp.cur_tick_regs_state.od_shp);
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::PushIncIncIpToPraShp => {
                dp.write_cell_number(off(s.pra_shp, -1), s.ip as i64 + 2);
                dp.pra_shp_pointer = off(s.pra_shp, -1);
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::EqNotConsumingRet => match isn {
                1 => {
                    dp.top = forth_bool(dp.read_cell_number(s.pra_shp + 1) == dp.read_cell_number(s.pra_shp));
                    dp.pra_shp_pointer = off(s.pra_shp, -1);
                }
                2 => {
                    dp.write_cell_number(dp.cur_tick_regs_state.pra_shp, dp.cur_tick_regs_state.top);
                }
                3 => {
                    dp.top = dp.read_cell_number(dp.cur_tick_regs_state.od_shp);
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::ReadVardata => match isn {
                1 => {
                    dp.next = s.top;
                    dp.top = dp.read_cell_number(dp.layout.var_data_start + instr.require_arg() as u32);
                }
                2 => {
                    dp.write_cell_number(off(s.od_shp, 1), dp.cur_tick_regs_state.top);
                    dp.od_sh_pointer = s.od_shp + 1;
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::WriteVardata => match isn {
                1 => {
                    dp.write_cell_number(dp.layout.var_data_start + instr.require_arg() as u32, s.top);
                    dp.top = s.next;
                }
                2 => {
                    dp.next = dp.read_cell_number(off(s.od_shp, -2));
                    dp.od_sh_pointer = off(s.od_shp, -1);
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::ReadVardataUserLink => {
                dp.top = dp.read_cell_number(s.top as u32);
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::WriteVardataUserLink => match isn {
                1 => {
                    dp.write_cell_number(s.top as u32, s.next);
                    dp.od_sh_pointer = off(s.od_shp, -2);
                }
                2 => {
                    let new_shp = dp.cur_tick_regs_state.od_shp;
                    dp.top = dp.read_cell_number(new_shp);
                    dp.next = dp.read_cell_number(off(new_shp, -1));
                    dp.instruction_pointer = s.ip + 1;
                    is_last = true;
                }
                _ => unreachable!("{} has no stage {}", instr.opcode, isn),
            },

            Opcode::SumTopWithVdsp => {
                dp.top = dp.layout.var_data_start as i64 + s.top;
                dp.write_cell_number(s.od_shp, dp.layout.var_data_start as i64 + s.top);
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::ReadPort => {
                let port = instr.require_arg() as usize;
                dp.next = s.top;
                dp.top = dp.ports[port].data;
                dp.write_cell_number(off(s.od_shp, 1), dp.ports[port].data);
                dp.ports[port].filled_with_device = false;
                dp.od_sh_pointer = s.od_shp + 1;
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::WritePort => {
                let port = instr.require_arg() as usize;
                dp.ports[port].data = s.top;
                dp.top = s.next;
                dp.next = dp.read_cell_number(off(s.od_shp, -2));
                dp.ports[port].filled_with_cpu = true;
                dp.od_sh_pointer = off(s.od_shp, -1);
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }

            Opcode::HasPortFilledWithCpu | Opcode::HasPortFilledWithDevice => {
                let port = instr.require_arg() as usize;
                dp.next = s.top;
                let value = forth_bool(match instr.opcode {
                    Opcode::HasPortFilledWithCpu => dp.ports[port].filled_with_cpu,
                    Opcode::HasPortFilledWithDevice => dp.ports[port].filled_with_device,
                    _ => unreachable!(),
                });
                dp.top = value;
                dp.write_cell_number(off(s.od_shp, 1), value);
                dp.od_sh_pointer = s.od_shp + 1;
                dp.instruction_pointer = s.ip + 1;
                is_last = true;
            }
        }

        dp.instruction_stage_number = if is_last { 1 } else { isn + 1 };
        trace!(
            "tick {}: ip={} od_shp={} pra_shp={} top={} next={} isn={} op={}",
            self.ticks_counter,
            dp.instruction_pointer,
            dp.od_sh_pointer,
            dp.pra_shp_pointer,
            dp.top,
            dp.next,
            dp.instruction_stage_number,
            instr.opcode
        );
        Ok(TickResult::Continue { is_last_instruction_tick: is_last })
    }

    /// Dispatches a two-tick interrupt entry (§4.4): saves IP then ISN on the return stack,
    /// jumps to the handler's start PC, and resets ISN to 1.
    fn step_in_port_interruption(&mut self, port_number: usize, is_cpu_write: bool) {
        let handler_start_pc = self.data_path.handler_start_pc(port_number, is_cpu_write);

        self.data_path.pra_shp_pointer -= 1;
        let saved_ip = self.data_path.instruction_pointer as i64;
        self.data_path.write_cell_number(self.data_path.pra_shp_pointer, saved_ip);
        self.data_path.instruction_pointer = handler_start_pc;

        self.data_path.pra_shp_pointer -= 1;
        let saved_isn = self.data_path.instruction_stage_number as i64;
        self.data_path.write_cell_number(self.data_path.pra_shp_pointer, saved_isn);
        self.data_path.instruction_stage_number = 1;
    }

    /// Runs the machine to completion, consulting `input_schedule` at every tick boundary and
    /// handing every byte the program writes to the main port to `on_output` (§5, §6.5).
    ///
    /// `on_output` receives the raw port value; the caller decides how CR (13) and other bytes
    /// are rendered (the CLI prints CR as a newline and everything else as-is, per §6.5).
    pub fn run(
        &mut self,
        input_schedule: &InputSchedule,
        ticks_limit: u64,
        mut on_output: impl FnMut(i64),
    ) -> Result<ExitCode, MachineError> {
        loop {
            if self.ticks_counter >= ticks_limit {
                warn!("ticks limit {} exceeded", ticks_limit);
                return Ok(ExitCode::TicksLimitExceeded);
            }

            if let Some(value) = input_schedule.at(self.ticks_counter) {
                if !self.is_in_interruption {
                    self.is_in_interruption = true;
                    self.data_path.ports[MAIN_PORT].data = value;
                    self.data_path.ports[MAIN_PORT].filled_with_device = true;
                    self.step_in_port_interruption(MAIN_PORT, false);
                    self.ticks_counter += 2;
                    debug!("device-wrote interrupt at tick {}: value={}", self.ticks_counter, value);
                    continue;
                } else {
                    warn!("dropped device write of {} at tick {}: interrupt in progress", value, self.ticks_counter);
                }
            }

            match self.next_tick_execute()? {
                TickResult::Halted => return Ok(ExitCode::Halted),
                TickResult::Continue { .. } => {}
            }

            if !self.is_in_interruption && self.data_path.ports[MAIN_PORT].filled_with_cpu {
                let value = self.data_path.ports[MAIN_PORT].data;
                on_output(value);
                self.data_path.ports[MAIN_PORT].filled_with_cpu = false;
                self.is_in_interruption = true;
                self.step_in_port_interruption(MAIN_PORT, true);
                self.ticks_counter += 1;
                debug!("cpu-wrote interrupt at tick {}: value={}", self.ticks_counter, value);
                continue;
            }
        }
    }
}
