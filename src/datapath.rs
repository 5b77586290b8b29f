//! The register file and flat memory of the stack processor (§3, §4.2).

use crate::isa::Instruction;
use crate::memory::{DataMemory, MemoryLayout};
use crate::port::{InterruptablePort, Port};

/// A cheap, `Copy` snapshot of the scalar registers taken at the top of every tick.
///
/// All `latch_*` operations within a tick read from this snapshot rather than from `DataPath`'s
/// live fields, so a tick behaves as one synchronous register transfer regardless of the order
/// individual latches run in (§4.2).
#[derive(Clone, Copy, Debug, Default)]
pub struct RegsState {
    pub ip: u32,
    pub od_shp: u32,
    pub pra_shp: u32,
    pub top: i64,
    pub next: i64,
}

/// The processor's register file plus its flat, partitioned data memory.
pub struct DataPath {
    pub memory: DataMemory,
    pub ports: Vec<Port>,

    pub layout: MemoryLayout,

    pub instruction_pointer: u32,
    pub top: i64,
    pub next: i64,
    pub pra_shp_pointer: u32,
    pub od_sh_pointer: u32,
    pub instruction_stage_number: u32,

    pub cur_tick_regs_state: RegsState,
}

impl DataPath {
    /// Boots a fresh image: writes each port's handler code and records the handler table, then
    /// reserves the variable-data region, then writes `program`, matching the partition order of
    /// §3's layout table.
    pub fn new(
        memory_size: u32,
        var_memory_size: u32,
        ports_description: Vec<InterruptablePort>,
        program: Vec<Instruction>,
    ) -> DataPath {
        assert!(memory_size > 0, "data memory size must be non-zero");
        assert!(
            !ports_description.is_empty(),
            "at least one port is required for the built-in port opcodes"
        );

        let mut memory = DataMemory::new(memory_size);
        let mut table = Vec::with_capacity(ports_description.len() * 2);
        let mut ports = Vec::with_capacity(ports_description.len());
        let mut cursor = 0u32;

        for described in ports_description {
            table.push(cursor);
            memory
                .write_program(cursor, &described.on_cpu_write)
                .expect("handler code exceeds memory size");
            cursor += described.on_cpu_write.len() as u32;

            table.push(cursor);
            memory
                .write_program(cursor, &described.on_device_write)
                .expect("handler code exceeds memory size");
            cursor += described.on_device_write.len() as u32;

            ports.push(described.port);
        }

        let handler_table_start = cursor;
        for (i, entry) in table.iter().enumerate() {
            memory
                .write_number(handler_table_start + i as u32, *entry as i64)
                .expect("handler table exceeds memory size");
        }

        let var_data_start = handler_table_start + table.len() as u32;
        let program_start = var_data_start + var_memory_size;
        memory
            .write_program(program_start, &program)
            .expect("program exceeds memory size");
        let od_stack_start = program_start + program.len() as u32;

        let layout = MemoryLayout {
            handler_table_start,
            handler_code_start: 0,
            var_data_start,
            program_start,
            od_stack_start,
            total_size: memory_size,
        };

        DataPath {
            memory,
            ports,
            layout,
            instruction_pointer: program_start,
            top: 0,
            next: 0,
            pra_shp_pointer: memory_size - 1,
            od_sh_pointer: od_stack_start,
            instruction_stage_number: 1,
            cur_tick_regs_state: RegsState::default(),
        }
    }

    /// Snapshots the live scalar registers into `cur_tick_regs_state`. Called once at the start
    /// of every tick, before any latch runs.
    pub fn snapshot(&mut self) {
        self.cur_tick_regs_state = RegsState {
            ip: self.instruction_pointer,
            od_shp: self.od_sh_pointer,
            pra_shp: self.pra_shp_pointer,
            top: self.top,
            next: self.next,
        };
    }

    pub fn current_instruction(&self) -> &Instruction {
        self.memory
            .read_instruction(self.instruction_pointer)
            .unwrap_or_else(|err| panic!("IP {} does not address an instruction: {}", self.instruction_pointer, err))
    }

    pub fn handler_start_pc(&self, port_number: usize, on_cpu_write: bool) -> u32 {
        let index = self.layout.handler_table_start + 2 * port_number as u32 + if on_cpu_write { 0 } else { 1 };
        self.memory.read_number(index).expect("handler table read out of bounds") as u32
    }

    pub fn read_cell_number(&self, address: u32) -> i64 {
        self.memory
            .read_number(address)
            .unwrap_or_else(|err| panic!("bad memory read at {}: {}", address, err))
    }

    pub fn write_cell_number(&mut self, address: u32, value: i64) {
        self.memory
            .write_number(address, value)
            .unwrap_or_else(|err| panic!("bad memory write at {}: {}", address, err));
    }
}
