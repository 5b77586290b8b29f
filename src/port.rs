//! Memory-mapped I/O ports and their interrupt handler programs (§3, §4.4).

use crate::isa::Instruction;

/// One memory-mapped port: a datum plus the two flags that drive the interrupt protocol.
///
/// Invariant (software contract, not enforced by the port itself): at most one of
/// `filled_with_device`/`filled_with_cpu` is set at a time.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Port {
    pub filled_with_device: bool,
    pub filled_with_cpu: bool,
    pub data: i64,
}

impl Port {
    pub fn new() -> Port {
        Port::default()
    }
}

/// A [`Port`] paired with its two compiled interrupt handler programs.
///
/// Handlers are plain compiled programs that end in `HALT`; the compiler does not special-case
/// them (§9) — the only asymmetry is how the machine treats reaching `HALT` while one is running.
pub struct InterruptablePort {
    pub port: Port,
    pub on_cpu_write: Vec<Instruction>,
    pub on_device_write: Vec<Instruction>,
}

impl InterruptablePort {
    pub fn new(on_cpu_write: Vec<Instruction>, on_device_write: Vec<Instruction>) -> InterruptablePort {
        InterruptablePort {
            port: Port::new(),
            on_cpu_write,
            on_device_write,
        }
    }
}

/// Port 0 is always the console.
pub const MAIN_PORT: usize = 0;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{Opcode, Term};

    fn halt() -> Instruction {
        Instruction::new(0, Opcode::Halt, None, Term::new(1, 1, "halt"))
    }

    #[test]
    fn a_fresh_port_has_neither_flag_set() {
        let port = Port::new();
        assert!(!port.filled_with_device);
        assert!(!port.filled_with_cpu);
        assert_eq!(port.data, 0);
    }

    #[test]
    fn an_interruptable_port_starts_with_a_fresh_port_and_keeps_its_handlers() {
        let cpu_write = vec![halt()];
        let device_write = vec![halt(), halt()];
        let interruptable = InterruptablePort::new(cpu_write.clone(), device_write.clone());
        assert_eq!(interruptable.port, Port::new());
        assert_eq!(interruptable.on_cpu_write.len(), cpu_write.len());
        assert_eq!(interruptable.on_device_write.len(), device_write.len());
    }

    #[test]
    fn main_port_is_index_zero() {
        assert_eq!(MAIN_PORT, 0);
    }
}
