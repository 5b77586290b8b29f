//! `machine <code> <input-schedule> <write-handler-0> <read-handler-0> [...]` (§6.3): boots a
//! [`forthchan::DataPath`]/[`forthchan::ControlUnit`] from a compiled image and a set of port
//! handler images, runs it to completion, and renders `WRITE_PORT 0` bytes to stdout (§6.5), the
//! Rust counterpart of the reference machine's `main`.

#[macro_use]
extern crate clap;

use std::fs;
use std::io::{self, Write};
use std::process;

use log::{error, info};

use forthchan::{ControlUnit, DataPath, ExitCode, InterruptablePort};
use forthchan::control::InputSchedule;

fn die(message: impl std::fmt::Display) -> ! {
    error!("{}", message);
    process::exit(1);
}

fn read_image(path: &str) -> Vec<forthchan::Instruction> {
    progimage::read_file(path)
        .unwrap_or_else(|err| die(format!("failed to read image {}: {}", path, err)))
        .into_instructions()
}

/// Parses §6.4's `TICK_INDEX CHAR` lines. Duplicate ticks keep the first occurrence
/// ([`InputSchedule::from_entries`]).
fn read_input_schedule(path: &str) -> InputSchedule {
    let text = fs::read_to_string(path).unwrap_or_else(|err| die(format!("failed to read input schedule {}: {}", path, err)));

    let entries = text.lines().filter(|line| !line.trim().is_empty()).map(|line| {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let parts: Vec<&str> = line.splitn(2, ' ').collect();
        if parts.len() != 2 || parts[1].chars().count() != 1 {
            die(format!("malformed input schedule line {:?}", line));
        }
        let tick: u64 = parts[0]
            .parse()
            .unwrap_or_else(|_| die(format!("bad tick index in {:?}", line)));
        let ch = parts[1].chars().next().unwrap();
        (tick, ch as i64)
    });

    InputSchedule::from_entries(entries.collect::<Vec<_>>())
}

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(
            clap::Arg::with_name("CODE")
                .help("Sets the compiled program image to run")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::with_name("INPUT_SCHEDULE")
                .help("Sets the input schedule file (§6.4)")
                .required(true)
                .index(2),
        )
        .arg(
            clap::Arg::with_name("HANDLERS")
                .help("Alternating write/read interrupt handler images, one pair per port")
                .required(true)
                .multiple(true)
                .min_values(2)
                .index(3),
        )
        .arg(
            clap::Arg::with_name("ticks-limit")
                .long("ticks-limit")
                .takes_value(true)
                .default_value("1000000")
                .help("Stops the run and warns once this many ticks have elapsed"),
        )
        .arg(
            clap::Arg::with_name("memory-size")
                .long("memory-size")
                .takes_value(true)
                .default_value("1000")
                .help("Sets the total number of cells in the data memory image (§3)"),
        )
        .arg(
            clap::Arg::with_name("var-size")
                .long("var-size")
                .takes_value(true)
                .default_value("100")
                .help("Sets the number of cells reserved for named variables (§3)"),
        )
        .get_matches();

    let ticks_limit = value_t!(matches.value_of("ticks-limit"), u64).unwrap_or_else(|err| err.exit());
    let memory_size = value_t!(matches.value_of("memory-size"), u32).unwrap_or_else(|err| err.exit());
    let var_size = value_t!(matches.value_of("var-size"), u32).unwrap_or_else(|err| err.exit());

    let program = read_image(matches.value_of("CODE").unwrap());
    let input_schedule = read_input_schedule(matches.value_of("INPUT_SCHEDULE").unwrap());

    let handler_files: Vec<&str> = matches.values_of("HANDLERS").unwrap().collect();
    if handler_files.len() % 2 != 0 {
        die("handler images must come in write/read pairs, one pair per port");
    }

    let ports: Vec<InterruptablePort> = handler_files
        .chunks(2)
        .map(|pair| InterruptablePort::new(read_image(pair[0]), read_image(pair[1])))
        .collect();

    let data_path = DataPath::new(memory_size, var_size, ports, program);
    let mut control_unit = ControlUnit::new(data_path);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = control_unit.run(&input_schedule, ticks_limit, |value| {
        if value == 13 {
            writeln!(out).ok();
        } else if let Some(ch) = char::from_u32(value as u32) {
            write!(out, "{}", ch).ok();
            out.flush().ok();
        }
    });

    match result {
        Ok(ExitCode::Halted) => info!("ticks: {}", control_unit.ticks_counter),
        Ok(ExitCode::TicksLimitExceeded) => info!("ticks limit exceeded at {}", control_unit.ticks_counter),
        Err(err) => die(err),
    }
}
