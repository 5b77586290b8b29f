//! `translator <source> <target>` (§6.3): compiles one `.forthchan` source file to a program
//! image, the Rust counterpart of the reference translator's `main`.

#[macro_use]
extern crate clap;

use std::fs;
use std::process;

use log::error;

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(
            clap::Arg::with_name("SOURCE")
                .help("Sets the .forthchan source file to compile")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::with_name("TARGET")
                .help("Sets the program image file to write")
                .required(true)
                .index(2),
        )
        .get_matches();

    let source_path = matches.value_of("SOURCE").unwrap();
    let target_path = matches.value_of("TARGET").unwrap();

    let source = fs::read_to_string(source_path).unwrap_or_else(|err| {
        error!("failed to read {}: {}", source_path, err);
        process::exit(1);
    });

    let code = forthchan_compiler::compile(&source).unwrap_or_else(|err| {
        error!("{}", err);
        process::exit(1);
    });

    let program = progimage::Program::new(code);
    progimage::write_file(target_path, &program).unwrap_or_else(|err| {
        error!("failed to write {}: {}", target_path, err);
        process::exit(1);
    });

    println!(
        "source LoC: {} code instr: {}",
        source.lines().count(),
        program.instructions().len()
    );
}
