use std::{fs, process::ExitCode};

use clap::Parser;
use pyir::{CodeObject, Options, StdTrace, Translator};

/// pyir — translate a CPython 3.8 bytecode dump into an SSA CFG IR.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// JSON code-object dump produced by the bytecode frontend.
    file: String,
    /// Emit a per-instruction trace to stderr.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let raw = match fs::read_to_string(&cli.file) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", cli.file);
            return ExitCode::FAILURE;
        }
    };
    let code: CodeObject = match serde_json::from_str(&raw) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: invalid code object dump: {err}");
            return ExitCode::FAILURE;
        }
    };

    match Translator::translate_module(&code, Options { debug: cli.debug }, &mut StdTrace) {
        Ok(object) => {
            print!("{object}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
