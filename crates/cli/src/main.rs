//! Vela CLI
//!
//! Runs and inspects compiled chunk files (`.vlc`). Compilation from
//! source is the compiler's job; this binary only drives the runtime.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing::debug;

use vela_runtime::{Closure, Function, State, dump};

#[derive(Parser)]
#[command(name = "vela")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Vela runtime - run and inspect compiled chunks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a compiled chunk file
    Run {
        /// Input chunk file (.vlc)
        input: PathBuf,

        /// Minimum value-stack capacity, in slots (rounded up to a power
        /// of two)
        #[arg(long, default_value_t = vela_runtime::DEFAULT_STACK_CAPACITY)]
        stack_size: usize,
    },

    /// Disassemble a compiled chunk file
    Dump {
        /// Input chunk file (.vlc)
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn load_function(input: &Path) -> Result<Function, String> {
    let file = File::open(input).map_err(|e| format!("cannot open {}: {e}", input.display()))?;
    let mut reader = BufReader::new(file);
    Function::deserialize(&mut reader)
        .map_err(|e| format!("cannot load {}: {e}", input.display()))
}

fn run(input: &Path, stack_size: usize) -> Result<(), String> {
    let function = load_function(input)?;
    if function.num_nonlocals != 0 {
        return Err(format!(
            "{}: top-level function captures {} nonlocals",
            input.display(),
            function.num_nonlocals
        ));
    }
    debug!(file = %function.file, "chunk loaded");
    let mut state = State::new(stack_size);
    state
        .push_closure(Closure::new(Rc::new(function), Vec::new()))
        .map_err(|e| e.to_string())?;
    match state.call(0) {
        Ok(()) => {
            state.pop();
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { input, stack_size } => run(&input, stack_size),
        Commands::Dump { input } => load_function(&input).and_then(|function| {
            dump::disassemble(&function, &mut io::stdout().lock()).map_err(|e| e.to_string())
        }),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            return ExitCode::SUCCESS;
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
