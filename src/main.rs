//! Compiscript compiler CLI.
//!
//! Command-line interface for compiling .cps programs to MIPS32 assembly.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

use cpsc::CompilerConfig;

#[derive(ClapParser)]
#[command(name = "cpsc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiscript compiler - compile .cps programs to MIPS32 assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .cps file to MIPS32 assembly, printed to stdout unless -o
    /// is given
    Compile {
        /// Input .cps source file
        input: PathBuf,

        /// Write assembly to `<input>.s` instead of stdout
        #[arg(short, long)]
        output: bool,

        /// Path to a TOML file overriding the default compiler configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { input, output, config } => run_compile(&input, output, config.as_deref()),
        Commands::Completions { shell } => run_completions(shell),
    }
}

/// Exit 0 on success, 1 on any semantic or generation error, 2 on I/O error.
fn run_compile(input: &std::path::Path, write_to_file: bool, config_path: Option<&std::path::Path>) {
    let config = match config_path {
        Some(path) => match CompilerConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };

    let source = match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("I/O error: cannot read source file '{}': {}", input.display(), e);
            process::exit(2);
        }
    };

    let output = match cpsc::compile_source(&source, &config) {
        Ok(output) => output,
        Err(errors) => {
            for e in &errors {
                eprintln!("{}: {}", e.kind(), e);
            }
            process::exit(1);
        }
    };

    if write_to_file {
        let asm_path = input.with_extension("s");
        if let Err(e) = fs::write(&asm_path, &output.assembly) {
            eprintln!("I/O error: cannot write output file '{}': {}", asm_path.display(), e);
            process::exit(2);
        }
    } else {
        print!("{}", output.assembly);
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "cpsc", &mut io::stdout());
}
