use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;

use driver::{Compiler, CompilerOptions, DriverResult};
use errors::RenderOptions;

#[derive(Parser)]
#[command(name = "pasc", about = "Pascal-subset compiler targeting a stack VM", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Disable colored diagnostics
    #[arg(long, global = true)]
    no_color: bool,

    /// Tag each diagnostic with the phase that reported it
    #[arg(long, global = true)]
    show_source: bool,

    /// Report each finished phase
    #[arg(long, global = true)]
    verbose: bool,

    /// Treat warnings as errors
    #[arg(long, global = true)]
    warnings_as_errors: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tokens of a source file
    Lex { file: PathBuf },
    /// Parse a source file
    Parse {
        file: PathBuf,
        /// Write the AST as JSON
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Lex, parse and type check without generating code
    Check { file: PathBuf },
    /// Compile a source file to a stack-machine listing
    Compile {
        file: PathBuf,
        /// Listing path (default: input with the .vm extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let compiler = Compiler::new(CompilerOptions {
        render: RenderOptions {
            emit_source: cli.show_source,
            ..RenderOptions::default()
        },
        verbose: cli.verbose,
        warnings_as_errors: cli.warnings_as_errors,
    });

    if let Err(error) = run(&compiler, cli.command) {
        eprintln!("{} {}", "error:".red().bold(), error);
        process::exit(1);
    }
}

fn run(compiler: &Compiler, command: Commands) -> DriverResult<()> {
    match command {
        Commands::Lex { file } => compiler.lex_file(&file),
        Commands::Parse { file, dump } => compiler.parse_file(&file, dump.as_deref()),
        Commands::Check { file } => compiler.check_file(&file),
        Commands::Compile { file, output } => compiler.compile_file(&file, output.as_deref()).map(|_| ()),
    }
}
