//! Dime Compiler CLI
//!
//! The `dimec` command is the main entry point for the Dime compiler.

use clap::{Parser, Subcommand};
use dime::{lexer, parser, BuildConfig, BuildError, CompileError};
use miette::{miette, LabeledSpan, NamedSource};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dimec")]
#[command(version = dime::VERSION)]
#[command(about = "The Dime Compiler", long_about = None)]
struct Cli {
    /// Log compiler progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project in a directory (entry file `main.dime`)
    Build {
        /// Project root
        #[arg(value_name = "PATH", default_value = ".")]
        root: PathBuf,

        /// Write to builds/release instead of builds/debug
        #[arg(long)]
        release: bool,
    },

    /// Compile a single source file
    Compile {
        /// Input file to compile
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file; the module is printed when omitted
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Tokenize a file and print tokens
    Tokens {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Parse a file and print the AST
    Ast {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(input: &PathBuf) -> miette::Result<String> {
    fs::read_to_string(input).map_err(|e| miette!("Failed to read {}: {}", input.display(), e))
}

/// Attach the offending span of `source` to a compile error
fn report(err: CompileError, name: &str, source: Option<String>) -> miette::Report {
    let Some(source) = source else {
        return miette!("{}", err);
    };
    let start = err.pos.offset.min(source.len());
    let end = (start + err.pos.length.max(1)).min(source.len());
    miette!(
        labels = vec![LabeledSpan::at(start..end, "here")],
        "{}",
        err
    )
    .with_source_code(NamedSource::new(name, source))
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build { root, release } => {
            let config = BuildConfig::new(root).release(release);
            match dime::build_project(&config) {
                Ok(output) => {
                    println!("Compiled to {}", output.display());
                    Ok(())
                }
                Err(BuildError::Compile(err)) => {
                    let entry = config.entry();
                    let source = fs::read_to_string(&entry).ok();
                    Err(report(err, &entry.to_string_lossy(), source))
                }
                Err(err) => Err(miette!("{}", err)),
            }
        }

        Commands::Compile { input, output } => {
            let source = read_source(&input)?;
            let name = input.to_string_lossy().into_owned();
            let module = dime::compile_source(&name, &source)
                .map_err(|err| report(err, &name, Some(source.clone())))?;

            match output {
                Some(path) => {
                    dime::project::write_output(&path, &module).map_err(|e| miette!("{}", e))?;
                    println!("Compiled to {}", path.display());
                }
                None => print!("{}", module),
            }
            Ok(())
        }

        Commands::Tokens { input } => {
            let source = read_source(&input)?;
            let name = input.to_string_lossy().into_owned();
            let tokens = lexer::Lexer::with_file(&name, &source)
                .tokenize()
                .map_err(|err| report(err, &name, Some(source.clone())))?;

            for token in &tokens {
                println!(
                    "{:>4}:{:<4} {:12} {:?}",
                    token.pos.line + 1,
                    token.pos.column,
                    token.kind.to_string(),
                    token.value
                );
            }
            Ok(())
        }

        Commands::Ast { input } => {
            let source = read_source(&input)?;
            let name = input.to_string_lossy().into_owned();
            let ast = parser::parse_source(&name, &source)
                .map_err(|err| report(err, &name, Some(source.clone())))?;

            println!("{:#?}", ast);
            Ok(())
        }
    }
}
