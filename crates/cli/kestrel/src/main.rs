//! Kestrel - compiler front-end CLI
//!
//! Compiles one source file down to the lowered, typed program tree and
//! reports what the backend would receive.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "CLI tool needs to print to stdout/stderr"
)]

use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize as _;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[clap(name = "kestrel", version, about = "Compiler front end for the Kestrel language")]
struct Cli {
    /// Source file to compile
    input: PathBuf,

    /// Print the backend symbol name of every prototype and lowered body
    #[clap(long)]
    dump_symbols: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let source = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to open `{}`", cli.input.display()))?;
    let name = cli.input.display().to_string();

    let result = match ks_driver::compile_source(&source, &name) {
        Ok(result) => result,
        Err(error) => {
            eprintln!("{:?}", miette::Report::new(error));
            return Ok(ExitCode::FAILURE);
        }
    };

    for error in &result.lex_errors {
        eprintln!("{:?}", miette::Report::new(error.clone()));
    }
    for error in &result.syntax_errors {
        eprintln!("{:?}", miette::Report::new(error.clone()));
    }

    let context = &result.context;
    println!(
        "{} {}: {} classes, {} prototypes, {} lowered bodies",
        "compiled".green().bold(),
        name,
        context.classes.len(),
        context.prototypes.len(),
        context.bodies.len()
    );

    if cli.dump_symbols {
        for &proto in &context.prototypes {
            let mangled = ks_driver::mangled_name(context, &result.interner, proto);
            println!("  {} {mangled}", "proto".dimmed());
        }
        for body in &context.bodies {
            println!("  {} {}", "body ".dimmed(), body.mangled);
        }
    }

    if result.has_syntax_errors() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
