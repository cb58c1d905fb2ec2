//! `graphwire` binary: classify response status codes from the command line.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use graphwire::status::{ResponseStatusCode, classify};

fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let codes: Vec<u16> = match cli.command {
        cli::Command::Classify { codes } => codes,
        cli::Command::List => ResponseStatusCode::ALL.iter().map(|s| s.as_u16()).collect(),
    };

    let mut status = ExitCode::SUCCESS;
    for code in codes {
        match classify(code) {
            Ok(c) => println!(
                "{}\t{:?}\t{:?}\terror={}",
                code, c.status, c.kind, c.is_error
            ),
            Err(e) => {
                tracing::error!(code, "{e}");
                status = ExitCode::FAILURE;
            }
        }
    }
    status
}
