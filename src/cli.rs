//! Command line interface for the `graphwire` binary.
//!
//! Exposes the status classifier so codes seen in server logs can be
//! interpreted quickly; also used to generate the man page.

use clap::{Parser, Subcommand};

/// Command line arguments for the `graphwire` binary.
#[derive(Debug, Parser)]
#[command(name = "graphwire", version, about = "Inspect graph server response status codes")]
pub struct Cli {
    /// Operation to perform.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of the `graphwire` binary.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify one or more numeric status codes.
    Classify {
        /// Status codes to classify.
        #[arg(required = true)]
        codes: Vec<u16>,
    },
    /// List every defined status code with its classification.
    List,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_classify_codes() {
        let cli = Cli::parse_from(["graphwire", "classify", "206", "596"]);
        let Command::Classify { codes } = cli.command else {
            panic!("expected classify subcommand");
        };
        assert_eq!(codes, vec![206, 596]);
    }

    #[test]
    fn classify_requires_codes() {
        assert!(Cli::try_parse_from(["graphwire", "classify"]).is_err());
    }
}
