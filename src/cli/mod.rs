//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "regcon",
    version,
    about = "Tax and regulatory consultant over a private legal corpus",
    long_about = "Regcon answers questions about tax and financial regulation from a private document \
                  corpus. Each question is expanded, matched against a vector index of the corpus and \
                  answered by a language model, then either graded and refined or critiqued and \
                  re-searched until it is good enough or a cycle limit is reached."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/regcon/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a single question
    Ask {
        /// Question to ask
        question: String,

        /// Pipeline mode, overriding the configuration
        #[arg(short, long, value_parser = ["refine", "reflect"])]
        mode: Option<String>,

        /// Profile to use (e.g., "thorough", "fast")
        #[arg(short, long)]
        profile: Option<String>,

        /// Print token and timing usage after the answer
        #[arg(long)]
        usage: bool,
    },

    /// Answer every question in a file
    Batch {
        /// Questions file: one question per line, or .jsonl with {"id", "question"}
        file: PathBuf,

        /// Output file for JSONL answers (defaults to <file>.answers.jsonl)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum questions in flight, overriding the configuration
        #[arg(short, long)]
        workers: Option<usize>,

        /// Pipeline mode, overriding the configuration
        #[arg(short, long, value_parser = ["refine", "reflect"])]
        mode: Option<String>,

        /// Profile to use
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Build the knowledge base artifacts from the raw documents
    Build {
        /// Rebuild even when the artifacts are up to date
        #[arg(short, long)]
        force: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_batch() {
        let cli = Cli::parse_from([
            "regcon",
            "batch",
            "questions.jsonl",
            "--workers",
            "8",
            "--mode",
            "reflect",
        ]);

        match cli.command {
            Commands::Batch {
                workers, mode, ..
            } => {
                assert_eq!(workers, Some(8));
                assert_eq!(mode.as_deref(), Some("reflect"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["regcon", "ask", "q", "--mode", "loop"]).is_err());
    }
}
