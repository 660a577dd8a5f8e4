// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `docs-finalizer`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "docs-finalizer",
    version,
    about = "Track document-transfer jobs in an in-progress folder and finalize them.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `DocsFinalizer.toml` in the current working directory if it
    /// exists, otherwise built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Folder to scan for jobs; overrides `[config].in_progress_folder`.
    #[arg(long, value_name = "PATH")]
    pub in_progress: Option<PathBuf>,

    /// Run a single poll cycle and exit.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DOCS_FINALIZER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the config, print it, and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let args = CliArgs::try_parse_from([
            "docs-finalizer",
            "--config",
            "conf/DocsFinalizer.toml",
            "--in-progress",
            "/spool/in-progress",
            "--once",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("conf/DocsFinalizer.toml")));
        assert_eq!(args.in_progress, Some(PathBuf::from("/spool/in-progress")));
        assert!(args.once);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(!args.dry_run);
    }

    #[test]
    fn defaults_are_empty() {
        let args = CliArgs::try_parse_from(["docs-finalizer"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.in_progress.is_none());
        assert!(!args.once);
    }
}
