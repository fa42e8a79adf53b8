//! Command-line arguments.

use crate::duration::parse_duration;
use crate::output::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use stepline_dsl::Literal;

/// Compile compact test definitions and create them as remote test steps
#[derive(Debug, Parser)]
#[command(name = "stepline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the configured one, else human)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Config file (defaults to ~/.stepline/config.yaml when present)
    #[arg(long, global = true, env = "STEPLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging for stepline
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse and validate a definition
    Validate(ValidateArgs),

    /// Print the operations a definition compiles to
    Compile(CompileArgs),

    /// Create the compiled steps on remote checkpoints
    Run(RunArgs),

    /// Inspect or change the stored session
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct CompileArgs {
    pub file: PathBuf,

    /// Override a data variable (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, Literal)>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// One file runs against the session or --checkpoint; several need one
    /// --checkpoint each, in the same order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Explicit checkpoint; the stored session is left untouched
    #[arg(long = "checkpoint", value_name = "ID")]
    pub checkpoints: Vec<i64>,

    /// First position to write to (1-based)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub position: Option<u32>,

    /// Definitions run concurrently in batch mode
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub parallel: Option<u64>,

    /// Limit for the whole run, e.g. 10m
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Limit for each remote call, e.g. 30s
    #[arg(long, value_parser = parse_duration)]
    pub call_timeout: Option<Duration>,

    /// Override a data variable (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, Literal)>,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Print the stored checkpoint and next position
    Show,

    /// Point the session at a checkpoint
    Set {
        #[arg(long)]
        checkpoint: i64,

        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        position: u32,
    },

    /// Remove the stored session
    Clear,
}

/// Parses `name=value`; the value is typed like a YAML scalar.
pub fn parse_var(text: &str) -> Result<(String, Literal), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", text))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", text));
    }
    Ok((name.to_string(), Literal::from_text(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn vars_are_typed() {
        assert_eq!(parse_var("rows=3"), Ok(("rows".into(), Literal::Int(3))));
        assert_eq!(parse_var("env=prod"), Ok(("env".into(), Literal::Str("prod".into()))));
        assert_eq!(parse_var("q=a=b"), Ok(("q".into(), Literal::Str("a=b".into()))));
        assert!(parse_var("nothing").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn batch_run_parses() {
        let cli = Cli::try_parse_from([
            "stepline", "run", "a.yaml", "b.yaml", "--checkpoint", "1", "--checkpoint", "2",
            "--parallel", "2", "--timeout", "5m", "--format", "json",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Json));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.checkpoints, vec![1, 2]);
        assert_eq!(args.parallel, Some(2));
        assert_eq!(args.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn zero_position_is_rejected() {
        assert!(Cli::try_parse_from(["stepline", "run", "a.yaml", "--position", "0"]).is_err());
    }
}
