use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ubup")]
#[command(version)]
#[command(about = "Set up your machine from a manifest of idempotent steps", long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Verbosity level; also echoes step command output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Setup options when no subcommand is given
    #[command(flatten)]
    pub setup: SetupArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Perform the setup (default)
    Setup(SetupArgs),

    /// List available step types and their configuration shapes
    Plugins(ManifestArgs),

    /// Show which steps already ran
    Status(ManifestArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// Manifest file, or a directory containing setup.yaml
    #[arg(default_value = ".", env = "UBUP_MANIFEST")]
    pub path: PathBuf,

    /// Run all steps, even those that already ran
    #[arg(long)]
    pub rerun: bool,

    /// Plain output without indentation or spinners
    #[arg(long)]
    pub no_roots: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    /// Manifest file, or a directory containing setup.yaml
    #[arg(default_value = ".", env = "UBUP_MANIFEST")]
    pub path: PathBuf,
}
