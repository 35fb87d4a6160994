mod cli;
mod elevation;
mod lock;
mod paths;
mod plugins;
mod setup;
mod sudo;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use lock::LockError;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        None => setup::run(&ctx, &cli.setup),
        Some(Command::Setup(args)) => setup::run(&ctx, &args),
        Some(Command::Plugins(args)) => setup::plugins(&ctx, &args),
        Some(Command::Status(args)) => setup::status(&ctx, &args),
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ubup", &mut io::stdout());
            Ok(())
        }
    }
}

fn report(err: &anyhow::Error) {
    if let Some(LockError::Conflict(path)) = err.downcast_ref::<LockError>() {
        log::debug!("Lock held: {}", path.display());
        ui::error("Another ubup process seems to be running.");
        ui::error("Please wait for the other process to complete.");
        return;
    }
    ui::error(&format!("{err:#}"));
}
