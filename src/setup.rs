//! setup, status and plugins commands

use crate::Context;
use crate::cli::{ManifestArgs, SetupArgs};
use crate::elevation;
use crate::lock;
use crate::paths;
use crate::plugins;
use crate::sudo::{CredentialRefresher, SystemRunner};
use crate::ui::{self, StepReporter};
use anyhow::{Context as _, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use stepkit::{PluginSource, RunOptions, Setup, manifest};

/// Perform the setup described by the manifest at `args.path`
///
/// Re-executes through sudo until running as the invoking user with a
/// fresh sudo timestamp, then runs every step under the run lock.
pub fn run(ctx: &Context, args: &SetupArgs) -> Result<()> {
    let elevation = elevation::ensure_privilege_stage()?;
    log::debug!(
        "Running as {} ({:?})",
        elevation.invoking_user.as_deref().unwrap_or("unknown user"),
        elevation.stage
    );

    let lock_path = paths::lock_file()?;
    lock::with_exclusive_run_lock(&lock_path, lock::DEFAULT_TIMEOUT, || {
        CredentialRefresher::default()
            .start()
            .context("Failed to start the sudo refresh thread")?;
        perform(ctx, args)
    })
}

fn perform(ctx: &Context, args: &SetupArgs) -> Result<()> {
    let verbose = ctx.verbose > 0;
    let manifest_path = expand(&args.path);

    if !ctx.quiet {
        ui::success_bold("🚀 Performing your setup.");
    }

    let mut setup = Setup::load(
        plugins::builtin_registry()?,
        &manifest_path,
        &paths::state_file()?,
        RunOptions {
            rerun: args.rerun,
            verbose,
        },
    )?;
    log::info!(
        "Loaded {} step(s) from {}",
        setup.manifest().len(),
        setup.manifest().path.display()
    );

    let runner = SystemRunner::new(verbose);
    let mut reporter = StepReporter::new(!(args.no_roots || verbose));
    let summary = setup.perform(&runner, &mut reporter)?;
    log::info!(
        "Visited {} step(s): {} performed, {} skipped",
        summary.total(),
        summary.performed,
        summary.skipped
    );

    if summary.skipped > 0 {
        ui::warn(&ui::skipped_message(summary.skipped));
        if !ctx.quiet {
            ui::dim("Run with --rerun to run all steps even if they were already run.");
        }
    }
    ui::success_bold("✓ Setup completed.");
    Ok(())
}

/// Show each declared step and whether it already ran
pub fn status(_ctx: &Context, args: &ManifestArgs) -> Result<()> {
    let setup = Setup::load(
        plugins::builtin_registry()?,
        &expand(&args.path),
        &paths::state_file()?,
        RunOptions::default(),
    )?;
    let manifest = setup.manifest();
    let tracker = setup.tracker();

    ui::header("Setup Status");
    ui::kv("Manifest", &manifest.path.display().to_string());
    ui::kv("State", &tracker.path().display().to_string());
    let last_run = tracker.last_run().map_or_else(
        || "never".to_string(),
        |t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        },
    );
    ui::kv("Last run", &last_run);
    println!();

    let total = manifest.len();
    let mut done = 0;
    for step in &manifest.steps {
        let label = format!("[{}/{}]", step.position, total);
        match tracker.get(&step.fingerprint) {
            Some(record) => {
                done += 1;
                println!(
                    "  {} {} {} {}",
                    "✓".green(),
                    label.dimmed(),
                    step.description(),
                    format!(
                        "({})",
                        record
                            .completed_at
                            .with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M")
                    )
                    .dimmed()
                );
            }
            None => println!(
                "  {} {} {}",
                "○".yellow(),
                label.dimmed(),
                step.description()
            ),
        }
    }

    println!();
    if total == 0 {
        ui::dim("The manifest declares no steps.");
    } else if done == total {
        ui::success(&format!("All {total} steps already ran"));
    } else {
        ui::warn(&format!("{} of {total} steps pending", total - done));
    }
    Ok(())
}

/// List builtin step types plus those discovered next to the manifest
pub fn plugins(_ctx: &Context, args: &ManifestArgs) -> Result<()> {
    let mut registry = plugins::builtin_registry()?;

    match manifest::locate(&expand(&args.path)) {
        Ok(file) => {
            let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
            manifest::discover_plugins(&dir, &mut registry)?;
        }
        Err(e) => log::info!("No manifest plugins loaded: {e}"),
    }

    ui::header("Step Types");
    for descriptor in registry.iter() {
        let source = match &descriptor.source {
            PluginSource::Builtin => String::new(),
            external => format!(" ({external})"),
        };
        println!(
            "  {}{}",
            descriptor.step_type.cyan().bold(),
            source.dimmed()
        );
        ui::dim(&format!("  {}", descriptor.shape));
    }
    Ok(())
}

fn expand(path: &Path) -> PathBuf {
    paths::expand(&path.to_string_lossy())
}
