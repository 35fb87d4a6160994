//! Setup orchestrator - runs bound steps in order, exactly once each
//!
//! The run is strictly sequential and fail-fast: the first failing step
//! stops the run, steps before it stay recorded, steps after it never run.

use crate::context::{CommandRunner, ProgressCallback, StepContext};
use crate::error::{Error, Result};
use crate::manifest::{self, BoundStep, Manifest};
use crate::registry::Registry;
use crate::tracker::Tracker;
use crate::types::{RunOptions, RunSummary, StepOutcome};
use std::path::Path;

/// A loaded setup: bound manifest and tracker for one run
#[derive(Debug)]
pub struct Setup {
    manifest: Manifest,
    tracker: Tracker,
    options: RunOptions,
}

impl Setup {
    /// Locate the manifest, discover its plugins, bind its steps and open
    /// the run state
    ///
    /// Fails before anything runs if any step is unknown or invalid.
    ///
    /// # Arguments
    /// * `registry` - Builtin plugins; discovered plugins are added to it
    /// * `manifest_path` - Manifest file or a directory containing one
    /// * `state_file` - TOML file holding idempotency records
    /// * `options` - Rerun and verbosity flags
    pub fn load(
        mut registry: Registry,
        manifest_path: &Path,
        state_file: &Path,
        options: RunOptions,
    ) -> Result<Self> {
        let manifest_file = manifest::locate(manifest_path)?;
        let manifest_dir = manifest_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let discovered = manifest::discover_plugins(&manifest_dir, &mut registry)?;
        if discovered > 0 {
            log::info!("Loaded {discovered} plugin(s) from {}", manifest_dir.display());
        }

        let manifest = Manifest::load(&manifest_file, &registry)?;
        let tracker = Tracker::open(state_file, &manifest.identity())?;

        Ok(Self {
            manifest,
            tracker,
            options,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Run every step, skipping those already recorded unless `rerun` is set
    pub fn perform<P: ProgressCallback>(
        &mut self,
        runner: &dyn CommandRunner,
        progress: &mut P,
    ) -> Result<RunSummary> {
        run_steps(
            &self.manifest.steps,
            &self.manifest.dir,
            &mut self.tracker,
            runner,
            &self.options,
            progress,
        )
    }
}

/// Run steps in order against a tracker
///
/// # Returns
/// Counts of performed and skipped steps. On failure the error names the
/// step and carries the plugin's error as its source.
pub fn run_steps<P: ProgressCallback>(
    steps: &[BoundStep],
    manifest_dir: &Path,
    tracker: &mut Tracker,
    runner: &dyn CommandRunner,
    options: &RunOptions,
    progress: &mut P,
) -> Result<RunSummary> {
    let total = steps.len();
    let mut summary = RunSummary::default();

    for step in steps {
        let outcome = run_step(step, total, manifest_dir, tracker, runner, options, progress)?;
        summary.add_outcome(&outcome);
    }

    tracker.finish_run(steps.iter().map(|step| &step.fingerprint))?;
    Ok(summary)
}

fn run_step<P: ProgressCallback>(
    step: &BoundStep,
    total: usize,
    manifest_dir: &Path,
    tracker: &mut Tracker,
    runner: &dyn CommandRunner,
    options: &RunOptions,
    progress: &mut P,
) -> Result<StepOutcome> {
    if !options.rerun && tracker.is_done(&step.fingerprint) {
        log::debug!(
            "Skipping step {} ({}), already done as {}",
            step.position,
            step.step_type,
            step.fingerprint.short()
        );
        progress.on_step_skipped(step, total);
        return Ok(StepOutcome::Skipped);
    }

    progress.on_step_start(step, total);

    let ctx = StepContext::new(manifest_dir, options.verbose, runner);
    if let Err(e) = step.plugin.perform(&ctx) {
        progress.on_step_failed(step, total, &format!("{e:#}"));
        return Err(Error::StepFailed {
            position: step.position,
            step_type: step.step_type.clone(),
            source: e.into(),
        });
    }

    tracker.record(&step.fingerprint, &step.step_type, step.position)?;
    progress.on_step_complete(step, total);
    Ok(StepOutcome::Performed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::plugin::{Plugin, PluginDescriptor, typed_config};
    use crate::shape::Shape;
    use crate::types::CommandOutput;
    use std::fs;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<i64>>>;

    struct NoCommands;

    impl CommandRunner for NoCommands {
        fn execute(
            &self,
            program: &str,
            _args: &[&str],
            _env: &[(&str, &str)],
            _elevated: bool,
        ) -> Result<CommandOutput> {
            panic!("unexpected command {program}");
        }
    }

    /// Appends its id to the log; fails when the id is negative
    #[derive(Debug)]
    struct Mark {
        id: i64,
        log: Log,
    }

    impl Plugin for Mark {
        fn description(&self) -> String {
            format!("mark {}", self.id)
        }

        fn perform(&self, _ctx: &StepContext) -> anyhow::Result<()> {
            if self.id < 0 {
                anyhow::bail!("mark {} refused", self.id);
            }
            self.log.lock().unwrap().push(self.id);
            Ok(())
        }
    }

    fn registry(log: &Log) -> Registry {
        let log = Arc::clone(log);
        Registry::with_plugins([PluginDescriptor::builtin(
            "mark",
            Shape::Integer,
            move |config| {
                Ok(Box::new(Mark {
                    id: typed_config(config)?,
                    log: Arc::clone(&log),
                }))
            },
        )])
        .unwrap()
    }

    struct Fixture {
        dir: tempfile::TempDir,
        log: Log,
    }

    impl Fixture {
        fn new(manifest: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("setup.yaml"), manifest).unwrap();
            Self {
                dir,
                log: Log::default(),
            }
        }

        fn state_file(&self) -> std::path::PathBuf {
            self.dir.path().join("state").join("state.toml")
        }

        fn load(&self, rerun: bool) -> Result<Setup> {
            Setup::load(
                registry(&self.log),
                self.dir.path(),
                &self.state_file(),
                RunOptions {
                    rerun,
                    verbose: false,
                },
            )
        }

        fn run(&self, rerun: bool) -> Result<RunSummary> {
            self.load(rerun)?.perform(&NoCommands, &mut NoProgress)
        }

        fn executed(&self) -> Vec<i64> {
            self.log.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_runs_all_steps_in_order() {
        let fx = Fixture::new("- mark: 3\n- mark: 1\n- mark: 2\n");
        let summary = fx.run(false).unwrap();
        assert_eq!(fx.executed(), vec![3, 1, 2]);
        assert_eq!(
            summary,
            RunSummary {
                performed: 3,
                skipped: 0
            }
        );
    }

    #[test]
    fn test_second_run_skips_everything() {
        let fx = Fixture::new("- mark: 1\n- mark: 2\n");
        fx.run(false).unwrap();
        let summary = fx.run(false).unwrap();

        assert_eq!(fx.executed(), vec![1, 2]);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.performed, 0);
    }

    #[test]
    fn test_rerun_executes_everything() {
        let fx = Fixture::new("- mark: 1\n- mark: 2\n");
        fx.run(false).unwrap();
        let summary = fx.run(true).unwrap();

        assert_eq!(fx.executed(), vec![1, 2, 1, 2]);
        assert_eq!(summary.performed, 2);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn test_rerun_on_fresh_state_still_records() {
        let fx = Fixture::new("- mark: 1\n- mark: 2\n- mark: 3\n");
        let summary = fx.run(true).unwrap();
        assert_eq!(summary.performed, 3);

        let summary = fx.run(false).unwrap();
        assert_eq!(fx.executed(), vec![1, 2, 3]);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.performed, 0);
    }

    #[test]
    fn test_failure_stops_run_and_keeps_prior_records() {
        let fx = Fixture::new("- mark: 1\n- mark: 2\n- mark: -3\n- mark: 4\n");
        let err = fx.run(false).unwrap_err();

        match &err {
            Error::StepFailed {
                position,
                step_type,
                source,
            } => {
                assert_eq!(*position, 3);
                assert_eq!(step_type, "mark");
                assert_eq!(source.to_string(), "mark -3 refused");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.executed(), vec![1, 2]);

        let setup = fx.load(false).unwrap();
        let steps = &setup.manifest().steps;
        assert!(setup.tracker().is_done(&steps[0].fingerprint));
        assert!(setup.tracker().is_done(&steps[1].fingerprint));
        assert!(!setup.tracker().is_done(&steps[2].fingerprint));
        assert!(!setup.tracker().is_done(&steps[3].fingerprint));
    }

    #[test]
    fn test_fixed_step_resumes_after_failure() {
        let fx = Fixture::new("- mark: 1\n- mark: -2\n");
        fx.run(false).unwrap_err();

        fs::write(fx.dir.path().join("setup.yaml"), "- mark: 1\n- mark: 2\n").unwrap();
        let summary = fx.run(false).unwrap();

        assert_eq!(fx.executed(), vec![1, 2]);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.performed, 1);
    }

    #[test]
    fn test_unknown_type_runs_nothing() {
        let fx = Fixture::new("- mark: 1\n- marker: 2\n");
        let err = fx.run(false).unwrap_err();
        assert!(err.is_load_error());
        assert!(err.to_string().contains("marker"));
        assert!(fx.executed().is_empty());
    }

    #[test]
    fn test_invalid_last_step_runs_nothing() {
        let fx = Fixture::new("- mark: 1\n- mark: 2\n- mark: three\n");
        let err = fx.run(false).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(fx.executed().is_empty());
    }

    #[test]
    fn test_reordering_does_not_rerun() {
        let fx = Fixture::new("- mark: 1\n- mark: 2\n");
        fx.run(false).unwrap();

        fs::write(fx.dir.path().join("setup.yaml"), "- mark: 2\n- mark: 1\n").unwrap();
        let summary = fx.run(false).unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(fx.executed(), vec![1, 2]);
    }
}
