//! scripts - run bash scripts from disk

use anyhow::{Result, bail};
use stepkit::{Plugin, PluginDescriptor, Shape, StepContext, typed_config};

pub const KEY: &str = "scripts";

#[derive(Debug)]
pub struct Scripts {
    scripts: Vec<String>,
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builtin(KEY, Shape::list_of(Shape::String), |config| {
        Ok(Box::new(Scripts {
            scripts: typed_config(config)?,
        }))
    })
}

impl Plugin for Scripts {
    fn description(&self) -> String {
        match self.scripts.as_slice() {
            [one] => format!("Run script {one}"),
            all => format!("Run {} scripts", all.len()),
        }
    }

    fn perform(&self, ctx: &StepContext) -> Result<()> {
        for script in &self.scripts {
            let path = ctx.expand_path(script);
            if !path.is_file() {
                bail!("The file {} doesn't exist", path.display());
            }
            ctx.run_command("/bin/bash", &[&path.to_string_lossy()])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::RecordingRunner;
    use std::fs;

    #[test]
    fn test_runs_each_script_without_arguments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sh"), "true").unwrap();
        fs::write(dir.path().join("b.sh"), "true").unwrap();
        let runner = RecordingRunner::new();
        let ctx = StepContext::new(dir.path(), false, &runner);

        descriptor()
            .instantiate(&serde_yaml::from_str("[./a.sh, b.sh]").unwrap())
            .unwrap()
            .perform(&ctx)
            .unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                format!("/bin/bash {}", dir.path().join("./a.sh").display()),
                format!("/bin/bash {}", dir.path().join("b.sh").display()),
            ]
        );
    }

    #[test]
    fn test_missing_script_fails_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let ctx = StepContext::new(dir.path(), false, &runner);

        let err = descriptor()
            .instantiate(&serde_yaml::from_str("[./missing.sh]").unwrap())
            .unwrap()
            .perform(&ctx)
            .unwrap_err();
        assert!(err.to_string().contains("doesn't exist"));
        assert!(runner.lines().is_empty());
    }
}
