//! scriptlet - run an inline bash script

use anyhow::{Context, Result};
use std::io::Write;
use stepkit::{Plugin, PluginDescriptor, Shape, StepContext, typed_config};

pub const KEY: &str = "scriptlet";

#[derive(Debug)]
pub struct Scriptlet {
    script: String,
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builtin(KEY, Shape::String, |config| {
        Ok(Box::new(Scriptlet {
            script: typed_config(config)?,
        }))
    })
}

impl Plugin for Scriptlet {
    fn description(&self) -> String {
        let first = self.script.lines().find(|l| !l.trim().is_empty());
        match first {
            Some(line) => format!("Run scriptlet: {}", line.trim()),
            None => "Run empty scriptlet".to_string(),
        }
    }

    fn perform(&self, ctx: &StepContext) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("scriptlet_")
            .suffix(".sh")
            .tempfile()
            .context("Failed to create scriptlet file")?;
        file.write_all(self.script.as_bytes())
            .and_then(|()| file.flush())
            .context("Failed to write scriptlet file")?;

        let path = file.path().to_string_lossy();
        ctx.run_command("/bin/bash", &[&path])?;
        Ok(())
    }
}
