//! folders - create directories

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use stepkit::{Plugin, PluginDescriptor, Shape, StepContext, typed_config};

pub const KEY: &str = "folders";

#[derive(Debug)]
pub struct Folders {
    folders: Vec<String>,
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builtin(KEY, Shape::list_of(Shape::String), |config| {
        Ok(Box::new(Folders {
            folders: typed_config(config)?,
        }))
    })
}

impl Plugin for Folders {
    fn description(&self) -> String {
        match self.folders.as_slice() {
            [one] => format!("Create folder {one}"),
            all => format!("Create {} folders", all.len()),
        }
    }

    fn perform(&self, ctx: &StepContext) -> Result<()> {
        for folder in &self.folders {
            let path = ctx.expand_path(folder);
            if path.exists() {
                continue;
            }
            match fs::create_dir_all(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    ctx.run_command_sudo("mkdir", &["-p", &path.to_string_lossy()])?;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create {}", path.display()));
                }
            }
        }
        Ok(())
    }
}
