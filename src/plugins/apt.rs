//! apt-packages - install packages with apt-get

use anyhow::Result;
use stepkit::{Plugin, PluginDescriptor, Shape, StepContext, typed_config};

pub const KEY: &str = "apt-packages";

#[derive(Debug)]
pub struct AptPackages {
    packages: Vec<String>,
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builtin(KEY, Shape::list_of(Shape::String), |config| {
        Ok(Box::new(AptPackages {
            packages: typed_config(config)?,
        }))
    })
}

impl Plugin for AptPackages {
    fn description(&self) -> String {
        format!("Install {} apt package(s)", self.packages.len())
    }

    fn requires_elevation(&self) -> bool {
        true
    }

    fn perform(&self, ctx: &StepContext) -> Result<()> {
        if self.packages.is_empty() {
            return Ok(());
        }
        let mut args = vec!["-y", "-q", "install"];
        args.extend(self.packages.iter().map(String::as_str));
        ctx.run_command_sudo("apt-get", &args)?;
        Ok(())
    }
}
