//! snap-packages - install snaps, optionally with a channel and confinement

use anyhow::Result;
use serde::Deserialize;
use serde_yaml::Value;
use stepkit::{Field, Plugin, PluginDescriptor, Shape, StepContext, typed_config};

pub const KEY: &str = "snap-packages";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct SnapOptions {
    channel: Option<String>,
    #[serde(default)]
    classic: bool,
    #[serde(default)]
    devmode: bool,
    #[serde(default)]
    jailmode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snap {
    name: String,
    options: SnapOptions,
}

impl Snap {
    fn install_args(&self) -> Vec<&str> {
        let mut args = vec!["install"];
        if let Some(channel) = &self.options.channel {
            args.extend(["--channel", channel.as_str()]);
        }
        if self.options.classic {
            args.push("--classic");
        }
        if self.options.devmode {
            args.push("--devmode");
        }
        if self.options.jailmode {
            args.push("--jailmode");
        }
        args.push(&self.name);
        args
    }
}

#[derive(Debug)]
pub struct SnapPackages {
    snaps: Vec<Snap>,
}

fn shape() -> Shape {
    Shape::list_of(Shape::OneOf(vec![
        Shape::String,
        Shape::map_of(Shape::Record(vec![
            Field::optional("channel", Shape::String),
            Field::optional("classic", Shape::Boolean),
            Field::optional("devmode", Shape::Boolean),
            Field::optional("jailmode", Shape::Boolean),
        ])),
    ]))
}

/// Flatten entries into snaps, keeping the order of names within a mapping
fn snaps(entries: Vec<Value>) -> Result<Vec<Snap>> {
    let mut snaps = Vec::new();
    for entry in entries {
        match entry {
            Value::Mapping(mapping) => {
                for (name, options) in mapping {
                    snaps.push(Snap {
                        name: typed_config(&name)?,
                        options: typed_config(&options)?,
                    });
                }
            }
            other => snaps.push(Snap {
                name: typed_config(&other)?,
                options: SnapOptions::default(),
            }),
        }
    }
    Ok(snaps)
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builtin(KEY, shape(), |config| {
        let entries: Vec<Value> = typed_config(config)?;
        Ok(Box::new(SnapPackages {
            snaps: snaps(entries)?,
        }))
    })
}

impl Plugin for SnapPackages {
    fn description(&self) -> String {
        format!("Install {} snap package(s)", self.snaps.len())
    }

    fn requires_elevation(&self) -> bool {
        true
    }

    fn perform(&self, ctx: &StepContext) -> Result<()> {
        for snap in &self.snaps {
            ctx.run_command_sudo("snap", &snap.install_args())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::RecordingRunner;

    const CONFIG: &str = "
- vlc
- code:
    classic: true
  hello-world:
    channel: beta
    devmode: true
    jailmode: true
";

    #[test]
    fn test_shape() {
        assert!(shape().validate(&serde_yaml::from_str(CONFIG).unwrap()).is_ok());
        let bad = serde_yaml::from_str("[{code: {classic: yes please}}]").unwrap();
        assert!(shape().validate(&bad).is_err());
    }

    #[test]
    fn test_install_flags_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let ctx = StepContext::new(dir.path(), false, &runner);

        descriptor()
            .instantiate(&serde_yaml::from_str(CONFIG).unwrap())
            .unwrap()
            .perform(&ctx)
            .unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "sudo snap install vlc",
                "sudo snap install --classic code",
                "sudo snap install --channel beta --devmode --jailmode hello-world",
            ]
        );
    }
}
