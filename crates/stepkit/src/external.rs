//! Externally supplied step types
//!
//! A manifest directory may contain a `plugins/` directory of YAML
//! descriptors. Each descriptor names a step type, its configuration
//! shape, and an executable that performs the step:
//!
//! ```yaml
//! key: npm-globals
//! schema: {list: string}
//! run: ./npm-globals.sh
//! elevated: false
//! ```
//!
//! The executable receives the step configuration as JSON in
//! `UBUP_STEP_CONFIG` and the manifest directory in `UBUP_MANIFEST_DIR`.

use crate::context::StepContext;
use crate::error::{Error, Result};
use crate::plugin::{Plugin, PluginDescriptor, PluginFactory};
use crate::shape::Shape;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the discovery directory next to the manifest
pub const PLUGIN_DIR: &str = "plugins";

/// Environment variable carrying the step configuration as JSON
pub const ENV_STEP_CONFIG: &str = "UBUP_STEP_CONFIG";

/// Environment variable carrying the manifest directory
pub const ENV_MANIFEST_DIR: &str = "UBUP_MANIFEST_DIR";

/// On-disk plugin descriptor
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalPluginSpec {
    /// Step type identifier
    pub key: String,
    /// Expected configuration shape
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub schema: Shape,
    /// Executable, relative to the descriptor unless absolute or a bare name
    pub run: String,
    /// Run the executable through the elevated path
    #[serde(default)]
    pub elevated: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl ExternalPluginSpec {
    /// Resolve the executable path against the descriptor's directory
    pub fn program(&self, descriptor_dir: &Path) -> PathBuf {
        let run = Path::new(&self.run);
        if run.is_absolute() || !self.run.contains('/') {
            run.to_path_buf()
        } else {
            descriptor_dir.join(run)
        }
    }

    fn into_descriptor(self, path: PathBuf) -> PluginDescriptor {
        let descriptor_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let program = self.program(&descriptor_dir);
        let step_type = self.key.clone();
        let elevated = self.elevated;
        let description = self.description.clone();

        let factory: PluginFactory = Arc::new(move |config| {
            Ok(Box::new(ExternalPlugin {
                step_type: step_type.clone(),
                program: program.clone(),
                config_json: serde_json::to_string(config)?,
                elevated,
                description: description.clone(),
            }))
        });

        PluginDescriptor::external(&self.key, self.schema, path, factory)
    }
}

/// A bound step backed by an external executable
#[derive(Debug)]
pub struct ExternalPlugin {
    step_type: String,
    program: PathBuf,
    config_json: String,
    elevated: bool,
    description: Option<String>,
}

impl Plugin for ExternalPlugin {
    fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("Run {} ({})", self.program.display(), self.step_type))
    }

    fn requires_elevation(&self) -> bool {
        self.elevated
    }

    fn perform(&self, ctx: &StepContext) -> anyhow::Result<()> {
        let program = self.program.to_string_lossy();
        let manifest_dir = ctx.manifest_dir.to_string_lossy();
        let env = [
            (ENV_STEP_CONFIG, self.config_json.as_str()),
            (ENV_MANIFEST_DIR, manifest_dir.as_ref()),
        ];
        ctx.run_command_with_env(&program, &[], &env, self.elevated)?;
        Ok(())
    }
}

/// Load one descriptor file
pub fn load_descriptor(path: &Path) -> Result<PluginDescriptor> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let spec: ExternalPluginSpec =
        serde_yaml::from_str(&content).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if spec.key.trim().is_empty() {
        return Err(Error::InvalidPlugin {
            path: path.to_path_buf(),
            reason: "key must not be empty".to_string(),
        });
    }
    if spec.run.trim().is_empty() {
        return Err(Error::InvalidPlugin {
            path: path.to_path_buf(),
            reason: "run must not be empty".to_string(),
        });
    }

    Ok(spec.into_descriptor(path.to_path_buf()))
}

/// Discover every descriptor in a plugin directory, sorted by file name
///
/// A missing directory yields no plugins.
pub fn discover(plugin_dir: &Path) -> Result<Vec<PluginDescriptor>> {
    if !plugin_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(plugin_dir)
        .map_err(|e| Error::io(plugin_dir, e))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_yaml_extension(path))
        .collect();
    paths.sort();

    log::debug!(
        "Found {} plugin descriptor(s) in {}",
        paths.len(),
        plugin_dir.display()
    );

    paths.iter().map(|path| load_descriptor(path)).collect()
}

/// Whether a path ends in `.yaml` or `.yml`
pub fn has_yaml_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}
