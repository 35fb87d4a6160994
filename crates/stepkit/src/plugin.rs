//! Plugin trait for step types
//!
//! A plugin implements one step type. The registry keeps a
//! [`PluginDescriptor`] per type; the manifest loader validates raw
//! configuration against the descriptor's shape and then asks the
//! factory for a bound plugin instance.

use crate::context::StepContext;
use crate::shape::Shape;
use anyhow::Result;
use serde_yaml::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Core trait for all step types
///
/// # Example
///
/// ```ignore
/// use stepkit::{Plugin, StepContext};
///
/// #[derive(Debug)]
/// struct Touch { files: Vec<String> }
///
/// impl Plugin for Touch {
///     fn description(&self) -> String {
///         format!("Touch {} files", self.files.len())
///     }
///
///     fn perform(&self, ctx: &StepContext) -> anyhow::Result<()> {
///         for file in &self.files {
///             std::fs::write(ctx.expand_path(file), "")?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + fmt::Debug {
    /// Human-readable description of what this step does
    fn description(&self) -> String;

    /// Whether the step runs its main command through the elevated path
    fn requires_elevation(&self) -> bool {
        false
    }

    /// Apply the step's effect
    ///
    /// Called only after the configuration passed shape validation.
    fn perform(&self, ctx: &StepContext) -> Result<()>;
}

/// A boxed plugin for type-erased storage
pub type BoxedPlugin = Box<dyn Plugin>;

/// Builds a bound plugin from validated raw configuration
pub type PluginFactory = Arc<dyn Fn(&Value) -> Result<BoxedPlugin> + Send + Sync>;

/// Where a plugin came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    /// Compiled into the binary
    Builtin,
    /// Discovered from a descriptor file next to the manifest
    External(PathBuf),
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => write!(f, "builtin"),
            Self::External(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Registry entry for one step type
#[derive(Clone)]
pub struct PluginDescriptor {
    pub step_type: String,
    pub shape: Shape,
    pub source: PluginSource,
    factory: PluginFactory,
}

impl PluginDescriptor {
    /// Describe a builtin plugin
    pub fn builtin<F>(step_type: &str, shape: Shape, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<BoxedPlugin> + Send + Sync + 'static,
    {
        Self {
            step_type: step_type.to_string(),
            shape,
            source: PluginSource::Builtin,
            factory: Arc::new(factory),
        }
    }

    /// Describe a plugin loaded from outside the binary
    pub fn external(
        step_type: &str,
        shape: Shape,
        path: PathBuf,
        factory: PluginFactory,
    ) -> Self {
        Self {
            step_type: step_type.to_string(),
            shape,
            source: PluginSource::External(path),
            factory,
        }
    }

    /// Build a plugin instance from already-validated configuration
    pub fn instantiate(&self, config: &Value) -> Result<BoxedPlugin> {
        (self.factory)(config)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("step_type", &self.step_type)
            .field("shape", &self.shape)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Deserialize validated configuration into a plugin's typed config
pub fn typed_config<T: serde::de::DeserializeOwned>(config: &Value) -> Result<T> {
    Ok(serde_yaml::from_value(config.clone())?)
}
