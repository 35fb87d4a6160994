//! Manifest loading - from a YAML document to bound, ready-to-run steps
//!
//! The top level of a manifest is a mapping from step type to that step's
//! raw configuration. Declaration order is execution order. A top-level
//! list of single-entry mappings is also accepted so a step type can be
//! declared more than once.
//!
//! Every declaration is resolved and validated before any plugin is
//! instantiated, so a typo in the last step stops the whole run.

use crate::error::{Error, Result};
use crate::external::{self, PLUGIN_DIR, has_yaml_extension};
use crate::plugin::BoxedPlugin;
use crate::registry::Registry;
use crate::tracker::StepFingerprint;
use serde_yaml::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File names tried, in order, when the manifest path is a directory
pub const MANIFEST_NAMES: [&str; 2] = ["setup.yaml", "setup.yml"];

/// Resolve a file or directory argument to a manifest file
pub fn locate(path: &Path) -> Result<PathBuf> {
    if path.is_dir() {
        return MANIFEST_NAMES
            .iter()
            .map(|name| path.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::ManifestNotFound(path.join(MANIFEST_NAMES[0])));
    }

    if !path.is_file() {
        return Err(Error::ManifestNotFound(path.to_path_buf()));
    }
    if !has_yaml_extension(path) {
        return Err(Error::UnsupportedExtension(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

/// Register every plugin found next to the manifest
///
/// Returns the number of plugins added.
pub fn discover_plugins(manifest_dir: &Path, registry: &mut Registry) -> Result<usize> {
    let descriptors = external::discover(&manifest_dir.join(PLUGIN_DIR))?;
    let count = descriptors.len();
    for descriptor in descriptors {
        registry.register(descriptor)?;
    }
    Ok(count)
}

/// One (step type, raw configuration) pair as written in the manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub step_type: String,
    pub config: Value,
}

/// Parse the document body into ordered declarations
pub fn parse_declarations(path: &Path, content: &str) -> Result<Vec<Declaration>> {
    let document: Value = serde_yaml::from_str(content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let invalid = |reason: &str| Error::InvalidManifest {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    match document {
        Value::Null => Ok(Vec::new()),
        Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(key, config)| {
                declaration(key, config).ok_or_else(|| invalid("step types must be strings"))
            })
            .collect(),
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Mapping(mapping) if mapping.len() == 1 => mapping
                    .into_iter()
                    .next()
                    .and_then(|(key, config)| declaration(key, config))
                    .ok_or_else(|| invalid("step types must be strings")),
                _ => Err(invalid(
                    "list entries must be mappings with exactly one step type",
                )),
            })
            .collect(),
        _ => Err(invalid(
            "top level must be a mapping of step types to their configuration",
        )),
    }
}

fn declaration(key: Value, config: Value) -> Option<Declaration> {
    match key {
        Value::String(step_type) => Some(Declaration { step_type, config }),
        _ => None,
    }
}

/// A plugin instance bound to its validated configuration
pub struct BoundStep {
    /// 1-based position in the manifest
    pub position: usize,
    pub step_type: String,
    pub config: Value,
    pub fingerprint: StepFingerprint,
    pub plugin: BoxedPlugin,
}

impl BoundStep {
    pub fn description(&self) -> String {
        self.plugin.description()
    }

    pub fn requires_elevation(&self) -> bool {
        self.plugin.requires_elevation()
    }
}

impl fmt::Debug for BoundStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundStep")
            .field("position", &self.position)
            .field("step_type", &self.step_type)
            .field("fingerprint", &self.fingerprint)
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

/// A loaded manifest with every step bound
#[derive(Debug)]
pub struct Manifest {
    /// Canonical path of the manifest file
    pub path: PathBuf,
    /// Directory relative paths resolve against
    pub dir: PathBuf,
    pub steps: Vec<BoundStep>,
}

impl Manifest {
    /// Read, parse, validate and bind a manifest file
    ///
    /// Plugins from the manifest's `plugins/` directory must already be
    /// registered (see [`discover_plugins`]).
    pub fn load(path: &Path, registry: &Registry) -> Result<Self> {
        let path = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;

        let declarations = parse_declarations(&path, &content)?;
        let steps = bind(declarations, registry)?;

        log::debug!("Loaded {} step(s) from {}", steps.len(), path.display());
        Ok(Self { path, dir, steps })
    }

    /// Identity of this manifest in the run state
    pub fn identity(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Resolve, validate and instantiate declarations
///
/// Every declaration is checked before any plugin is built.
pub fn bind(declarations: Vec<Declaration>, registry: &Registry) -> Result<Vec<BoundStep>> {
    for declaration in &declarations {
        let descriptor = registry.resolve(&declaration.step_type)?;
        descriptor
            .shape
            .validate(&declaration.config)
            .map_err(|mismatch| Error::InvalidConfig {
                step_type: declaration.step_type.clone(),
                location: mismatch.location,
                expected: descriptor.shape.to_string(),
                reason: mismatch.reason,
            })?;
    }

    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let mut steps = Vec::with_capacity(declarations.len());

    for (index, declaration) in declarations.into_iter().enumerate() {
        let descriptor = registry.resolve(&declaration.step_type)?;
        let plugin = descriptor
            .instantiate(&declaration.config)
            .map_err(|e| Error::InvalidConfig {
                step_type: declaration.step_type.clone(),
                location: "$".to_string(),
                expected: descriptor.shape.to_string(),
                reason: format!("{e:#}"),
            })?;

        let content = StepFingerprint::content_key(&declaration.step_type, &declaration.config);
        let occurrence = occurrences.entry(content).or_default();
        let fingerprint =
            StepFingerprint::compute(&declaration.step_type, &declaration.config, *occurrence);
        *occurrence += 1;

        steps.push(BoundStep {
            position: index + 1,
            step_type: declaration.step_type,
            config: declaration.config,
            fingerprint,
            plugin,
        });
    }

    Ok(steps)
}
