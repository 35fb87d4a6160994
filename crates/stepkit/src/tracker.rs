//! Idempotency tracking - which steps already ran for a manifest
//!
//! Steps are identified by a content fingerprint of their step type and
//! configuration, so reordering a manifest does not re-run finished steps.
//! Records are persisted in a TOML state file after every successful step.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Step Fingerprints
// ============================================================================

/// Stable identity of a step across runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepFingerprint(String);

impl StepFingerprint {
    /// Hash of (step type, canonical configuration)
    pub fn content_key(step_type: &str, config: &Value) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(step_type.as_bytes());
        hasher.update(&[0]);
        hasher.update(canonical(config).as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Fingerprint of the `occurrence`-th identical declaration (0-based)
    pub fn compute(step_type: &str, config: &Value, occurrence: usize) -> Self {
        let content = Self::content_key(step_type, config);
        if occurrence == 0 {
            return Self(content);
        }
        let mut hasher = blake3::Hasher::new();
        hasher.update(content.as_bytes());
        hasher.update(&occurrence.to_le_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Abbreviated form for display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for StepFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order-independent rendering of a value; mapping entries are sorted
fn canonical(value: &Value) -> String {
    match value {
        Value::Null => "~".to_string(),
        Value::Bool(b) => format!("b:{b}"),
        Value::Number(n) => format!("n:{n}"),
        Value::String(s) => format!("s{}:{s}", s.len()),
        Value::Sequence(items) => {
            let inner: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Mapping(mapping) => {
            let mut entries: Vec<String> = mapping
                .iter()
                .map(|(k, v)| format!("{}={}", canonical(k), canonical(v)))
                .collect();
            entries.sort();
            format!("{{{}}}", entries.join(","))
        }
        Value::Tagged(tagged) => format!("!{}({})", tagged.tag, canonical(&tagged.value)),
    }
}

// ============================================================================
// State Structures
// ============================================================================

/// Everything persisted in the state file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    /// Per-manifest records, keyed by canonical manifest path
    #[serde(default)]
    pub manifests: BTreeMap<String, ManifestState>,
}

/// Records for one manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestState {
    /// Last time a run of this manifest finished successfully
    pub last_run: Option<DateTime<Utc>>,

    /// Completed steps by fingerprint
    #[serde(default)]
    pub steps: BTreeMap<StepFingerprint, StepRecord>,
}

/// A completed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_type: String,
    /// Position in the manifest when it ran
    pub position: usize,
    pub completed_at: DateTime<Utc>,
}

// ============================================================================
// Tracker
// ============================================================================

/// Idempotency tracker bound to one manifest and one state file
#[derive(Debug)]
pub struct Tracker {
    path: PathBuf,
    manifest: String,
    state: RunState,
}

impl Tracker {
    /// Load the state file, or start empty if it does not exist
    pub fn open(state_file: &Path, manifest_identity: &str) -> Result<Self> {
        let state = if state_file.exists() {
            let content = fs::read_to_string(state_file).map_err(|e| Error::io(state_file, e))?;
            let state: RunState = toml::from_str(&content).map_err(|e| Error::State {
                path: state_file.to_path_buf(),
                reason: e.to_string(),
            })?;
            log::debug!("Loaded run state from {}", state_file.display());
            state
        } else {
            log::debug!("State file does not exist, starting with empty state");
            RunState::default()
        };

        Ok(Self {
            path: state_file.to_path_buf(),
            manifest: manifest_identity.to_string(),
            state,
        })
    }

    /// Path of the backing state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn manifest_state(&self) -> Option<&ManifestState> {
        self.state.manifests.get(&self.manifest)
    }

    /// Whether a step was already recorded as done
    pub fn is_done(&self, fingerprint: &StepFingerprint) -> bool {
        self.get(fingerprint).is_some()
    }

    /// Record for a step, if it completed before
    pub fn get(&self, fingerprint: &StepFingerprint) -> Option<&StepRecord> {
        self.manifest_state()?.steps.get(fingerprint)
    }

    /// Number of completed steps recorded for this manifest
    pub fn recorded(&self) -> usize {
        self.manifest_state().map_or(0, |m| m.steps.len())
    }

    /// Last successful run of this manifest
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.manifest_state()?.last_run
    }

    /// Mark a step as done and persist immediately
    pub fn record(
        &mut self,
        fingerprint: &StepFingerprint,
        step_type: &str,
        position: usize,
    ) -> Result<()> {
        let record = StepRecord {
            step_type: step_type.to_string(),
            position,
            completed_at: Utc::now(),
        };
        self.state
            .manifests
            .entry(self.manifest.clone())
            .or_default()
            .steps
            .insert(fingerprint.clone(), record);
        log::trace!("Recorded step {position} ({step_type}) as {fingerprint}");
        self.save()
    }

    /// Stamp the end of a successful run and persist
    ///
    /// Records whose fingerprint is not in `live` belong to steps that were
    /// edited or removed from the manifest and are dropped.
    pub fn finish_run<'a>(
        &mut self,
        live: impl IntoIterator<Item = &'a StepFingerprint>,
    ) -> Result<()> {
        let live: BTreeSet<&StepFingerprint> = live.into_iter().collect();
        let manifest = self.state.manifests.entry(self.manifest.clone()).or_default();

        let before = manifest.steps.len();
        manifest.steps.retain(|fingerprint, _| live.contains(fingerprint));
        let pruned = before - manifest.steps.len();
        if pruned > 0 {
            log::debug!("Pruned {pruned} stale step record(s)");
        }

        manifest.last_run = Some(Utc::now());
        self.save()
    }

    /// Write the state file, replacing it atomically
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }

        let content = toml::to_string_pretty(&self.state).map_err(|e| Error::State {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let staging = self.path.with_extension("toml.tmp");
        fs::write(&staging, content).map_err(|e| Error::io(&staging, e))?;
        fs::rename(&staging, &self.path).map_err(|e| Error::io(&self.path, e))?;

        log::debug!("Saved run state to {}", self.path.display());
        Ok(())
    }
}
