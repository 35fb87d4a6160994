//! # Stepkit
//!
//! An engine for idempotent, ordered setup steps.
//!
//! A manifest lists typed steps. Each step type is a [`Plugin`] registered
//! with a configuration [`Shape`]; the manifest loader validates every
//! declaration before anything runs, and the [`Setup`] orchestrator performs
//! steps in order, recording each success so later runs skip it.
//!
//! ## Core Concepts
//!
//! - **Plugin**: One step type, built from validated configuration
//! - **Registry**: Step types by identifier, builtin or discovered
//! - **Manifest**: Ordered, bound steps loaded from YAML
//! - **Tracker**: Persisted record of finished steps per manifest
//! - **Setup**: Runs the steps, fail-fast, skipping finished ones
//!
//! ## Example
//!
//! ```ignore
//! use stepkit::{NoProgress, Registry, RunOptions, Setup};
//!
//! let registry = Registry::with_plugins(builtin_plugins())?;
//! let mut setup = Setup::load(
//!     registry,
//!     Path::new("."),
//!     Path::new("/home/me/.local/state/ubup/state.toml"),
//!     RunOptions::default(),
//! )?;
//! let summary = setup.perform(&runner, &mut NoProgress)?;
//! println!("{} skipped", summary.skipped);
//! ```
//!
//! ## Provider Traits
//!
//! The engine does not spawn processes or draw to the terminal itself:
//!
//! - [`CommandRunner`]: Runs commands, optionally elevated
//! - [`ProgressCallback`]: Receives per-step progress

pub mod context;
pub mod error;
pub mod executor;
pub mod external;
pub mod glob;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod shape;
pub mod tracker;
pub mod types;

pub use context::{CommandRunner, NoProgress, ProgressCallback, StepContext, command_line};
pub use error::{BoxError, Error, Result};
pub use executor::{Setup, run_steps};
pub use manifest::{BoundStep, Declaration, Manifest};
pub use plugin::{BoxedPlugin, Plugin, PluginDescriptor, PluginFactory, PluginSource, typed_config};
pub use registry::Registry;
pub use shape::{Field, Mismatch, Shape};
pub use tracker::{StepFingerprint, StepRecord, Tracker};
pub use types::{CommandOutput, RunOptions, RunSummary, StepOutcome};
