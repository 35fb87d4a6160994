//! Privilege stage handling across re-exec
//!
//! A setup run passes through three stages, one process image each:
//!
//! 1. Unelevated: re-exec through `sudo -E` as root, setting `UBUP_STAGE_1`
//! 2. Elevated to root: re-exec through `sudo -E -u <user>` back to the
//!    invoking user, setting `UBUP_STAGE_2`. This leaves the user's sudo
//!    timestamp fresh, so elevated commands later run without prompting.
//! 3. Elevated to invoking user: proceed with the run
//!
//! The whole environment is forwarded on each hop. sudo rewrites
//! `SUDO_USER` to the caller of each hop, so the invoking user is pinned in
//! `UBUP_INVOKING_USER` on the first hop and read from there afterwards.

use anyhow::{Context, Result};
use std::convert::Infallible;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

/// Marker set when re-executing as root
pub const ENV_STAGE_1: &str = "UBUP_STAGE_1";

/// Marker set when dropping back to the invoking user
pub const ENV_STAGE_2: &str = "UBUP_STAGE_2";

/// User the run belongs to, carried across both hops
pub const ENV_INVOKING_USER: &str = "UBUP_INVOKING_USER";

/// Where the current process image sits in the escalation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unelevated,
    ElevatedToRoot,
    ElevatedToInvokingUser,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ElevationError {
    #[error("could not determine the invoking user: neither SUDO_USER nor USER is set")]
    UnknownUser,
}

/// Privilege stage plus the user the run belongs to, read from the
/// environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationContext {
    pub stage: Stage,
    pub invoking_user: Option<String>,
}

/// What the current process image must do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Final stage reached; run the setup here
    Proceed,
    /// Replace this process with the next stage
    Reexec(Reexec),
}

/// A planned re-exec through sudo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reexec {
    pub target: Stage,
    /// Marker added to the forwarded environment
    pub marker: &'static str,
    /// Target user for `sudo -u`; `None` means root
    pub user: Option<String>,
    /// Forwarded as `UBUP_INVOKING_USER`
    pub invoking_user: String,
}

impl ElevationContext {
    /// Read the stage markers and invoking user from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the stage markers and invoking user through a lookup function
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let stage = match (lookup(ENV_STAGE_1).is_some(), lookup(ENV_STAGE_2).is_some()) {
            (false, _) => Stage::Unelevated,
            (true, false) => Stage::ElevatedToRoot,
            (true, true) => Stage::ElevatedToInvokingUser,
        };
        let invoking_user = [ENV_INVOKING_USER, "SUDO_USER", "USER"]
            .into_iter()
            .find_map(|key| lookup(key).filter(|u| !u.is_empty()));

        Self {
            stage,
            invoking_user,
        }
    }

    /// Decide the next transition
    ///
    /// The invoking user must be known for any re-exec, including the first
    /// hop, so a missing user fails before anything is elevated.
    pub fn plan(&self) -> Result<Transition, ElevationError> {
        if self.stage == Stage::ElevatedToInvokingUser {
            return Ok(Transition::Proceed);
        }

        let user = self
            .invoking_user
            .clone()
            .ok_or(ElevationError::UnknownUser)?;

        let reexec = match self.stage {
            Stage::Unelevated => Reexec {
                target: Stage::ElevatedToRoot,
                marker: ENV_STAGE_1,
                user: None,
                invoking_user: user,
            },
            _ => Reexec {
                target: Stage::ElevatedToInvokingUser,
                marker: ENV_STAGE_2,
                user: Some(user.clone()),
                invoking_user: user,
            },
        };
        Ok(Transition::Reexec(reexec))
    }
}

impl Reexec {
    /// Arguments passed to `sudo`
    pub fn sudo_args(&self, exe: PathBuf, args: &[OsString]) -> Vec<OsString> {
        let mut sudo_args: Vec<OsString> = vec!["-E".into()];
        if let Some(user) = &self.user {
            sudo_args.push("-u".into());
            sudo_args.push(user.into());
        }
        sudo_args.push(exe.into_os_string());
        sudo_args.extend(args.iter().cloned());
        sudo_args
    }

    /// Build the `sudo` command for this hop
    pub fn command(&self, exe: PathBuf, args: &[OsString]) -> Command {
        let mut cmd = Command::new("sudo");
        cmd.args(self.sudo_args(exe, args))
            .env(self.marker, "1")
            .env(ENV_INVOKING_USER, &self.invoking_user);
        cmd
    }
}

/// Replace the current process image with the next stage
///
/// Never returns on success.
pub fn replace_process(reexec: &Reexec) -> Result<Infallible> {
    let exe = std::env::current_exe().context("Could not determine the current executable")?;
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    log::debug!(
        "Re-executing as {} ({:?})",
        reexec.user.as_deref().unwrap_or("root"),
        reexec.target
    );

    let err = reexec.command(exe, &args).exec();
    Err(err).context("Failed to re-execute through sudo")
}

/// Bring the process into the final stage, re-executing as needed
///
/// Returns only in the final stage.
pub fn ensure_privilege_stage() -> Result<ElevationContext> {
    let ctx = ElevationContext::from_env();
    match ctx.plan()? {
        Transition::Proceed => Ok(ctx),
        Transition::Reexec(reexec) => match replace_process(&reexec)? {},
    }
}
