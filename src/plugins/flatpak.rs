//! flatpak-packages - install flatpak bundles and refs
//!
//! Entries are either a path or URL (a `.flatpakref` suffix means a ref,
//! anything else a bundle) or a detailed record:
//!
//! ```yaml
//! flatpak-packages:
//!   - ./apps/tool.flatpak
//!   - from: https://dl.flathub.org/repo/appstream/org.gimp.GIMP.flatpakref
//!     target: user
//! ```
//!
//! Refs are installed only when their application is not listed yet.
//! Bundles are always installed with `--reinstall`.

use super::ppas::Ppas;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use stepkit::{Field, Plugin, PluginDescriptor, Shape, StepContext, typed_config};
use tempfile::NamedTempFile;

pub const KEY: &str = "flatpak-packages";

/// PPA shipping flatpak for Ubuntu releases that lack it
const FLATPAK_PPA: &str = "alexlarsson/flatpak";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Target {
    #[default]
    System,
    User,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Path(String),
    Detailed {
        bundle: Option<String>,
        from: Option<String>,
        #[serde(default)]
        target: Target,
        runtime: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Bundle(String),
    Ref(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Install {
    source: Source,
    target: Target,
    runtime: Option<String>,
}

impl Install {
    fn from_entry(entry: Entry) -> Result<Self> {
        match entry {
            Entry::Path(path) => {
                let source = if path.ends_with(".flatpakref") {
                    Source::Ref(path)
                } else {
                    Source::Bundle(path)
                };
                Ok(Self {
                    source,
                    target: Target::System,
                    runtime: None,
                })
            }
            Entry::Detailed {
                bundle,
                from,
                target,
                runtime,
            } => {
                let source = match (from, bundle) {
                    (Some(r), _) => Source::Ref(r),
                    (None, Some(b)) => Source::Bundle(b),
                    (None, None) => bail!("either 'bundle' or 'from' is required"),
                };
                Ok(Self {
                    source,
                    target,
                    runtime,
                })
            }
        }
    }

    fn install_args<'a>(&'a self, file: &'a str) -> Vec<&'a str> {
        let mut args = vec!["install", "--reinstall", "-y"];
        args.push(match self.target {
            Target::User => "--user",
            Target::System => "--system",
        });
        if let Some(runtime) = &self.runtime {
            args.extend(["--runtime", runtime.as_str()]);
        }
        args.push(file);
        args
    }
}

#[derive(Debug)]
pub struct FlatpakPackages {
    installs: Vec<Install>,
}

fn shape() -> Shape {
    Shape::list_of(Shape::OneOf(vec![
        Shape::String,
        Shape::Record(vec![
            Field::any_of(&["bundle", "from"], Shape::String),
            Field::optional("target", Shape::choice(&["system", "user"])),
            Field::optional("runtime", Shape::String),
        ]),
    ]))
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builtin(KEY, shape(), |config| {
        let entries: Vec<Entry> = typed_config(config)?;
        let installs = entries
            .into_iter()
            .map(Install::from_entry)
            .collect::<Result<_>>()?;
        Ok(Box::new(FlatpakPackages { installs }))
    })
}

impl Plugin for FlatpakPackages {
    fn description(&self) -> String {
        format!("Install {} flatpak package(s)", self.installs.len())
    }

    fn requires_elevation(&self) -> bool {
        self.installs.iter().any(|i| i.target == Target::System)
    }

    fn perform(&self, ctx: &StepContext) -> Result<()> {
        ensure_flatpak(ctx)?;

        for install in &self.installs {
            match &install.source {
                Source::Bundle(bundle) => {
                    // flatpak fetches remote bundles itself
                    if bundle.contains("://") {
                        run_install(ctx, install, bundle)?;
                    } else {
                        let path = ctx.expand_path(bundle);
                        run_install(ctx, install, &path.to_string_lossy())?;
                    }
                }
                Source::Ref(reference) => {
                    let (path, _download) = fetch_ref(ctx, reference)?;
                    let app = application_name(&path)?;
                    if is_installed(ctx, &app)? {
                        log::debug!("{app} is already installed");
                        continue;
                    }
                    run_install(ctx, install, &path.to_string_lossy())?;
                }
            }
        }
        Ok(())
    }
}

fn flatpak_available(ctx: &StepContext) -> Result<bool> {
    match ctx.run_command("flatpak", &["--version"]) {
        Ok(_) => Ok(true),
        Err(stepkit::Error::Spawn { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn ensure_flatpak(ctx: &StepContext) -> Result<()> {
    if flatpak_available(ctx)? {
        return Ok(());
    }
    Ppas::new(vec![FLATPAK_PPA.to_string()]).perform(ctx)?;
    ctx.run_command_sudo("apt", &["install", "-y", "flatpak"])?;
    if !flatpak_available(ctx)? {
        bail!("flatpak is still unavailable after installing it");
    }
    Ok(())
}

/// Resolve a ref to a local file, downloading remote ones
///
/// The returned temp file, if any, must outlive the install.
fn fetch_ref(ctx: &StepContext, reference: &str) -> Result<(PathBuf, Option<NamedTempFile>)> {
    if !reference.contains("://") {
        return Ok((ctx.expand_path(reference), None));
    }

    log::debug!("Downloading {reference}");
    let body = ureq::get(reference)
        .call()
        .with_context(|| format!("Failed to download {reference}"))?
        .body_mut()
        .read_to_vec()
        .with_context(|| format!("Failed to read {reference}"))?;

    let mut file = tempfile::Builder::new()
        .prefix("download_")
        .suffix(".flatpakref")
        .tempfile()
        .context("Failed to create a temporary file")?;
    file.write_all(&body)
        .context("Failed to write the downloaded flatpakref")?;
    Ok((file.path().to_path_buf(), Some(file)))
}

/// `Name=` entry of a `.flatpakref` file
fn application_name(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    text.lines()
        .find_map(|line| line.strip_prefix("Name="))
        .map(|name| name.trim().to_string())
        .with_context(|| format!("No Name= entry in flatpakref {}", path.display()))
}

fn is_installed(ctx: &StepContext, app: &str) -> Result<bool> {
    let listed = ctx.run_command("flatpak", &["list"])?;
    Ok(listed.contains(app))
}

fn run_install(ctx: &StepContext, install: &Install, file: &str) -> Result<()> {
    let args = install.install_args(file);
    match install.target {
        Target::System => ctx.run_command_sudo("flatpak", &args)?,
        Target::User => ctx.run_command("flatpak", &args)?,
    };
    Ok(())
}
