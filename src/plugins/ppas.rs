//! ppas - add Launchpad PPAs that are not configured yet

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use stepkit::{Plugin, PluginDescriptor, Shape, StepContext, typed_config};
use walkdir::WalkDir;

pub const KEY: &str = "ppas";

const APT_SOURCES: &str = "/etc/apt";

static PPA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^deb(?:\s+\[[^\]]*\])?\s+https?://ppa\.launchpad(?:content)?\.net/([a-z0-9-]+)/([a-z0-9-]+)")
        .expect("valid regex")
});

#[derive(Debug)]
pub struct Ppas {
    ppas: Vec<String>,
    sources_root: PathBuf,
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builtin(KEY, Shape::list_of(Shape::String), |config| {
        Ok(Box::new(Ppas::new(typed_config(config)?)))
    })
}

impl Ppas {
    pub fn new(ppas: Vec<String>) -> Self {
        Self {
            ppas,
            sources_root: PathBuf::from(APT_SOURCES),
        }
    }

    /// `owner/name` of every PPA in the `*.list` files under `root`
    fn existing(root: &Path) -> Result<BTreeSet<String>> {
        let mut found = BTreeSet::new();
        let lists = WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "list"));

        for entry in lists {
            let text = fs::read_to_string(entry.path())
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;
            for line in text.lines() {
                if let Some(caps) = PPA_LINE.captures(line.trim_start()) {
                    found.insert(format!("{}/{}", &caps[1], &caps[2]));
                }
            }
        }
        Ok(found)
    }
}

impl Plugin for Ppas {
    fn description(&self) -> String {
        format!("Add {} PPA(s)", self.ppas.len())
    }

    fn requires_elevation(&self) -> bool {
        true
    }

    fn perform(&self, ctx: &StepContext) -> Result<()> {
        let existing = Self::existing(&self.sources_root)?;
        let mut added = false;

        for ppa in &self.ppas {
            if existing.contains(ppa) {
                log::debug!("PPA {ppa} already configured");
                continue;
            }
            ctx.run_command_sudo("apt-add-repository", &["-y", &format!("ppa:{ppa}")])?;
            added = true;
        }

        if added {
            ctx.run_command_sudo("apt-get", &["update"])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::RecordingRunner;

    fn sources(dir: &Path) -> PathBuf {
        let root = dir.join("apt");
        fs::create_dir_all(root.join("sources.list.d")).unwrap();
        fs::write(
            root.join("sources.list.d/git-core-ubuntu-ppa-jammy.list"),
            "deb http://ppa.launchpad.net/git-core/ppa/ubuntu jammy main\n\
             # deb-src http://ppa.launchpad.net/git-core/ppa/ubuntu jammy main\n",
        )
        .unwrap();
        fs::write(
            root.join("sources.list"),
            "deb [arch=amd64] https://ppa.launchpadcontent.net/deadsnakes/ppa/ubuntu jammy main\n\
             deb http://archive.ubuntu.com/ubuntu jammy main\n",
        )
        .unwrap();
        root
    }

    #[test]
    fn test_existing_ppas() {
        let dir = tempfile::tempdir().unwrap();
        let found = Ppas::existing(&sources(dir.path())).unwrap();
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["deadsnakes/ppa", "git-core/ppa"]
        );
    }

    #[test]
    fn test_adds_only_missing_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = Ppas {
            ppas: vec!["git-core/ppa".into(), "alexlarsson/flatpak".into()],
            sources_root: sources(dir.path()),
        };
        let runner = RecordingRunner::new();
        plugin
            .perform(&StepContext::new(dir.path(), false, &runner))
            .unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "sudo apt-add-repository -y ppa:alexlarsson/flatpak",
                "sudo apt-get update",
            ]
        );
    }

    #[test]
    fn test_nothing_new_skips_update() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = Ppas {
            ppas: vec!["git-core/ppa".into()],
            sources_root: sources(dir.path()),
        };
        let runner = RecordingRunner::new();
        plugin
            .perform(&StepContext::new(dir.path(), false, &runner))
            .unwrap();
        assert!(runner.lines().is_empty());
    }
}
