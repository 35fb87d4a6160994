//! copy - copy files and directories matched by glob patterns
//!
//! Files overwrite their destination; a destination directory receives the
//! file under its own name. Directories are copied recursively and skipped
//! when the destination already exists. Permission errors fall back to
//! `sudo cp`.

use anyhow::{Context, Result, bail};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use stepkit::{Plugin, PluginDescriptor, Shape, StepContext, typed_config};
use walkdir::WalkDir;

pub const KEY: &str = "copy";

#[derive(Debug)]
pub struct CopyPaths {
    /// (source pattern, destination) in manifest order
    entries: Vec<(String, String)>,
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builtin(KEY, Shape::map_of(Shape::String), |config| {
        let mapping: Mapping = typed_config(config)?;
        let entries = mapping
            .into_iter()
            .map(|(src, dst)| Ok((scalar(src)?, scalar(dst)?)))
            .collect::<Result<_>>()?;
        Ok(Box::new(CopyPaths { entries }))
    })
}

fn scalar(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => bail!("expected a path, found {other:?}"),
    }
}

impl Plugin for CopyPaths {
    fn description(&self) -> String {
        match self.entries.as_slice() {
            [(src, dst)] => format!("Copy {src} to {dst}"),
            all => format!("Copy {} path(s)", all.len()),
        }
    }

    fn perform(&self, ctx: &StepContext) -> Result<()> {
        for (src, dst) in &self.entries {
            let dst = ctx.expand_path(dst);
            let sources = ctx.expand_glob(src)?;
            if sources.is_empty() {
                log::debug!("Nothing matches {src}");
            }
            for source in sources {
                if source.is_file() {
                    copy_file(ctx, &source, &dst)?;
                } else if source.is_dir() {
                    copy_dir(ctx, &source, &dst)?;
                }
            }
        }
        Ok(())
    }
}

fn copy_file(ctx: &StepContext, source: &Path, dst: &Path) -> Result<()> {
    let target = match source.file_name() {
        Some(name) if dst.is_dir() => dst.join(name),
        _ => dst.to_path_buf(),
    };
    match fs::copy(source, &target) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            let (src, dst) = (source.to_string_lossy(), dst.to_string_lossy());
            ctx.run_command_sudo("cp", &["-p", &src, &dst])?;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| {
            format!("Failed to copy {} to {}", source.display(), target.display())
        }),
    }
}

fn copy_dir(ctx: &StepContext, source: &Path, dst: &Path) -> Result<()> {
    copy_dir_with(ctx, source, dst, copy_tree)
}

fn copy_dir_with(
    ctx: &StepContext,
    source: &Path,
    dst: &Path,
    copy: impl FnOnce(&Path, &Path) -> io::Result<()>,
) -> Result<()> {
    if dst.exists() {
        if ctx.verbose {
            crate::ui::dim(&format!("{} already exists, skipping", dst.display()));
        }
        return Ok(());
    }
    match copy(source, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            // cp -r into an existing directory would nest the source inside it
            if dst.exists() {
                fs::remove_dir_all(dst).with_context(|| {
                    format!("Failed to remove partial copy at {}", dst.display())
                })?;
            }
            let (src, dst) = (source.to_string_lossy(), dst.to_string_lossy());
            ctx.run_command_sudo("cp", &["-rp", &src, &dst])?;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| {
            format!("Failed to copy {} to {}", source.display(), dst.display())
        }),
    }
}

fn copy_tree(source: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::RecordingRunner;

    fn perform(dir: &Path, config: &str) {
        let runner = RecordingRunner::new();
        let ctx = StepContext::new(dir, false, &runner);
        descriptor()
            .instantiate(&serde_yaml::from_str(config).unwrap())
            .unwrap()
            .perform(&ctx)
            .unwrap();
        assert!(runner.lines().is_empty());
    }

    #[test]
    fn test_glob_sources_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("dotfiles")).unwrap();
        fs::write(dir.path().join("dotfiles/a.conf"), "a").unwrap();
        fs::write(dir.path().join("dotfiles/b.conf"), "b").unwrap();
        fs::write(dir.path().join("dotfiles/c.txt"), "c").unwrap();
        fs::create_dir(dir.path().join("out")).unwrap();

        perform(dir.path(), "{'dotfiles/*.conf': out}");

        assert_eq!(fs::read_to_string(dir.path().join("out/a.conf")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dir.path().join("out/b.conf")).unwrap(), "b");
        assert!(!dir.path().join("out/c.txt").exists());
    }

    #[test]
    fn test_directory_copy_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/nested/f"), "new").unwrap();

        perform(dir.path(), "{src: dst}");
        assert_eq!(fs::read_to_string(dir.path().join("dst/nested/f")).unwrap(), "new");

        fs::write(dir.path().join("src/nested/f"), "newer").unwrap();
        perform(dir.path(), "{src: dst}");
        assert_eq!(fs::read_to_string(dir.path().join("dst/nested/f")).unwrap(), "new");
    }

    #[test]
    fn test_permission_denied_midway_restarts_from_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let (src, dst) = (dir.path().join("src"), dir.path().join("dst"));
        fs::create_dir(&src).unwrap();
        let runner = RecordingRunner::new();
        let ctx = StepContext::new(dir.path(), false, &runner);

        copy_dir_with(&ctx, &src, &dst, |_, dst| {
            fs::create_dir_all(dst.join("a"))?;
            fs::write(dst.join("a/readable"), "x")?;
            Err(io::Error::from(ErrorKind::PermissionDenied))
        })
        .unwrap();

        assert!(!dst.exists());
        assert_eq!(
            runner.lines(),
            vec![format!("sudo cp -rp {} {}", src.display(), dst.display())]
        );
    }

    #[test]
    fn test_description() {
        let plugin = descriptor()
            .instantiate(&serde_yaml::from_str("{z: a, a: z}").unwrap())
            .unwrap();
        assert_eq!(plugin.description(), "Copy 2 path(s)");

        let plugin = descriptor()
            .instantiate(&serde_yaml::from_str("{~/.bashrc: /root/}").unwrap())
            .unwrap();
        assert_eq!(plugin.description(), "Copy ~/.bashrc to /root/");
    }
}
