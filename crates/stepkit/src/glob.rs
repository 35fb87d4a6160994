//! Component-wise wildcard expansion for plugin paths
//!
//! Supports `*`, `?` and `[...]` (with `[!...]` negation) inside a single
//! path component. Hidden entries only match patterns that start with `.`.

use crate::error::{Error, Result};
use regex::Regex;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Whether a path component contains wildcard characters
pub fn has_wildcards(component: &str) -> bool {
    component.contains(['*', '?', '['])
}

/// Expand a pattern into the sorted list of existing paths it matches
///
/// A pattern without wildcards yields itself if it exists.
pub fn expand(pattern: &Path) -> Result<Vec<PathBuf>> {
    let mut candidates = vec![PathBuf::new()];

    for component in pattern.components() {
        let wildcard = match component {
            Component::Normal(name) => name.to_str().filter(|n| has_wildcards(n)),
            _ => None,
        };

        candidates = match wildcard {
            None => candidates
                .into_iter()
                .map(|c| c.join(component.as_os_str()))
                .collect(),
            Some(segment) => {
                let matcher = component_regex(segment)?;
                let mut next = Vec::new();
                for dir in &candidates {
                    next.extend(matching_entries(dir, segment, &matcher));
                }
                next
            }
        };
    }

    let mut found: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|p| p.symlink_metadata().is_ok())
        .collect();
    found.sort();
    Ok(found)
}

fn matching_entries(dir: &Path, segment: &str, matcher: &Regex) -> Vec<PathBuf> {
    let read_from = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };

    let Ok(entries) = fs::read_dir(read_from) else {
        return Vec::new();
    };

    entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            if name.starts_with('.') && !segment.starts_with('.') {
                return None;
            }
            matcher
                .is_match(name)
                .then(|| dir.join(OsStr::new(name)))
        })
        .collect()
}

/// Translate one glob component into an anchored regex
fn component_regex(segment: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    let mut chars = segment.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' && !(class.is_empty() || class == "^") {
                        closed = true;
                        break;
                    }
                    if inner == '\\' || inner == '[' || inner == ']' {
                        class.push('\\');
                    }
                    class.push(inner);
                }
                if closed {
                    pattern.push('[');
                    pattern.push_str(&class);
                    pattern.push(']');
                } else {
                    pattern.push_str(&regex::escape("["));
                    pattern.push_str(&regex::escape(class.trim_start_matches('^')));
                }
            }
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| Error::Pattern {
        pattern: segment.to_string(),
        reason: e.to_string(),
    })
}
