//! Shared operation semantics across backends.
//!
//! The in-memory and store-backed backends both hold a flat map from
//! canonical path to file content, with directories implied by path
//! segments. The helpers here define the listing, globbing, grepping and
//! edit semantics once so every backend behaves identically; the remote
//! sandbox backend reuses them too for the operations it applies locally.

use crate::{
    error::{BackendError, BackendResult},
    FileInfo, GrepMatch, MAX_GREP_LINE_LEN,
};
use backplane_util::vpath;
use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::collections::BTreeSet;

/// Flat description of a stored file for listing/globbing.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Extract a window of lines from content.
pub fn window_lines(content: &str, offset: usize, limit: usize) -> String {
    content
        .lines()
        .skip(offset)
        .take(limit)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply an exact substring replacement, enforcing the edit preconditions.
///
/// Returns the new content and the number of replacements made.
pub fn apply_edit(
    path: &str,
    content: &str,
    old_string: &str,
    new_string: &str,
    replace_all: bool,
) -> BackendResult<(String, usize)> {
    if old_string.is_empty() {
        return Err(BackendError::string_not_found(path, old_string));
    }

    let count = content.matches(old_string).count();
    match count {
        0 => Err(BackendError::string_not_found(path, old_string)),
        1 => Ok((content.replacen(old_string, new_string, 1), 1)),
        n if replace_all => Ok((content.replace(old_string, new_string), n)),
        n => Err(BackendError::ambiguous_edit(path, old_string, n)),
    }
}

/// Check that writing `path` does not structurally collide with existing
/// files: no ancestor of `path` may exist as a file, and `path` itself may
/// not be an implied directory.
pub fn check_write_target<'a>(
    path: &str,
    existing: impl Iterator<Item = &'a String> + Clone,
) -> BackendResult<()> {
    let dir_prefix = format!("{path}/");
    if existing.clone().any(|p| p.starts_with(&dir_prefix)) {
        return Err(BackendError::is_directory(path));
    }

    for ancestor in ancestors(path) {
        if existing.clone().any(|p| p == &ancestor) {
            return Err(BackendError::conflict(
                path,
                format!("'{ancestor}' already exists as a file"),
            ));
        }
    }
    Ok(())
}

/// Direct children of `dir` in a flat path map, with implied directories
/// synthesized. Sorted by path.
pub fn list_dir(entries: &[TreeEntry], dir: &str) -> Vec<FileInfo> {
    let base = if dir == "/" { "" } else { dir };
    let mut files = Vec::new();
    let mut dirs = BTreeSet::new();

    for entry in entries {
        let Some(rest) = entry
            .path
            .strip_prefix(base)
            .and_then(|r| r.strip_prefix('/'))
        else {
            continue;
        };
        match rest.split_once('/') {
            None => files.push(FileInfo::file(
                entry.path.clone(),
                entry.size,
                entry.modified_at,
            )),
            Some((child, _)) => {
                dirs.insert(format!("{base}/{child}"));
            }
        }
    }

    let mut result: Vec<FileInfo> = dirs.into_iter().map(FileInfo::dir).collect();
    result.extend(files);
    result.sort_by(|a, b| a.path.cmp(&b.path));
    result
}

/// Files under `base` whose path matches `pattern`. Sorted by path.
pub fn glob_entries(
    entries: &[TreeEntry],
    pattern: &str,
    base: &str,
) -> BackendResult<Vec<FileInfo>> {
    let pattern = compile_glob(pattern)?;
    let mut result: Vec<FileInfo> = entries
        .iter()
        .filter(|entry| vpath::is_ancestor(base, &entry.path))
        .filter(|entry| {
            let relative = relative_to(base, &entry.path);
            glob_matches(&pattern, relative)
        })
        .map(|entry| FileInfo::file(entry.path.clone(), entry.size, entry.modified_at))
        .collect();
    result.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(result)
}

/// Collect grep matches from one file's content.
pub fn grep_content(
    path: &str,
    content: &str,
    regex: &Regex,
    matches: &mut Vec<GrepMatch>,
) {
    for (index, line) in content.lines().enumerate() {
        if regex.is_match(line) {
            matches.push(GrepMatch {
                path: path.to_string(),
                line_number: index + 1,
                text: truncate_line(line),
            });
        }
    }
}

/// Compile a caller-supplied regex, mapping failure to a typed error.
pub fn compile_regex(pattern: &str) -> BackendResult<Regex> {
    Regex::new(pattern).map_err(|e| BackendError::invalid_pattern(pattern, e.to_string()))
}

/// Compile a caller-supplied glob, mapping failure to a typed error.
pub fn compile_glob(pattern: &str) -> BackendResult<Pattern> {
    Pattern::new(pattern).map_err(|e| BackendError::invalid_pattern(pattern, e.to_string()))
}

/// Match a path against a glob with literal separators, also accepting a
/// bare-filename pattern like `*.rs` against the final segment.
pub fn glob_matches(pattern: &Pattern, relative: &str) -> bool {
    let options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::default()
    };
    if pattern.matches_with(relative, options) {
        return true;
    }
    match relative.rsplit_once('/') {
        Some((_, name)) => pattern.matches_with(name, options),
        None => false,
    }
}

/// Path of `path` relative to `base`, without a leading slash.
pub fn relative_to<'a>(base: &str, path: &'a str) -> &'a str {
    if base == "/" {
        path.strip_prefix('/').unwrap_or(path)
    } else {
        path.strip_prefix(base)
            .and_then(|r| r.strip_prefix('/'))
            .unwrap_or("")
    }
}

fn truncate_line(line: &str) -> String {
    if line.chars().count() <= MAX_GREP_LINE_LEN {
        line.to_string()
    } else {
        line.chars().take(MAX_GREP_LINE_LEN).collect()
    }
}

fn ancestors(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = path;
    while let Some(index) = current.rfind('/') {
        if index == 0 {
            break;
        }
        current = &path[..index];
        result.push(current.to_string());
    }
    result
}
