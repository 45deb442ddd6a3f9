//! Virtual path normalization.
//!
//! Every backend operates on a `/`-rooted virtual path namespace that is
//! independent of any physical storage layout. This module is the single
//! place that turns arbitrary caller-supplied path strings into that
//! canonical form, and the single place that rejects traversal attempts.
//!
//! Canonical form invariants:
//! - always begins with `/`
//! - `/` separators only, no `//`, no `.` segments
//! - no `..` segments (rejected, never resolved)
//! - no trailing `/` except for the root itself
//!
//! Host-absolute paths with a drive letter (`C:\Users\...`) are the one
//! exception: they are normalized to forward slashes but returned as-is
//! rather than forced under `/`, because they name the real filesystem.
//! Only the local filesystem backend honors them.

use thiserror::Error;

/// Errors produced by virtual path normalization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VPathError {
    /// Path contains a `..` segment.
    #[error("path '{path}' contains a '..' segment")]
    Traversal { path: String },

    /// Path uses a `~` home-directory shorthand.
    #[error("path '{path}' uses a '~' home shorthand, which is not allowed")]
    HomeShorthand { path: String },

    /// Path falls outside every allowed prefix.
    #[error("path '{path}' is outside the allowed prefixes {allowed:?}")]
    OutsidePrefixes { path: String, allowed: Vec<String> },
}

/// Check whether a raw path is host-absolute (drive-letter pattern).
///
/// Matches `C:\...` and `C:/...` for any ASCII drive letter.
pub fn is_host_absolute(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Normalize a raw path string into canonical virtual form.
///
/// Collapses redundant separators, drops `.` segments, and roots the
/// result under `/`. Rejects `..` segments and `~` shorthands outright.
/// Drive-letter host-absolute paths are normalized but keep their drive
/// prefix instead of being rooted under `/`.
pub fn normalize(raw: &str) -> Result<String, VPathError> {
    let raw = raw.trim();

    if raw.starts_with('~') {
        return Err(VPathError::HomeShorthand {
            path: raw.to_string(),
        });
    }

    if is_host_absolute(raw) {
        let converted = raw.replace('\\', "/");
        let (drive, rest) = converted.split_at(2);
        let segments = clean_segments(rest, raw)?;
        return Ok(format!("{}/{}", drive, segments.join("/")));
    }

    let segments = clean_segments(raw, raw)?;
    if segments.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Normalize a raw path and require it to fall under one of the allowed
/// prefixes (themselves given in canonical form).
pub fn normalize_within(raw: &str, allowed: &[&str]) -> Result<String, VPathError> {
    let path = normalize(raw)?;
    if allowed.iter().any(|prefix| is_ancestor(prefix, &path)) {
        Ok(path)
    } else {
        Err(VPathError::OutsidePrefixes {
            path,
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// Check whether `prefix` is the path itself or an ancestor of it, using
/// `/`-segment boundaries. `/mem` is not an ancestor of `/memories`.
///
/// Both arguments must already be in canonical form.
pub fn is_ancestor(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    path == prefix || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

fn clean_segments(input: &str, original: &str) -> Result<Vec<String>, VPathError> {
    let mut segments = Vec::new();
    for segment in input.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(VPathError::Traversal {
                    path: original.to_string(),
                })
            }
            other => segments.push(other.to_string()),
        }
    }
    Ok(segments)
}
