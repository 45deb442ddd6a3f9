//! Local filesystem backend.
//!
//! Implements the backend contract against the real OS filesystem,
//! constrained to a configured root directory. Virtual `/` paths resolve
//! under the root; host-absolute drive-letter paths (see
//! `backplane_util::vpath`) pass through unconstrained — callers supplying
//! them are assumed to already be authorized, e.g. on a trusted developer
//! machine.

use crate::{
    error::{BackendError, BackendResult},
    ops, Backend, EditResult, FileInfo, GrepMatch, WriteResult,
};
use backplane_util::vpath;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Backend rooted at a real directory.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a local backend sandboxed to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory all virtual paths resolve under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a normalized path to a physical path.
    fn resolve(&self, normalized: &str) -> PathBuf {
        if vpath::is_host_absolute(normalized) {
            PathBuf::from(normalized)
        } else {
            self.root.join(normalized.trim_start_matches('/'))
        }
    }

    /// Map a physical path back to its caller-visible form.
    fn to_display(&self, physical: &Path) -> String {
        match physical.strip_prefix(&self.root) {
            Ok(relative) => format!("/{}", relative.to_string_lossy().replace('\\', "/")),
            Err(_) => physical.to_string_lossy().replace('\\', "/"),
        }
    }

    async fn file_info(&self, physical: &Path) -> BackendResult<FileInfo> {
        let meta = fs::metadata(physical).await?;
        let path = self.to_display(physical);
        if meta.is_dir() {
            Ok(FileInfo::dir(path))
        } else {
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            Ok(FileInfo::file(path, meta.len(), modified))
        }
    }

    async fn read_full(&self, path: &str, physical: &Path) -> BackendResult<String> {
        match fs::read_to_string(physical).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::not_found(path))
            }
            Err(e) => {
                if fs::metadata(physical).await.map(|m| m.is_dir()).unwrap_or(false) {
                    Err(BackendError::is_directory(path))
                } else {
                    Err(BackendError::Io(e))
                }
            }
        }
    }

    /// Write atomically: temp file in the same directory, then rename.
    async fn write_atomic(&self, physical: &Path, content: &str) -> BackendResult<()> {
        if let Some(parent) = physical.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_name = format!(
            ".{}.{:x}.tmp",
            physical
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default(),
            std::process::id()
        );
        let temp_path = physical
            .parent()
            .map(|p| p.join(&temp_name))
            .unwrap_or_else(|| PathBuf::from(&temp_name));

        fs::write(&temp_path, content).await?;
        let renamed = fs::rename(&temp_path, physical).await;
        if renamed.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        renamed.map_err(BackendError::Io)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let path = vpath::normalize(path)?;
        let physical = self.resolve(&path);

        let mut dir = match fs::read_dir(&physical).await {
            Ok(dir) => dir,
            // Listing a nonexistent path is empty, not an error
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackendError::Io(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            entries.push(self.file_info(&entry.path()).await?);
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let path = vpath::normalize(path)?;
        let physical = self.resolve(&path);
        let content = self.read_full(&path, &physical).await?;
        Ok(ops::window_lines(&content, offset, limit))
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let path = vpath::normalize(path)?;
        let physical = self.resolve(&path);

        let created = match fs::metadata(&physical).await {
            Ok(meta) if meta.is_dir() => return Err(BackendError::is_directory(path)),
            Ok(_) => false,
            Err(_) => true,
        };

        debug!(path = %path, created, "Local write");
        self.write_atomic(&physical, content).await?;

        Ok(WriteResult {
            path,
            created,
            bytes_written: content.len() as u64,
        })
    }

    async fn edit(
        &self,
        path: &str,
        old_string: &str,
        new_string: &str,
        replace_all: bool,
    ) -> BackendResult<EditResult> {
        let path = vpath::normalize(path)?;
        let physical = self.resolve(&path);

        let content = self.read_full(&path, &physical).await?;
        let (new_content, replacements) =
            ops::apply_edit(&path, &content, old_string, new_string, replace_all)?;
        self.write_atomic(&physical, &new_content).await?;

        Ok(EditResult { path, replacements })
    }

    async fn delete(&self, path: &str) -> BackendResult<()> {
        let path = vpath::normalize(path)?;
        let physical = self.resolve(&path);
        match fs::remove_file(&physical).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::not_found(path))
            }
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let base = vpath::normalize(path.unwrap_or("/"))?;
        let physical = self.resolve(&base);
        let regex = ops::compile_regex(pattern)?;
        let filter = glob.map(ops::compile_glob).transpose()?;

        if !physical.exists() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        // gitignore-aware walk; binary and unreadable files are skipped
        for entry in WalkBuilder::new(&physical).build().filter_map(Result::ok) {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let display = self.to_display(entry.path());
            if let Some(ref filter) = filter {
                if !ops::glob_matches(filter, ops::relative_to(&base, &display)) {
                    continue;
                }
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            ops::grep_content(&display, &content, &regex, &mut matches);
        }

        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line_number.cmp(&b.line_number)));
        Ok(matches)
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        // Host-absolute patterns walk the real filesystem directly
        // (drive-letter pass-through for trusted callers).
        if vpath::is_host_absolute(pattern) {
            let mut result = Vec::new();
            let paths = glob::glob(pattern)
                .map_err(|e| BackendError::invalid_pattern(pattern, e.to_string()))?;
            for physical in paths.filter_map(Result::ok) {
                if physical.is_file() {
                    result.push(self.file_info(&physical).await?);
                }
            }
            result.sort_by(|a, b| a.path.cmp(&b.path));
            return Ok(result);
        }

        let base = vpath::normalize(path)?;
        let physical = self.resolve(&base);
        let compiled = ops::compile_glob(pattern)?;

        if !physical.exists() {
            return Ok(Vec::new());
        }

        let mut result = Vec::new();
        for entry in walkdir::WalkDir::new(&physical)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let display = self.to_display(entry.path());
            if ops::glob_matches(&compiled, ops::relative_to(&base, &display)) {
                result.push(self.file_info(entry.path()).await?);
            }
        }
        result.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> (TempDir, LocalBackend) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        (dir, backend)
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let (_dir, backend) = backend();
        backend.write("/notes.txt", "hello").await.unwrap();
        assert_eq!(backend.read("/notes.txt", 0, 10).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_virtual_paths_stay_under_root() {
        let (dir, backend) = backend();
        backend.write("/sub/deep/f.txt", "x").await.unwrap();
        assert!(dir.path().join("sub/deep/f.txt").exists());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (_dir, backend) = backend();
        let err = backend.read("/../escape", 0, 10).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let (_dir, backend) = backend();
        assert!(matches!(
            backend.read("/gone", 0, 10).await.unwrap_err(),
            BackendError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_write_over_directory() {
        let (dir, backend) = backend();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        assert!(matches!(
            backend.write("/d", "x").await.unwrap_err(),
            BackendError::IsDirectory { .. }
        ));
    }

    #[tokio::test]
    async fn test_edit_atomic_and_typed_errors() {
        let (_dir, backend) = backend();
        backend.write("/f", "foo bar foo").await.unwrap();

        assert!(matches!(
            backend.edit("/f", "foo", "baz", false).await.unwrap_err(),
            BackendError::AmbiguousEdit { .. }
        ));

        let result = backend.edit("/f", "foo", "baz", true).await.unwrap();
        assert_eq!(result.replacements, 2);
        assert_eq!(backend.read("/f", 0, 10).await.unwrap(), "baz bar baz");
    }

    #[tokio::test]
    async fn test_list_sorted_with_dirs() {
        let (_dir, backend) = backend();
        backend.write("/b.txt", "2").await.unwrap();
        backend.write("/sub/a.txt", "1").await.unwrap();

        let entries = backend.list("/").await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/b.txt", "/sub"]);
        assert!(entries[1].is_dir);
    }

    #[tokio::test]
    async fn test_list_missing_is_empty() {
        let (_dir, backend) = backend();
        assert!(backend.list("/nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_glob_recursive() {
        let (_dir, backend) = backend();
        backend.write("/a.md", "1").await.unwrap();
        backend.write("/sub/b.md", "2").await.unwrap();
        backend.write("/sub/c.rs", "3").await.unwrap();

        let found = backend.glob("**/*.md", "/").await.unwrap();
        let paths: Vec<_> = found.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.md", "/sub/b.md"]);
    }

    #[tokio::test]
    async fn test_grep_scoped() {
        let (_dir, backend) = backend();
        backend.write("/x.txt", "alpha\nneedle").await.unwrap();
        backend.write("/sub/y.txt", "needle").await.unwrap();

        let matches = backend.grep("needle", Some("/sub"), None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "/sub/y.txt");

        let matches = backend.grep("needle", None, None).await.unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, backend) = backend();
        backend.write("/f", "x").await.unwrap();
        backend.delete("/f").await.unwrap();
        assert!(matches!(
            backend.delete("/f").await.unwrap_err(),
            BackendError::NotFound { .. }
        ));
    }
}
