//! In-memory backend.
//!
//! Stores a virtual file tree inside session state; no external I/O.
//! Directories are implied by path segments and synthesized on listing.
//! The tree lives behind a single `RwLock`, which gives per-path atomicity
//! for free: a concurrent `read` can never observe a half-applied `write`.

use crate::{
    error::{BackendError, BackendResult},
    ops::{self, TreeEntry},
    Backend, EditResult, FileInfo, GrepMatch, WriteResult,
};
use backplane_util::vpath;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryFile {
    content: String,
    modified_at: DateTime<Utc>,
}

/// Backend holding a virtual file tree in memory.
pub struct MemoryBackend {
    files: RwLock<BTreeMap<String, MemoryFile>>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Seed the backend with initial files; used when restoring session
    /// state.
    pub fn with_files(files: impl IntoIterator<Item = (String, String)>) -> BackendResult<Self> {
        let backend = Self::new();
        {
            let mut tree = backend.tree_write()?;
            for (path, content) in files {
                let path = vpath::normalize(&path)?;
                tree.insert(
                    path,
                    MemoryFile {
                        content,
                        modified_at: Utc::now(),
                    },
                );
            }
        }
        Ok(backend)
    }

    fn tree_read(&self) -> BackendResult<RwLockReadGuard<'_, BTreeMap<String, MemoryFile>>> {
        self.files
            .read()
            .map_err(|e| BackendError::LockPoisoned(e.to_string()))
    }

    fn tree_write(&self) -> BackendResult<RwLockWriteGuard<'_, BTreeMap<String, MemoryFile>>> {
        self.files
            .write()
            .map_err(|e| BackendError::LockPoisoned(e.to_string()))
    }

    fn snapshot_entries(&self) -> BackendResult<Vec<TreeEntry>> {
        let tree = self.tree_read()?;
        Ok(tree
            .iter()
            .map(|(path, file)| TreeEntry {
                path: path.clone(),
                size: file.content.len() as u64,
                modified_at: file.modified_at,
            })
            .collect())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let path = vpath::normalize(path)?;
        Ok(ops::list_dir(&self.snapshot_entries()?, &path))
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let path = vpath::normalize(path)?;
        let tree = self.tree_read()?;

        match tree.get(&path) {
            Some(file) => Ok(ops::window_lines(&file.content, offset, limit)),
            None => {
                let dir_prefix = format!("{path}/");
                if tree.keys().any(|p| p.starts_with(&dir_prefix)) {
                    Err(BackendError::is_directory(path))
                } else {
                    Err(BackendError::not_found(path))
                }
            }
        }
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let path = vpath::normalize(path)?;
        let mut tree = self.tree_write()?;

        ops::check_write_target(&path, tree.keys())?;

        let created = !tree.contains_key(&path);
        debug!(path = %path, created, "Memory write");
        let bytes_written = content.len() as u64;
        tree.insert(
            path.clone(),
            MemoryFile {
                content: content.to_string(),
                modified_at: Utc::now(),
            },
        );

        Ok(WriteResult {
            path,
            created,
            bytes_written,
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
        let mut tree = self.tree_write()?;

        let file = tree
            .get(&path)
            .ok_or_else(|| BackendError::not_found(&path))?;
        let (content, replacements) =
            ops::apply_edit(&path, &file.content, old_string, new_string, replace_all)?;

        tree.insert(
            path.clone(),
            MemoryFile {
                content,
                modified_at: Utc::now(),
            },
        );

        Ok(EditResult { path, replacements })
    }

    async fn delete(&self, path: &str) -> BackendResult<()> {
        let path = vpath::normalize(path)?;
        let mut tree = self.tree_write()?;
        match tree.remove(&path) {
            Some(_) => Ok(()),
            None => Err(BackendError::not_found(path)),
        }
    }

    async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let base = vpath::normalize(path.unwrap_or("/"))?;
        let regex = ops::compile_regex(pattern)?;
        let filter = glob.map(ops::compile_glob).transpose()?;

        let tree = self.tree_read()?;
        let mut matches = Vec::new();
        for (file_path, file) in tree.iter() {
            if !vpath::is_ancestor(&base, file_path) {
                continue;
            }
            if let Some(ref filter) = filter {
                if !ops::glob_matches(filter, ops::relative_to(&base, file_path)) {
                    continue;
                }
            }
            ops::grep_content(file_path, &file.content, &regex, &mut matches);
        }
        Ok(matches)
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let base = vpath::normalize(path)?;
        ops::glob_entries(&self.snapshot_entries()?, pattern, &base)
    }
}
