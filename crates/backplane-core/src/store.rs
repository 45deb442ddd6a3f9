//! Persistent backend over a durable key-value store.
//!
//! Same contract and tree semantics as the in-memory backend, but records
//! survive process restart, keyed by a stable namespace plus the virtual
//! path. Typically routed under `/memories/` in a composite backend.

use crate::{
    error::{BackendError, BackendResult},
    ops::{self, TreeEntry},
    Backend, EditResult, FileInfo, GrepMatch, WriteResult,
};
use backplane_storage::Store;
use backplane_util::vpath;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Backend storing files in a durable, cross-session key-value store.
pub struct StoreBackend {
    store: Arc<dyn Store>,
    namespace: String,
}

impl StoreBackend {
    /// Create a store-backed backend for the given namespace.
    pub fn new(store: Arc<dyn Store>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// The namespace this backend reads and writes under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn entries(&self) -> BackendResult<Vec<TreeEntry>> {
        let entries = self.store.list(&self.namespace).await?;
        Ok(entries
            .into_iter()
            .map(|entry| TreeEntry {
                path: entry.path,
                size: entry.size,
                modified_at: entry.modified_at,
            })
            .collect())
    }

    async fn read_content(&self, path: &str) -> BackendResult<Option<String>> {
        Ok(self
            .store
            .get(&self.namespace, path)
            .await?
            .map(|record| String::from_utf8_lossy(&record.bytes).into_owned()))
    }
}

#[async_trait]
impl Backend for StoreBackend {
    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let path = vpath::normalize(path)?;
        Ok(ops::list_dir(&self.entries().await?, &path))
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let path = vpath::normalize(path)?;
        match self.read_content(&path).await? {
            Some(content) => Ok(ops::window_lines(&content, offset, limit)),
            None => {
                let dir_prefix = format!("{path}/");
                let entries = self.entries().await?;
                if entries.iter().any(|e| e.path.starts_with(&dir_prefix)) {
                    Err(BackendError::is_directory(path))
                } else {
                    Err(BackendError::not_found(path))
                }
            }
        }
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let path = vpath::normalize(path)?;

        let entries = self.entries().await?;
        let paths: Vec<String> = entries.iter().map(|e| e.path.clone()).collect();
        ops::check_write_target(&path, paths.iter())?;

        let created = !paths.contains(&path);
        debug!(namespace = %self.namespace, path = %path, created, "Store write");
        self.store
            .put(&self.namespace, &path, content.as_bytes())
            .await?;

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
        let content = self
            .read_content(&path)
            .await?
            .ok_or_else(|| BackendError::not_found(&path))?;

        let (new_content, replacements) =
            ops::apply_edit(&path, &content, old_string, new_string, replace_all)?;
        self.store
            .put(&self.namespace, &path, new_content.as_bytes())
            .await?;

        Ok(EditResult { path, replacements })
    }

    async fn delete(&self, path: &str) -> BackendResult<()> {
        let path = vpath::normalize(path)?;
        if !self.store.exists(&self.namespace, &path).await? {
            return Err(BackendError::not_found(path));
        }
        self.store.delete(&self.namespace, &path).await?;
        Ok(())
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

        let mut matches = Vec::new();
        for entry in self.entries().await? {
            if !vpath::is_ancestor(&base, &entry.path) {
                continue;
            }
            if let Some(ref filter) = filter {
                if !ops::glob_matches(filter, ops::relative_to(&base, &entry.path)) {
                    continue;
                }
            }
            if let Some(content) = self.read_content(&entry.path).await? {
                ops::grep_content(&entry.path, &content, &regex, &mut matches);
            }
        }
        Ok(matches)
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let base = vpath::normalize(path)?;
        ops::glob_entries(&self.entries().await?, pattern, &base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backplane_storage::MemoryStore;

    fn backend() -> StoreBackend {
        StoreBackend::new(Arc::new(MemoryStore::new()), "agent")
    }

    #[tokio::test]
    async fn test_round_trip() {
        let backend = backend();
        backend.write("/memo.md", "remember").await.unwrap();
        assert_eq!(backend.read("/memo.md", 0, 10).await.unwrap(), "remember");
    }

    #[tokio::test]
    async fn test_namespace_isolation() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let a = StoreBackend::new(Arc::clone(&store), "agent-a");
        let b = StoreBackend::new(store, "agent-b");

        a.write("/f", "private").await.unwrap();
        assert!(matches!(
            b.read("/f", 0, 10).await.unwrap_err(),
            BackendError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_edit_preconditions() {
        let backend = backend();
        backend.write("/f", "foo bar foo").await.unwrap();

        assert!(matches!(
            backend.edit("/f", "foo", "baz", false).await.unwrap_err(),
            BackendError::AmbiguousEdit { .. }
        ));
        assert!(matches!(
            backend.edit("/f", "zap", "baz", false).await.unwrap_err(),
            BackendError::StringNotFound { .. }
        ));

        backend.edit("/f", "bar", "mid", false).await.unwrap();
        assert_eq!(backend.read("/f", 0, 10).await.unwrap(), "foo mid foo");
    }

    #[tokio::test]
    async fn test_structural_collision() {
        let backend = backend();
        backend.write("/a", "file").await.unwrap();
        assert!(matches!(
            backend.write("/a/b", "x").await.unwrap_err(),
            BackendError::Conflict { .. }
        ));
    }

    #[tokio::test]
    async fn test_list_and_glob() {
        let backend = backend();
        backend.write("/a.md", "1").await.unwrap();
        backend.write("/sub/b.md", "2").await.unwrap();

        let listed = backend.list("/").await.unwrap();
        let paths: Vec<_> = listed.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.md", "/sub"]);

        let found = backend.glob("**/*.md", "/").await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_grep() {
        let backend = backend();
        backend.write("/x.txt", "alpha\nbeta\ngamma").await.unwrap();

        let matches = backend.grep("beta", None, None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line_number, 2);
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let backend = backend();
        assert!(matches!(
            backend.delete("/gone").await.unwrap_err(),
            BackendError::NotFound { .. }
        ));
    }
}
