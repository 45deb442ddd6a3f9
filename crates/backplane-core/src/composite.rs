//! Path-prefix router presenting multiple backends as one namespace.
//!
//! A composite backend owns a default backend plus a set of routes, each
//! mounting another backend under a virtual prefix such as `/memories`.
//! Every operation dispatches to the backend with the longest matching
//! prefix, the prefix stripped from the path on the way in and re-applied
//! to any paths embedded in results on the way out. Backends never see
//! their own mount point.
//!
//! Routes are validated once at construction; a bad prefix is an
//! [`BackendError::InvalidRoute`] from [`CompositeBuilder::build`], never a
//! per-operation surprise.

use crate::{
    error::{BackendError, BackendResult},
    join_prefix, Backend, DownloadResult, EditResult, ExecuteResult, FileInfo, GrepMatch,
    SharedBackend, UploadResult, WriteResult,
};
use backplane_util::vpath;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::debug;

/// Factory for a route backend that is expensive to construct, such as one
/// holding a live sandbox connection. Invoked at most once, on first use.
pub type BackendFactory = Box<dyn Fn() -> BackendResult<SharedBackend> + Send + Sync>;

enum RouteSource {
    Ready(SharedBackend),
    Lazy {
        factory: BackendFactory,
        cell: OnceCell<SharedBackend>,
    },
}

struct Route {
    prefix: String,
    source: RouteSource,
}

impl Route {
    fn backend(&self) -> BackendResult<&SharedBackend> {
        match &self.source {
            RouteSource::Ready(backend) => Ok(backend),
            RouteSource::Lazy { factory, cell } => cell.get_or_try_init(|| {
                debug!(prefix = %self.prefix, "Constructing lazy route backend");
                factory()
            }),
        }
    }
}

/// Builder for [`CompositeBackend`].
pub struct CompositeBuilder {
    default: SharedBackend,
    routes: Vec<(String, RouteSource)>,
}

impl CompositeBuilder {
    /// Mount an already-constructed backend under `prefix`.
    pub fn route(mut self, prefix: impl Into<String>, backend: SharedBackend) -> Self {
        self.routes.push((prefix.into(), RouteSource::Ready(backend)));
        self
    }

    /// Mount a backend that is constructed on first use under `prefix`.
    ///
    /// The factory result is memoized; later operations on the route reuse
    /// the same instance. A factory error is returned to the caller of the
    /// triggering operation and the factory is retried on the next one.
    pub fn route_lazy(
        mut self,
        prefix: impl Into<String>,
        factory: impl Fn() -> BackendResult<SharedBackend> + Send + Sync + 'static,
    ) -> Self {
        self.routes.push((
            prefix.into(),
            RouteSource::Lazy {
                factory: Box::new(factory),
                cell: OnceCell::new(),
            },
        ));
        self
    }

    /// Validate the route table and build the composite.
    pub fn build(self) -> BackendResult<CompositeBackend> {
        let mut routes = Vec::with_capacity(self.routes.len());
        for (raw, source) in self.routes {
            let prefix = vpath::normalize(&raw)
                .map_err(|e| BackendError::invalid_route(format!("prefix '{raw}': {e}")))?;
            if prefix == "/" {
                return Err(BackendError::invalid_route(
                    "'/' cannot be a route prefix; use the default backend",
                ));
            }
            if routes.iter().any(|r: &Route| r.prefix == prefix) {
                return Err(BackendError::invalid_route(format!(
                    "duplicate route prefix '{prefix}'"
                )));
            }
            routes.push(Route { prefix, source });
        }
        // Longest prefix first, so dispatch can take the first match
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(CompositeBackend {
            default: self.default,
            routes,
        })
    }
}

/// Routes operations across mounted backends by longest path prefix.
pub struct CompositeBackend {
    default: SharedBackend,
    routes: Vec<Route>,
}

impl CompositeBackend {
    /// Start building a composite over a default backend. The default
    /// handles every path no route claims.
    pub fn builder(default: SharedBackend) -> CompositeBuilder {
        CompositeBuilder {
            default,
            routes: Vec::new(),
        }
    }

    /// The mount prefixes of all configured routes.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.prefix.as_str())
    }

    /// Whether the default backend can run commands.
    pub fn supports_execution(&self) -> bool {
        self.default.as_sandbox().is_some()
    }

    /// Run a command in the default backend's sandbox.
    pub async fn execute(&self, command: &str) -> BackendResult<ExecuteResult> {
        match self.default.as_sandbox() {
            Some(sandbox) => sandbox.execute(command).await,
            None => Err(BackendError::unsupported("execute")),
        }
    }

    /// Upload files into the default backend's sandbox.
    pub async fn upload(&self, files: &[(String, Vec<u8>)]) -> BackendResult<Vec<UploadResult>> {
        match self.default.as_sandbox() {
            Some(sandbox) => sandbox.upload(files).await,
            None => Err(BackendError::unsupported("upload")),
        }
    }

    /// Download files from the default backend's sandbox.
    pub async fn download(&self, paths: &[String]) -> BackendResult<Vec<DownloadResult>> {
        match self.default.as_sandbox() {
            Some(sandbox) => sandbox.download(paths).await,
            None => Err(BackendError::unsupported("download")),
        }
    }

    /// The route owning `path`, if any. Routes are sorted longest-first, so
    /// the first ancestor match is the most specific.
    fn route_for(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| vpath::is_ancestor(&r.prefix, path))
    }

    /// Routes mounted strictly below `path`. The owning route is never in
    /// this set since its prefix is at or above `path`.
    fn routes_under<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Route> {
        self.routes
            .iter()
            .filter(move |r| r.prefix != path && vpath::is_ancestor(path, &r.prefix))
    }

    fn strip(prefix: &str, path: &str) -> String {
        if path == prefix {
            "/".to_string()
        } else {
            path[prefix.len()..].to_string()
        }
    }
}

#[async_trait]
impl Backend for CompositeBackend {
    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let path = vpath::normalize(path)?;

        let mut entries = match self.route_for(&path) {
            Some(route) => {
                let sub = Self::strip(&route.prefix, &path);
                route
                    .backend()?
                    .list(&sub)
                    .await?
                    .into_iter()
                    .map(|e| e.with_prefix(&route.prefix))
                    .collect()
            }
            None => self.default.list(&path).await?,
        };

        // Mount points appear as directories in their parent listing
        let base = if path == "/" { "" } else { path.as_str() };
        for route in self.routes_under(&path) {
            let rest = &route.prefix[base.len() + 1..];
            let child = match rest.split_once('/') {
                Some((first, _)) => format!("{base}/{first}"),
                None => route.prefix.clone(),
            };
            if !entries.iter().any(|e: &FileInfo| e.path == child) {
                entries.push(FileInfo::dir(child));
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let path = vpath::normalize(path)?;
        match self.route_for(&path) {
            Some(route) => {
                let sub = Self::strip(&route.prefix, &path);
                route.backend()?.read(&sub, offset, limit).await
            }
            None => self.default.read(&path, offset, limit).await,
        }
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let path = vpath::normalize(path)?;
        match self.route_for(&path) {
            Some(route) => {
                let sub = Self::strip(&route.prefix, &path);
                let result = route.backend()?.write(&sub, content).await?;
                Ok(WriteResult {
                    path: join_prefix(&route.prefix, &result.path),
                    created: result.created,
                    bytes_written: result.bytes_written,
                })
            }
            None => self.default.write(&path, content).await,
        }
    }

    async fn edit(
        &self,
        path: &str,
        old_string: &str,
        new_string: &str,
        replace_all: bool,
    ) -> BackendResult<EditResult> {
        let path = vpath::normalize(path)?;
        match self.route_for(&path) {
            Some(route) => {
                let sub = Self::strip(&route.prefix, &path);
                let result = route
                    .backend()?
                    .edit(&sub, old_string, new_string, replace_all)
                    .await?;
                Ok(EditResult {
                    path: join_prefix(&route.prefix, &result.path),
                    replacements: result.replacements,
                })
            }
            None => self.default.edit(&path, old_string, new_string, replace_all).await,
        }
    }

    async fn delete(&self, path: &str) -> BackendResult<()> {
        let path = vpath::normalize(path)?;
        match self.route_for(&path) {
            Some(route) => {
                let sub = Self::strip(&route.prefix, &path);
                route.backend()?.delete(&sub).await
            }
            None => self.default.delete(&path).await,
        }
    }

    async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let base = vpath::normalize(path.unwrap_or("/"))?;
        let mut matches = Vec::new();

        match self.route_for(&base) {
            Some(route) => {
                let sub = Self::strip(&route.prefix, &base);
                for m in route.backend()?.grep(pattern, Some(&sub), glob).await? {
                    matches.push(m.with_prefix(&route.prefix));
                }
            }
            None => matches.extend(self.default.grep(pattern, Some(&base), glob).await?),
        }

        // Fan out to every route mounted below the search base
        for route in self.routes_under(&base) {
            for m in route.backend()?.grep(pattern, None, glob).await? {
                matches.push(m.with_prefix(&route.prefix));
            }
        }

        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line_number.cmp(&b.line_number)));
        Ok(matches)
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let base = vpath::normalize(path)?;
        let mut result = Vec::new();

        match self.route_for(&base) {
            Some(route) => {
                let sub = Self::strip(&route.prefix, &base);
                for info in route.backend()?.glob(pattern, &sub).await? {
                    result.push(info.with_prefix(&route.prefix));
                }
            }
            None => result.extend(self.default.glob(pattern, &base).await?),
        }

        for route in self.routes_under(&base) {
            for info in route.backend()?.glob(pattern, "/").await? {
                result.push(info.with_prefix(&route.prefix));
            }
        }

        result.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn composite() -> CompositeBackend {
        CompositeBackend::builder(Arc::new(MemoryBackend::new()))
            .route("/memories", Arc::new(MemoryBackend::new()))
            .route("/memories/shared", Arc::new(MemoryBackend::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_to_default_and_route() {
        let composite = composite();

        composite.write("/scratch.txt", "a").await.unwrap();
        composite.write("/memories/b.md", "b").await.unwrap();

        assert_eq!(composite.read("/scratch.txt", 0, 10).await.unwrap(), "a");
        assert_eq!(composite.read("/memories/b.md", 0, 10).await.unwrap(), "b");

        // Default backend never saw the routed path
        let err = composite.read("/b.md", 0, 10).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let composite = composite();
        composite.write("/memories/shared/s.md", "shared").await.unwrap();
        composite.write("/memories/mine.md", "mine").await.unwrap();

        // The nested route owns its subtree; the outer one does not see it
        let outer = composite.list("/memories").await.unwrap();
        let paths: Vec<_> = outer.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/memories/mine.md", "/memories/shared"]);
        assert_eq!(
            composite.read("/memories/shared/s.md", 0, 10).await.unwrap(),
            "shared"
        );
    }

    #[tokio::test]
    async fn test_prefix_boundary_not_substring() {
        let composite = CompositeBackend::builder(Arc::new(MemoryBackend::new()))
            .route("/mem", Arc::new(MemoryBackend::new()))
            .build()
            .unwrap();

        // "/memx" is not under "/mem"
        composite.write("/memx/f", "default").await.unwrap();
        let err = composite.read("/mem/memx/f", 0, 10).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_root_shows_mount_points() {
        let composite = composite();
        composite.write("/a.txt", "1").await.unwrap();

        let entries = composite.list("/").await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/memories"]);
        assert!(entries[1].is_dir);
    }

    #[tokio::test]
    async fn test_write_result_reprefixed() {
        let composite = composite();
        let result = composite.write("/memories/note.md", "x").await.unwrap();
        assert_eq!(result.path, "/memories/note.md");
        assert!(result.created);

        let result = composite.edit("/memories/note.md", "x", "y", false).await.unwrap();
        assert_eq!(result.path, "/memories/note.md");
    }

    #[tokio::test]
    async fn test_grep_fans_out() {
        let composite = composite();
        composite.write("/a.txt", "needle").await.unwrap();
        composite.write("/memories/b.md", "needle").await.unwrap();

        let matches = composite.grep("needle", None, None).await.unwrap();
        let paths: Vec<_> = matches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/memories/b.md"]);
    }

    #[tokio::test]
    async fn test_glob_fans_out() {
        let composite = composite();
        composite.write("/a.md", "1").await.unwrap();
        composite.write("/memories/b.md", "2").await.unwrap();
        composite.write("/memories/shared/c.md", "3").await.unwrap();

        let found = composite.glob("**/*.md", "/").await.unwrap();
        let paths: Vec<_> = found.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/a.md", "/memories/b.md", "/memories/shared/c.md"]
        );
    }

    #[tokio::test]
    async fn test_route_scoped_grep() {
        let composite = composite();
        composite.write("/a.txt", "needle").await.unwrap();
        composite.write("/memories/b.md", "needle").await.unwrap();

        let matches = composite.grep("needle", Some("/memories"), None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "/memories/b.md");
    }

    #[tokio::test]
    async fn test_lazy_route_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let composite = CompositeBackend::builder(Arc::new(MemoryBackend::new()))
            .route_lazy("/lazy", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryBackend::new()) as SharedBackend)
            })
            .build()
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        composite.write("/lazy/f", "x").await.unwrap();
        composite.read("/lazy/f", 0, 10).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lazy_route_failure_propagates() {
        let composite = CompositeBackend::builder(Arc::new(MemoryBackend::new()))
            .route_lazy("/broken", || {
                Err(BackendError::provider_unavailable("docker", "daemon down"))
            })
            .build()
            .unwrap();

        let err = composite.read("/broken/f", 0, 10).await.unwrap_err();
        assert!(matches!(err, BackendError::ProviderUnavailable { .. }));
    }

    #[test]
    fn test_invalid_routes_rejected() {
        let err = CompositeBackend::builder(Arc::new(MemoryBackend::new()))
            .route("/", Arc::new(MemoryBackend::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::InvalidRoute { .. }));

        let err = CompositeBackend::builder(Arc::new(MemoryBackend::new()))
            .route("/m", Arc::new(MemoryBackend::new()))
            .route("/m/", Arc::new(MemoryBackend::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::InvalidRoute { .. }));

        let err = CompositeBackend::builder(Arc::new(MemoryBackend::new()))
            .route("/a/../b", Arc::new(MemoryBackend::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::InvalidRoute { .. }));
    }

    #[tokio::test]
    async fn test_execute_without_sandbox_default() {
        let composite = composite();
        assert!(!composite.supports_execution());
        let err = composite.execute("ls").await.unwrap_err();
        assert!(matches!(err, BackendError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_delete_routed() {
        let composite = composite();
        composite.write("/memories/f", "x").await.unwrap();
        composite.delete("/memories/f").await.unwrap();
        assert!(matches!(
            composite.read("/memories/f", 0, 10).await.unwrap_err(),
            BackendError::NotFound { .. }
        ));
    }
}
