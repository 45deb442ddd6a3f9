//! Backend over a remote sandbox.
//!
//! Implements the full backend contract plus execution in terms of a
//! [`SandboxTransport`]'s single `run` primitive, using the inline-script
//! protocol from [`crate::script`]. Reads slice remotely so a small window
//! of a large file never transfers whole; edits transfer the file, apply
//! the replacement locally for exact precondition errors, and write the
//! result back.

use crate::{
    config::SandboxConfig,
    script,
    transport::{RunOutput, SharedTransport},
};
use async_trait::async_trait;
use backplane_core::{
    error::{BackendError, BackendResult},
    ops, Backend, DownloadResult, EditResult, ExecuteResult, FileInfo, GrepMatch, Sandbox,
    UploadResult, WriteResult,
};
use backplane_util::vpath;
use std::time::Duration;
use tracing::debug;

/// Budget for one internal file-protocol command. Distinct from the
/// execute budget because file scripts finish in seconds while user
/// commands may legitimately run for minutes.
const FILE_OP_TIMEOUT: Duration = Duration::from_secs(60);

/// Backend and sandbox implementation over a provider transport.
pub struct RemoteBackend {
    transport: SharedTransport,
    execute_timeout: Duration,
    max_output_bytes: usize,
}

impl RemoteBackend {
    /// Wrap a transport with the configured budgets.
    pub fn new(transport: SharedTransport, config: &SandboxConfig) -> Self {
        Self {
            transport,
            execute_timeout: config.execute_timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Map a normalized virtual path to its remote physical path.
    fn resolve(&self, normalized: &str) -> String {
        let workdir = self.transport.workdir();
        if normalized == "/" {
            workdir.to_string()
        } else {
            format!("{workdir}{normalized}")
        }
    }

    /// Map a remote physical path back to its virtual form.
    fn to_virtual(&self, physical: &str) -> String {
        let workdir = self.transport.workdir();
        match physical.strip_prefix(workdir) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => physical.to_string(),
        }
    }

    /// Run a file-protocol script, mapping sentinels and failures.
    async fn run_file_op(&self, script: &str, path: &str) -> BackendResult<RunOutput> {
        let out = self.transport.run(script, FILE_OP_TIMEOUT).await?;
        if let Some(err) = script::sentinel_error(path, &out.output) {
            return Err(err);
        }
        if out.exit_code != 0 {
            return Err(BackendError::exec_failed(format!(
                "file operation on '{path}' failed (exit {}): {}",
                out.exit_code,
                out.output.trim()
            )));
        }
        Ok(out)
    }

    async fn read_full(&self, path: &str) -> BackendResult<String> {
        let out = self
            .run_file_op(&script::cat_script(&self.resolve(path)), path)
            .await?;
        let bytes = script::decode_base64(&out.output)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> BackendResult<bool> {
        let b64 = script::encode_base64(bytes);
        let out = self
            .run_file_op(&script::write_script(&self.resolve(path), &b64), path)
            .await?;
        Ok(out.output.contains(&format!("{} 1", script::OK)))
    }

    fn clamp_output(&self, mut output: String) -> (String, bool) {
        if output.len() <= self.max_output_bytes {
            return (output, false);
        }
        let mut end = self.max_output_bytes;
        while end > 0 && !output.is_char_boundary(end) {
            end -= 1;
        }
        output.truncate(end);
        (output, true)
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let path = vpath::normalize(path)?;
        let out = self
            .run_file_op(&script::list_script(&self.resolve(&path)), &path)
            .await?;

        let base = if path == "/" { "" } else { path.as_str() };
        let mut entries = Vec::new();
        for line in out.output.lines() {
            let mut fields = line.splitn(3, '\t');
            let (Some(kind), Some(size), Some(name)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let child = format!("{base}/{name}");
            entries.push(FileInfo {
                path: child,
                is_dir: kind == "d",
                size: (kind == "f").then(|| size.trim().parse().unwrap_or(0)),
                modified_at: None,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let path = vpath::normalize(path)?;
        let out = self
            .run_file_op(
                &script::read_script(&self.resolve(&path), offset, limit),
                &path,
            )
            .await?;
        let bytes = script::decode_base64(&out.output)?;
        let mut content = String::from_utf8_lossy(&bytes).into_owned();
        // awk terminates the last line; the window itself carries none
        if content.ends_with('\n') {
            content.pop();
        }
        Ok(content)
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let path = vpath::normalize(path)?;
        debug!(sandbox = %self.transport.id(), path = %path, "Remote write");
        let created = self.write_bytes(&path, content.as_bytes()).await?;
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
        let content = self.read_full(&path).await?;
        let (new_content, replacements) =
            ops::apply_edit(&path, &content, old_string, new_string, replace_all)?;
        self.write_bytes(&path, new_content.as_bytes()).await?;
        Ok(EditResult { path, replacements })
    }

    async fn delete(&self, path: &str) -> BackendResult<()> {
        let path = vpath::normalize(path)?;
        self.run_file_op(&script::delete_script(&self.resolve(&path)), &path)
            .await?;
        Ok(())
    }

    async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let base = vpath::normalize(path.unwrap_or("/"))?;
        // Compile locally first so a bad pattern is a typed caller error,
        // not a remote grep failure.
        ops::compile_regex(pattern)?;
        let filter = glob.map(ops::compile_glob).transpose()?;

        let out = self
            .run_file_op(&script::grep_script(&self.resolve(&base), pattern), &base)
            .await?;

        let mut matches = Vec::new();
        for line in out.output.lines() {
            let mut fields = line.splitn(3, ':');
            let (Some(physical), Some(number), Some(text)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let Ok(line_number) = number.parse::<usize>() else {
                continue;
            };
            let virtual_path = self.to_virtual(physical);
            if let Some(ref filter) = filter {
                if !ops::glob_matches(filter, ops::relative_to(&base, &virtual_path)) {
                    continue;
                }
            }
            matches.push(GrepMatch {
                path: virtual_path,
                line_number,
                text: text.to_string(),
            });
        }
        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line_number.cmp(&b.line_number)));
        Ok(matches)
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let base = vpath::normalize(path)?;
        let compiled = ops::compile_glob(pattern)?;
        let out = self
            .run_file_op(&script::find_script(&self.resolve(&base)), &base)
            .await?;

        let mut result = Vec::new();
        for line in out.output.lines() {
            let virtual_path = self.to_virtual(line.trim());
            if virtual_path.is_empty() {
                continue;
            }
            if ops::glob_matches(&compiled, ops::relative_to(&base, &virtual_path)) {
                result.push(FileInfo {
                    path: virtual_path,
                    is_dir: false,
                    size: None,
                    modified_at: None,
                });
            }
        }
        result.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(result)
    }

    fn as_sandbox(&self) -> Option<&dyn Sandbox> {
        Some(self)
    }
}

#[async_trait]
impl Sandbox for RemoteBackend {
    fn id(&self) -> &str {
        self.transport.id()
    }

    async fn execute(&self, command: &str) -> BackendResult<ExecuteResult> {
        debug!(sandbox = %self.transport.id(), "Executing command");
        let out = self.transport.run(command, self.execute_timeout).await?;
        let (output, truncated) = self.clamp_output(out.output);
        Ok(ExecuteResult {
            output,
            exit_code: out.exit_code,
            truncated,
        })
    }

    async fn upload(&self, files: &[(String, Vec<u8>)]) -> BackendResult<Vec<UploadResult>> {
        let mut results = Vec::with_capacity(files.len());
        for (raw_path, bytes) in files {
            let outcome = match vpath::normalize(raw_path) {
                Ok(path) => match self.write_bytes(&path, bytes).await {
                    Ok(_) => UploadResult { path, error: None },
                    Err(e) => UploadResult {
                        path,
                        error: Some(e.to_string()),
                    },
                },
                Err(e) => UploadResult {
                    path: raw_path.clone(),
                    error: Some(e.to_string()),
                },
            };
            results.push(outcome);
        }
        Ok(results)
    }

    async fn download(&self, paths: &[String]) -> BackendResult<Vec<DownloadResult>> {
        let mut results = Vec::with_capacity(paths.len());
        for raw_path in paths {
            let outcome = match vpath::normalize(raw_path) {
                Ok(path) => {
                    let fetched = self
                        .run_file_op(&script::cat_script(&self.resolve(&path)), &path)
                        .await
                        .and_then(|out| script::decode_base64(&out.output));
                    match fetched {
                        Ok(bytes) => DownloadResult {
                            path,
                            bytes: Some(bytes),
                            error: None,
                        },
                        Err(e) => DownloadResult {
                            path,
                            bytes: None,
                            error: Some(e.to_string()),
                        },
                    }
                }
                Err(e) => DownloadResult {
                    path: raw_path.clone(),
                    bytes: None,
                    error: Some(e.to_string()),
                },
            };
            results.push(outcome);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::PassthroughTransport;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn backend_with(config: SandboxConfig) -> (TempDir, RemoteBackend) {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(PassthroughTransport::new(dir.path()));
        (dir, RemoteBackend::new(transport, &config))
    }

    fn backend() -> (TempDir, RemoteBackend) {
        backend_with(SandboxConfig::default())
    }

    #[tokio::test]
    async fn test_write_read_round_trip_with_metacharacters() {
        let (_dir, backend) = backend();
        let content = "it's $(hostile) `quoted` \"content\"\nsecond line";
        backend.write("/f.txt", content).await.unwrap();
        assert_eq!(backend.read("/f.txt", 0, 100).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_read_slices_remotely() {
        let (_dir, backend) = backend();
        backend.write("/f", "l1\nl2\nl3\nl4\nl5").await.unwrap();
        assert_eq!(backend.read("/f", 1, 2).await.unwrap(), "l2\nl3");
        assert_eq!(backend.read("/f", 10, 2).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_read_missing_and_directory() {
        let (dir, backend) = backend();
        assert!(matches!(
            backend.read("/gone", 0, 10).await.unwrap_err(),
            BackendError::NotFound { .. }
        ));

        std::fs::create_dir(dir.path().join("d")).unwrap();
        assert!(matches!(
            backend.read("/d", 0, 10).await.unwrap_err(),
            BackendError::IsDirectory { .. }
        ));
    }

    #[tokio::test]
    async fn test_write_reports_created() {
        let (_dir, backend) = backend();
        assert!(backend.write("/f", "a").await.unwrap().created);
        assert!(!backend.write("/f", "b").await.unwrap().created);
    }

    #[tokio::test]
    async fn test_edit_applies_locally_with_typed_errors() {
        let (_dir, backend) = backend();
        backend.write("/f", "foo bar foo").await.unwrap();

        assert!(matches!(
            backend.edit("/f", "foo", "baz", false).await.unwrap_err(),
            BackendError::AmbiguousEdit { .. }
        ));
        assert!(matches!(
            backend.edit("/f", "zap", "x", false).await.unwrap_err(),
            BackendError::StringNotFound { .. }
        ));

        let result = backend.edit("/f", "foo", "baz", true).await.unwrap();
        assert_eq!(result.replacements, 2);
        assert_eq!(backend.read("/f", 0, 10).await.unwrap(), "baz bar baz");
    }

    #[tokio::test]
    async fn test_list_parses_kinds_and_sizes() {
        let (dir, backend) = backend();
        backend.write("/a.txt", "abc").await.unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = backend.list("/").await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/sub"]);
        assert_eq!(entries[0].size, Some(3));
        assert!(entries[1].is_dir);
    }

    #[tokio::test]
    async fn test_grep_with_glob_filter() {
        let (_dir, backend) = backend();
        backend.write("/a.rs", "let needle = 1;").await.unwrap();
        backend.write("/sub/b.txt", "needle").await.unwrap();

        let matches = backend.grep("needle", None, Some("*.rs")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "/a.rs");
        assert_eq!(matches[0].line_number, 1);

        let all = backend.grep("needle", None, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_grep_scoped_to_single_file() {
        let (_dir, backend) = backend();
        backend.write("/f.txt", "hay\nneedle here").await.unwrap();

        let matches = backend
            .grep("needle", Some("/f.txt"), None)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "/f.txt");
        assert_eq!(matches[0].line_number, 2);
        assert_eq!(matches[0].text, "needle here");
    }

    #[tokio::test]
    async fn test_glob() {
        let (_dir, backend) = backend();
        backend.write("/a.md", "1").await.unwrap();
        backend.write("/sub/b.md", "2").await.unwrap();
        backend.write("/c.rs", "3").await.unwrap();

        let found = backend.glob("**/*.md", "/").await.unwrap();
        let paths: Vec<_> = found.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.md", "/sub/b.md"]);
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

    #[tokio::test]
    async fn test_execute_and_truncation() {
        let (_dir, backend) = backend();
        let result = backend.execute("echo hello").await.unwrap();
        assert!(result.success());
        assert_eq!(result.output.trim(), "hello");

        let config = SandboxConfig {
            max_output_bytes: 8,
            ..SandboxConfig::default()
        };
        let (_dir2, small) = backend_with(config);
        let result = small.execute("echo 0123456789abcdef").await.unwrap();
        assert!(result.truncated);
        assert_eq!(result.output.len(), 8);
    }

    #[tokio::test]
    async fn test_execute_timeout_kills_process() {
        let config = SandboxConfig {
            execute_timeout_secs: 1,
            ..SandboxConfig::default()
        };
        let (_dir, backend) = backend_with(config);
        let err = backend.execute("sleep 30").await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_upload_download_binary() {
        let (_dir, backend) = backend();
        let payload = vec![0u8, 159, 146, 150, 255];
        let results = backend
            .upload(&[("/bin/blob".to_string(), payload.clone())])
            .await
            .unwrap();
        assert!(results[0].error.is_none());

        let fetched = backend.download(&["/bin/blob".to_string()]).await.unwrap();
        assert_eq!(fetched[0].bytes.as_deref(), Some(payload.as_slice()));
    }

    #[tokio::test]
    async fn test_download_missing_is_per_file_error() {
        let (_dir, backend) = backend();
        backend.write("/ok", "x").await.unwrap();
        let results = backend
            .download(&["/ok".to_string(), "/missing".to_string()])
            .await
            .unwrap();
        assert!(results[0].error.is_none());
        assert!(results[1].bytes.is_none());
        assert!(results[1].error.is_some());
    }

    #[tokio::test]
    async fn test_as_sandbox_narrows() {
        let (_dir, backend) = backend();
        assert!(backend.as_sandbox().is_some());
    }
}
