//! Low-level command channel into a sandbox instance.

use crate::config::ProviderKind;
use async_trait::async_trait;
use backplane_core::error::BackendResult;
use std::sync::Arc;
use std::time::Duration;

/// Raw output of one command run inside a sandbox.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Interleaved stdout and stderr.
    pub output: String,
    /// Process exit code.
    pub exit_code: i32,
}

/// One provider's command channel.
///
/// A transport owns the lifecycle of a single sandbox instance and runs
/// shell commands inside it. Everything file-shaped is layered on top by
/// [`crate::RemoteBackend`] through the inline-script protocol, so an
/// adapter only has to get these six operations right.
#[async_trait]
pub trait SandboxTransport: Send + Sync {
    /// Stable instance identifier, usable for reattachment across calls.
    fn id(&self) -> &str;

    /// Provider this transport talks to.
    fn kind(&self) -> ProviderKind;

    /// Remote directory all virtual `/` paths are rooted under.
    fn workdir(&self) -> &str;

    /// Start the sandbox if it is not already running.
    async fn start(&self) -> BackendResult<()>;

    /// Health check. Used before reuse and during startup polling.
    async fn is_alive(&self) -> bool;

    /// Run `sh -c command` with the workdir as cwd, bounded by `timeout`.
    ///
    /// Implementations must terminate the remote process when the deadline
    /// passes and return [`backplane_core::BackendError::Timeout`]; an
    /// orphaned remote process is a resource leak.
    async fn run(&self, command: &str, timeout: Duration) -> BackendResult<RunOutput>;

    /// Tear the sandbox down.
    async fn stop(&self) -> BackendResult<()>;
}

/// A shared, dynamically dispatched transport.
pub type SharedTransport = Arc<dyn SandboxTransport>;
