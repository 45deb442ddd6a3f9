//! Remote sandbox backend for backplane.
//!
//! Layers the full backend contract over any substrate that can run shell
//! commands: the [`RemoteBackend`] implements file operations through
//! small inline `sh` scripts sent over a provider's command channel, with
//! file content crossing only as base64 and failures signalled by sentinel
//! markers mapped to typed errors. Providers implement the
//! [`SandboxTransport`] trait; Docker, Apptainer and a host-passthrough
//! transport ship in [`runtime`], and [`SandboxManager`] handles
//! provisioning, reuse and setup scripts.
//!
//! # Example
//!
//! ```rust,no_run
//! use backplane_core::{Backend, Sandbox};
//! use backplane_sandbox::{SandboxConfig, SandboxManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SandboxManager::new(SandboxConfig::default());
//!     let sandbox = manager.launch().await?;
//!
//!     sandbox.write("/src/main.rs", "fn main() {}").await?;
//!     let result = sandbox.execute("ls /workspace/src").await?;
//!     println!("{}", result.output);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod lifecycle;
pub mod remote;
pub mod runtime;
mod script;
pub mod transport;

pub use config::{ProviderKind, SandboxConfig};
pub use lifecycle::SandboxManager;
pub use remote::RemoteBackend;
pub use transport::{RunOutput, SandboxTransport, SharedTransport};
