//! Provider transports.
//!
//! One module per provider:
//!
//! - `docker`: container via the local Docker daemon
//! - `apptainer`: Apptainer/Singularity instance, for HPC hosts
//! - `passthrough`: direct host execution, for tests and trusted runs

pub mod apptainer;
pub mod docker;
pub mod passthrough;

pub use apptainer::ApptainerTransport;
pub use docker::DockerTransport;
pub use passthrough::PassthroughTransport;

use crate::{
    config::{ProviderKind, SandboxConfig},
    transport::SharedTransport,
};
use backplane_core::error::BackendResult;
use backplane_util::id::short_id;
use std::process::Stdio;
use std::sync::Arc;
use tracing::{debug, warn};

/// Detect the first available provider on this host, preferring real
/// isolation over passthrough.
pub async fn detect_provider() -> ProviderKind {
    if docker_available().await {
        debug!("Detected docker");
        return ProviderKind::Docker;
    }
    if apptainer_available().await {
        debug!("Detected apptainer");
        return ProviderKind::Apptainer;
    }
    warn!("No container runtime found, falling back to passthrough execution");
    ProviderKind::Passthrough
}

/// Build a transport for the configured provider.
pub async fn create_transport(config: &SandboxConfig) -> BackendResult<SharedTransport> {
    let provider = match config.provider {
        ProviderKind::Auto => detect_provider().await,
        explicit => explicit,
    };

    match provider {
        ProviderKind::Docker => Ok(Arc::new(DockerTransport::new(config).await?)),
        ProviderKind::Apptainer => Ok(Arc::new(ApptainerTransport::new(config))),
        ProviderKind::Passthrough | ProviderKind::Auto => {
            let root = std::env::temp_dir().join(short_id("backplane"));
            Ok(Arc::new(PassthroughTransport::new(root)))
        }
    }
}

async fn docker_available() -> bool {
    match bollard::Docker::connect_with_local_defaults() {
        Ok(docker) => docker.ping().await.is_ok(),
        Err(_) => false,
    }
}

async fn apptainer_available() -> bool {
    tokio::process::Command::new("apptainer")
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
