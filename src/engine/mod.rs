mod docker;

use std::path::PathBuf;

use async_trait::async_trait;

pub use docker::DockerEngine;

/// Fully resolved description of one sandbox container, ready to hand to the
/// engine. The hardening flags are set identically for every language by the
/// lifecycle driver; they live here so the create call (and tests against a
/// mock engine) can see exactly what was requested.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub mounts: Vec<ResolvedMount>,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub pids_limit: i64,
    pub network_mode: String,
    pub readonly_rootfs: bool,
    pub drop_all_capabilities: bool,
    pub no_new_privileges: bool,
    pub auto_remove: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

/// The outbound contract with the container engine. The orchestrator only
/// issues lifecycle commands through this seam and trusts the engine's
/// isolation guarantees; tests substitute a recording mock.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn image_present(&self, image: &str) -> bool;

    /// Pull the image and fully drain the pull stream before returning, so a
    /// partially pulled image can never back a sandbox.
    async fn pull_image(&self, image: &str) -> anyhow::Result<()>;

    /// Returns the engine-issued container id, valid until `remove`.
    async fn create(&self, name: &str, spec: &ContainerSpec) -> anyhow::Result<String>;

    async fn start(&self, id: &str) -> anyhow::Result<()>;

    /// Wait until the container leaves the running state; resolves to its
    /// exit code. Cancellable: the caller races it against a deadline.
    async fn wait(&self, id: &str) -> anyhow::Result<i64>;

    async fn stop(&self, id: &str) -> anyhow::Result<()>;

    async fn remove(&self, id: &str) -> anyhow::Result<()>;

    /// Combined stdout+stderr, demultiplexed out of the engine's framing.
    async fn combined_logs(&self, id: &str) -> anyhow::Result<String>;
}
