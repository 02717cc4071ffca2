//! Sandbox lifecycle driver.
//!
//! Drives one sandbox through
//! staged -> image ready -> provisioned -> running -> terminal -> torn down.
//! The staging directory and the container are released on every exit path:
//! the happy path tears both down explicitly, and drop guards cover early
//! returns and a cancelled caller.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use uuid::Uuid;

use crate::{
    engine::{ContainerEngine, ContainerSpec, ResolvedMount},
    error::ExecError,
    executor::{language::LaunchRecipe, staging::StagingArea},
};

/// Hardening profile applied identically to every sandbox.
const MEMORY_LIMIT_BYTES: i64 = 128 * 1024 * 1024;
const NANO_CPUS: i64 = 1_000_000_000;
const PIDS_LIMIT: i64 = 100;

#[derive(Debug)]
pub struct RunOutput {
    pub exit_code: i64,
    pub combined_output: String,
}

pub struct LifecycleDriver {
    engine: Arc<dyn ContainerEngine>,
    network_mode: String,
    exec_deadline: Duration,
    pull_deadline: Duration,
}

impl LifecycleDriver {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        network_mode: String,
        exec_deadline: Duration,
        pull_deadline: Duration,
    ) -> Self {
        Self {
            engine,
            network_mode,
            exec_deadline,
            pull_deadline,
        }
    }

    pub async fn run(&self, recipe: &LaunchRecipe) -> Result<RunOutput, ExecError> {
        let staging = StagingArea::materialize(recipe).await?;
        self.ensure_image(recipe.image).await?;

        let spec = self.container_spec(recipe, &staging);
        let name = format!("execbox-{}", Uuid::new_v4());
        let id = self.engine.create(&name, &spec).await?;
        let mut guard = SandboxGuard::new(self.engine.clone(), id.clone());

        self.engine.start(&id).await?;

        // Deadline is measured from wait start, not from provisioning.
        let waited = tokio::time::timeout(self.exec_deadline, self.engine.wait(&id)).await;
        let exit_code = match waited {
            Err(_) => {
                tracing::warn!(container = %id, "execution deadline elapsed, stopping sandbox");
                let _ = self.engine.stop(&id).await;
                let _ = self.engine.remove(&id).await;
                guard.disarm();
                return Err(ExecError::Timeout);
            }
            Ok(Err(err)) => {
                let _ = self.engine.remove(&id).await;
                guard.disarm();
                return Err(ExecError::Orchestration(err.context("container wait failed")));
            }
            Ok(Ok(code)) => code,
        };

        let logs = self.engine.combined_logs(&id).await;
        // Auto-removal was requested at create time but is not relied upon.
        let _ = self.engine.remove(&id).await;
        guard.disarm();

        let combined_output = logs.context("failed to fetch sandbox logs")?;
        Ok(RunOutput {
            exit_code,
            combined_output,
        })
    }

    async fn ensure_image(&self, image: &str) -> Result<(), ExecError> {
        if self.engine.image_present(image).await {
            return Ok(());
        }
        tracing::info!(image, "sandbox image absent, pulling");
        tokio::time::timeout(self.pull_deadline, self.engine.pull_image(image))
            .await
            .map_err(|_| ExecError::Orchestration(anyhow!("image pull timed out: {image}")))??;
        Ok(())
    }

    fn container_spec(&self, recipe: &LaunchRecipe, staging: &StagingArea) -> ContainerSpec {
        ContainerSpec {
            image: recipe.image.to_string(),
            command: recipe.entry_command.clone(),
            working_dir: recipe.working_dir.to_string(),
            mounts: recipe
                .mounts
                .iter()
                .map(|m| ResolvedMount {
                    host_path: staging.resolve(m.host_file),
                    container_path: m.container_path.to_string(),
                    read_only: m.read_only,
                })
                .collect(),
            memory_bytes: MEMORY_LIMIT_BYTES,
            nano_cpus: NANO_CPUS,
            pids_limit: PIDS_LIMIT,
            network_mode: self.network_mode.clone(),
            readonly_rootfs: true,
            drop_all_capabilities: true,
            no_new_privileges: true,
            auto_remove: true,
        }
    }
}

/// Best-effort teardown for a provisioned container when the normal path is
/// skipped, typically because the caller's request future was dropped
/// mid-await. Disarmed once explicit teardown has run.
struct SandboxGuard {
    engine: Arc<dyn ContainerEngine>,
    id: Option<String>,
}

impl SandboxGuard {
    fn new(engine: Arc<dyn ContainerEngine>, id: String) -> Self {
        Self {
            engine,
            id: Some(id),
        }
    }

    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let engine = self.engine.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = engine.stop(&id).await;
                let _ = engine.remove(&id).await;
            });
        }
    }
}
