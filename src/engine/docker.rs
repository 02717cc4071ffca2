use anyhow::Context;
use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions, WaitContainerOptions,
    },
    image::CreateImageOptions,
    models::{HostConfig, Mount, MountTypeEnum},
};
use futures_util::StreamExt;

use crate::engine::{ContainerEngine, ContainerSpec};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_present(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    async fn pull_image(&self, image: &str) -> anyhow::Result<()> {
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });
        let mut progress = self.docker.create_image(options, None, None);
        // Drain the whole stream: the pull is only complete once it ends.
        while let Some(step) = progress.next().await {
            step.with_context(|| format!("failed to pull image {image}"))?;
        }
        Ok(())
    }

    async fn create(&self, name: &str, spec: &ContainerSpec) -> anyhow::Result<String> {
        let mounts = spec
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.container_path.clone()),
                source: Some(m.host_path.to_string_lossy().into_owned()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            mounts: Some(mounts),
            memory: Some(spec.memory_bytes),
            nano_cpus: Some(spec.nano_cpus),
            pids_limit: Some(spec.pids_limit),
            network_mode: Some(spec.network_mode.clone()),
            readonly_rootfs: Some(spec.readonly_rootfs),
            auto_remove: Some(spec.auto_remove),
            security_opt: spec
                .no_new_privileges
                .then(|| vec!["no-new-privileges".to_string()]),
            cap_drop: spec.drop_all_capabilities.then(|| vec!["ALL".to_string()]),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(CreateContainerOptions { name, platform: None }), config)
            .await
            .context("failed to create sandbox container")?;
        Ok(created.id)
    }

    async fn start(&self, id: &str) -> anyhow::Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .context("failed to start sandbox container")
    }

    async fn wait(&self, id: &str) -> anyhow::Result<i64> {
        let options = Some(WaitContainerOptions {
            condition: "not-running",
        });
        let mut wait = self.docker.wait_container(id, options);
        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard surfaces a non-zero exit as this error variant; the
            // caller treats the code like any other exit status.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(err).context("container wait failed"),
            None => anyhow::bail!("container wait stream ended without a status"),
        }
    }

    async fn stop(&self, id: &str) -> anyhow::Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: 1 }))
            .await
            .context("failed to stop sandbox container")
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        self.docker
            .remove_container(id, options)
            .await
            .context("failed to remove sandbox container")
    }

    async fn combined_logs(&self, id: &str) -> anyhow::Result<String> {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        });
        let mut frames = self.docker.logs(id, options);
        let mut combined = String::new();
        while let Some(frame) = frames.next().await {
            match frame.context("failed to read sandbox logs")? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => {
                    combined.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(combined)
    }
}
