//! Per-request staging directory for the materialized wrapper and payload.
//!
//! Owned exclusively by one in-flight request. Removal happens in `Drop`, so
//! the directory is gone on every exit path, including a cancelled handler
//! future.

use std::path::{Path, PathBuf};

use anyhow::Context;
use uuid::Uuid;

use crate::{error::ExecError, executor::language::LaunchRecipe};

pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Writes every staged file from the recipe into a fresh directory. The
    /// directory is world-readable (0755) and the files 0644 so the sandbox
    /// user can read them through the bind mounts.
    pub async fn materialize(recipe: &LaunchRecipe) -> Result<Self, ExecError> {
        let root = std::env::temp_dir().join(format!("execbox-{}", Uuid::new_v4().as_simple()));
        tokio::fs::create_dir_all(&root)
            .await
            .context("failed to create staging directory")?;
        let staging = Self { root };

        set_permissions(&staging.root, 0o755)
            .await
            .context("failed to set staging directory permissions")?;

        for file in &recipe.files {
            let path = staging.root.join(file.name);
            tokio::fs::write(&path, file.content.as_bytes())
                .await
                .with_context(|| format!("failed to stage {}", file.name))?;
            set_permissions(&path, 0o644)
                .await
                .with_context(|| format!("failed to set permissions on {}", file.name))?;
        }
        Ok(staging)
    }

    pub fn resolve(&self, host_file: &str) -> PathBuf {
        self.root.join(host_file)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

#[cfg(unix)]
async fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
