//! # Image Builder
//!
//! Builds a local image tagged `{app}:{gitTime}-{gitHash}` from the current
//! commit. Refuses to build from a dirty working tree: the tag must pin
//! the exact source state the image was produced from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task;
use tracing::{debug, info};

use crate::docker::ContainerRuntime;
use crate::error::{Error, Result};
use crate::git::VcsClient;

/// Result of one build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub image_tag: String,
    pub app_name: String,
    pub git_hash: String,
    pub git_time: String,
}

/// Builds git-tagged images through the container runtime.
pub struct ImageBuilder {
    runtime: Arc<dyn ContainerRuntime>,
    vcs: Arc<dyn VcsClient>,
}

impl ImageBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, vcs: Arc<dyn VcsClient>) -> Self {
        Self { runtime, vcs }
    }

    /// Builds `app` from `context` using `dockerfile`, deriving the tag
    /// from the repository at `git_path`.
    pub async fn build(
        &self,
        app: &str,
        context: &Path,
        dockerfile: &str,
        git_path: &Path,
        platform: Option<&str>,
    ) -> Result<BuildOutcome> {
        info!(app, context = %context.display(), dockerfile, "starting build");

        let runtime = self.runtime.clone();
        let vcs = self.vcs.clone();
        let app = app.to_string();
        let context = context.to_path_buf();
        let dockerfile = dockerfile.to_string();
        let git_path = git_path.to_path_buf();
        let platform = platform.map(str::to_string);

        task::spawn_blocking(move || -> Result<BuildOutcome> {
            if vcs.is_dirty(&git_path)? {
                return Err(Error::DirtyRepository);
            }

            let git_hash = vcs.current_hash(&git_path)?;
            let git_time = vcs.commit_timestamp(&git_path)?;
            let image_tag = format!("{app}:{git_time}-{git_hash}");
            debug!(%image_tag, "derived build tag");

            runtime.build(
                &context,
                &dockerfile,
                std::slice::from_ref(&image_tag),
                platform.as_deref(),
            )?;

            info!(%image_tag, "build complete");
            Ok(BuildOutcome {
                image_tag,
                app_name: app,
                git_hash,
                git_time,
            })
        })
        .await
        .map_err(|e| Error::Internal(format!("build task failed: {e}")))?
    }

    /// Discovers the repository root, preferring the git path, then the
    /// build context, then the working directory.
    pub fn discover_repo_root(&self, git_path: &Path, context: &Path) -> Result<PathBuf> {
        for candidate in [git_path, context, Path::new(".")] {
            if let Ok(root) = self.vcs.find_root(candidate) {
                debug!(candidate = %candidate.display(), root = %root.display(), "found repository root");
                return Ok(root);
            }
        }
        Err(Error::Vcs(format!(
            "could not find a git repository from {}",
            git_path.display()
        )))
    }
}
