//! # VCS Adapter
//!
//! Read-only view of the git repository an image is built from. The
//! distribution layer needs four facts: the abbreviated commit hash, the
//! committer timestamp (formatted `YYYYMMDD-HHMM` in UTC), whether the
//! working tree is dirty, and where the repository root is.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::{Repository, StatusOptions};

use crate::constants::{GIT_TIME_FORMAT, SHORT_HASH_LEN};
use crate::error::{Error, Result};

/// Version control facts consumed by build and push.
pub trait VcsClient: Send + Sync {
    /// First seven hex characters of the current HEAD commit.
    fn current_hash(&self, path: &Path) -> Result<String>;

    /// Committer timestamp of HEAD, formatted `YYYYMMDD-HHMM` in UTC.
    fn commit_timestamp(&self, path: &Path) -> Result<String>;

    /// Whether the working tree has uncommitted or untracked changes.
    fn is_dirty(&self, path: &Path) -> Result<bool>;

    /// Discovers the repository root containing `start`.
    fn find_root(&self, start: &Path) -> Result<PathBuf>;
}

/// [`VcsClient`] backed by libgit2.
pub struct GitRepo;

impl GitRepo {
    pub fn new() -> Self {
        Self
    }

    fn head_commit(repo: &Repository) -> Result<git2::Commit<'_>> {
        Ok(repo.head()?.peel_to_commit()?)
    }
}

impl Default for GitRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl VcsClient for GitRepo {
    fn current_hash(&self, path: &Path) -> Result<String> {
        let repo = Repository::open(path)?;
        let commit = Self::head_commit(&repo)?;
        let full = commit.id().to_string();
        Ok(full[..SHORT_HASH_LEN.min(full.len())].to_string())
    }

    fn commit_timestamp(&self, path: &Path) -> Result<String> {
        let repo = Repository::open(path)?;
        let commit = Self::head_commit(&repo)?;

        let committed_at = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
            .ok_or_else(|| Error::Vcs("commit timestamp out of range".to_string()))?;
        Ok(committed_at.format(GIT_TIME_FORMAT).to_string())
    }

    fn is_dirty(&self, path: &Path) -> Result<bool> {
        let repo = Repository::open(path)?;
        let mut options = StatusOptions::new();
        options.include_untracked(true).exclude_submodules(true);

        let statuses = repo.statuses(Some(&mut options))?;
        Ok(!statuses.is_empty())
    }

    fn find_root(&self, start: &Path) -> Result<PathBuf> {
        let repo = Repository::discover(start)?;
        repo.workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Vcs("repository has no working directory".to_string()))
    }
}
