//! Source control operations used by deployment and rollback.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{RemedyError, Result};

/// Branch and commit operations on the platform repository.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn current_branch(&self) -> Result<String>;

    /// Full SHA of `HEAD`.
    async fn head_commit(&self) -> Result<String>;

    async fn switch_branch(&self, branch: &str) -> Result<()>;

    /// Merge `branch` into the current branch with a merge commit.
    async fn merge(&self, branch: &str, message: &str) -> Result<()>;

    /// Abort an in-progress merge. No-op when none is in progress.
    async fn abort_merge(&self) -> Result<()>;

    /// Hard-reset the current branch to `commit` (any rev expression).
    async fn reset_hard(&self, commit: &str) -> Result<()>;
}

/// [`SourceControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        debug!(args = ?args, "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RemedyError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RemedyError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn current_branch(&self) -> Result<String> {
        let branch = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if branch.is_empty() || branch == "HEAD" {
            return Err(RemedyError::Git(
                "repository is in detached HEAD state".to_string(),
            ));
        }
        Ok(branch)
    }

    async fn head_commit(&self) -> Result<String> {
        let sha = self.git(&["rev-parse", "HEAD"]).await?;
        if sha.is_empty() {
            return Err(RemedyError::Git(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(sha)
    }

    async fn switch_branch(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", branch]).await.map(|_| ())
    }

    async fn merge(&self, branch: &str, message: &str) -> Result<()> {
        self.git(&["merge", "--no-ff", "--no-edit", "-m", message, branch])
            .await
            .map(|_| ())
    }

    async fn abort_merge(&self) -> Result<()> {
        // MERGE_HEAD only exists while a merge is in progress.
        if self
            .git(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .await
            .is_err()
        {
            return Ok(());
        }
        self.git(&["merge", "--abort"]).await.map(|_| ())
    }

    async fn reset_hard(&self, commit: &str) -> Result<()> {
        self.git(&["reset", "--hard", commit]).await.map(|_| ())
    }
}
