use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Per-job temp namespace. Every intermediate clip for one job lives in a
/// directory named with the job id plus a random suffix, so concurrent jobs
/// never collide without any locking. Dropping the workspace removes all
/// intermediates, on success and failure paths alike.
pub struct JobWorkspace {
    job_id: String,
    dir: TempDir,
}

impl JobWorkspace {
    pub fn create(scratch_root: &Path) -> Result<Self> {
        let job_id = format!("{:08x}", rand::random::<u32>());
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{job_id}-"))
            .tempdir_in(scratch_root)
            .with_context(|| {
                format!(
                    "Failed to create job workspace under {}",
                    scratch_root.display()
                )
            })?;
        Ok(Self { job_id, dir })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_is_namespaced_and_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let workspace_path;
        {
            let workspace = JobWorkspace::create(root.path()).unwrap();
            workspace_path = workspace.dir().to_path_buf();
            let name = workspace_path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with(&format!("job-{}-", workspace.job_id())));
            std::fs::write(workspace.path("clip.wav"), b"pcm").unwrap();
            assert!(workspace_path.exists());
        }
        assert!(!workspace_path.exists(), "workspace must be cleaned up");
    }

    #[test]
    fn two_workspaces_never_share_a_directory() {
        let root = tempfile::tempdir().unwrap();
        let a = JobWorkspace::create(root.path()).unwrap();
        let b = JobWorkspace::create(root.path()).unwrap();
        assert_ne!(a.dir(), b.dir());
    }
}
