//! Temporary workspace for one acquisition
//!
//! The directory lives exactly as long as the [`Workspace`] value. It is
//! removed on drop, whichever stage returned, and a failure to remove it is
//! logged rather than reported.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{AcquireError, Result};

const WORKSPACE_PREFIX: &str = "chartkit-helm-chart";

#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Allocate a fresh directory, under `root` when given, the system temp
    /// dir otherwise
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(AcquireError::Workspace)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(AcquireError::Workspace)?;

        let path = dir.path().to_path_buf();
        tracing::debug!(path = %path.display(), "created workspace");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, reporting any failure
    pub fn close(mut self) -> std::io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove temporary chart directory"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_on_drop() {
        let workspace = Workspace::create(None).unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(path.join("Chart.yaml"), "name: app").unwrap();
        assert!(path.is_dir());

        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_created_under_root() {
        let root = tempfile::TempDir::new().unwrap();
        let nested = root.path().join("work");

        let workspace = Workspace::create(Some(&nested)).unwrap();
        assert!(workspace.path().starts_with(&nested));
        assert!(
            workspace
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(WORKSPACE_PREFIX)
        );

        workspace.close().unwrap();
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }

    #[test]
    fn test_separate_invocations_do_not_share() {
        let a = Workspace::create(None).unwrap();
        let b = Workspace::create(None).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
