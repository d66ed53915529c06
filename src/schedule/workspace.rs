use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;
use tracing::{info, warn};

/// Private scratch directory of one task. Removed on `release`, and on
/// drop if nobody released it first.
#[derive(Debug)]
pub struct Workspace {
    task_id: String,
    path: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl Workspace {
    pub fn acquire(root: &Path, task_id: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", task_id))
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        info!("Acquired workspace for task {} at {}", task_id, path.display());

        Ok(Self {
            task_id: task_id.to_string(),
            path,
            dir: Mutex::new(Some(dir)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.dir.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Best effort: failures are logged, never returned. Safe to call
    /// any number of times.
    pub fn release(&self) {
        let dir = self.dir.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(dir) = dir else {
            return;
        };

        match dir.close() {
            Ok(()) => info!("Released workspace for task {}", self.task_id),
            Err(e) => {
                warn!("Failed to remove workspace {}: {}", self.path.display(), e);
                // retry once for whatever survived the first pass
                if self.path.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&self.path) {
                        warn!("Workspace {} left behind: {}", self.path.display(), e);
                    }
                }
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}
