//! Polling watcher for the task file

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Detects changes by comparing modification times
#[derive(Debug)]
pub struct PollingFileWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl PollingFileWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_modified: modified(path),
        }
    }

    /// True when the file changed or appeared since the last check
    pub fn check_modified(&mut self) -> bool {
        let current = modified(&self.path);

        let changed = match (self.last_modified, current) {
            (Some(last), Some(curr)) => curr != last,
            (None, Some(_)) => true,
            _ => false,
        };
        if changed {
            self.last_modified = current;
        }
        changed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Watch a different file
    pub fn set_path(&mut self, path: &Path) {
        self.path = path.to_path_buf();
        self.reset();
    }

    /// Accept the current state, e.g. after our own write
    pub fn reset(&mut self) {
        self.last_modified = modified(&self.path);
    }
}
