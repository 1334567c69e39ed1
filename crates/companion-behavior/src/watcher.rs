//! Hot reload of the strategy catalog file.
//!
//! The watcher polls the file's modification time. A changed file is parsed
//! and swapped in whole; a bad edit is logged and the running catalog stays
//! as it was.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::catalog::{parse_records, StrategyCatalog};
use crate::error::ImportError;

pub struct CatalogWatcher {
    path: PathBuf,
    catalog: Arc<StrategyCatalog>,
    poll_interval: Duration,
    last_modified: Mutex<Option<SystemTime>>,
    shutdown: Arc<Notify>,
}

impl CatalogWatcher {
    pub fn new(path: impl Into<PathBuf>, catalog: Arc<StrategyCatalog>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            catalog,
            poll_interval,
            last_modified: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file into the catalog now. Returns the number of records loaded.
    pub fn load_now(&self) -> Result<usize, ImportError> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        let json = std::fs::read_to_string(&self.path)?;
        let records = parse_records(&json)?;
        let count = self.catalog.replace_records(records)?;
        *self.last_modified.lock().unwrap_or_else(|e| e.into_inner()) = Some(modified);
        tracing::info!(path = %self.path.display(), count, "Strategy catalog loaded");
        Ok(count)
    }

    /// Reload if the file changed since the last load. Returns true on reload.
    pub fn poll_once(&self) -> bool {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Catalog file unavailable");
                return false;
            }
        };

        let previous = *self.last_modified.lock().unwrap_or_else(|e| e.into_inner());
        if previous == Some(modified) {
            return false;
        }

        match self.load_now() {
            Ok(_) => true,
            Err(e) => {
                // Remember the bad version so it is not re-parsed every tick.
                *self.last_modified.lock().unwrap_or_else(|e| e.into_inner()) = Some(modified);
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Catalog reload rejected, keeping current strategies"
                );
                false
            }
        }
    }

    /// Poll until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.poll_once();
                }
                _ = self.shutdown.notified() => return,
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
