pub mod config;
pub mod deploy;
pub mod error;
pub mod event;
pub mod handlers;
pub mod ingress;
pub mod matcher;
pub mod signature;
pub mod status;

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::warn;

use crate::config::Config;
use crate::status::StatusReporter;

/// Shared server state. The configuration lives behind the lock as an
/// immutable `Arc` snapshot: readers clone the Arc and a reload replaces it
/// wholesale, so an in-flight request never observes a half-updated
/// project list.
pub struct AppState {
    pub config_path: PathBuf,
    config: RwLock<Arc<Config>>,
    pub reporter: Arc<StatusReporter>,
    pub started_at: DateTime<Utc>,
    pub start_time: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config_path: PathBuf, config: Config) -> Self {
        Self {
            config_path,
            config: RwLock::new(Arc::new(config)),
            reporter: Arc::new(StatusReporter::new()),
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    /// Current configuration snapshot.
    pub fn snapshot(&self) -> Arc<Config> {
        self.config.read().unwrap().clone()
    }

    /// Reloads the configuration file and swaps in the new snapshot.
    /// A failed reload keeps the previous snapshot so an edit mid-flight
    /// never takes down an otherwise-healthy server.
    pub fn reload(&self) -> Arc<Config> {
        match Config::load(&self.config_path) {
            Ok(config) => {
                let snapshot = Arc::new(config);
                *self.config.write().unwrap() = Arc::clone(&snapshot);
                snapshot
            }
            Err(e) => {
                warn!("Config reload failed, keeping previous snapshot: {}", e);
                self.snapshot()
            }
        }
    }
}
