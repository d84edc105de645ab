use crate::types::lifecycle::{DAY, LifecyclePolicy, SweepScope};
use std::path::PathBuf;
use std::time::Duration;

/// Core configuration for RelayCore initialization.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_path: PathBuf,
    pub saved: SavedConfig,
}

/// Settings that come from the persisted `config.toml`.
#[derive(Clone, Debug)]
pub struct SavedConfig {
    pub password: String,
    pub capacity_bytes: u64,
    pub clips_limit: usize,
    pub grey_after: Duration,
    pub expire_after: Duration,
    pub sweep_scope: SweepScope,
    pub session_max_age: Duration,
}

impl Default for SavedConfig {
    fn default() -> Self {
        let lifecycle = LifecyclePolicy::default();
        Self {
            password: "abc".to_string(),
            capacity_bytes: 1 << 30,
            clips_limit: 100,
            grey_after: lifecycle.grey_after,
            expire_after: lifecycle.expire_after,
            sweep_scope: lifecycle.scope,
            session_max_age: 99 * DAY,
        }
    }
}

impl SavedConfig {
    pub fn lifecycle(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            grey_after: self.grey_after,
            expire_after: self.expire_after,
            scope: self.sweep_scope,
        }
    }
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.base_path.join("relay.redb")
    }

    pub fn files_path(&self) -> PathBuf {
        self.base_path.join("files")
    }
}
