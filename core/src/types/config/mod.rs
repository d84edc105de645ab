mod app;
mod core;

pub use self::app::{
    AppConfig, AppConfigError, GeneralConfig, LifecycleConfig, SessionConfig, StorageConfig,
};
pub use self::core::{Config, SavedConfig};
