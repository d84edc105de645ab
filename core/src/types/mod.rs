pub(crate) mod config;
pub use config::{
    AppConfig, AppConfigError, Config, GeneralConfig, LifecycleConfig, SavedConfig,
    SessionConfig, StorageConfig,
};

pub(crate) mod record_id;
pub use record_id::{RecordId, RecordIdError};

pub(crate) mod increase_id;
pub use increase_id::{IncreaseId, IncreaseIdError, year_of};

pub(crate) mod record;
pub use record::{
    Record, RecordKind, TEXT_FILE_TYPE, ValidationError, ZIP_FILE_TYPE, content_digest,
    file_type_for, format_timestamp,
};

pub(crate) mod lifecycle;
pub use lifecycle::{DAY, LifecyclePolicy, LifecycleState, SweepScope};

pub(crate) mod age_key;
pub use age_key::AgeKey;
