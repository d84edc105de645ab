pub mod core;
pub mod session;
pub mod types;

pub use crate::core::error::RelayError;
pub use crate::core::{Command, CommandOutcome, RelayCore, Submission, UploadOutcome, Usage};
