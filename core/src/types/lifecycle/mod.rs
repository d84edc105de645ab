//! Age-derived lifecycle of message records.
//!
//! Nothing here is persisted: a record's state is computed from its
//! `updated_at` against the configured thresholds at query time.

use crate::types::{Record, RecordKind};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Fresh,
    /// Nearing expiry; shown dimmed to the user.
    Grey,
    /// Past retention; removed by the next sweep.
    Expired,
}

/// Which records the grey/expired queries consider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepScope {
    #[default]
    AllKinds,
    FilesOnly,
}

impl SweepScope {
    pub fn includes(self, kind: RecordKind) -> bool {
        match self {
            SweepScope::AllKinds => true,
            SweepScope::FilesOnly => kind == RecordKind::FileContent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub grey_after: Duration,
    pub expire_after: Duration,
    pub scope: SweepScope,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            grey_after: 15 * DAY,
            expire_after: 30 * DAY,
            scope: SweepScope::default(),
        }
    }
}

impl LifecyclePolicy {
    pub fn state_at(&self, updated_at: SystemTime, now: SystemTime) -> LifecycleState {
        let age = now.duration_since(updated_at).unwrap_or(Duration::ZERO);
        if age > self.expire_after {
            LifecycleState::Expired
        } else if age > self.grey_after {
            LifecycleState::Grey
        } else {
            LifecycleState::Fresh
        }
    }

    pub fn state_of(&self, record: &Record, now: SystemTime) -> LifecycleState {
        self.state_at(record.updated_at(), now)
    }

    /// Records updated strictly before this instant are grey (or expired).
    pub fn grey_cutoff(&self, now: SystemTime) -> Option<SystemTime> {
        now.checked_sub(self.grey_after)
    }

    /// Records updated strictly before this instant are expired.
    pub fn expire_cutoff(&self, now: SystemTime) -> Option<SystemTime> {
        now.checked_sub(self.expire_after)
    }
}

#[cfg(test)]
mod tests;
