//! Year-partitioned monotonic identifiers.
//!
//! The string form is the base-36 year, left-padded to three characters,
//! followed by the base-36 count. `2026/1` renders as `1ka1`.

use crate::types::RecordId;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use thiserror::Error;

const YEAR_WIDTH: usize = 3;
const RADIX: u32 = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncreaseId {
    pub year: u32,
    pub count: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IncreaseIdError {
    #[error("id is too short: {0:?}")]
    TooShort(String),

    #[error("id is not base-36: {0:?}")]
    InvalidDigits(String),
}

/// Calendar year (UTC) of `now`.
pub fn year_of(now: SystemTime) -> u32 {
    let year = DateTime::<Utc>::from(now).year();
    u32::try_from(year).unwrap_or(0)
}

impl IncreaseId {
    /// State persisted when a store is opened for the first time.
    ///
    /// The count starts at zero so the first issued id has count 1.
    pub fn first(now: SystemTime) -> Self {
        Self {
            year: year_of(now),
            count: 0,
        }
    }

    /// Returns the successor of `self` for the given wall-clock year.
    pub fn increase(self, now_year: u32) -> Self {
        if now_year > self.year {
            return Self {
                year: now_year,
                count: 1,
            };
        }
        Self {
            year: self.year,
            count: self.count + 1,
        }
    }

    pub fn to_record_id(self) -> RecordId {
        // SAFETY: the rendered form always has at least the three year digits.
        unsafe { RecordId::new_unchecked(self.to_string()) }
    }
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        let digit = (n % u64::from(RADIX)) as u32;
        digits.push(char::from_digit(digit, RADIX).unwrap_or('0'));
        n /= u64::from(RADIX);
    }
    digits.iter().rev().collect()
}

impl fmt::Display for IncreaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = to_base36(u64::from(self.year));
        write!(f, "{year:0>YEAR_WIDTH$}{}", to_base36(self.count))
    }
}

impl FromStr for IncreaseId {
    type Err = IncreaseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() <= YEAR_WIDTH || !s.is_ascii() {
            return Err(IncreaseIdError::TooShort(s.to_string()));
        }
        let (year, count) = s.split_at(YEAR_WIDTH);
        let invalid = || IncreaseIdError::InvalidDigits(s.to_string());

        Ok(Self {
            year: u32::from_str_radix(year, RADIX).map_err(|_| invalid())?,
            count: u64::from_str_radix(count, RADIX).map_err(|_| invalid())?,
        })
    }
}

#[cfg(test)]
mod tests;
