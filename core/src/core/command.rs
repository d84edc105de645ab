//! Maintenance commands accepted by the command endpoint.

use crate::core::error::RelayError;
use crate::types::{Record, RecordId};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Bundle every file message (except earlier bundles) into one zip message.
    ZipAllFiles,
    DeleteAllFiles,
    /// Delete the `n` oldest file messages.
    DeleteOldestFiles(usize),
    /// Delete the `n` oldest messages of any kind.
    DeleteOldestItems(usize),
    DeleteGreyItems,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Zipped(Record),
    Deleted(Vec<RecordId>),
}

impl FromStr for Command {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || RelayError::UnknownCommand(s.to_string());

        match s {
            "zip-all-files" => return Ok(Command::ZipAllFiles),
            "delete-all-files" => return Ok(Command::DeleteAllFiles),
            "delete-grey-items" => return Ok(Command::DeleteGreyItems),
            _ => {}
        }

        // delete-<n>-files / delete-<n>-items
        let rest = s.strip_prefix("delete-").ok_or_else(unknown)?;
        let (count, target) = rest.split_once('-').ok_or_else(unknown)?;
        let count: usize = count.parse().map_err(|_| unknown())?;
        if count == 0 {
            return Err(unknown());
        }

        match target {
            "files" => Ok(Command::DeleteOldestFiles(count)),
            "items" => Ok(Command::DeleteOldestItems(count)),
            _ => Err(unknown()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ZipAllFiles => write!(f, "zip-all-files"),
            Command::DeleteAllFiles => write!(f, "delete-all-files"),
            Command::DeleteOldestFiles(n) => write!(f, "delete-{n}-files"),
            Command::DeleteOldestItems(n) => write!(f, "delete-{n}-items"),
            Command::DeleteGreyItems => write!(f, "delete-grey-items"),
        }
    }
}
