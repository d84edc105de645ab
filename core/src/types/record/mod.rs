//! Stored records shared by the message and clip collections.

use crate::types::RecordId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;

pub(crate) mod versioned;

/// File type of archives produced by the `zip-all-files` command.
pub const ZIP_FILE_TYPE: &str = "relay/zip";

/// File type of text records.
pub const TEXT_FILE_TYPE: &str = "text/plain";

const FALLBACK_FILE_TYPE: &str = "application/octet-stream";

const FILE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("js", "text/javascript"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("7z", "application/x-7z-compressed"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text is empty")]
    EmptyText,

    #[error("file name is too short")]
    FileNameTooShort,

    #[error("operation requires a {expected:?} record")]
    WrongKind { expected: RecordKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    TextContent,
    FileContent,
}

/// Derives a MIME-like type from the extension of `file_name`.
pub fn file_type_for(file_name: &str) -> &'static str {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return FALLBACK_FILE_TYPE;
    };
    let ext = ext.to_ascii_lowercase();
    FILE_TYPES
        .iter()
        .find(|&&(known, _)| known == ext)
        .map_or(FALLBACK_FILE_TYPE, |&(_, file_type)| file_type)
}

/// Hex BLAKE3 digest used for checksums and the text dedup index.
pub fn content_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Formats a timestamp as RFC 3339 (UTC, second precision).
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    kind: RecordKind,
    text: String,
    file_name: String,
    file_size: u64,
    file_type: String,
    checksum: String,
    created_at: SystemTime,
    updated_at: SystemTime,
}

impl Record {
    fn empty(id: RecordId, kind: RecordKind, now: SystemTime) -> Self {
        Self {
            id,
            kind,
            text: String::new(),
            file_name: String::new(),
            file_size: 0,
            file_type: String::new(),
            checksum: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a text record. Fails with `EmptyText` for blank input.
    pub fn text(id: RecordId, text: &str, now: SystemTime) -> Result<Self, ValidationError> {
        let mut record = Self::empty(id, RecordKind::TextContent, now);
        record.file_type = TEXT_FILE_TYPE.to_string();
        record.set_text(text)?;
        Ok(record)
    }

    /// Creates a file record with no content yet; see [`Record::set_content`].
    pub fn file(id: RecordId, file_name: &str, now: SystemTime) -> Result<Self, ValidationError> {
        let mut record = Self::empty(id, RecordKind::FileContent, now);
        record.set_file_name(file_name)?;
        Ok(record)
    }

    /// Creates the record of a bundle archive named `<base>_<id>.zip`.
    pub fn zip_archive(id: RecordId, base: &str, now: SystemTime) -> Self {
        let mut record = Self::empty(id, RecordKind::FileContent, now);
        record.file_name = format!("{base}_{}.zip", record.id);
        record.file_type = ZIP_FILE_TYPE.to_string();
        record
    }

    pub fn validate_text(text: &str) -> Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        Ok(())
    }

    pub fn validate_file_name(file_name: &str) -> Result<(), ValidationError> {
        if file_name.trim().is_empty() {
            return Err(ValidationError::FileNameTooShort);
        }
        Ok(())
    }

    /// Replaces the text; `file_size` follows its UTF-8 length.
    pub fn set_text(&mut self, text: &str) -> Result<(), ValidationError> {
        if self.kind != RecordKind::TextContent {
            return Err(ValidationError::WrongKind {
                expected: RecordKind::TextContent,
            });
        }
        Self::validate_text(text)?;
        self.text = text.to_string();
        self.file_size = text.len() as u64;
        Ok(())
    }

    /// Replaces the file name; `file_type` follows its extension.
    pub fn set_file_name(&mut self, file_name: &str) -> Result<(), ValidationError> {
        if self.kind != RecordKind::FileContent {
            return Err(ValidationError::WrongKind {
                expected: RecordKind::FileContent,
            });
        }
        Self::validate_file_name(file_name)?;
        let file_name = file_name.trim();
        self.file_name = file_name.to_string();
        self.file_type = file_type_for(file_name).to_string();
        Ok(())
    }

    /// Sets `file_size` and `checksum` from the file bytes. No-op on text records.
    pub fn set_content(&mut self, bytes: &[u8]) {
        if self.kind != RecordKind::FileContent {
            return;
        }
        self.file_size = bytes.len() as u64;
        self.checksum = content_digest(bytes);
    }

    /// Sets an externally measured size, e.g. of an archive written to disk.
    pub fn set_file_size(&mut self, file_size: u64) {
        if self.kind == RecordKind::FileContent {
            self.file_size = file_size;
        }
    }

    pub(crate) fn touch(&mut self, now: SystemTime) {
        self.updated_at = now;
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == RecordKind::FileContent
    }

    pub fn text_content(&self) -> &str {
        &self.text
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn updated_at(&self) -> SystemTime {
        self.updated_at
    }

    pub fn updated_at_iso(&self) -> String {
        format_timestamp(self.updated_at)
    }

    pub fn is_image(&self) -> bool {
        self.is_file() && self.file_type.starts_with("image/") && self.file_type != "image/svg+xml"
    }

    pub fn is_zip_archive(&self) -> bool {
        self.file_type == ZIP_FILE_TYPE
    }

    /// Digest of the text, used by the text dedup index.
    pub(crate) fn text_digest(&self) -> Option<String> {
        match self.kind {
            RecordKind::TextContent => Some(content_digest(self.text.as_bytes())),
            RecordKind::FileContent => None,
        }
    }
}

#[cfg(test)]
mod tests;
