//! Database layer for relay storage.
//!
//! This module handles all redb operations including:
//! - Two record collections (messages, clips) with their indexes
//! - The id counters and the capacity ledger (metadata JSON strings)
//! - Age queries backing the grey/expired lifecycle

use crate::core::db::collection::{Collection, Index};
use crate::core::db::error::DatabaseError;
use crate::types::{
    Config, IncreaseId, LifecyclePolicy, Record, RecordId, RecordKind, content_digest, year_of,
};
use redb::{ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::SystemTime;
use tracing::{debug, warn};

pub mod error {
    use crate::types::ValidationError;
    use std::fmt;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum DatabaseError {
        #[error("Database error: {0}")]
        Redb(#[from] redb::DatabaseError),

        #[error("Table error: {0}")]
        TableError(#[from] redb::TableError),

        #[error("Storage error: {0}")]
        StorageError(#[from] redb::StorageError),

        #[error("Transaction error: {0}")]
        TransactionError(#[from] redb::TransactionError),

        #[error("Commit error: {0}")]
        CommitError(#[from] redb::CommitError),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Metadata error: {0}")]
        Metadata(#[from] serde_json::Error),

        #[error(transparent)]
        Validation(#[from] ValidationError),

        #[error("Record not found")]
        NotFound,

        #[error("{0} already exists")]
        Collision(CollisionField),

        #[error("Capacity exceeded: {needed} bytes needed, {available} bytes available")]
        CapacityExceeded { needed: u64, available: u64 },

        #[error("Corrupt metadata: {0}")]
        CorruptMetadata(String),
    }

    /// Which unique field an insert collided on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CollisionField {
        Id,
        FileName,
        Checksum,
        Text,
    }

    impl fmt::Display for CollisionField {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let name = match self {
                CollisionField::Id => "Id",
                CollisionField::FileName => "File name",
                CollisionField::Checksum => "Checksum",
                CollisionField::Text => "Text",
            };
            f.write_str(name)
        }
    }
}

mod age_table;
mod collection;

/// Metadata table: &str → JSON string
const METADATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("metadata");

/// Metadata key for the capacity ledger.
const METADATA_KEY_TOTAL_SIZE: &str = "total_size";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Messages,
    Clips,
}

/// Result of storing content that may already exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A new record was created. `evicted` lists clips dropped by the ring buffer.
    Stored {
        record: Record,
        evicted: Vec<RecordId>,
    },
    /// Identical content was already stored; only its `updated_at` moved.
    Refreshed(Record),
}

impl Submission {
    pub fn record(&self) -> &Record {
        match self {
            Submission::Stored { record, .. } | Submission::Refreshed(record) => record,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Submission::Stored { record, .. } | Submission::Refreshed(record) => record,
        }
    }
}

/// The main database struct wrapping redb.
pub struct Database {
    db: redb::Database,
    messages: Collection,
    clips: Collection,
    capacity: u64,
    lifecycle: LifecyclePolicy,
}

impl Database {
    /// Creates or opens a database using paths and settings from the config.
    pub fn new(config: &Config) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(&config.base_path)?;

        let db = redb::Database::create(config.db_path())?;
        let messages = Collection::messages();
        let clips = Collection::clips(config.saved.clips_limit);
        let now = SystemTime::now();

        // Initialize tables and metadata slots
        let write_txn = db.begin_write()?;
        {
            messages.init(&write_txn)?;
            clips.init(&write_txn)?;

            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            for slot in [messages.id_slot, clips.id_slot] {
                if meta_table.get(slot)?.is_none() {
                    let json = serde_json::to_string(&IncreaseId::first(now))?;
                    meta_table.insert(slot, json.as_str())?;
                }
            }
            if meta_table.get(METADATA_KEY_TOTAL_SIZE)?.is_none() {
                meta_table.insert(METADATA_KEY_TOTAL_SIZE, "0")?;
            }
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            messages,
            clips,
            capacity: config.saved.capacity_bytes,
            lifecycle: config.saved.lifecycle(),
        })
    }

    fn collection(&self, kind: CollectionKind) -> &Collection {
        match kind {
            CollectionKind::Messages => &self.messages,
            CollectionKind::Clips => &self.clips,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn lifecycle(&self) -> LifecyclePolicy {
        self.lifecycle
    }
}

/// Id operations.
impl Database {
    /// Issues the next id of a collection and persists the counter.
    pub fn next_id(
        &self,
        kind: CollectionKind,
        now: SystemTime,
    ) -> Result<IncreaseId, DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let id = Self::allocate_id(&write_txn, self.collection(kind), now)?;
        write_txn.commit()?;
        Ok(id)
    }

    /// Last issued id of a collection (count 0 before the first one).
    pub fn current_id(&self, kind: CollectionKind) -> Result<IncreaseId, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(METADATA_TABLE)?;
        let slot = self.collection(kind).id_slot;
        read_json(&table, slot)?.ok_or_else(|| missing_slot(slot))
    }
}

/// Create operations.
impl Database {
    /// Inserts a record built by the caller.
    ///
    /// A text record whose content is already stored refreshes the stored
    /// record to the new record's `updated_at` instead.
    /// Returns `Err(Collision)` or `Err(CapacityExceeded)` without writing.
    pub fn insert(
        &self,
        kind: CollectionKind,
        record: &Record,
    ) -> Result<Submission, DatabaseError> {
        let collection = self.collection(kind);
        let write_txn = self.db.begin_write()?;

        let existing = match record.text_digest() {
            Some(digest) => collection.find_id(&write_txn, Index::Text, &digest)?,
            None => None,
        };
        let submission = match existing {
            Some(existing) => Submission::Refreshed(collection.touch(
                &write_txn,
                &existing,
                record.updated_at(),
            )?),
            None => {
                let evicted = self.insert_in(&write_txn, kind, record)?;
                Submission::Stored {
                    record: record.clone(),
                    evicted,
                }
            }
        };

        write_txn.commit()?;
        Ok(submission)
    }

    /// Stores `text`, or refreshes the record that already holds it.
    ///
    /// Dedup lookup, id allocation and insert share one transaction, so a
    /// duplicate never consumes an id.
    pub fn submit_text(
        &self,
        kind: CollectionKind,
        text: &str,
        now: SystemTime,
    ) -> Result<Submission, DatabaseError> {
        Record::validate_text(text)?;
        let collection = self.collection(kind);
        let write_txn = self.db.begin_write()?;

        let digest = content_digest(text.as_bytes());
        let submission = match collection.find_id(&write_txn, Index::Text, &digest)? {
            Some(existing) => Submission::Refreshed(collection.touch(&write_txn, &existing, now)?),
            None => {
                let id = Self::allocate_id(&write_txn, collection, now)?;
                let record = Record::text(id.to_record_id(), text, now)?;
                let evicted = self.insert_in(&write_txn, kind, &record)?;
                Submission::Stored { record, evicted }
            }
        };

        write_txn.commit()?;
        Ok(submission)
    }

    /// Stores a new file message, or refreshes the one with the same checksum.
    ///
    /// Returns `Err(Collision(FileName))` if another file already uses the name.
    pub fn submit_file(
        &self,
        file_name: &str,
        bytes: &[u8],
        now: SystemTime,
    ) -> Result<Submission, DatabaseError> {
        Record::validate_file_name(file_name)?;
        let write_txn = self.db.begin_write()?;

        let checksum = content_digest(bytes);
        let submission = match self
            .messages
            .find_id(&write_txn, Index::Checksum, &checksum)?
        {
            Some(existing) => {
                Submission::Refreshed(self.messages.touch(&write_txn, &existing, now)?)
            }
            None => {
                let id = Self::allocate_id(&write_txn, &self.messages, now)?;
                let mut record = Record::file(id.to_record_id(), file_name, now)?;
                record.set_content(bytes);
                let evicted = self.insert_in(&write_txn, CollectionKind::Messages, &record)?;
                Submission::Stored { record, evicted }
            }
        };

        write_txn.commit()?;
        Ok(submission)
    }
}

/// Read operations.
impl Database {
    pub fn get(
        &self,
        kind: CollectionKind,
        id: &RecordId,
    ) -> Result<Option<Record>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        self.collection(kind).get(&read_txn, id)
    }

    pub fn find_by_text(
        &self,
        kind: CollectionKind,
        text: &str,
    ) -> Result<Option<Record>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        self.collection(kind).find_text(&read_txn, text)
    }

    pub fn find_by_checksum(
        &self,
        kind: CollectionKind,
        checksum: &str,
    ) -> Result<Option<Record>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        self.collection(kind)
            .find(&read_txn, Index::Checksum, checksum)
    }

    pub fn find_by_file_name(
        &self,
        kind: CollectionKind,
        file_name: &str,
    ) -> Result<Option<Record>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        self.collection(kind)
            .find(&read_txn, Index::FileName, file_name)
    }

    /// Every record, oldest `updated_at` first.
    pub fn all_by_updated_at(&self, kind: CollectionKind) -> Result<Vec<Record>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        self.collection(kind).ordered(&read_txn)
    }

    /// Every file message, oldest first.
    pub fn all_files(&self) -> Result<Vec<Record>, DatabaseError> {
        let mut files = self.all_by_updated_at(CollectionKind::Messages)?;
        files.retain(Record::is_file);
        Ok(files)
    }

    /// The `n` oldest records, optionally only of one kind.
    pub fn oldest(
        &self,
        kind: CollectionKind,
        filter: Option<RecordKind>,
        n: usize,
    ) -> Result<Vec<Record>, DatabaseError> {
        let records = self.all_by_updated_at(kind)?;
        Ok(records
            .into_iter()
            .filter(|record| filter.is_none_or(|kind| record.kind() == kind))
            .take(n)
            .collect())
    }

    /// Messages in the sweep scope that are at least grey.
    pub fn find_grey(&self, now: SystemTime) -> Result<Vec<Record>, DatabaseError> {
        self.older_messages(self.lifecycle.grey_cutoff(now))
    }

    /// Messages in the sweep scope that are expired.
    pub fn find_expired(&self, now: SystemTime) -> Result<Vec<Record>, DatabaseError> {
        self.older_messages(self.lifecycle.expire_cutoff(now))
    }

    fn older_messages(&self, cutoff: Option<SystemTime>) -> Result<Vec<Record>, DatabaseError> {
        let Some(cutoff) = cutoff else {
            return Ok(vec![]);
        };
        let read_txn = self.db.begin_read()?;
        let mut records = self.messages.older_than(&read_txn, cutoff)?;
        records.retain(|record| self.lifecycle.scope.includes(record.kind()));
        Ok(records)
    }

    /// Most recently updated text record.
    pub fn last_text(&self, kind: CollectionKind) -> Result<Option<Record>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        self.collection(kind)
            .newest(&read_txn, RecordKind::TextContent)
    }

    pub fn count(&self, kind: CollectionKind) -> Result<u64, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        self.collection(kind).count(&read_txn)
    }

    /// Current value of the capacity ledger.
    pub fn total_size(&self) -> Result<u64, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(METADATA_TABLE)?;
        read_json(&table, METADATA_KEY_TOTAL_SIZE)?
            .ok_or_else(|| missing_slot(METADATA_KEY_TOTAL_SIZE))
    }
}

/// Update operations.
impl Database {
    /// Updates `updated_at` only.
    ///
    /// Returns `Err(NotFound)` if the record doesn't exist.
    pub fn touch(
        &self,
        kind: CollectionKind,
        id: &RecordId,
        now: SystemTime,
    ) -> Result<Record, DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let record = self.collection(kind).touch(&write_txn, id, now)?;
        write_txn.commit()?;
        Ok(record)
    }
}

/// Delete operations.
impl Database {
    /// Deletes one record and returns it.
    ///
    /// Returns `Err(NotFound)` if the record doesn't exist.
    pub fn delete(&self, kind: CollectionKind, id: &RecordId) -> Result<Record, DatabaseError> {
        let collection = self.collection(kind);
        let write_txn = self.db.begin_write()?;

        let record = collection
            .remove(&write_txn, id)?
            .ok_or(DatabaseError::NotFound)?;

        if collection.capacity_tracked {
            Self::release(&write_txn, collection, record.file_size())?;
        }

        write_txn.commit()?;
        Ok(record)
    }

    /// Deletes every listed record that exists and recounts the ledger.
    ///
    /// Returns exactly the ids that were removed.
    pub fn delete_many(
        &self,
        kind: CollectionKind,
        ids: &[RecordId],
    ) -> Result<Vec<RecordId>, DatabaseError> {
        let collection = self.collection(kind);
        let write_txn = self.db.begin_write()?;

        let removed = collection.remove_many(&write_txn, ids)?;
        if collection.capacity_tracked {
            Self::recount_in(&write_txn, collection)?;
        }

        write_txn.commit()?;
        Ok(removed)
    }

    /// Deletes every file message and recounts the ledger.
    pub fn delete_all_files(&self) -> Result<Vec<RecordId>, DatabaseError> {
        self.delete_all_of(CollectionKind::Messages, Some(RecordKind::FileContent))
    }

    /// Deletes every record of a collection.
    pub fn delete_all(&self, kind: CollectionKind) -> Result<Vec<RecordId>, DatabaseError> {
        self.delete_all_of(kind, None)
    }

    fn delete_all_of(
        &self,
        kind: CollectionKind,
        filter: Option<RecordKind>,
    ) -> Result<Vec<RecordId>, DatabaseError> {
        let collection = self.collection(kind);
        let write_txn = self.db.begin_write()?;

        let ids = collection.select_oldest(&write_txn, filter, None)?;
        let removed = collection.remove_many(&write_txn, &ids)?;
        if collection.capacity_tracked {
            Self::recount_in(&write_txn, collection)?;
        }

        write_txn.commit()?;
        Ok(removed)
    }

    /// Recomputes the ledger from the stored message sizes.
    pub fn recount(&self) -> Result<u64, DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let total = Self::recount_in(&write_txn, &self.messages)?;
        write_txn.commit()?;
        Ok(total)
    }
}

/// Transaction helpers.
impl Database {
    fn allocate_id(
        txn: &WriteTransaction,
        collection: &Collection,
        now: SystemTime,
    ) -> Result<IncreaseId, DatabaseError> {
        let slot = collection.id_slot;
        let mut meta_table = txn.open_table(METADATA_TABLE)?;

        let current: IncreaseId = read_json(&meta_table, slot)?.ok_or_else(|| missing_slot(slot))?;
        let next = current.increase(year_of(now));

        let json = serde_json::to_string(&next)?;
        meta_table.insert(slot, json.as_str())?;

        debug!(slot, id = %next, "allocated id");
        Ok(next)
    }

    fn insert_in(
        &self,
        txn: &WriteTransaction,
        kind: CollectionKind,
        record: &Record,
    ) -> Result<Vec<RecordId>, DatabaseError> {
        let collection = self.collection(kind);

        collection.insert(txn, record)?;
        if collection.capacity_tracked {
            Self::reserve(txn, record.file_size(), self.capacity)?;
        }

        let evicted = collection.evict_overflow(txn)?;
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted oldest records over the limit");
        }
        Ok(evicted)
    }

    fn reserve(txn: &WriteTransaction, size: u64, capacity: u64) -> Result<u64, DatabaseError> {
        let meta_table = txn.open_table(METADATA_TABLE)?;
        let total: u64 = read_json(&meta_table, METADATA_KEY_TOTAL_SIZE)?
            .ok_or_else(|| missing_slot(METADATA_KEY_TOTAL_SIZE))?;

        let new_total = total.saturating_add(size);
        if new_total > capacity {
            return Err(DatabaseError::CapacityExceeded {
                needed: size,
                available: capacity.saturating_sub(total),
            });
        }

        drop(meta_table);

        write_json(txn, METADATA_KEY_TOTAL_SIZE, &new_total)?;
        Ok(new_total)
    }

    fn release(
        txn: &WriteTransaction,
        collection: &Collection,
        size: u64,
    ) -> Result<u64, DatabaseError> {
        let total: u64 = {
            let meta_table = txn.open_table(METADATA_TABLE)?;
            read_json(&meta_table, METADATA_KEY_TOTAL_SIZE)?
                .ok_or_else(|| missing_slot(METADATA_KEY_TOTAL_SIZE))?
        };

        let Some(new_total) = total.checked_sub(size) else {
            warn!(total, size, "ledger underflow, recounting");
            return Self::recount_in(txn, collection);
        };

        write_json(txn, METADATA_KEY_TOTAL_SIZE, &new_total)?;
        Ok(new_total)
    }

    fn recount_in(txn: &WriteTransaction, collection: &Collection) -> Result<u64, DatabaseError> {
        let total = collection.sum_sizes(txn)?;
        write_json(txn, METADATA_KEY_TOTAL_SIZE, &total)?;
        Ok(total)
    }
}

fn read_json<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static str>,
    key: &str,
) -> Result<Option<T>, DatabaseError> {
    match table.get(key)? {
        None => Ok(None),
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
    }
}

fn missing_slot(slot: &str) -> DatabaseError {
    DatabaseError::CorruptMetadata(format!("missing metadata slot {slot:?}"))
}

fn write_json<T: Serialize>(
    txn: &WriteTransaction,
    key: &str,
    value: &T,
) -> Result<(), DatabaseError> {
    let json = serde_json::to_string(value)?;
    let mut table = txn.open_table(METADATA_TABLE)?;
    table.insert(key, json.as_str())?;
    Ok(())
}
