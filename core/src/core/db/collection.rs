//! One bounded, aged record collection and its secondary indexes.
//!
//! Tables per collection `<c>`:
//! - `<c>`: RecordId → VersionedRecord
//! - `<c>_by_updated`: AgeKey → ()
//! - `<c>_by_file_name`, `<c>_by_checksum`, `<c>_by_text`: &str → RecordId
//!
//! Every method works inside a caller-supplied transaction so a logical
//! operation commits or aborts as a whole.

use crate::core::db::age_table::{AgeTable, ids_oldest_first, ids_older_than};
use crate::core::db::error::{CollisionField, DatabaseError};
use crate::types::record::versioned::VersionedRecord;
use crate::types::{AgeKey, Record, RecordId, RecordKind, content_digest};
use redb::{
    ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction,
};
use std::time::SystemTime;

type IndexDefinition = TableDefinition<'static, &'static str, RecordId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    FileName,
    Checksum,
    Text,
}

pub struct Collection {
    records: TableDefinition<'static, RecordId, VersionedRecord>,
    by_updated: AgeTable,
    by_file_name: IndexDefinition,
    by_checksum: IndexDefinition,
    by_text: IndexDefinition,
    /// Metadata key holding this collection's current `IncreaseId`.
    pub id_slot: &'static str,
    /// Whether record sizes count against the capacity ledger.
    pub capacity_tracked: bool,
    pub max_count: Option<usize>,
}

impl Collection {
    pub fn messages() -> Self {
        Self {
            records: TableDefinition::new("messages"),
            by_updated: AgeTable::new("messages_by_updated"),
            by_file_name: TableDefinition::new("messages_by_file_name"),
            by_checksum: TableDefinition::new("messages_by_checksum"),
            by_text: TableDefinition::new("messages_by_text"),
            id_slot: "current_id",
            capacity_tracked: true,
            max_count: None,
        }
    }

    pub fn clips(limit: usize) -> Self {
        Self {
            records: TableDefinition::new("clips"),
            by_updated: AgeTable::new("clips_by_updated"),
            by_file_name: TableDefinition::new("clips_by_file_name"),
            by_checksum: TableDefinition::new("clips_by_checksum"),
            by_text: TableDefinition::new("clips_by_text"),
            id_slot: "current_clip_id",
            capacity_tracked: false,
            max_count: Some(limit),
        }
    }

    fn index(&self, index: Index) -> IndexDefinition {
        match index {
            Index::FileName => self.by_file_name,
            Index::Checksum => self.by_checksum,
            Index::Text => self.by_text,
        }
    }

    /// Index entries a record occupies. Empty checksums are not indexed.
    fn index_entries(record: &Record) -> Vec<(Index, String)> {
        let mut entries = Vec::new();
        if record.is_file() {
            entries.push((Index::FileName, record.file_name().to_string()));
        }
        if !record.checksum().is_empty() {
            entries.push((Index::Checksum, record.checksum().to_string()));
        }
        if let Some(digest) = record.text_digest() {
            entries.push((Index::Text, digest));
        }
        entries
    }

    pub fn init(&self, txn: &WriteTransaction) -> Result<(), DatabaseError> {
        txn.open_table(self.records)?;
        self.by_updated.init(txn)?;
        txn.open_table(self.by_file_name)?;
        txn.open_table(self.by_checksum)?;
        txn.open_table(self.by_text)?;
        Ok(())
    }
}

fn load(
    records: &impl ReadableTable<RecordId, VersionedRecord>,
    id: &RecordId,
) -> Result<Option<Record>, DatabaseError> {
    Ok(records.get(id)?.map(|guard| guard.value().into_latest()))
}

fn load_all(
    records: &impl ReadableTable<RecordId, VersionedRecord>,
    ids: Vec<RecordId>,
) -> Result<Vec<Record>, DatabaseError> {
    let mut loaded = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(record) = load(records, &id)? {
            loaded.push(record);
        }
    }
    Ok(loaded)
}

/// Read operations.
impl Collection {
    pub fn get(
        &self,
        txn: &ReadTransaction,
        id: &RecordId,
    ) -> Result<Option<Record>, DatabaseError> {
        let records = txn.open_table(self.records)?;
        load(&records, id)
    }

    pub fn find(
        &self,
        txn: &ReadTransaction,
        index: Index,
        value: &str,
    ) -> Result<Option<Record>, DatabaseError> {
        if value.is_empty() {
            return Ok(None);
        }
        let index_table = txn.open_table(self.index(index))?;
        let Some(id) = index_table.get(value)?.map(|guard| guard.value()) else {
            return Ok(None);
        };
        let records = txn.open_table(self.records)?;
        load(&records, &id)
    }

    pub fn find_text(
        &self,
        txn: &ReadTransaction,
        text: &str,
    ) -> Result<Option<Record>, DatabaseError> {
        self.find(txn, Index::Text, &content_digest(text.as_bytes()))
    }

    /// All records, oldest `updated_at` first.
    pub fn ordered(&self, txn: &ReadTransaction) -> Result<Vec<Record>, DatabaseError> {
        let by_updated = txn.open_table(self.by_updated.definition())?;
        let records = txn.open_table(self.records)?;
        load_all(&records, ids_oldest_first(&by_updated)?)
    }

    /// Records with `updated_at < cutoff`, oldest first.
    pub fn older_than(
        &self,
        txn: &ReadTransaction,
        cutoff: SystemTime,
    ) -> Result<Vec<Record>, DatabaseError> {
        let by_updated = txn.open_table(self.by_updated.definition())?;
        let records = txn.open_table(self.records)?;
        load_all(&records, ids_older_than(&by_updated, cutoff)?)
    }

    /// Most recently updated record of `kind`.
    pub fn newest(
        &self,
        txn: &ReadTransaction,
        kind: RecordKind,
    ) -> Result<Option<Record>, DatabaseError> {
        let by_updated = txn.open_table(self.by_updated.definition())?;
        let records = txn.open_table(self.records)?;

        for entry in by_updated.iter()?.rev() {
            let (key_guard, _) = entry?;
            if let Some(record) = load(&records, &key_guard.value().id)?
                && record.kind() == kind
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn count(&self, txn: &ReadTransaction) -> Result<u64, DatabaseError> {
        let records = txn.open_table(self.records)?;
        Ok(records.len()?)
    }
}

/// Write operations.
impl Collection {
    /// Id indexed under `value`, seen from inside a write transaction.
    pub fn find_id(
        &self,
        txn: &WriteTransaction,
        index: Index,
        value: &str,
    ) -> Result<Option<RecordId>, DatabaseError> {
        if value.is_empty() {
            return Ok(None);
        }
        let index_table = txn.open_table(self.index(index))?;
        let id = index_table.get(value)?.map(|guard| guard.value());
        Ok(id)
    }

    /// Inserts a record and its index entries.
    ///
    /// Returns `Err(Collision)` without writing anything if the id, file name,
    /// checksum or text is already present.
    pub fn insert(&self, txn: &WriteTransaction, record: &Record) -> Result<(), DatabaseError> {
        let entries = Self::index_entries(record);

        {
            let records = txn.open_table(self.records)?;
            if records.get(record.id())?.is_some() {
                return Err(DatabaseError::Collision(CollisionField::Id));
            }
        }

        for (index, value) in &entries {
            let index_table = txn.open_table(self.index(*index))?;
            if index_table.get(value.as_str())?.is_some() {
                return Err(DatabaseError::Collision(CollisionField::from(*index)));
            }
        }

        {
            let mut records = txn.open_table(self.records)?;
            records.insert(record.id(), &VersionedRecord::V1(record.clone()))?;
        }

        for (index, value) in &entries {
            let mut index_table = txn.open_table(self.index(*index))?;
            index_table.insert(value.as_str(), record.id())?;
        }

        self.by_updated.insert(
            txn,
            &AgeKey {
                updated_at: record.updated_at(),
                id: record.id().clone(),
            },
        )?;

        Ok(())
    }

    /// Removes a record and its index entries. Returns `None` if absent.
    pub fn remove(
        &self,
        txn: &WriteTransaction,
        id: &RecordId,
    ) -> Result<Option<Record>, DatabaseError> {
        let removed = {
            let mut records = txn.open_table(self.records)?;
            let removed = records.remove(id)?.map(|guard| guard.value().into_latest());
            removed
        };

        let Some(record) = removed else {
            return Ok(None);
        };

        for (index, value) in Self::index_entries(&record) {
            let mut index_table = txn.open_table(self.index(index))?;
            index_table.remove(value.as_str())?;
        }

        self.by_updated.remove(
            txn,
            &AgeKey {
                updated_at: record.updated_at(),
                id: id.clone(),
            },
        )?;

        Ok(Some(record))
    }

    /// Moves a record's `updated_at` to `now`.
    ///
    /// Returns `Err(NotFound)` if the record doesn't exist.
    pub fn touch(
        &self,
        txn: &WriteTransaction,
        id: &RecordId,
        now: SystemTime,
    ) -> Result<Record, DatabaseError> {
        let mut record = {
            let records = txn.open_table(self.records)?;
            load(&records, id)?.ok_or(DatabaseError::NotFound)?
        };

        self.by_updated.remove(
            txn,
            &AgeKey {
                updated_at: record.updated_at(),
                id: id.clone(),
            },
        )?;
        record.touch(now);
        self.by_updated.insert(
            txn,
            &AgeKey {
                updated_at: now,
                id: id.clone(),
            },
        )?;

        let mut records = txn.open_table(self.records)?;
        records.insert(id, &VersionedRecord::V1(record.clone()))?;
        Ok(record)
    }

    /// Oldest ids, optionally restricted to one kind and capped at `limit`.
    pub fn select_oldest(
        &self,
        txn: &WriteTransaction,
        kind: Option<RecordKind>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordId>, DatabaseError> {
        let by_updated = txn.open_table(self.by_updated.definition())?;
        let records = txn.open_table(self.records)?;
        let mut selected = Vec::new();

        for id in ids_oldest_first(&by_updated)? {
            if limit.is_some_and(|limit| selected.len() >= limit) {
                break;
            }
            if let Some(kind) = kind {
                match load(&records, &id)? {
                    Some(record) if record.kind() == kind => {}
                    _ => continue,
                }
            }
            selected.push(id);
        }

        Ok(selected)
    }

    /// Removes every listed id that exists; returns the ids actually removed.
    pub fn remove_many(
        &self,
        txn: &WriteTransaction,
        ids: &[RecordId],
    ) -> Result<Vec<RecordId>, DatabaseError> {
        let mut removed = Vec::new();
        for id in ids {
            if self.remove(txn, id)?.is_some() {
                removed.push(id.clone());
            }
        }
        Ok(removed)
    }

    /// Drops the oldest records beyond `max_count`. Recomputed from the
    /// current row count on every call.
    pub fn evict_overflow(&self, txn: &WriteTransaction) -> Result<Vec<RecordId>, DatabaseError> {
        let Some(max_count) = self.max_count else {
            return Ok(vec![]);
        };

        let count = {
            let records = txn.open_table(self.records)?;
            usize::try_from(records.len()?).unwrap_or(usize::MAX)
        };
        if count <= max_count {
            return Ok(vec![]);
        }

        let overflow = self.select_oldest(txn, None, Some(count - max_count))?;
        self.remove_many(txn, &overflow)
    }

    /// Σ `file_size` over every record.
    pub fn sum_sizes(&self, txn: &WriteTransaction) -> Result<u64, DatabaseError> {
        let records = txn.open_table(self.records)?;
        let mut total = 0u64;
        for entry in records.iter()? {
            let (_, value_guard) = entry?;
            total += value_guard.value().into_latest().file_size();
        }
        Ok(total)
    }
}

impl From<Index> for CollisionField {
    fn from(index: Index) -> Self {
        match index {
            Index::FileName => CollisionField::FileName,
            Index::Checksum => CollisionField::Checksum,
            Index::Text => CollisionField::Text,
        }
    }
}
