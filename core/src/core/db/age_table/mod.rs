use crate::core::db::error::DatabaseError;
use crate::types::{AgeKey, RecordId};
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use std::time::SystemTime;

/// Stores `AgeKey { updated_at, id }` entries so a collection can be scanned
/// oldest-first and cut at an age threshold without touching the records.
#[derive(Clone, Copy)]
pub struct AgeTable {
    definition: TableDefinition<'static, AgeKey, ()>,
}

impl AgeTable {
    pub const fn new(name: &'static str) -> Self {
        Self {
            definition: TableDefinition::new(name),
        }
    }

    pub fn init(&self, txn: &WriteTransaction) -> Result<(), DatabaseError> {
        txn.open_table(self.definition)?;
        Ok(())
    }

    pub fn definition(&self) -> TableDefinition<'static, AgeKey, ()> {
        self.definition
    }

    pub fn insert(&self, txn: &WriteTransaction, key: &AgeKey) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(self.definition)?;
        table.insert(key, &())?;
        Ok(())
    }

    /// Returns `true` if the key was present.
    pub fn remove(&self, txn: &WriteTransaction, key: &AgeKey) -> Result<bool, DatabaseError> {
        let mut table = txn.open_table(self.definition)?;
        Ok(table.remove(key)?.is_some())
    }
}

/// Ids with `updated_at < cutoff`, oldest first.
pub fn ids_older_than(
    table: &impl ReadableTable<AgeKey, ()>,
    cutoff: SystemTime,
) -> Result<Vec<RecordId>, DatabaseError> {
    table
        .range(..AgeKey::floor(cutoff))?
        .map(|entry| {
            let (key_guard, _) = entry?;
            Ok(key_guard.value().id)
        })
        .collect()
}

/// Every id, oldest first.
pub fn ids_oldest_first(
    table: &impl ReadableTable<AgeKey, ()>,
) -> Result<Vec<RecordId>, DatabaseError> {
    let mut ids = Vec::new();

    for entry in table.iter()? {
        let (key_guard, _) = entry?;
        ids.push(key_guard.value().id);
    }

    Ok(ids)
}

#[cfg(test)]
mod tests;
