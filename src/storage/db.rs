use redb::{
    Database as RedbDatabase, ReadTransaction, ReadableTable, Table, TableDefinition,
    WriteTransaction,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub nodes: u64,
    pub activities: u64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("drive-store.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        // Initialize application tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(NODES)?;
            let _ = write_txn.open_table(OWNER_NODES)?;
            let _ = write_txn.open_table(PUBLIC_LINKS)?;
            let _ = write_txn.open_table(PATH_REFS)?;
            let _ = write_txn.open_table(SHARED_NODES)?;
            let _ = write_txn.open_table(QUOTAS)?;
            let _ = write_txn.open_table(ACTIVITIES)?;
            let _ = write_txn.open_table(USER_ACTIVITIES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Purge all data - for testing only
    pub fn purge_all(&self) -> Result<PurgeStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        let stats = PurgeStats {
            nodes: clear_table(&write_txn, NODES)?,
            activities: clear_table(&write_txn, ACTIVITIES)?,
        };
        clear_table(&write_txn, OWNER_NODES)?;
        clear_table(&write_txn, PUBLIC_LINKS)?;
        clear_table(&write_txn, PATH_REFS)?;
        clear_table(&write_txn, SHARED_NODES)?;
        clear_table(&write_txn, QUOTAS)?;
        clear_table(&write_txn, USER_ACTIVITIES)?;
        write_txn.commit()?;
        Ok(stats)
    }
}

fn clear_table<V: redb::Value + 'static>(
    txn: &WriteTransaction,
    definition: TableDefinition<&'static str, V>,
) -> Result<u64, DatabaseError> {
    let mut table = txn.open_table(definition)?;
    let keys: Vec<String> = table
        .iter()?
        .map(|r| r.map(|(k, _)| k.value().to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    for key in &keys {
        table.remove(key.as_str())?;
    }
    Ok(keys.len() as u64)
}

// ============================================================================
// Id-list indexes (owner -> nodes, recipient -> nodes, user -> activities)
// ============================================================================

pub(super) fn load_ids(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> Result<Vec<String>, DatabaseError> {
    match table.get(key)? {
        Some(data) => Ok(rmp_serde::from_slice(data.value())?),
        None => Ok(Vec::new()),
    }
}

pub(super) fn index_add(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids = load_ids(&*table, key)?;
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}

pub(super) fn index_remove(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids = load_ids(&*table, key)?;
    let before = ids.len();
    ids.retain(|existing| existing != id);
    if ids.len() == before {
        return Ok(());
    }
    if ids.is_empty() {
        table.remove(key)?;
    } else {
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}
