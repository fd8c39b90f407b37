use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::QuotaRecord;
use super::tables::QUOTAS;

impl Database {
    /// Store the latest usage snapshot for an account
    pub fn put_quota(&self, record: &QuotaRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(QUOTAS)?;
            let data = rmp_serde::to_vec_named(record)?;
            table.insert(record.owner_id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get the last stored usage snapshot for an account
    pub fn get_quota(&self, owner_id: &str) -> Result<Option<QuotaRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(QUOTAS)?;

        let record = match table.get(owner_id)? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        Ok(record)
    }
}
