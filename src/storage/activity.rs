use redb::ReadableTable;

use super::db::{index_add, load_ids, Database, DatabaseError};
use super::models::ActivityEvent;
use super::tables::{ACTIVITIES, USER_ACTIVITIES};

impl Database {
    /// Append an event and index it under its actor and, if present, its target
    pub fn put_activity(&self, event: &ActivityEvent) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(ACTIVITIES)?;
            let data = rmp_serde::to_vec_named(event)?;
            table.insert(event.id.as_str(), data.as_slice())?;

            let mut user_table = write_txn.open_table(USER_ACTIVITIES)?;
            index_add(&mut user_table, &event.user_id, &event.id)?;
            if let Some(ref target) = event.target_user_id {
                if *target != event.user_id {
                    index_add(&mut user_table, target, &event.id)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Newest events where `user_id` is the actor or the target, at most `limit`.
    pub fn recent_activity(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let user_table = read_txn.open_table(USER_ACTIVITIES)?;
        let table = read_txn.open_table(ACTIVITIES)?;

        let mut events = Vec::new();
        for id in load_ids(&user_table, user_id)?.iter().rev() {
            if events.len() >= limit {
                break;
            }
            if let Some(data) = table.get(id.as_str())? {
                let event: ActivityEvent = rmp_serde::from_slice(data.value())?;
                events.push(event);
            }
        }
        Ok(events)
    }
}
