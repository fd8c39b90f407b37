use async_trait::async_trait;
use thiserror::Error;

use super::{Drive, DriveError};
use crate::storage::models::{ActivityEvent, Node};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Sink error: {0}")]
    Sink(String),
}

/// Sink for the activity log. The drive never waits on its success.
#[async_trait]
pub trait ActivityRecorder: Send + Sync {
    async fn record(&self, event: &ActivityEvent) -> Result<(), ActivityError>;
}

/// Records activity into the same redb database as the nodes, where it
/// backs the recent feed.
pub struct DbActivityRecorder {
    db: Database,
}

impl DbActivityRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityRecorder for DbActivityRecorder {
    async fn record(&self, event: &ActivityEvent) -> Result<(), ActivityError> {
        self.db.put_activity(event)?;
        Ok(())
    }
}

/// Combined "recent" read model.
#[derive(Debug, Clone)]
pub struct RecentFeed {
    /// Most recently changed live files owned by the user
    pub files: Vec<Node>,
    /// Newest events where the user is the actor or the target
    pub activity: Vec<ActivityEvent>,
}

impl Drive {
    pub fn recent(&self, user_id: &str, limit: usize) -> Result<RecentFeed, DriveError> {
        let mut files: Vec<Node> = self
            .db
            .get_nodes_by_owner(user_id)?
            .into_iter()
            .filter(|n| !n.is_folder && !n.in_trash)
            .collect();
        files.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        files.truncate(limit);

        let activity = self.db.recent_activity(user_id, limit)?;
        Ok(RecentFeed { files, activity })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::DriveConfig;
    use crate::object_store::LocalStore;
    use crate::storage::models::ActivityKind;

    /// A sink that always fails, to show the drive shrugs it off.
    struct BrokenRecorder;

    #[async_trait]
    impl ActivityRecorder for BrokenRecorder {
        async fn record(&self, _event: &ActivityEvent) -> Result<(), ActivityError> {
            Err(ActivityError::Sink("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_recorder_failure_does_not_fail_operation() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("data")).unwrap();
        let store = LocalStore::new(dir.path().join("files")).unwrap();
        let drive = Drive::new(
            db.clone(),
            Arc::new(store),
            Arc::new(BrokenRecorder),
            DriveConfig::default(),
        );

        let folder = drive.create_folder("u1", "Docs", None).await.unwrap();
        assert_eq!(db.get_node(&folder.id).unwrap().unwrap().name, "Docs");
        assert!(db.recent_activity("u1", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_feed_includes_shares_received() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::testutil::test_state(&dir);

        let folder = state.drive.create_folder("owner", "Shared", None).await.unwrap();
        state
            .drive
            .share(
                "owner",
                &folder.id,
                "friend",
                crate::storage::models::Permission::View,
            )
            .await
            .unwrap();

        let owner_feed = state.drive.recent("owner", 10).unwrap();
        assert_eq!(owner_feed.activity.len(), 2);
        assert_eq!(owner_feed.activity[0].kind, ActivityKind::Share);
        assert_eq!(owner_feed.activity[1].kind, ActivityKind::CreateFolder);

        let friend_feed = state.drive.recent("friend", 10).unwrap();
        assert_eq!(friend_feed.activity.len(), 1);
        assert_eq!(
            friend_feed.activity[0].target_user_id.as_deref(),
            Some("friend")
        );
        assert!(friend_feed.files.is_empty());
    }
}
