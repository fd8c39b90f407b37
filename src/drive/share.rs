use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::info;

use super::{Drive, DriveError};
use crate::storage::models::{ActivityEvent, ActivityKind, Node, Permission, ShareEntry};

const PUBLIC_TOKEN_BYTES: usize = 24;

impl Drive {
    /// Grant `target_user_id` access to a node, or change the permission of an
    /// existing grant. A node holds at most one entry per recipient.
    pub async fn share(
        &self,
        owner_id: &str,
        node_id: &str,
        target_user_id: &str,
        permission: Permission,
    ) -> Result<Node, DriveError> {
        let target_user_id = target_user_id.trim();
        if target_user_id.is_empty() {
            return Err(DriveError::Validation("Recipient cannot be empty".to_string()));
        }
        if target_user_id == owner_id {
            return Err(DriveError::Validation(
                "Cannot share an item with its owner".to_string(),
            ));
        }
        let node = self.owned_node(owner_id, node_id)?;
        if node.in_trash {
            return Err(DriveError::Validation(
                "Cannot share an item in the trash".to_string(),
            ));
        }

        let updated = self
            .db
            .update_node(node_id, |n| {
                match n.shared_with.iter_mut().find(|s| s.user_id == target_user_id) {
                    Some(entry) => entry.permission = permission,
                    None => n.shared_with.push(ShareEntry {
                        user_id: target_user_id.to_string(),
                        permission,
                        shared_at: Utc::now(),
                    }),
                }
            })?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;

        info!(node_id = %node_id, recipient = %target_user_id, ?permission, "Shared node");
        self.record(
            ActivityEvent::for_node(ActivityKind::Share, owner_id, &updated)
                .with_target(target_user_id)
                .with_details(format!("{permission:?}").to_lowercase()),
        )
        .await;
        Ok(updated)
    }

    /// Withdraw a recipient's access. Unknown recipients are ignored.
    pub async fn unshare(
        &self,
        owner_id: &str,
        node_id: &str,
        target_user_id: &str,
    ) -> Result<Node, DriveError> {
        let node = self.owned_node(owner_id, node_id)?;
        if !node.shared_with.iter().any(|s| s.user_id == target_user_id) {
            return Ok(node);
        }

        let updated = self
            .db
            .update_node(node_id, |n| n.shared_with.retain(|s| s.user_id != target_user_id))?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;

        info!(node_id = %node_id, recipient = %target_user_id, "Unshared node");
        self.record(
            ActivityEvent::for_node(ActivityKind::Unshare, owner_id, &updated)
                .with_target(target_user_id),
        )
        .await;
        Ok(updated)
    }

    /// Publish a file under an unguessable token and return the token.
    /// Publishing an already public file returns its existing token.
    pub async fn make_public(&self, owner_id: &str, node_id: &str) -> Result<String, DriveError> {
        let node = self.owned_node(owner_id, node_id)?;
        if node.is_folder {
            return Err(DriveError::Validation(
                "Only files can have a public link".to_string(),
            ));
        }
        if node.in_trash {
            return Err(DriveError::Validation(
                "Cannot publish an item in the trash".to_string(),
            ));
        }
        if let (true, Some(token)) = (node.is_public, node.public_url.as_ref()) {
            return Ok(token.clone());
        }

        let token = self.unused_public_token()?;
        let updated = self
            .db
            .update_node(node_id, |n| {
                n.is_public = true;
                n.public_url = Some(token.clone());
            })?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;

        info!(node_id = %node_id, "Created public link");
        self.record(ActivityEvent::for_node(ActivityKind::MakePublic, owner_id, &updated))
            .await;
        Ok(token)
    }

    pub async fn revoke_public(&self, owner_id: &str, node_id: &str) -> Result<Node, DriveError> {
        let node = self.owned_node(owner_id, node_id)?;
        if !node.is_public {
            return Ok(node);
        }

        let updated = self
            .db
            .update_node(node_id, |n| {
                n.is_public = false;
                n.public_url = None;
            })?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;

        info!(node_id = %node_id, "Revoked public link");
        self.record(ActivityEvent::for_node(ActivityKind::RevokePublic, owner_id, &updated))
            .await;
        Ok(updated)
    }

    pub fn shared_with_me(&self, user_id: &str) -> Result<Vec<Node>, DriveError> {
        Ok(self.db.find_shared_with(user_id)?)
    }

    pub fn shared_by_me(&self, owner_id: &str) -> Result<Vec<Node>, DriveError> {
        Ok(self.db.find_shared_by(owner_id)?)
    }

    fn unused_public_token(&self) -> Result<String, DriveError> {
        let rng = SystemRandom::new();
        for _ in 0..3 {
            let token = generate_token(&rng)?;
            if self.db.get_node_by_public_url(&token)?.is_none() {
                return Ok(token);
            }
        }
        Err(DriveError::Internal(
            "Could not allocate a unique public link".to_string(),
        ))
    }
}

fn generate_token(rng: &SystemRandom) -> Result<String, DriveError> {
    let mut bytes = [0u8; PUBLIC_TOKEN_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| DriveError::Internal("System random source unavailable".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
