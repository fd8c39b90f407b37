use std::collections::HashSet;

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

use super::db::{index_add, index_remove, load_ids, Database, DatabaseError};
use super::models::Node;
use super::tables::*;

/// Outcome of inserting a folder under the per-directory name constraint.
#[derive(Debug)]
pub enum FolderInsert {
    Created,
    /// A non-trashed folder with the same name already exists under the parent.
    Conflict(Node),
}

/// Outcome of inserting a file under the duplicate-upload constraint.
#[derive(Debug)]
pub enum FileInsert {
    Created,
    /// A non-trashed file with the same original name, size and parent exists.
    Duplicate(Node),
}

fn decode_node(data: &[u8]) -> Result<Node, DatabaseError> {
    Ok(rmp_serde::from_slice(data)?)
}

fn load_node(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    id: &str,
) -> Result<Option<Node>, DatabaseError> {
    match table.get(id)? {
        Some(data) => Ok(Some(decode_node(data.value())?)),
        None => Ok(None),
    }
}

fn is_live_folder_named(node: &Node, parent: Option<&str>, name: &str) -> bool {
    node.is_folder && !node.in_trash && node.parent_folder.as_deref() == parent && node.name == name
}

fn is_duplicate_upload(node: &Node, candidate: &Node) -> bool {
    !node.is_folder
        && !node.in_trash
        && node.parent_folder == candidate.parent_folder
        && node.size == candidate.size
        && node.original_name.is_some()
        && node.original_name == candidate.original_name
}

/// First of `name`, `name (1)`, `name (2)`, ... not in `taken`.
fn free_folder_name(taken: &HashSet<String>, name: &str) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let mut n = 1u64;
    loop {
        let candidate = format!("{name} ({n})");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn path_ref_add(txn: &WriteTransaction, path: &str) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(PATH_REFS)?;
    let count = table.get(path)?.map(|v| v.value()).unwrap_or(0);
    table.insert(path, count + 1)?;
    Ok(())
}

fn path_ref_remove(txn: &WriteTransaction, path: &str) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(PATH_REFS)?;
    let count = table.get(path)?.map(|v| v.value()).unwrap_or(0);
    if count <= 1 {
        table.remove(path)?;
    } else {
        table.insert(path, count - 1)?;
    }
    Ok(())
}

/// Load every node indexed under `owner_id` inside an open write transaction.
fn owner_nodes_in(txn: &WriteTransaction, owner_id: &str) -> Result<Vec<Node>, DatabaseError> {
    let ids = {
        let owner_table = txn.open_table(OWNER_NODES)?;
        let ids = load_ids(&owner_table, owner_id)?;
        ids
    };
    let table = txn.open_table(NODES)?;
    let mut nodes = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(node) = load_node(&table, &id)? {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Write `node` and bring every secondary index in line with it.
/// `previous` is the stored version being replaced, if any.
fn store_node(
    txn: &WriteTransaction,
    previous: Option<&Node>,
    node: &Node,
) -> Result<(), DatabaseError> {
    {
        let mut table = txn.open_table(NODES)?;
        let data = rmp_serde::to_vec_named(node)?;
        table.insert(node.id.as_str(), data.as_slice())?;
    }

    // Owner index
    {
        let mut owner_table = txn.open_table(OWNER_NODES)?;
        if let Some(prev) = previous {
            if prev.owner_id != node.owner_id {
                index_remove(&mut owner_table, &prev.owner_id, &node.id)?;
            }
        }
        index_add(&mut owner_table, &node.owner_id, &node.id)?;
    }

    // Content references
    let old_path = previous.and_then(|p| p.path.as_deref());
    if old_path != node.path.as_deref() {
        if let Some(path) = old_path {
            path_ref_remove(txn, path)?;
        }
        if let Some(ref path) = node.path {
            path_ref_add(txn, path)?;
        }
    }

    // Public link index
    {
        let mut link_table = txn.open_table(PUBLIC_LINKS)?;
        if let Some(old_token) = previous.and_then(|p| p.public_url.as_deref()) {
            if node.public_url.as_deref() != Some(old_token) || !node.is_public {
                link_table.remove(old_token)?;
            }
        }
        if node.is_public {
            if let Some(ref token) = node.public_url {
                link_table.insert(token.as_str(), node.id.as_str())?;
            }
        }
    }

    // Share index
    {
        let mut shared_table = txn.open_table(SHARED_NODES)?;
        if let Some(prev) = previous {
            for entry in &prev.shared_with {
                if !node.shared_with.iter().any(|s| s.user_id == entry.user_id) {
                    index_remove(&mut shared_table, &entry.user_id, &node.id)?;
                }
            }
        }
        for entry in &node.shared_with {
            index_add(&mut shared_table, &entry.user_id, &node.id)?;
        }
    }

    Ok(())
}

fn remove_node(txn: &WriteTransaction, node: &Node) -> Result<(), DatabaseError> {
    {
        let mut table = txn.open_table(NODES)?;
        table.remove(node.id.as_str())?;
    }
    {
        let mut owner_table = txn.open_table(OWNER_NODES)?;
        index_remove(&mut owner_table, &node.owner_id, &node.id)?;
    }
    if let Some(ref path) = node.path {
        path_ref_remove(txn, path)?;
    }
    if let Some(ref token) = node.public_url {
        let mut link_table = txn.open_table(PUBLIC_LINKS)?;
        link_table.remove(token.as_str())?;
    }
    {
        let mut shared_table = txn.open_table(SHARED_NODES)?;
        for entry in &node.shared_with {
            index_remove(&mut shared_table, &entry.user_id, &node.id)?;
        }
    }
    Ok(())
}

impl Database {
    // ========================================================================
    // Node writes
    // ========================================================================

    /// Store a node, replacing any existing record with the same id, and
    /// update the owner, public-link and share indexes.
    pub fn put_node(&self, node: &Node) -> Result<(), DatabaseError> {
        debug_assert!(!node.id.is_empty(), "node id must not be empty");
        debug_assert!(!node.owner_id.is_empty(), "node owner must not be empty");

        let write_txn = self.begin_write()?;
        let previous = {
            let table = write_txn.open_table(NODES)?;
            let previous = load_node(&table, &node.id)?;
            previous
        };
        store_node(&write_txn, previous.as_ref(), node)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Insert a folder unless a live folder with the same name already sits
    /// under the same parent for the same owner. Check and insert share one
    /// write transaction.
    pub fn insert_folder_unique(&self, folder: &Node) -> Result<FolderInsert, DatabaseError> {
        debug_assert!(folder.is_folder, "insert_folder_unique takes folders only");

        let write_txn = self.begin_write()?;
        let existing = owner_nodes_in(&write_txn, &folder.owner_id)?
            .into_iter()
            .find(|n| is_live_folder_named(n, folder.parent_folder.as_deref(), &folder.name));

        if let Some(existing) = existing {
            write_txn.abort()?;
            return Ok(FolderInsert::Conflict(existing));
        }

        store_node(&write_txn, None, folder)?;
        write_txn.commit()?;
        Ok(FolderInsert::Created)
    }

    /// Insert a file unless a live file with the same original name, size and
    /// parent already exists for the owner. Check and insert share one write
    /// transaction, so concurrent identical uploads produce a single node.
    pub fn insert_file_dedup(&self, file: &Node) -> Result<FileInsert, DatabaseError> {
        debug_assert!(!file.is_folder, "insert_file_dedup takes files only");

        let write_txn = self.begin_write()?;
        let existing = owner_nodes_in(&write_txn, &file.owner_id)?
            .into_iter()
            .find(|n| is_duplicate_upload(n, file));

        if let Some(existing) = existing {
            write_txn.abort()?;
            return Ok(FileInsert::Duplicate(existing));
        }

        store_node(&write_txn, None, file)?;
        write_txn.commit()?;
        Ok(FileInsert::Created)
    }

    /// Apply `patch` to a stored node and bump `updated_at`.
    /// Returns the updated node, or `None` if no node has that id.
    pub fn update_node<F>(&self, id: &str, patch: F) -> Result<Option<Node>, DatabaseError>
    where
        F: FnOnce(&mut Node),
    {
        let write_txn = self.begin_write()?;
        let existing = {
            let table = write_txn.open_table(NODES)?;
            let existing = load_node(&table, id)?;
            existing
        };

        let updated = match existing {
            Some(previous) => {
                let mut node = previous.clone();
                patch(&mut node);
                debug_assert_eq!(node.id, previous.id, "patch must not change the id");
                node.updated_at = Utc::now();
                store_node(&write_txn, Some(&previous), &node)?;
                Some(node)
            }
            None => None,
        };

        write_txn.commit()?;
        Ok(updated)
    }

    /// Delete a node by id and clean up its index entries.
    pub fn delete_node(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let existing = {
            let table = write_txn.open_table(NODES)?;
            let existing = load_node(&table, id)?;
            existing
        };

        let deleted = match existing {
            Some(node) => {
                remove_node(&write_txn, &node)?;
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    /// Point every direct child of `parent_id` at `new_parent`.
    /// A live folder child whose name is already taken by a live folder at
    /// `new_parent` gets the first free `"name (n)"` suffix.
    /// Returns the number of children moved.
    pub fn reparent_children(
        &self,
        owner_id: &str,
        parent_id: &str,
        new_parent: Option<&str>,
    ) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        let owned = owner_nodes_in(&write_txn, owner_id)?;
        let mut taken: HashSet<String> = owned
            .iter()
            .filter(|n| {
                n.is_folder
                    && !n.in_trash
                    && n.id != parent_id
                    && n.parent_folder.as_deref() == new_parent
            })
            .map(|n| n.name.clone())
            .collect();
        let children: Vec<&Node> = owned
            .iter()
            .filter(|n| n.parent_folder.as_deref() == Some(parent_id))
            .collect();

        let now = Utc::now();
        for &previous in &children {
            let mut node = previous.clone();
            node.parent_folder = new_parent.map(|s| s.to_string());
            node.updated_at = now;
            if node.is_folder && !node.in_trash {
                node.name = free_folder_name(&taken, &previous.name);
                taken.insert(node.name.clone());
            }
            store_node(&write_txn, Some(previous), &node)?;
        }

        write_txn.commit()?;
        Ok(children.len() as u64)
    }

    // ========================================================================
    // Node reads
    // ========================================================================

    /// Get a node by its UUID
    pub fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NODES)?;
        load_node(&table, id)
    }

    /// Get a node by its public link token
    pub fn get_node_by_public_url(&self, token: &str) -> Result<Option<Node>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let link_table = read_txn.open_table(PUBLIC_LINKS)?;

        let id = match link_table.get(token)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(NODES)?;
        load_node(&table, &id)
    }

    fn nodes_from_index(
        &self,
        index: redb::TableDefinition<&'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Vec<Node>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let table = read_txn.open_table(NODES)?;

        let mut nodes = Vec::new();
        for id in load_ids(&index_table, key)? {
            if let Some(node) = load_node(&table, &id)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// All nodes owned by an account, trashed or not.
    pub fn get_nodes_by_owner(&self, owner_id: &str) -> Result<Vec<Node>, DatabaseError> {
        self.nodes_from_index(OWNER_NODES, owner_id)
    }

    /// Non-trashed children of `parent_id` (`None` = root), folders first then by name.
    pub fn find_by_parent(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Node>, DatabaseError> {
        let mut nodes: Vec<Node> = self
            .get_nodes_by_owner(owner_id)?
            .into_iter()
            .filter(|n| !n.in_trash && n.parent_folder.as_deref() == parent_id)
            .collect();
        nodes.sort_by(|a, b| {
            b.is_folder
                .cmp(&a.is_folder)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(nodes)
    }

    /// Trashed nodes of an owner, most recently trashed first.
    pub fn find_trashed(&self, owner_id: &str) -> Result<Vec<Node>, DatabaseError> {
        let mut nodes: Vec<Node> = self
            .get_nodes_by_owner(owner_id)?
            .into_iter()
            .filter(|n| n.in_trash)
            .collect();
        nodes.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(nodes)
    }

    /// Trashed nodes of every owner whose retention window ended at or before `now`.
    pub fn find_expired_trash(&self, now: DateTime<Utc>) -> Result<Vec<Node>, DatabaseError> {
        Ok(self
            .get_all_nodes()?
            .into_iter()
            .filter(|n| n.in_trash && n.permanent_delete_at.is_some_and(|at| at <= now))
            .collect())
    }

    /// Nodes other accounts have shared with `user_id`.
    pub fn find_shared_with(&self, user_id: &str) -> Result<Vec<Node>, DatabaseError> {
        Ok(self
            .nodes_from_index(SHARED_NODES, user_id)?
            .into_iter()
            .filter(|n| !n.in_trash)
            .collect())
    }

    /// Nodes `owner_id` has shared with at least one other account.
    pub fn find_shared_by(&self, owner_id: &str) -> Result<Vec<Node>, DatabaseError> {
        Ok(self
            .get_nodes_by_owner(owner_id)?
            .into_iter()
            .filter(|n| !n.in_trash && !n.shared_with.is_empty())
            .collect())
    }

    /// A live folder with exactly this name under `parent_id`.
    pub fn find_folder_by_name(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Node>, DatabaseError> {
        Ok(self
            .get_nodes_by_owner(owner_id)?
            .into_iter()
            .find(|n| is_live_folder_named(n, parent_id, name)))
    }

    /// A live file matching an incoming upload by original name, size and parent.
    pub fn find_duplicate_file(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
        original_name: &str,
        size: u64,
    ) -> Result<Option<Node>, DatabaseError> {
        Ok(self.get_nodes_by_owner(owner_id)?.into_iter().find(|n| {
            !n.is_folder
                && !n.in_trash
                && n.parent_folder.as_deref() == parent_id
                && n.size == size
                && n.original_name.as_deref() == Some(original_name)
        }))
    }

    /// Number of nodes, trashed or not, whose content key is `path`.
    pub fn count_path_references(&self, path: &str) -> Result<u64, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PATH_REFS)?;
        let count = table.get(path)?.map(|v| v.value()).unwrap_or(0);
        Ok(count)
    }

    /// Get all nodes
    pub fn get_all_nodes(&self) -> Result<Vec<Node>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NODES)?;

        let mut nodes = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            nodes.push(decode_node(value.value())?);
        }

        Ok(nodes)
    }
}
