use chrono::{Duration, Utc};
use drive_store::storage::models::{
    ActivityEvent, ActivityKind, Node, NodeType, Permission, QuotaRecord, ShareEntry,
};
use drive_store::storage::{Database, FileInsert, FolderInsert};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_file(owner: &str, name: &str, size: u64, parent: Option<&str>) -> Node {
    Node::new_file(
        owner,
        name,
        "text/plain",
        size,
        &format!("{owner}/{name}"),
        parent,
    )
}

fn share_with(user_id: &str) -> ShareEntry {
    ShareEntry {
        user_id: user_id.to_string(),
        permission: Permission::View,
        shared_at: Utc::now(),
    }
}

#[test]
fn test_put_and_get_node() {
    let (_dir, db) = test_db();
    let file = sample_file("alice", "notes.txt", 12, None);

    db.put_node(&file).unwrap();

    let retrieved = db.get_node(&file.id).unwrap().expect("node should exist");
    assert_eq!(retrieved, file);
    assert_eq!(retrieved.node_type, NodeType::Text);
    assert_eq!(retrieved.original_name.as_deref(), Some("notes.txt"));
    assert!(!retrieved.is_folder);
}

#[test]
fn test_get_node_not_found() {
    let (_dir, db) = test_db();
    assert!(db.get_node("nonexistent").unwrap().is_none());
}

#[test]
fn test_owner_index() {
    let (_dir, db) = test_db();
    let a = sample_file("alice", "a.txt", 1, None);
    let b = sample_file("alice", "b.txt", 2, None);
    let c = sample_file("bob", "c.txt", 3, None);
    for node in [&a, &b, &c] {
        db.put_node(node).unwrap();
    }

    let alice = db.get_nodes_by_owner("alice").unwrap();
    assert_eq!(alice.len(), 2);
    assert_eq!(db.get_nodes_by_owner("bob").unwrap().len(), 1);
    assert!(db.get_nodes_by_owner("carol").unwrap().is_empty());
    assert_eq!(db.get_all_nodes().unwrap().len(), 3);
}

#[test]
fn test_find_by_parent_orders_folders_first() {
    let (_dir, db) = test_db();
    let folder = Node::new_folder("alice", "Zeta", None);
    let file = sample_file("alice", "alpha.txt", 5, None);
    let nested = sample_file("alice", "inner.txt", 5, Some(&folder.id));
    let mut trashed = sample_file("alice", "beta.txt", 5, None);
    trashed.in_trash = true;
    for node in [&folder, &file, &nested, &trashed] {
        db.put_node(node).unwrap();
    }

    let root = db.find_by_parent("alice", None).unwrap();
    let names: Vec<&str> = root.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Zeta", "alpha.txt"]);

    let children = db.find_by_parent("alice", Some(&folder.id)).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, nested.id);
}

#[test]
fn test_insert_folder_unique() {
    let (_dir, db) = test_db();
    let first = Node::new_folder("alice", "Docs", None);
    assert!(matches!(
        db.insert_folder_unique(&first).unwrap(),
        FolderInsert::Created
    ));

    let second = Node::new_folder("alice", "Docs", None);
    match db.insert_folder_unique(&second).unwrap() {
        FolderInsert::Conflict(existing) => assert_eq!(existing.id, first.id),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(db.get_node(&second.id).unwrap().is_none());

    // Same name elsewhere, or for someone else, is fine
    let nested = Node::new_folder("alice", "Docs", Some(&first.id));
    assert!(matches!(
        db.insert_folder_unique(&nested).unwrap(),
        FolderInsert::Created
    ));
    let other_owner = Node::new_folder("bob", "Docs", None);
    assert!(matches!(
        db.insert_folder_unique(&other_owner).unwrap(),
        FolderInsert::Created
    ));
}

#[test]
fn test_insert_folder_unique_ignores_trashed() {
    let (_dir, db) = test_db();
    let mut old = Node::new_folder("alice", "Docs", None);
    old.in_trash = true;
    db.put_node(&old).unwrap();

    let fresh = Node::new_folder("alice", "Docs", None);
    assert!(matches!(
        db.insert_folder_unique(&fresh).unwrap(),
        FolderInsert::Created
    ));
}

#[test]
fn test_insert_file_dedup() {
    let (_dir, db) = test_db();
    let first = sample_file("alice", "report.txt", 100, None);
    assert!(matches!(
        db.insert_file_dedup(&first).unwrap(),
        FileInsert::Created
    ));

    let again = sample_file("alice", "report.txt", 100, None);
    match db.insert_file_dedup(&again).unwrap() {
        FileInsert::Duplicate(existing) => assert_eq!(existing.id, first.id),
        other => panic!("expected duplicate, got {other:?}"),
    }
    assert!(db.get_node(&again.id).unwrap().is_none());

    // A different size is a different file
    let resized = sample_file("alice", "report.txt", 101, None);
    assert!(matches!(
        db.insert_file_dedup(&resized).unwrap(),
        FileInsert::Created
    ));
    assert!(db
        .find_duplicate_file("alice", None, "report.txt", 101)
        .unwrap()
        .is_some());
}

#[test]
fn test_update_node() {
    let (_dir, db) = test_db();
    let file = sample_file("alice", "draft.txt", 10, None);
    db.put_node(&file).unwrap();

    let updated = db
        .update_node(&file.id, |n| n.name = "final.txt".to_string())
        .unwrap()
        .expect("node should exist");
    assert_eq!(updated.name, "final.txt");
    assert!(updated.updated_at >= file.updated_at);
    assert_eq!(updated.created_at, file.created_at);

    assert!(db.update_node("missing", |n| n.size = 1).unwrap().is_none());
}

#[test]
fn test_delete_node() {
    let (_dir, db) = test_db();
    let file = sample_file("alice", "gone.txt", 10, None);
    db.put_node(&file).unwrap();

    assert!(db.delete_node(&file.id).unwrap());
    assert!(db.get_node(&file.id).unwrap().is_none());
    assert!(db.get_nodes_by_owner("alice").unwrap().is_empty());
    assert!(!db.delete_node(&file.id).unwrap());
}

#[test]
fn test_reparent_children() {
    let (_dir, db) = test_db();
    let folder = Node::new_folder("alice", "Old", None);
    let a = sample_file("alice", "a.txt", 1, Some(&folder.id));
    let b = sample_file("alice", "b.txt", 2, Some(&folder.id));
    let c = sample_file("alice", "c.txt", 3, None);
    for node in [&folder, &a, &b, &c] {
        db.put_node(node).unwrap();
    }

    assert_eq!(db.reparent_children("alice", &folder.id, None).unwrap(), 2);
    assert!(db.find_by_parent("alice", Some(&folder.id)).unwrap().is_empty());
    assert_eq!(db.find_by_parent("alice", None).unwrap().len(), 4);
}

#[test]
fn test_reparent_children_suffixes_colliding_folders() {
    let (_dir, db) = test_db();
    let old = Node::new_folder("alice", "Old", None);
    let taken = Node::new_folder("alice", "Docs", None);
    let taken_one = Node::new_folder("alice", "Docs (1)", None);
    let child = Node::new_folder("alice", "Docs", Some(&old.id));
    let mut trashed = Node::new_folder("alice", "Docs", Some(&old.id));
    trashed.in_trash = true;
    let file = sample_file("alice", "Docs", 1, Some(&old.id));
    for node in [&old, &taken, &taken_one, &child, &trashed, &file] {
        db.put_node(node).unwrap();
    }

    assert_eq!(db.reparent_children("alice", &old.id, None).unwrap(), 3);

    assert_eq!(db.get_node(&child.id).unwrap().unwrap().name, "Docs (2)");
    // Only live folders are held to the name rule
    assert_eq!(db.get_node(&trashed.id).unwrap().unwrap().name, "Docs");
    assert_eq!(db.get_node(&file.id).unwrap().unwrap().name, "Docs");
    assert_eq!(db.get_node(&taken.id).unwrap().unwrap().name, "Docs");
}

#[test]
fn test_public_link_index() {
    let (_dir, db) = test_db();
    let file = sample_file("alice", "photo.txt", 10, None);
    db.put_node(&file).unwrap();
    assert!(db.get_node_by_public_url("tok-1").unwrap().is_none());

    db.update_node(&file.id, |n| {
        n.is_public = true;
        n.public_url = Some("tok-1".to_string());
    })
    .unwrap();
    let found = db.get_node_by_public_url("tok-1").unwrap().unwrap();
    assert_eq!(found.id, file.id);

    db.update_node(&file.id, |n| {
        n.is_public = false;
        n.public_url = None;
    })
    .unwrap();
    assert!(db.get_node_by_public_url("tok-1").unwrap().is_none());
}

#[test]
fn test_shared_indexes() {
    let (_dir, db) = test_db();
    let file = sample_file("alice", "plan.txt", 10, None);
    db.put_node(&file).unwrap();
    db.update_node(&file.id, |n| {
        n.shared_with.push(share_with("bob"));
        n.shared_with.push(share_with("carol"));
    })
    .unwrap();

    assert_eq!(db.find_shared_with("bob").unwrap().len(), 1);
    assert_eq!(db.find_shared_with("carol").unwrap().len(), 1);
    assert_eq!(db.find_shared_by("alice").unwrap().len(), 1);

    db.update_node(&file.id, |n| n.shared_with.retain(|s| s.user_id != "bob"))
        .unwrap();
    assert!(db.find_shared_with("bob").unwrap().is_empty());
    assert_eq!(db.find_shared_with("carol").unwrap().len(), 1);

    db.delete_node(&file.id).unwrap();
    assert!(db.find_shared_with("carol").unwrap().is_empty());
}

#[test]
fn test_find_expired_trash() {
    let (_dir, db) = test_db();
    let now = Utc::now();

    let mut expired = sample_file("alice", "old.txt", 1, None);
    expired.in_trash = true;
    expired.deleted_at = Some(now - Duration::days(31));
    expired.permanent_delete_at = Some(now - Duration::days(1));

    let mut pending = sample_file("bob", "recent.txt", 1, None);
    pending.in_trash = true;
    pending.deleted_at = Some(now);
    pending.permanent_delete_at = Some(now + Duration::days(30));

    let live = sample_file("carol", "live.txt", 1, None);
    for node in [&expired, &pending, &live] {
        db.put_node(node).unwrap();
    }

    let found = db.find_expired_trash(now).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, expired.id);

    let trashed = db.find_trashed("bob").unwrap();
    assert_eq!(trashed.len(), 1);
    assert_eq!(trashed[0].id, pending.id);
}

#[test]
fn test_count_path_references() {
    let (_dir, db) = test_db();
    let original = sample_file("alice", "shared.txt", 4, None);
    let mut copy = Node::new_file("alice", "shared (Copy).txt", "text/plain", 4, "alice/shared.txt", None);
    copy.original_name = Some("shared.txt".to_string());
    db.put_node(&original).unwrap();
    db.put_node(&copy).unwrap();

    assert_eq!(db.count_path_references("alice/shared.txt").unwrap(), 2);
    assert_eq!(db.count_path_references("alice/other.txt").unwrap(), 0);

    // Rewriting the key moves the reference
    db.update_node(&copy.id, |n| n.path = Some("alice/other.txt".to_string()))
        .unwrap();
    assert_eq!(db.count_path_references("alice/shared.txt").unwrap(), 1);
    assert_eq!(db.count_path_references("alice/other.txt").unwrap(), 1);

    // Metadata-only updates leave the count alone
    db.update_node(&original.id, |n| n.name = "renamed.txt".to_string())
        .unwrap();
    assert_eq!(db.count_path_references("alice/shared.txt").unwrap(), 1);

    db.delete_node(&original.id).unwrap();
    assert_eq!(db.count_path_references("alice/shared.txt").unwrap(), 0);

    db.purge_all().unwrap();
    assert_eq!(db.count_path_references("alice/other.txt").unwrap(), 0);
}

#[test]
fn test_quota_record_round_trip() {
    let (_dir, db) = test_db();
    assert!(db.get_quota("alice").unwrap().is_none());

    let record = QuotaRecord {
        owner_id: "alice".to_string(),
        used_storage: 600,
        total_files: 2,
        total_folders: 1,
        file_type_breakdown: [("text".to_string(), 600)].into_iter().collect(),
        quota_bytes: 1_000,
        computed_at: Utc::now(),
    };
    db.put_quota(&record).unwrap();

    let stored = db.get_quota("alice").unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(stored.available(), 400);
}

#[test]
fn test_recent_activity_for_actor_and_target() {
    let (_dir, db) = test_db();
    let file = sample_file("alice", "memo.txt", 1, None);

    let upload = ActivityEvent::for_node(ActivityKind::Upload, "alice", &file);
    let share = ActivityEvent::for_node(ActivityKind::Share, "alice", &file).with_target("bob");
    db.put_activity(&upload).unwrap();
    db.put_activity(&share).unwrap();

    let alice = db.recent_activity("alice", 10).unwrap();
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].id, share.id);

    let bob = db.recent_activity("bob", 10).unwrap();
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].kind, ActivityKind::Share);

    assert_eq!(db.recent_activity("alice", 1).unwrap().len(), 1);
}

#[test]
fn test_purge_all() {
    let (_dir, db) = test_db();
    let file = sample_file("alice", "a.txt", 1, None);
    db.put_node(&file).unwrap();
    db.put_node(&Node::new_folder("alice", "Docs", None)).unwrap();
    db.put_activity(&ActivityEvent::for_node(ActivityKind::Upload, "alice", &file))
        .unwrap();

    let stats = db.purge_all().unwrap();
    assert_eq!(stats.nodes, 2);
    assert_eq!(stats.activities, 1);
    assert!(db.get_all_nodes().unwrap().is_empty());
    assert!(db.get_nodes_by_owner("alice").unwrap().is_empty());
    assert!(db.recent_activity("alice", 10).unwrap().is_empty());
}

#[test]
fn test_node_type_from_mime() {
    assert_eq!(NodeType::from_mime("image/png"), NodeType::Image);
    assert_eq!(NodeType::from_mime("video/mp4"), NodeType::Video);
    assert_eq!(NodeType::from_mime("audio/mpeg"), NodeType::Audio);
    assert_eq!(NodeType::from_mime("application/pdf"), NodeType::Pdf);
    assert_eq!(NodeType::from_mime("application/zip"), NodeType::Archive);
    assert_eq!(NodeType::from_mime("application/json"), NodeType::Code);
    assert_eq!(NodeType::from_mime("text/plain; charset=utf-8"), NodeType::Text);
    assert_eq!(
        NodeType::from_mime("application/octet-stream"),
        NodeType::Document
    );
}
