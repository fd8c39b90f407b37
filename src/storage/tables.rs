use redb::TableDefinition;

/// Node records: uuid -> Node (msgpack)
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Owner index: owner_id -> msgpack Vec of node UUIDs
pub const OWNER_NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_nodes");

/// Public link index: token -> node uuid
pub const PUBLIC_LINKS: TableDefinition<&str, &str> = TableDefinition::new("public_links");

/// Content references: object key -> number of nodes whose `path` is that key
pub const PATH_REFS: TableDefinition<&str, u64> = TableDefinition::new("path_refs");

/// Share index: recipient user_id -> msgpack Vec of node UUIDs
pub const SHARED_NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("shared_nodes");

/// Last computed usage: owner_id -> QuotaRecord (msgpack)
pub const QUOTAS: TableDefinition<&str, &[u8]> = TableDefinition::new("quotas");

/// Activity log: uuid -> ActivityEvent (msgpack)
pub const ACTIVITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("activities");

/// Activity index: user_id (actor or target) -> msgpack Vec of activity UUIDs, oldest first
pub const USER_ACTIVITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("user_activities");
