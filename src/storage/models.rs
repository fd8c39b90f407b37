use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category tag derived from a node's content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Archive,
    Audio,
    Code,
    Document,
    Folder,
    Image,
    Pdf,
    Text,
    Video,
}

impl NodeType {
    /// Classify a file by MIME type. Anything unrecognised is a document.
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        let (primary, sub) = mime.split_once('/').unwrap_or((mime.as_str(), ""));

        match primary {
            "image" => return NodeType::Image,
            "video" => return NodeType::Video,
            "audio" => return NodeType::Audio,
            _ => {}
        }

        match sub {
            "pdf" => NodeType::Pdf,
            "zip" | "x-zip-compressed" | "x-rar-compressed" | "vnd.rar" | "x-7z-compressed"
            | "x-tar" | "gzip" | "x-gzip" | "x-bzip2" | "x-xz" => NodeType::Archive,
            "javascript" | "x-javascript" | "ecmascript" | "typescript" | "x-typescript"
            | "json" | "xml" | "html" | "css" | "x-python" | "x-python-script" | "x-sh"
            | "x-shellscript" | "x-c" | "x-c++" | "x-csrc" | "x-chdr" | "x-java-source"
            | "x-rust" | "x-go" | "x-ruby" | "x-php" | "x-yaml" | "yaml" | "x-toml"
            | "sql" => NodeType::Code,
            _ if primary == "text" => NodeType::Text,
            _ => NodeType::Document,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Archive => "archive",
            NodeType::Audio => "audio",
            NodeType::Code => "code",
            NodeType::Document => "document",
            NodeType::Folder => "folder",
            NodeType::Image => "image",
            NodeType::Pdf => "pdf",
            NodeType::Text => "text",
            NodeType::Video => "video",
        }
    }
}

/// Access level recorded on a share. Recipients get read access at either
/// level: they can fetch and download a shared node but every mutation
/// stays with the owner. `Edit` is stored and returned so clients can
/// display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Edit,
}

/// One recipient of a direct share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareEntry {
    pub user_id: String,
    pub permission: Permission,
    pub shared_at: DateTime<Utc>,
}

/// A file or folder stored in redb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    /// Name as uploaded; never changes. `None` for folders.
    #[serde(default)]
    pub original_name: Option<String>,
    pub is_folder: bool,
    pub node_type: NodeType,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size: u64,
    /// Content-store key. `None` for folders.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub parent_folder: Option<String>,

    #[serde(default)]
    pub in_trash: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub permanent_delete_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub shared_with: Vec<ShareEntry>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new_folder(owner_id: &str, name: &str, parent_folder: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            original_name: None,
            is_folder: true,
            node_type: NodeType::Folder,
            mime_type: None,
            size: 0,
            path: None,
            parent_folder: parent_folder.map(|s| s.to_string()),
            in_trash: false,
            deleted_at: None,
            permanent_delete_at: None,
            is_public: false,
            public_url: None,
            shared_with: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_file(
        owner_id: &str,
        original_name: &str,
        mime_type: &str,
        size: u64,
        path: &str,
        parent_folder: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: original_name.to_string(),
            original_name: Some(original_name.to_string()),
            is_folder: false,
            node_type: NodeType::from_mime(mime_type),
            mime_type: Some(mime_type.to_string()),
            size,
            path: Some(path.to_string()),
            parent_folder: parent_folder.map(|s| s.to_string()),
            in_trash: false,
            deleted_at: None,
            permanent_delete_at: None,
            is_public: false,
            public_url: None,
            shared_with: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True for the owner and for every direct-share recipient.
    pub fn is_accessible_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.shared_with.iter().any(|s| s.user_id == user_id)
    }

    /// Name used when matching content-store objects; falls back to the display name.
    pub fn match_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.name)
    }
}

/// Per-account usage, derived from the non-trashed nodes the account owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub owner_id: String,
    pub used_storage: u64,
    pub total_files: u64,
    pub total_folders: u64,
    /// Bytes per file type, keyed by `NodeType::as_str`.
    pub file_type_breakdown: BTreeMap<String, u64>,
    pub quota_bytes: u64,
    pub computed_at: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn available(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.used_storage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Copy,
    CreateFolder,
    Delete,
    EmptyTrash,
    MakePublic,
    Move,
    Rename,
    Restore,
    RevokePublic,
    Share,
    Trash,
    Unshare,
    Upload,
}

/// Append-only activity log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    pub kind: ActivityKind,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub target_user_id: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, user_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            file_id: None,
            file_name: None,
            user_id: user_id.to_string(),
            target_user_id: None,
            details: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_node(kind: ActivityKind, user_id: &str, node: &Node) -> Self {
        let mut event = Self::new(kind, user_id);
        event.file_id = Some(node.id.clone());
        event.file_name = Some(node.name.clone());
        event
    }

    pub fn with_target(mut self, target_user_id: &str) -> Self {
        self.target_user_id = Some(target_user_id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
