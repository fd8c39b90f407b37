mod account;
mod admin;
mod nodes;
mod shares;
mod uploads;

pub use account::{get_quota, get_recent};
pub use admin::{admin_purge, health};
pub use nodes::{
    copy_node, delete_node, download_node, empty_trash, get_node, list_nodes, list_trash,
    move_node, rename_node, restore_node, trash_node, NodeResponse,
};
pub use shares::{list_shared, make_public, revoke_public, serve_public, share_node, unshare_node};
pub use uploads::{create_folder, upload_batch, upload_file};
