mod activity;
pub mod db;
pub mod models;
mod nodes;
mod quota;
mod tables;

pub use db::{Database, DatabaseError};
pub use nodes::{FileInsert, FolderInsert};
pub use tables::*;
