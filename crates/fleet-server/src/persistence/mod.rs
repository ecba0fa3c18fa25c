//! Persistence layer for the fleet server.
//!
//! The whole fleet is stored as one JSON snapshot in SQLite and restored on
//! startup.

pub mod db;
pub mod snapshots;

pub use db::{init_database, Database};
pub use snapshots::{load_snapshot, save_snapshot};
