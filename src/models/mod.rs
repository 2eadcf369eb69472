//! Data models shared by the catalog, the pager and the HTTP layer.
//!
//! Catalog rows travel through the row store as JSON records, so these derive
//! `serde` rather than `sqlx::FromRow`; only [`object::StoredObject`] maps
//! straight onto a SQLite table.

pub mod album;
pub mod object;
pub mod portfolio;
