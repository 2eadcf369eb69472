//! Metadata of a payload held by the local object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored blob, addressed by `key` inside the configured bucket.
///
/// Only metadata lives here; the bytes sit on disk under a sharded path.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Bucket the object belongs to.
    pub bucket: String,

    /// Object key, e.g. `photos/1700000000000-k3j9x.webp`.
    pub key: String,

    /// MIME type given at upload time.
    pub content_type: Option<String>,

    /// `Cache-Control` value served with the payload.
    pub cache_control: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload.
    pub etag: Option<String>,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,
}
