//! Core metadata types shared between the store and the API layer.

use chrono::{DateTime, Utc};

/// Object metadata as held on chunk 0.
///
/// `etag` is the bare hex digest (or `"<hex>-<N>"` for assembled multipart
/// objects); headers and XML quote it via [`ObjectMeta::quoted_etag`].
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub content_type: String,
}

impl ObjectMeta {
    /// Double-quoted form used in the `ETag` header and XML bodies.
    pub fn quoted_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }
}

/// One direct object in a listing page.
#[derive(Debug, Clone)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

/// Result page of a ListObjectsV2 request.
///
/// `contents` and `common_prefixes` together hold at most `max-keys` items;
/// `next_continuation_token` is set only when the page is truncated.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub contents: Vec<ListedObject>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// One in-progress multipart upload session.
#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
}

/// Result page of a ListMultipartUploads request.
#[derive(Debug, Clone, Default)]
pub struct UploadPage {
    pub uploads: Vec<UploadInfo>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
}
