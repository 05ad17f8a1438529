//! S3 API request handlers
//!
//! Split into submodules by domain:
//! - `object`: GET, HEAD, PUT, DELETE for individual objects (plus copy)
//! - `bucket`: HeadBucket, ListObjectsV2, ListMultipartUploads
//! - `multipart`: Multipart upload lifecycle
//! - `status`: Health check

mod bucket;
mod multipart;
mod object;
mod status;

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use super::errors::S3Error;
use crate::broadcast::ActivityBroadcaster;
use crate::store::TenantStore;
use crate::types::ObjectMeta;

// Re-export all public handlers so the router doesn't reach into submodules.
pub use bucket::{bucket_get_handler, head_bucket, BucketGetQuery};
pub use multipart::post_object;
pub use object::{delete_object, get_object, head_object, put_object_or_copy};
pub use status::health_check;

/// Application state shared across handlers
pub struct AppState {
    pub store: TenantStore,
    pub broadcaster: Arc<ActivityBroadcaster>,
}

/// Query parameters for object-level operations (multipart upload)
#[derive(Debug, serde::Deserialize, Default)]
pub struct ObjectQuery {
    /// CreateMultipartUpload (POST with ?uploads)
    pub uploads: Option<String>,
    /// UploadPart / CompleteMultipartUpload / Abort (with ?uploadId)
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    /// UploadPart (PUT with ?partNumber)
    #[serde(rename = "partNumber")]
    pub part_number: Option<u32>,
}

// ---------------------------------------------------------------------------
// Shared utility functions used across handler submodules
// ---------------------------------------------------------------------------

/// Build response headers for an object: ETag, sizes, timestamps.
fn build_object_headers(meta: &ObjectMeta) -> HeaderMap {
    let mut itoa_buf = itoa::Buffer::new();

    let mut headers = HeaderMap::new();
    headers.insert("ETag", hval(&meta.quoted_etag()));
    headers.insert("Content-Length", hval(itoa_buf.format(meta.size)));
    headers.insert("Content-Type", hval(&meta.content_type));
    headers.insert(
        "Last-Modified",
        hval(
            &meta
                .last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        ),
    );
    headers
}

fn hval(s: &str) -> HeaderValue {
    HeaderValue::from_bytes(s.as_bytes()).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Build an XML response with correct Content-Type header.
fn xml_response(xml: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "application/xml")],
        xml.into(),
    )
        .into_response()
}

/// Extract Content-Type header, defaulting to octet-stream.
fn extract_content_type(headers: &HeaderMap) -> String {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string()
}
