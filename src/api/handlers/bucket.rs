//! Bucket-level S3 handlers: HeadBucket, ListObjectsV2, ListMultipartUploads.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, instrument};

use super::{xml_response, AppState, S3Error};
use crate::api::xml::{ListBucketResult, ListMultipartUploadsResult};

/// Query parameters for bucket-level GET operations
#[derive(Debug, serde::Deserialize, Default)]
pub struct BucketGetQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "list-type")]
    pub list_type: Option<u8>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<u32>,
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    #[serde(rename = "start-after")]
    pub start_after: Option<String>,
    /// ListMultipartUploads query parameter
    pub uploads: Option<String>,
    #[serde(rename = "key-marker")]
    pub key_marker: Option<String>,
    #[serde(rename = "upload-id-marker")]
    pub upload_id_marker: Option<String>,
    #[serde(rename = "max-uploads")]
    pub max_uploads: Option<u32>,
}

/// Bucket-level GET handler - dispatches by query params
/// GET /{bucket}?list-type=2&prefix=  -> ListObjectsV2
/// GET /{bucket}?uploads             -> ListMultipartUploads
#[instrument(skip(state, ws, headers))]
pub async fn bucket_get_handler(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(query): Query<BucketGetQuery>,
    ws: Option<WebSocketUpgrade>,
    headers: axum::http::HeaderMap,
) -> Result<Response, S3Error> {
    if let Some(ws) = ws {
        return Ok(state.broadcaster.handle_upgrade(ws));
    }
    // An Upgrade header got this request past auth; a handshake too broken
    // to extract must not fall through to an unauthenticated read.
    if crate::api::auth::is_websocket_upgrade(&headers) {
        return Err(S3Error::InvalidArgument(
            "Malformed WebSocket upgrade request".to_string(),
        ));
    }

    if query.uploads.is_some() {
        return list_multipart_uploads(&state, &bucket, &query).await;
    }

    list_objects_v2(&state, &bucket, &query).await
}

/// GET /{bucket}?list-type=2 (ListObjectsV2)
async fn list_objects_v2(
    state: &Arc<AppState>,
    bucket: &str,
    query: &BucketGetQuery,
) -> Result<Response, S3Error> {
    let prefix = query.prefix.as_deref().unwrap_or("");
    let delimiter = query.delimiter.as_deref().unwrap_or("");
    let max_keys = query.max_keys.unwrap_or(1000);

    // The continuation token resumes a paginated walk; start-after only
    // seeds the first page.
    let marker = query
        .continuation_token
        .as_deref()
        .or(query.start_after.as_deref());

    info!("LIST {}/{}*", bucket, prefix);

    let page = state
        .store
        .list_objects(bucket, prefix, delimiter, max_keys as usize, marker)
        .await?;

    let xml = ListBucketResult::new(
        bucket.to_string(),
        prefix.to_string(),
        query.delimiter.clone(),
        max_keys,
        page,
    )
    .to_xml();

    Ok(xml_response(xml))
}

/// GET /{bucket}?uploads (ListMultipartUploads)
async fn list_multipart_uploads(
    state: &Arc<AppState>,
    bucket: &str,
    query: &BucketGetQuery,
) -> Result<Response, S3Error> {
    let prefix = query.prefix.as_deref().unwrap_or("");
    let max_uploads = query.max_uploads.unwrap_or(1000);

    info!("LIST multipart uploads: {}/{}*", bucket, prefix);

    let page = state
        .store
        .list_uploads(
            bucket,
            prefix,
            query.key_marker.as_deref(),
            query.upload_id_marker.as_deref(),
            max_uploads as usize,
        )
        .await?;

    let xml = ListMultipartUploadsResult {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        uploads: page.uploads,
        max_uploads,
        is_truncated: page.is_truncated,
        next_key_marker: page.next_key_marker,
        next_upload_id_marker: page.next_upload_id_marker,
    }
    .to_xml();

    Ok(xml_response(xml))
}

/// HEAD bucket handler
/// HEAD /{bucket}
///
/// Bucket existence is not tracked separately from its objects, so any
/// authorized bucket reads as present.
#[instrument]
pub async fn head_bucket(Path(bucket): Path<String>) -> Response {
    info!("HEAD bucket {}", bucket);
    StatusCode::OK.into_response()
}
