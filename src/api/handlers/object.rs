//! Object-level S3 handlers: GET, HEAD, PUT (with copy detection), DELETE.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, instrument, warn};

use super::{
    build_object_headers, extract_content_type, xml_response, AppState, ObjectQuery, S3Error,
};
use crate::api::xml::CopyObjectResult;

/// PUT object handler (internal)
/// Called by put_object_or_copy after dispatch
async fn put_object_inner(
    state: &Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, S3Error> {
    info!("PUT {}/{} ({} bytes)", bucket, key, body.len());

    let content_type = extract_content_type(headers);
    let meta = state
        .store
        .put_object(bucket, key, body, &content_type)
        .await?;

    Ok((StatusCode::OK, [("ETag", meta.quoted_etag())], "").into_response())
}

/// COPY object handler (internal)
/// Called by put_object_or_copy when x-amz-copy-source is present
async fn copy_object_inner(
    state: &Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    let copy_source = headers
        .get("x-amz-copy-source")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| S3Error::InvalidArgument("Missing x-amz-copy-source header".to_string()))?;

    // Source format: /bucket/key or bucket/key, with the key URL-encoded.
    let copy_source = copy_source.trim_start_matches('/');
    let (source_bucket, source_key) = copy_source
        .split_once('/')
        .ok_or_else(|| S3Error::InvalidArgument("Copy source must be bucket/key".to_string()))?;
    let source_key = urlencoding::decode(source_key)
        .map_err(|_| S3Error::InvalidArgument("Invalid copy source encoding".to_string()))?;

    if source_bucket != bucket {
        warn!(
            "rejected cross-bucket copy {}/{} -> {}/{}",
            source_bucket, source_key, bucket, key
        );
        return Err(S3Error::InvalidArgument(
            "Cross-bucket copy is not supported".to_string(),
        ));
    }

    info!("COPY {}/{} -> {}/{}", bucket, source_key, bucket, key);

    let meta = state
        .store
        .copy_object(bucket, &source_key, key)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(source_key.to_string()))?;

    let xml = CopyObjectResult {
        etag: meta.quoted_etag(),
        last_modified: meta.last_modified,
    }
    .to_xml();

    Ok(xml_response(xml))
}

/// PUT object handler with copy detection and multipart upload support
/// PUT /{bucket}/{key}
/// Detects ?partNumber&uploadId for multipart upload part
/// Detects x-amz-copy-source header to dispatch to copy operation
#[instrument(skip(state, headers, body))]
pub async fn put_object_or_copy(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    if let (Some(part_number), Some(upload_id)) = (&query.part_number, &query.upload_id) {
        info!(
            "UploadPart {}/{} part={} uploadId={}",
            bucket, key, part_number, upload_id
        );

        // S3 caps multipart uploads at 10000 parts.
        if !(1..=10000).contains(part_number) {
            return Err(S3Error::InvalidArgument(
                "Part number must be an integer between 1 and 10000, inclusive".to_string(),
            ));
        }

        let etag = state.store.upload_part(upload_id, *part_number, &body).await?;
        return Ok((StatusCode::OK, [("ETag", format!("\"{etag}\""))], "").into_response());
    }

    if headers.contains_key("x-amz-copy-source") {
        copy_object_inner(&state, &bucket, &key, &headers).await
    } else {
        put_object_inner(&state, &bucket, &key, &headers, &body).await
    }
}

/// GET object handler
/// GET /{bucket}/{key}
///
/// WebSocket upgrades are claimed by the activity feed before dispatch.
#[instrument(skip(state, ws, headers))]
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    ws: Option<WebSocketUpgrade>,
    headers: HeaderMap,
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

    info!("GET {}/{}", bucket, key);

    let (meta, body) = state
        .store
        .get_object(&bucket, &key)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(key.clone()))?;

    debug!("Retrieved {}/{} ({} bytes)", bucket, key, body.len());

    let headers = build_object_headers(&meta);
    Ok((StatusCode::OK, headers, body).into_response())
}

/// HEAD object handler
/// HEAD /{bucket}/{key}
#[instrument(skip(state))]
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, S3Error> {
    info!("HEAD {}/{}", bucket, key);

    let meta = state
        .store
        .head_object(&bucket, &key)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(key.clone()))?;

    let headers = build_object_headers(&meta);
    Ok((StatusCode::OK, headers).into_response())
}

/// DELETE object handler
/// DELETE /{bucket}/{key}
/// DELETE /{bucket}/{key}?uploadId=X - AbortMultipartUpload
#[instrument(skip(state))]
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, S3Error> {
    // AbortMultipartUpload is idempotent, like the delete below.
    if let Some(upload_id) = &query.upload_id {
        info!(
            "AbortMultipartUpload {}/{} uploadId={}",
            bucket, key, upload_id
        );
        state.store.abort_upload(upload_id).await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    info!("DELETE {}/{}", bucket, key);

    let removed = state.store.delete_object(&bucket, &key).await?;
    debug!("Deleted {}/{} ({} rows)", bucket, key, removed);

    // S3 returns 204 No Content whether or not the key existed.
    Ok(StatusCode::NO_CONTENT.into_response())
}
