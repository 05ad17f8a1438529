//! Multipart upload S3 handlers: CreateMultipartUpload, CompleteMultipartUpload.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use tracing::{debug, info, instrument};

use super::{extract_content_type, xml_response, AppState, ObjectQuery, S3Error};
use crate::api::xml::{CompleteMultipartUploadResult, InitiateMultipartUploadResult};

/// POST object handler, dispatching multipart upload operations by query param.
#[instrument(skip(state, headers, body))]
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    if query.uploads.is_some() {
        initiate_multipart_upload(&state, &bucket, &key, &headers).await
    } else if let Some(upload_id) = &query.upload_id {
        complete_multipart_upload(&state, &bucket, &key, upload_id, body).await
    } else {
        Err(S3Error::NotImplemented)
    }
}

/// POST /{bucket}/{key}?uploads (CreateMultipartUpload)
async fn initiate_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    info!("CreateMultipartUpload {}/{}", bucket, key);

    let content_type = extract_content_type(headers);
    let upload_id = state.store.create_upload(bucket, key, &content_type).await?;

    let xml = InitiateMultipartUploadResult {
        bucket: bucket.to_string(),
        key: key.to_string(),
        upload_id,
    }
    .to_xml();
    Ok(xml_response(xml))
}

/// POST /{bucket}/{key}?uploadId=X (CompleteMultipartUpload)
///
/// The stored parts are authoritative: the session's chunk-0 part rows,
/// taken in part-number order, become the object. The request's XML part
/// list is accepted but not cross-validated against them.
async fn complete_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
    _body: Bytes,
) -> Result<Response, S3Error> {
    info!(
        "CompleteMultipartUpload {}/{} uploadId={}",
        bucket, key, upload_id
    );

    let (bucket, key, meta) = state.store.complete_upload(upload_id).await?;

    debug!(
        "CompleteMultipartUpload {}/{}: {} bytes, etag {}",
        bucket, key, meta.size, meta.etag
    );

    let xml = CompleteMultipartUploadResult {
        location: format!("/{}/{}", bucket, key),
        bucket,
        key,
        etag: meta.quoted_etag(),
    }
    .to_xml();
    Ok(xml_response(xml))
}
