//! Path-style S3 router.
//!
//! The first path segment is the bucket; everything after it (trailing
//! slashes included) is the key, percent-decoded once by the extractor.
//! Method routers dispatch by method x query x headers inside the
//! handlers; anything that matches no operation is `NotImplemented`.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, AuthConfig};
use super::handlers::{
    bucket_get_handler, delete_object, get_object, head_bucket, head_object, health_check,
    post_object, put_object_or_copy, AppState,
};
use super::S3Error;
use crate::broadcast::activity_middleware;

/// 501 for any method x path x query combination outside the dispatch table.
async fn not_implemented() -> Response {
    S3Error::NotImplemented.into_response()
}

/// 404 for requests with no bucket segment.
async fn no_such_bucket() -> Response {
    S3Error::NoSuchBucket.into_response()
}

/// Every response carries a fresh request id unless the handler already
/// set one (error envelopes embed their own).
async fn request_id_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let mut response = next.run(request).await;
    if !response.headers().contains_key("x-amz-request-id") {
        let id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert("x-amz-request-id", value);
        }
    }
    response
}

/// Build the S3 router around one tenant's state.
///
/// S3 API paths:
///   HEAD /{bucket} - head bucket (always 200)
///   GET /{bucket}?list-type=2 - list objects
///   GET /{bucket}?uploads - list multipart uploads
///   PUT /{bucket}/{key...} - upload object (copy with x-amz-copy-source,
///                            part upload with ?uploadId&partNumber)
///   POST /{bucket}/{key...}?uploads - create multipart upload
///   POST /{bucket}/{key...}?uploadId - complete multipart upload
///   DELETE /{bucket}/{key...}?uploadId - abort multipart upload
///   GET / HEAD / DELETE /{bucket}/{key...} - object operations
pub fn build_router(state: Arc<AppState>, auth: Arc<AuthConfig>, max_body: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Object operations (wildcard routes first - more specific)
        .route(
            "/:bucket/*key",
            get(get_object)
                .put(put_object_or_copy)
                .delete(delete_object)
                .head(head_object)
                .post(post_object)
                .fallback(not_implemented),
        )
        // Bucket operations (without trailing slash)
        .route(
            "/:bucket",
            get(bucket_get_handler)
                .head(head_bucket)
                .fallback(not_implemented),
        )
        // Bucket operations (with trailing slash: empty key)
        .route(
            "/:bucket/",
            get(bucket_get_handler)
                .head(head_bucket)
                .fallback(not_implemented),
        )
        .fallback(no_such_bucket)
        .layer(TraceLayer::new_for_http())
        // Bearer-token auth (skips WebSocket upgrades and /health)
        .layer(middleware::from_fn(auth_middleware))
        .layer(Extension(auth))
        .layer(middleware::from_fn(request_id_middleware))
        // Activity feed sits outside auth so rejected requests are
        // broadcast too
        .layer(middleware::from_fn_with_state(
            state.broadcaster.clone(),
            activity_middleware,
        ))
        // Default 2MB body limit is far too small for object uploads
        .layer(DefaultBodyLimit::max(max_body))
        // CORS must be outermost to handle OPTIONS preflight before auth
        .layer(CorsLayer::permissive())
        .with_state(state)
}
