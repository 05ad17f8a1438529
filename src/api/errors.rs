//! S3 error types and XML responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::xml::escape_xml;

/// S3 API errors
#[derive(Debug, Clone, Error)]
pub enum S3Error {
    #[error("Unauthorized: Missing or invalid authorization token.")]
    Unauthorized,

    #[error("Forbidden: The token is not valid for this bucket.")]
    Forbidden,

    #[error("NoSuchKey: The specified key does not exist.")]
    NoSuchKey(String),

    #[error("NoSuchBucket: The specified bucket does not exist.")]
    NoSuchBucket,

    #[error("NoSuchUpload: The specified multipart upload does not exist.")]
    NoSuchUpload(String),

    #[error("InvalidPart: One or more of the specified parts could not be found.")]
    InvalidPart(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error("NotImplemented: The requested operation is not implemented.")]
    NotImplemented,

    #[error("InternalError: We encountered an internal error. Please try again.")]
    InternalError(String),
}

impl S3Error {
    /// Get the S3 error code
    pub fn code(&self) -> &'static str {
        match self {
            S3Error::Unauthorized => "Unauthorized",
            S3Error::Forbidden => "Forbidden",
            S3Error::NoSuchKey(_) => "NoSuchKey",
            S3Error::NoSuchBucket => "NoSuchBucket",
            S3Error::NoSuchUpload(_) => "NoSuchUpload",
            S3Error::InvalidPart(_) => "InvalidPart",
            S3Error::InvalidArgument(_) => "InvalidArgument",
            S3Error::NotImplemented => "NotImplemented",
            S3Error::InternalError(_) => "InternalError",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            S3Error::Unauthorized => StatusCode::UNAUTHORIZED,
            S3Error::Forbidden => StatusCode::FORBIDDEN,
            S3Error::NoSuchKey(_) => StatusCode::NOT_FOUND,
            S3Error::NoSuchBucket => StatusCode::NOT_FOUND,
            S3Error::NoSuchUpload(_) => StatusCode::NOT_FOUND,
            S3Error::InvalidPart(_) => StatusCode::BAD_REQUEST,
            S3Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            S3Error::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            S3Error::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generate the XML error envelope with the given request id.
    pub fn to_xml(&self, request_id: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>{}</Code>
    <Message>{}</Message>
    <RequestId>{}</RequestId>
</Error>"#,
            self.code(),
            escape_xml(&self.to_string()),
            escape_xml(request_id),
        )
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        if let S3Error::InternalError(ref detail) = self {
            // The envelope stays generic; the detail goes to the log only.
            tracing::error!("internal error: {detail}");
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let status = self.status_code();
        let body = self.to_xml(&request_id);

        (
            status,
            [
                ("Content-Type", "application/xml".to_string()),
                ("x-amz-request-id", request_id),
            ],
            body,
        )
            .into_response()
    }
}

impl From<crate::store::StoreError> for S3Error {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::NoSuchUpload(id) => S3Error::NoSuchUpload(id),
            crate::store::StoreError::EmptyUpload(id) => S3Error::InvalidPart(id),
            other => S3Error::InternalError(other.to_string()),
        }
    }
}
