//! S3 API implementation

pub mod auth;
mod errors;
pub mod handlers;
pub mod router;
pub mod xml;

pub use errors::S3Error;
