//! Bearer-token authentication middleware.
//!
//! Two `Authorization` forms are accepted:
//!
//! * `Bearer <token>`, the plain form;
//! * `AWS4-HMAC-SHA256 Credential=<token>/..., ...`: the token rides in the
//!   first `/`-delimited component of the `Credential` field. This lets
//!   stock AWS SDK clients talk to the engine without a custom signer; the
//!   signature bytes past that slot are ignored.
//!
//! Tokens are HS256 JWTs carrying `sub`, `bucket` and `exp` claims,
//! verified against a rotation list of accepted secrets. The bucket claim
//! must match the bucket addressed by the URL.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, warn};

use super::S3Error;

/// Development affordance: accepted verbatim when `allow_dev_token` is set.
pub const DEV_TOKEN: &str = "foo";

/// Shared auth configuration extracted from Config at startup.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Accepted HS256 secrets, newest first. Several entries allow key
    /// rotation without invalidating tokens minted under the old secret.
    pub secrets: Vec<String>,
    /// Accept the literal dev token. Never enable in production.
    pub allow_dev_token: bool,
}

/// Verified claim set of an access token.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub bucket: String,
    #[allow(dead_code)]
    pub exp: usize,
}

/// Pull the bearer token out of an Authorization header value.
pub fn extract_token(header: &str) -> Option<&str> {
    let header = header.trim();
    if let Some(token) = header.strip_prefix("Bearer ") {
        return Some(token.trim());
    }

    let rest = header.strip_prefix("AWS4-HMAC-SHA256")?.trim();
    for part in rest.split(',') {
        if let Some(credential) = part.trim().strip_prefix("Credential=") {
            // Credential=<token>/<date>/<region>/s3/aws4_request
            return credential.split('/').next();
        }
    }
    None
}

/// Verify a token against the accepted secrets and check its claims
/// against the addressed bucket.
pub fn verify_token(config: &AuthConfig, token: &str, bucket: &str) -> Result<Claims, S3Error> {
    if config.allow_dev_token && token == DEV_TOKEN {
        debug!("accepted dev token for bucket {bucket}");
        return Ok(Claims {
            sub: "dev".to_string(),
            bucket: bucket.to_string(),
            exp: 0,
        });
    }

    if token.split('.').count() != 3 {
        return Err(S3Error::Unauthorized);
    }

    let validation = Validation::new(Algorithm::HS256);
    let mut claims: Option<Claims> = None;
    for secret in &config.secrets {
        match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
            Ok(data) => {
                claims = Some(data.claims);
                break;
            }
            Err(_) => continue,
        }
    }

    let claims = claims.ok_or(S3Error::Unauthorized)?;
    if claims.sub.is_empty() {
        return Err(S3Error::Unauthorized);
    }
    if claims.bucket != bucket {
        warn!(
            "token for bucket {} used against bucket {}",
            claims.bucket, bucket
        );
        return Err(S3Error::Forbidden);
    }
    Ok(claims)
}

/// Whether the request is a WebSocket upgrade. Upgrades bypass auth and
/// dispatch; they are claimed by the activity feed.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Axum middleware enforcing bearer-token auth on every S3 request.
///
/// The auth config is stored in request extensions by the Extension layer.
pub async fn auth_middleware(request: Request<Body>, next: Next) -> Result<Response, Response> {
    if is_websocket_upgrade(request.headers()) {
        return Ok(next.run(request).await);
    }

    // Used by container healthchecks and load balancers.
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let config = request
        .extensions()
        .get::<Arc<AuthConfig>>()
        .cloned()
        .ok_or_else(|| {
            S3Error::InternalError("auth config missing from request extensions".to_string())
                .into_response()
        })?;

    let bucket = request
        .uri()
        .path()
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or("")
        .to_string();
    if bucket.is_empty() {
        return Err(S3Error::NoSuchBucket.into_response());
    }

    let header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            debug!("missing Authorization header");
            S3Error::Unauthorized.into_response()
        })?;

    let token = extract_token(header).ok_or_else(|| {
        debug!("unparseable Authorization header");
        S3Error::Unauthorized.into_response()
    })?;

    verify_token(&config, token, &bucket).map_err(|e| e.into_response())?;

    Ok(next.run(request).await)
}
