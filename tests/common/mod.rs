//! Shared test infrastructure for router-level integration tests.
//!
//! Builds the full axum Router around an in-memory tenant store and drives
//! it in-process with tower's `oneshot`: no sockets, no subprocess.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chunkvault::api::auth::AuthConfig;
use chunkvault::api::handlers::AppState;
use chunkvault::api::router::build_router;
use chunkvault::broadcast::ActivityBroadcaster;
use chunkvault::store::TenantStore;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const BUCKET: &str = "bucket";

/// Collected response: status, headers, and the full body.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).expect("response body is not UTF-8")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// In-process test server around a fresh in-memory tenant store.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = TenantStore::open_in_memory().expect("in-memory store");
        let state = Arc::new(AppState {
            store,
            broadcaster: Arc::new(ActivityBroadcaster::new()),
        });
        let auth = Arc::new(AuthConfig {
            secrets: vec![TEST_SECRET.to_string()],
            allow_dev_token: true,
        });
        Self {
            router: build_router(state, auth, 64 * 1024 * 1024),
        }
    }

    pub async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let (parts, body) = response.into_parts();
        let body = body.collect().await.expect("collect body").to_bytes();
        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    /// Send a request carrying the dev bearer token.
    pub async fn send(&self, method: &str, uri: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", "Bearer foo")
            .body(Body::from(body.into()))
            .unwrap();
        self.dispatch(request).await
    }

    /// Send with extra headers on top of the dev token.
    pub async fn send_with_headers(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: impl Into<Vec<u8>>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", "Bearer foo");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.dispatch(builder.body(Body::from(body.into())).unwrap())
            .await
    }

    /// Send without any Authorization header.
    pub async fn send_unauthed(
        &self,
        method: &str,
        uri: &str,
        body: impl Into<Vec<u8>>,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.into()))
            .unwrap();
        self.dispatch(request).await
    }

    pub async fn put(&self, key: &str, body: &[u8]) -> TestResponse {
        self.send("PUT", &object_uri(key), body.to_vec()).await
    }

    pub async fn get(&self, key: &str) -> TestResponse {
        self.send("GET", &object_uri(key), Vec::new()).await
    }

    pub async fn delete(&self, key: &str) -> TestResponse {
        self.send("DELETE", &object_uri(key), Vec::new()).await
    }

    pub async fn list(&self, query: &str) -> TestResponse {
        let uri = if query.is_empty() {
            format!("/{BUCKET}?list-type=2")
        } else {
            format!("/{BUCKET}?list-type=2&{query}")
        };
        self.send("GET", &uri, Vec::new()).await
    }
}

/// Percent-encode a key per path segment, preserving slashes.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn object_uri(key: &str) -> String {
    format!("/{}/{}", BUCKET, encode_key(key))
}

/// Text of the first occurrence of an XML element, raw (still XML-escaped).
pub fn xml_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

/// All occurrences of an XML element's text, in document order.
pub fn xml_texts<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        out.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    out
}

/// Mint an HS256 access token the way the token service would.
pub fn mint_token(secret: &str, sub: &str, bucket: &str) -> String {
    #[derive(serde::Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        bucket: &'a str,
        exp: usize,
    }
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &Claims {
            sub,
            bucket,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        },
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token minting")
}
