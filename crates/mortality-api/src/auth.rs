//! HTTP basic authentication for the administrative endpoints.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::state::AppState;

/// Value of the `WWW-Authenticate` challenge sent with a 401.
pub const BASIC_CHALLENGE: &str = r#"Basic realm="restricted", charset="UTF-8""#;

/// The single username/password pair accepted by admin endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Credentials accepting `username` and `password`.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether the request headers carry these credentials.
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        basic_credentials(headers).is_some_and(|(username, password)| {
            let diff = digest_diff(&username, &self.username)
                | digest_diff(&password, &self.password);
            diff == 0
        })
    }
}

/// Zero when both strings are equal, compared in time independent of where
/// they first differ.
///
/// Both sides are hashed first so the comparison always covers the same
/// number of bytes whatever the input lengths.
fn digest_diff(given: &str, expected: &str) -> u8 {
    let given = Sha256::digest(given.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    given
        .iter()
        .zip(expected.iter())
        .fold(0, |diff, (a, b)| diff | (a ^ b))
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decode `Authorization: Basic <base64(user:pass)>`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

/// Response sent when credentials are missing or wrong.
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, BASIC_CHALLENGE)],
        "Unauthorized",
    )
        .into_response()
}

/// Middleware rejecting requests without valid admin credentials.
pub async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.credentials.authorize(request.headers()) {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "Rejected unauthenticated admin request");
        unauthorized()
    }
}
