//! HTTP Basic credential gate for the upload routes.
//!
//! Credentials come from a `user:password;user2:password2` list. When the list
//! is empty the gate admits every request.

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use std::{fmt, sync::Arc};
use subtle::ConstantTimeEq;
use tracing::warn;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse a `;`-separated list of `user:password` pairs. Entries without a
    /// `:` are skipped.
    pub fn parse_list(list: &str) -> Vec<Credential> {
        list.split(';')
            .map(str::trim)
            .filter_map(|entry| entry.split_once(':'))
            .filter(|(username, _)| !username.is_empty())
            .map(|(username, password)| Credential::new(username, password))
            .collect()
    }

    fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicAuthGate {
    credentials: Arc<Vec<Credential>>,
}

impl BasicAuthGate {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: Arc::new(credentials),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.credentials.is_empty()
    }

    /// Decide whether an `Authorization` header value is admitted.
    pub fn admits(&self, authorization: Option<&str>) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let Some((username, password)) = authorization.and_then(parse_basic) else {
            return false;
        };
        // Check every entry so timing does not reveal which one matched.
        self.credentials
            .iter()
            .fold(false, |found, cred| cred.matches(&username, &password) | found)
    }
}

/// Extract `(username, password)` from a `Basic <base64>` header value.
fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware rejecting requests whose credentials the gate does not admit.
pub async fn require_basic_auth(
    State(gate): State<BasicAuthGate>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if gate.admits(header) {
        return next.run(request).await;
    }

    warn!(
        path = %request.uri().path(),
        has_header = header.is_some(),
        "Authentication failed"
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Authentication failed" })),
    )
        .into_response()
}
