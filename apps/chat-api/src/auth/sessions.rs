//! Cookie session management: opaque session IDs and CSRF tokens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

use palaver_common::model::UserRole;

// ---------------------------------------------------------------------------
// Opaque token generation
// ---------------------------------------------------------------------------

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// SHA-256 hex digest used for the demo password store.
pub fn password_digest(password: &str) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(password.as_bytes());
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

// ---------------------------------------------------------------------------
// Sessions — 7-day TTL
// ---------------------------------------------------------------------------

/// Session TTL in seconds (7 days).
pub const SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

/// CSRF cookie lifetime in seconds (1 hour).
pub const CSRF_TTL_SECS: u64 = 3600;

/// Data stored alongside a session ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: String,
    pub email: String,
    pub role: UserRole,
}

pub fn generate_session_id() -> String {
    generate_opaque_token("sess", 32)
}

pub fn generate_csrf_token() -> String {
    generate_opaque_token("csrf", 32)
}

fn session_key(session_id: &str) -> String {
    format!("chat:sess:{}", session_id)
}

pub async fn store_session(
    kv: &dyn KeyValueStore,
    session_id: &str,
    data: &SessionData,
) -> Result<(), ApiError> {
    let value = serde_json::to_string(data)?;
    kv.set_ex(&session_key(session_id), &value, SESSION_TTL_SECS)
        .await
}

pub async fn lookup_session(
    kv: &dyn KeyValueStore,
    session_id: &str,
) -> Result<Option<SessionData>, ApiError> {
    match kv.get(&session_key(session_id)).await? {
        Some(v) => {
            let data: SessionData =
                serde_json::from_str(&v).map_err(|_| ApiError::internal("corrupt session data"))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}

pub async fn delete_session(kv: &dyn KeyValueStore, session_id: &str) -> Result<(), ApiError> {
    kv.del(&session_key(session_id)).await
}

// ---------------------------------------------------------------------------
// Cookies
// ---------------------------------------------------------------------------

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sessionId";

/// Name of the CSRF double-submit cookie.
pub const CSRF_COOKIE: &str = "csrfToken";

/// Parse a `Cookie` header into name/value pairs.
pub fn parse_cookies(header: Option<&str>) -> HashMap<String, String> {
    let Some(header) = header else {
        return HashMap::new();
    };
    header
        .split(';')
        .filter_map(|cookie| {
            let mut parts = cookie.trim().splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(k), Some(v)) if !k.is_empty() && !v.is_empty() => {
                    Some((k.to_string(), v.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

/// `Set-Cookie` value for a new session (HttpOnly).
pub fn session_cookie(session_id: &str) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Strict; Max-Age={}",
        SESSION_COOKIE, session_id, SESSION_TTL_SECS
    )
}

/// `Set-Cookie` value for the CSRF token. Readable by the client so it can be
/// echoed back in the `X-CSRF-Token` header (double-submit).
pub fn csrf_cookie(csrf_token: &str) -> String {
    format!(
        "{}={}; Path=/; SameSite=Strict; Max-Age={}",
        CSRF_COOKIE, csrf_token, CSRF_TTL_SECS
    )
}

/// `Set-Cookie` values that clear both auth cookies.
pub fn clear_auth_cookies() -> [String; 2] {
    [
        format!(
            "{}=; HttpOnly; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            SESSION_COOKIE
        ),
        format!(
            "{}=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            CSRF_COOKIE
        ),
    ]
}
