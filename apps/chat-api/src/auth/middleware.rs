//! Session-cookie extraction middleware.

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use palaver_common::model::User;

use crate::auth::sessions::{self, SESSION_COOKIE};
use crate::AppState;

/// Authenticated user resolved from the `sessionId` cookie.
///
/// Use as an Axum extractor in any handler that requires authentication:
///
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

/// Rejection returned when the session cookie is missing or invalid.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookie_header = parts.headers.get(COOKIE).and_then(|v| v.to_str().ok());
        let cookies = sessions::parse_cookies(cookie_header);

        let session_id = cookies.get(SESSION_COOKIE).ok_or(AuthError {
            message: "Not authenticated",
        })?;

        let data = sessions::lookup_session(state.kv.as_ref(), session_id)
            .await
            .map_err(|_| AuthError {
                message: "Session lookup failed",
            })?
            .ok_or(AuthError {
                message: "Session expired",
            })?;

        let user = state
            .store
            .get_user(&data.user_id)
            .await
            .map_err(|_| AuthError {
                message: "User lookup failed",
            })?
            .ok_or(AuthError {
                message: "Not authenticated",
            })?;

        Ok(AuthUser { user })
    }
}
