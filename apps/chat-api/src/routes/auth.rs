//! Auth routes: cookie-session login, registration, logout, and `me`.

use axum::extract::State;
use axum::http::header::{HeaderMap, SET_COOKIE, COOKIE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use palaver_common::id::{prefix, prefixed_ulid};
use palaver_common::model::{User, UserRole, UserStatus};

use crate::auth::sessions::{
    self, clear_auth_cookies, csrf_cookie, generate_csrf_token, generate_session_id,
    password_digest, session_cookie, SessionData, CSRF_COOKIE, SESSION_COOKIE,
};
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/auth", post(login).put(register).delete(logout).get(me))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_email(email: &str) -> Result<(), ApiError> {
    let well_formed = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
    });
    if well_formed {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid email address"))
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(ApiError::bad_request(
            "Password must contain letters and digits",
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if len < 2 {
        return Err(ApiError::bad_request("Name must be at least 2 characters"));
    }
    if len > 50 {
        return Err(ApiError::bad_request("Name must not exceed 50 characters"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// POST /api/auth — login
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub csrf_token: String,
}

/// Build the authenticated response: session + CSRF token stored in the KV
/// store, both cookies set, `{user, csrfToken}` body.
async fn establish_session(state: &AppState, user: User) -> Result<Response, ApiError> {
    let session_id = generate_session_id();
    let csrf_token = generate_csrf_token();

    sessions::store_session(
        state.kv.as_ref(),
        &session_id,
        &SessionData {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
        },
    )
    .await?;

    let body = Json(AuthResponse {
        user,
        csrf_token: csrf_token.clone(),
    });

    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.append(
        SET_COOKIE,
        session_cookie(&session_id)
            .parse()
            .map_err(|_| ApiError::internal("Internal server error"))?,
    );
    headers.append(
        SET_COOKIE,
        csrf_cookie(&csrf_token)
            .parse()
            .map_err(|_| ApiError::internal("Internal server error"))?,
    );
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/auth",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 401, description = "Bad credentials", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    validate_email(&body.email)?;
    if body.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    let user = state
        .store
        .find_user_by_email(&body.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let stored = state
        .store
        .password_digest(&user.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;
    if stored != password_digest(&body.password) {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    tracing::info!(user_id = %user.id, "user logged in");
    establish_session(&state, user).await
}

// ---------------------------------------------------------------------------
// PUT /api/auth — register
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[utoipa::path(
    put,
    path = "/api/auth",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 409, description = "Email already registered", body = ApiErrorBody),
    ),
)]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    validate_email(&body.email)?;
    validate_password(&body.password)?;
    validate_name(&body.name)?;

    if state.store.find_user_by_email(&body.email).await?.is_some() {
        return Err(ApiError::conflict("A user with this email already exists"));
    }

    let user = User {
        id: prefixed_ulid(prefix::USER),
        name: body.name,
        email: body.email,
        avatar: None,
        status: UserStatus::Online,
        last_seen: Some(Utc::now()),
        role: UserRole::User,
        created_at: Utc::now(),
    };
    state
        .store
        .insert_user(user.clone(), password_digest(&body.password))
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    establish_session(&state, user).await
}

// ---------------------------------------------------------------------------
// DELETE /api/auth — logout
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/auth",
    tag = "Auth",
    responses(
        (status = 200, description = "Logged out"),
        (status = 403, description = "CSRF validation failed", body = ApiErrorBody),
    ),
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cookie_header = headers.get(COOKIE).and_then(|v| v.to_str().ok());
    let cookies = sessions::parse_cookies(cookie_header);

    // Double-submit check: the header must echo the CSRF cookie.
    let header_token = headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let cookie_token = cookies.get(CSRF_COOKIE).map(String::as_str).unwrap_or("");
    if header_token.is_empty() || header_token != cookie_token {
        return Err(ApiError::forbidden("CSRF token validation failed"));
    }

    if let Some(session_id) = cookies.get(SESSION_COOKIE) {
        sessions::delete_session(state.kv.as_ref(), session_id).await?;
    }

    let mut response =
        (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response();
    for cookie in clear_auth_cookies() {
        response.headers_mut().append(
            SET_COOKIE,
            cookie
                .parse()
                .map_err(|_| ApiError::internal("Internal server error"))?,
        );
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// GET /api/auth — current user
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct MeUser {
    pub id: String,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: MeUser,
}

#[utoipa::path(
    get,
    path = "/api/auth",
    tag = "Auth",
    responses(
        (status = 200, description = "Current session user", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ApiErrorBody),
    ),
)]
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, ApiError> {
    let cookie_header = headers.get(COOKIE).and_then(|v| v.to_str().ok());
    let cookies = sessions::parse_cookies(cookie_header);
    let session_id = cookies
        .get(SESSION_COOKIE)
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    let data = sessions::lookup_session(state.kv.as_ref(), session_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Session expired"))?;

    Ok(Json(MeResponse {
        user: MeUser {
            id: data.user_id,
            email: data.email,
            role: data.role,
        },
    }))
}
