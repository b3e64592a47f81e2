use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use rand_core::OsRng;
use tracing::info;

use eventmaster_db::StorageError;
use eventmaster_types::api::{LoginRequest, RegisterRequest, SessionResponse};
use eventmaster_types::input::{NewUser, is_valid_email};
use eventmaster_types::models::{Role, User};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::CurrentUser;
use crate::session;
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    validate_username(&username)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;
    let full_name = req
        .full_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let password_hash = hash_password(&req.password)?;
    let first_user_admin = state.settings.first_user_admin;

    let user = state
        .db(move |s| {
            if s.get_user_by_username(&username)?.is_some() {
                return Err(StorageError::Conflict("username is already taken".into()));
            }
            if s.get_user_by_email(&email)?.is_some() {
                return Err(StorageError::Conflict("email is already registered".into()));
            }
            let role = if first_user_admin && s.count_users()? == 0 {
                Role::Admin
            } else {
                Role::User
            };
            s.create_user(NewUser {
                username,
                email,
                password_hash,
                full_name,
                role,
            })
        })
        .await?;

    info!("Registered user {} ({})", user.username, user.role);

    let token = session::create_token(&state.settings, &user)?;
    let jar = jar.add(session::session_cookie(&state.settings, token.clone()));

    Ok((StatusCode::CREATED, jar, Json(SessionResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let login = req.username.trim().to_string();
    let user = state
        .db(move |s| {
            if login.contains('@') {
                s.get_user_by_email(&login)
            } else {
                s.get_user_by_username(&login)
            }
        })
        .await?;

    // Same answer for unknown accounts and wrong passwords.
    let user = user
        .filter(|u| verify_password(&u.password_hash, &req.password))
        .ok_or_else(|| ApiError::Unauthorized("invalid username or password".into()))?;

    let token = session::create_token(&state.settings, &user)?;
    let jar = jar.add(session::session_cookie(&state.settings, token.clone()));

    Ok((jar, Json(SessionResponse { user, token })))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (jar.remove(session::removal_cookie()), StatusCode::NO_CONTENT)
}

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<User> {
    Json(user)
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(ApiError::BadRequest(format!(
            "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }
    Ok(email)
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::BadRequest(
            "username must be between 3 and 32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ApiError::BadRequest(
            "username may only contain letters, digits, '_', '-' and '.'".into(),
        ));
    }
    Ok(())
}
