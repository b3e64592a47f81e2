use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use eventmaster_types::api::Claims;
use eventmaster_types::models::User;

use crate::error::ApiError;
use crate::state::{AppState, Settings};

pub const SESSION_COOKIE: &str = "em_session";

pub fn create_token(settings: &Settings, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        role: user.role,
        exp: (Utc::now() + Duration::hours(settings.session_ttl_hours)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.session_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Returns the claims of a well-formed, unexpired token.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// The signed-in user on a public route, if any. Bad or stale tokens count
/// as anonymous.
pub async fn optional_user(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<Option<User>, ApiError> {
    let Some(claims) = token_from_request(jar, headers)
        .and_then(|token| decode_token(&state.settings.session_secret, &token))
    else {
        return Ok(None);
    };
    state.db(move |s| s.get_user(claims.sub)).await
}

/// The session cookie wins over an `Authorization: Bearer` header.
pub fn token_from_request(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

// Expiry is enforced by the token's `exp`, so the cookie itself is a
// browser-session cookie.
pub fn session_cookie(settings: &Settings, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.cookie_secure)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
