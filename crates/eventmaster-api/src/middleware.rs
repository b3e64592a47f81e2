use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use eventmaster_types::models::User;

use crate::error::ApiError;
use crate::session;
use crate::state::AppState;

/// The authenticated user, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Resolve the session token (cookie or bearer) to a live user.
///
/// The user is re-read on every request so that role changes and deletions
/// take effect before the token expires.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session::token_from_request(&jar, req.headers())
        .ok_or_else(ApiError::unauthenticated)?;

    let claims = session::decode_token(&state.settings.session_secret, &token)
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired session".into()))?;

    let user = state
        .db(move |s| s.get_user(claims.sub))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired session".into()))?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Must be layered inside [`require_auth`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(ApiError::unauthenticated)?;

    if !user.0.is_admin() {
        return Err(ApiError::Forbidden("administrator access required".into()));
    }

    Ok(next.run(req).await)
}
