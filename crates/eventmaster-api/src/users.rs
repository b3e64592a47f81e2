use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use eventmaster_types::api::{ChangePasswordRequest, UpdateProfileRequest, UpdateRoleRequest};
use eventmaster_types::input::UserPatch;
use eventmaster_types::models::User;

use crate::auth::{hash_password, normalize_email, validate_password, verify_password};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let email = req.email.as_deref().map(normalize_email).transpose()?;
    // An empty name clears it.
    let full_name = req.full_name.map(|n| n.trim().to_string());

    let updated = state
        .db(move |s| {
            s.update_user(
                user.id,
                UserPatch {
                    email,
                    full_name,
                    ..UserPatch::default()
                },
            )
        })
        .await?;
    Ok(Json(updated))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    if !verify_password(&user.password_hash, &req.current_password) {
        return Err(ApiError::BadRequest("current password is incorrect".into()));
    }
    validate_password(&req.new_password)?;
    let password_hash = hash_password(&req.new_password)?;

    state
        .db(move |s| {
            s.update_user(
                user.id,
                UserPatch {
                    password_hash: Some(password_hash),
                    ..UserPatch::default()
                },
            )
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Admin --

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.db(|s| s.list_users()).await?))
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<Json<User>, ApiError> {
    if user_id == me.id {
        return Err(ApiError::BadRequest("you cannot change your own role".into()));
    }
    let updated = state
        .db(move |s| {
            s.update_user(
                user_id,
                UserPatch {
                    role: Some(req.role),
                    ..UserPatch::default()
                },
            )
        })
        .await?;
    info!("{} set role of {} to {}", me.username, updated.username, updated.role);
    Ok(Json(updated))
}

/// Removes the account with its bookings and notifications.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    if user_id == me.id {
        return Err(ApiError::BadRequest("you cannot delete your own account".into()));
    }
    state.db(move |s| s.delete_user(user_id)).await?;
    info!("{} deleted user {}", me.username, user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn profile_update_normalizes_email() {
        let app = TestApp::new();
        let ada = app.register("ada").await;
        let resp = app
            .request(Method::PATCH, "/api/users/me", Some(&ada), Some(json!({
                "email": "  Ada.Lovelace@Example.com ",
                "full_name": "Ada Lovelace",
            })))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.json()["email"], "ada.lovelace@example.com");
        assert_eq!(resp.json()["full_name"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn email_taken_by_someone_else_is_a_conflict() {
        let app = TestApp::new();
        let ada = app.register("ada").await;
        app.register("bob").await;
        let resp = app
            .request(Method::PATCH, "/api/users/me", Some(&ada), Some(json!({
                "email": "bob@example.com",
            })))
            .await;
        assert_eq!(resp.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn password_change_requires_current_password() {
        let app = TestApp::new();
        let ada = app.register("ada").await;

        let resp = app
            .request(Method::POST, "/api/users/me/password", Some(&ada), Some(json!({
                "current_password": "wrong-password",
                "new_password": "brand-new-pass",
            })))
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);

        let resp = app
            .request(Method::POST, "/api/users/me/password", Some(&ada), Some(json!({
                "current_password": "password123",
                "new_password": "brand-new-pass",
            })))
            .await;
        assert_eq!(resp.status, StatusCode::NO_CONTENT);

        let resp = app
            .request(Method::POST, "/api/auth/login", None, Some(json!({
                "username": "ada",
                "password": "brand-new-pass",
            })))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn role_changes_take_effect_immediately() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let ada = app.register("ada").await;
        let ada_id = app.user_id(&ada).await;

        let resp = app.request(Method::GET, "/api/admin/stats", Some(&ada), None).await;
        assert_eq!(resp.status, StatusCode::FORBIDDEN);

        let resp = app
            .request(Method::PATCH, &format!("/api/admin/users/{ada_id}"), Some(&admin), Some(json!({
                "role": "admin",
            })))
            .await;
        assert_eq!(resp.json()["role"], "admin");

        // Same session token, new role.
        let resp = app.request(Method::GET, "/api/admin/stats", Some(&ada), None).await;
        assert_eq!(resp.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_cannot_delete_or_demote_self() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let admin_id = app.user_id(&admin).await;

        let resp = app
            .request(Method::DELETE, &format!("/api/admin/users/{admin_id}"), Some(&admin), None)
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);

        let resp = app
            .request(Method::PATCH, &format!("/api/admin/users/{admin_id}"), Some(&admin), Some(json!({
                "role": "user",
            })))
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_a_user_releases_their_seats_and_session() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let ada = app.register("ada").await;
        let ada_id = app.user_id(&ada).await;
        let event = app.create_event(&admin, json!({ "capacity": 3 })).await;
        let event_id = event["id"].as_str().unwrap();
        app.book(&ada, event_id, 3).await;

        let resp = app
            .request(Method::DELETE, &format!("/api/admin/users/{ada_id}"), Some(&admin), None)
            .await;
        assert_eq!(resp.status, StatusCode::NO_CONTENT);

        let resp = app.request(Method::GET, &format!("/api/events/{event_id}"), None, None).await;
        assert_eq!(resp.json()["current_attendees"], 0);

        let resp = app.request(Method::GET, "/api/auth/me", Some(&ada), None).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }
}
