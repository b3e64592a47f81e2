use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use eventmaster_types::api::{BroadcastRequest, BroadcastResponse, UnreadCount};
use eventmaster_types::input::NewNotification;
use eventmaster_types::models::{Notification, NotificationKind};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::mailer::{self, OutgoingEmail};
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotificationQuery {
    pub unread: bool,
}

/// Stores an in-app notification and optionally emails the same text.
/// Never fails the caller: a notification is a side effect of something
/// that already succeeded.
pub(crate) async fn notify(
    state: &AppState,
    user_id: Uuid,
    kind: NotificationKind,
    title: String,
    message: String,
    send_email: bool,
) {
    let note = NewNotification {
        user_id,
        kind,
        title: title.clone(),
        message: message.clone(),
    };
    let result = state
        .db(move |s| {
            let user = s.get_user(note.user_id)?;
            if user.is_some() {
                s.create_notification(note)?;
            }
            Ok(user)
        })
        .await;

    match result {
        Ok(Some(user)) if send_email => mailer::send_in_background(
            state.mailer.clone(),
            OutgoingEmail {
                to: user.email,
                subject: title,
                body: message,
            },
        ),
        Ok(_) => {}
        Err(e) => warn!("Failed to notify user {}: {}", user_id, e),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = state
        .db(move |s| s.list_notifications(user.id, query.unread))
        .await?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<UnreadCount>, ApiError> {
    let unread = state.db(move |s| s.unread_count(user.id)).await?;
    Ok(Json(UnreadCount { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(notification_id): ApiPath<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    let notification = state
        .db(move |s| s.mark_notification_read(user.id, notification_id))
        .await?;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.db(move |s| s.mark_all_read(user.id)).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(notification_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .db(move |s| s.delete_notification(user.id, notification_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Admin: system notification to one user, or to everyone.
pub async fn broadcast(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BroadcastRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    let message = req.message.trim().to_string();
    if title.is_empty() || message.is_empty() {
        return Err(ApiError::BadRequest("title and message are required".into()));
    }

    let recipients = match req.user_id {
        Some(user_id) => vec![
            state
                .db(move |s| s.get_user(user_id))
                .await?
                .ok_or_else(|| ApiError::NotFound("user not found".into()))?,
        ],
        None => state.db(|s| s.list_users()).await?,
    };

    let notes: Vec<NewNotification> = recipients
        .iter()
        .map(|u| NewNotification {
            user_id: u.id,
            kind: NotificationKind::System,
            title: title.clone(),
            message: message.clone(),
        })
        .collect();
    let delivered = state
        .db(move |s| {
            for note in notes {
                s.create_notification(note)?;
            }
            Ok(())
        })
        .await
        .map(|_| recipients.len())?;

    if req.email {
        for user in &recipients {
            mailer::send_in_background(
                state.mailer.clone(),
                OutgoingEmail {
                    to: user.email.clone(),
                    subject: title.clone(),
                    body: message.clone(),
                },
            );
        }
    }

    info!("Broadcast '{}' to {} user(s)", title, delivered);
    Ok((StatusCode::CREATED, Json(BroadcastResponse { delivered })))
}
