use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use eventmaster_types::input::{ContactStatusUpdate, NewContactMessage};
use eventmaster_types::models::ContactMessage;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::mailer::{self, OutgoingEmail};
use crate::state::AppState;

/// Public contact form. A copy goes to the configured admin address.
pub async fn submit(
    State(state): State<AppState>,
    ApiJson(mut new): ApiJson<NewContactMessage>,
) -> Result<impl IntoResponse, ApiError> {
    new.name = new.name.trim().to_string();
    new.email = new.email.trim().to_string();
    new.subject = new.subject.trim().to_string();
    new.validate().map_err(ApiError::BadRequest)?;

    let message = state.db(move |s| s.create_contact_message(new)).await?;
    info!("Contact message {} from {}", message.id, message.email);

    if let Some(admin_email) = &state.settings.admin_email {
        mailer::send_in_background(
            state.mailer.clone(),
            OutgoingEmail {
                to: admin_email.clone(),
                subject: format!("[Contact] {}", message.subject),
                body: format!(
                    "From: {} <{}>\n\n{}",
                    message.name, message.email, message.message
                ),
            },
        );
    }

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ContactMessage>>, ApiError> {
    Ok(Json(state.db(|s| s.list_contact_messages()).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<ContactStatusUpdate>,
) -> Result<Json<ContactMessage>, ApiError> {
    let message = state
        .db(move |s| s.update_contact_status(message_id, update.status))
        .await?;
    Ok(Json(message))
}

pub async fn delete(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db(move |s| s.delete_contact_message(message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn submission_is_stored_and_forwarded() {
        let app = TestApp::with_admin_email("desk@eventmaster.test");
        let admin = app.admin().await;

        let resp = app
            .request(Method::POST, "/api/contact", None, Some(json!({
                "name": "Grace",
                "email": "grace@example.com",
                "subject": "Group tickets",
                "message": "Do you offer discounts for groups of 20?",
            })))
            .await;
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.json()["status"], "new");
        let id = resp.json()["id"].as_str().unwrap().to_string();

        let sent = app.mailer.wait_for(1).await;
        assert_eq!(sent[0].to, "desk@eventmaster.test");
        assert!(sent[0].subject.contains("Group tickets"));

        let resp = app
            .request(Method::PATCH, &format!("/api/admin/contact/{id}"), Some(&admin), Some(json!({
                "status": "resolved",
            })))
            .await;
        assert_eq!(resp.json()["status"], "resolved");

        let resp = app.request(Method::GET, "/api/admin/contact", Some(&admin), None).await;
        assert_eq!(resp.json().as_array().unwrap().len(), 1);

        let resp = app
            .request(Method::DELETE, &format!("/api/admin/contact/{id}"), Some(&admin), None)
            .await;
        assert_eq!(resp.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected() {
        let app = TestApp::new();
        let resp = app
            .request(Method::POST, "/api/contact", None, Some(json!({
                "name": "Grace",
                "email": "not-an-email",
                "subject": "Hi",
                "message": "Hello",
            })))
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }
}
