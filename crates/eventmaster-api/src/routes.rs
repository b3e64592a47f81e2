use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
};
use serde_json::{Value, json};

use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;
use crate::{admin, auth, bookings, contact, events, export, notifications, users};

/// The full HTTP surface. Transport layers (CORS, tracing) are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/events", get(events::list_events))
        .route("/api/events/featured", get(events::featured_events))
        .route("/api/events/categories", get(events::categories))
        .route("/api/events/{event_id}", get(events::get_event))
        .route("/api/contact", post(contact::submit));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/users/me", patch(users::update_profile))
        .route("/api/users/me/password", post(users::change_password))
        .route("/api/bookings", get(bookings::my_bookings).post(bookings::create_booking))
        .route("/api/bookings/reference/{reference}", get(bookings::get_by_reference))
        .route("/api/bookings/{booking_id}", get(bookings::get_booking))
        .route("/api/bookings/{booking_id}/confirm", post(bookings::confirm_booking))
        .route("/api/bookings/{booking_id}/cancel", post(bookings::cancel_booking))
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/{notification_id}", delete(notifications::delete))
        .route("/api/notifications/{notification_id}/read", post(notifications::mark_read))
        .layer(from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/events", get(events::admin_list_events).post(events::create_event))
        .route(
            "/api/admin/events/{event_id}",
            get(events::admin_get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/api/admin/events/{event_id}/recount", post(events::recount))
        .route("/api/admin/events/{event_id}/attendees", get(events::attendees))
        .route("/api/admin/bookings", get(bookings::admin_list))
        .route(
            "/api/admin/bookings/{booking_id}",
            patch(bookings::admin_update).delete(bookings::admin_delete),
        )
        .route("/api/admin/users", get(users::list_users))
        .route(
            "/api/admin/users/{user_id}",
            patch(users::update_role).delete(users::delete_user),
        )
        .route("/api/admin/notifications", post(notifications::broadcast))
        .route("/api/admin/contact", get(contact::list))
        .route(
            "/api/admin/contact/{message_id}",
            patch(contact::update_status).delete(contact::delete),
        )
        .route("/api/admin/export/events.csv", get(export::events_csv))
        .route("/api/admin/export/bookings.csv", get(export::bookings_csv))
        .route("/api/admin/export/users.csv", get(export::users_csv))
        .route(
            "/api/admin/export/events/{event_id}/attendees.csv",
            get(export::attendees_csv),
        )
        .layer(from_fn(require_admin))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
