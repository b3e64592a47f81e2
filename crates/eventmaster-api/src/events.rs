use std::collections::HashMap;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use eventmaster_db::{Storage, StorageError};
use eventmaster_types::api::Attendee;
use eventmaster_types::filter::{BookingFilter, EventFilter};
use eventmaster_types::input::{BookingPatch, EventPatch, NewEvent};
use eventmaster_types::models::{
    Booking, BookingStatus, CategoryCount, Event, EventStatus, NotificationKind, PaymentStatus,
};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::notifications::notify;
use crate::session;
use crate::state::AppState;

const DEFAULT_FEATURED: u32 = 6;
const MAX_FEATURED: u32 = 24;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeaturedQuery {
    pub limit: Option<u32>,
}

// -- Public --

/// Published events only, whatever the query asks for.
pub async fn list_events(
    State(state): State<AppState>,
    ApiQuery(mut filter): ApiQuery<EventFilter>,
) -> Result<Json<Vec<Event>>, ApiError> {
    filter.status = Some(EventStatus::Published);
    let events = state.db(move |s| s.list_events(&filter)).await?;
    Ok(Json(events))
}

pub async fn featured_events(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<FeaturedQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_FEATURED).clamp(1, MAX_FEATURED);
    let events = state.db(move |s| s.featured_events(limit)).await?;
    Ok(Json(events))
}

pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<CategoryCount>>, ApiError> {
    let categories = state.db(|s| s.categories()).await?;
    Ok(Json(categories))
}

/// Drafts are only visible to a signed-in admin; everyone else gets 404.
pub async fn get_event(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Json<Event>, ApiError> {
    let event = state
        .db(move |s| s.get_event(event_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("event not found".into()))?;

    if event.status == EventStatus::Draft {
        let viewer = session::optional_user(&state, &jar, &headers).await?;
        if !viewer.is_some_and(|u| u.is_admin()) {
            return Err(ApiError::NotFound("event not found".into()));
        }
    }
    Ok(Json(event))
}

// -- Admin --

pub async fn admin_list_events(
    State(state): State<AppState>,
    ApiQuery(mut filter): ApiQuery<EventFilter>,
) -> Result<Json<Vec<Event>>, ApiError> {
    filter.include_past = true;
    let events = state.db(move |s| s.list_events(&filter)).await?;
    Ok(Json(events))
}

pub async fn admin_get_event(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Json<Event>, ApiError> {
    let event = state
        .db(move |s| s.get_event(event_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("event not found".into()))?;
    Ok(Json(event))
}

pub async fn create_event(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewEvent>,
) -> Result<impl IntoResponse, ApiError> {
    new.validate().map_err(ApiError::BadRequest)?;
    let event = state.db(move |s| s.create_event(new)).await?;
    info!("Created event {} '{}'", event.id, event.title);
    Ok((StatusCode::CREATED, Json(event)))
}

/// Moving an event to `cancelled` cancels its active bookings and tells the
/// ticket holders.
pub async fn update_event(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<EventPatch>,
) -> Result<Json<Event>, ApiError> {
    let (event, cancelled) = state
        .db(move |s| {
            let before = s
                .get_event(event_id)?
                .ok_or_else(|| StorageError::not_found("event", event_id))?;
            let event = s.update_event(event_id, patch)?;
            if before.status == EventStatus::Cancelled || event.status != EventStatus::Cancelled {
                return Ok((event, None));
            }

            // Storage refuses new bookings once the status is written, so this
            // sweep sees every booking that will ever exist for the event.
            let cancelled = cancel_event_bookings(s, event_id)?;
            let event = s
                .get_event(event_id)?
                .ok_or_else(|| StorageError::not_found("event", event_id))?;
            Ok((event, Some(cancelled)))
        })
        .await?;

    if let Some(cancelled) = cancelled {
        info!("Cancelled event {} and {} booking(s)", event_id, cancelled.len());
        for booking in cancelled {
            notify(
                &state,
                booking.user_id,
                NotificationKind::Event,
                format!("Event cancelled: {}", event.title),
                format!(
                    "{} has been cancelled. Booking {} is cancelled{}.",
                    event.title,
                    booking.reference,
                    if booking.payment_status == PaymentStatus::Refunded {
                        " and will be refunded"
                    } else {
                        ""
                    }
                ),
                true,
            )
            .await;
        }
    }

    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let (event, holders) = state
        .db(move |s| {
            let event = s
                .get_event(event_id)?
                .ok_or_else(|| StorageError::not_found("event", event_id))?;
            let holders: Vec<Booking> = s
                .list_bookings(&BookingFilter::for_event(event_id))?
                .into_iter()
                .filter(Booking::is_active)
                .collect();
            s.delete_event(event_id)?;
            Ok((event, holders))
        })
        .await?;

    info!("Deleted event {} with {} active booking(s)", event_id, holders.len());
    for booking in holders {
        notify(
            &state,
            booking.user_id,
            NotificationKind::Event,
            format!("Event removed: {}", event.title),
            format!(
                "{} is no longer listed and booking {} has been removed.",
                event.title, booking.reference
            ),
            false,
        )
        .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn recount(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let current_attendees = state.db(move |s| s.recount_attendees(event_id)).await?;
    Ok(Json(json!({
        "event_id": event_id,
        "current_attendees": current_attendees,
    })))
}

pub async fn attendees(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Json<Vec<Attendee>>, ApiError> {
    Ok(Json(load_attendees(&state, event_id).await?))
}

/// Confirmed bookings of an event joined with their users.
pub(crate) async fn load_attendees(state: &AppState, event_id: Uuid) -> Result<Vec<Attendee>, ApiError> {
    state
        .db(move |s| {
            if s.get_event(event_id)?.is_none() {
                return Err(StorageError::not_found("event", event_id));
            }
            let bookings = s.list_bookings(&BookingFilter {
                event_id: Some(event_id),
                status: Some(BookingStatus::Confirmed),
                ..BookingFilter::default()
            })?;

            let mut users = HashMap::new();
            let mut attendees = Vec::with_capacity(bookings.len());
            for booking in bookings {
                if !users.contains_key(&booking.user_id) {
                    let user = s.get_user(booking.user_id)?;
                    users.insert(booking.user_id, user);
                }
                let Some(Some(user)) = users.get(&booking.user_id) else {
                    continue;
                };
                attendees.push(Attendee {
                    booking_id: booking.id,
                    reference: booking.reference,
                    user_id: user.id,
                    username: user.username.clone(),
                    email: user.email.clone(),
                    full_name: user.full_name.clone(),
                    quantity: booking.quantity,
                    status: booking.status,
                });
            }
            Ok(attendees)
        })
        .await
}

fn cancel_event_bookings(s: &dyn Storage, event_id: Uuid) -> eventmaster_db::Result<Vec<Booking>> {
    let active: Vec<Booking> = s
        .list_bookings(&BookingFilter::for_event(event_id))?
        .into_iter()
        .filter(Booking::is_active)
        .collect();

    let mut cancelled = Vec::with_capacity(active.len());
    for booking in active {
        let refund = booking.payment_status == PaymentStatus::Paid;
        cancelled.push(s.update_booking(
            booking.id,
            BookingPatch {
                status: Some(BookingStatus::Cancelled),
                payment_status: refund.then_some(PaymentStatus::Refunded),
                payment_intent_id: None,
            },
        )?);
    }
    Ok(cancelled)
}
