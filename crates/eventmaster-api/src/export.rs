use std::collections::HashMap;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use eventmaster_types::api::Attendee;
use eventmaster_types::filter::{BookingFilter, EventFilter, MAX_PAGE_SIZE};
use eventmaster_types::models::{Booking, Event, User};

use crate::error::ApiError;
use crate::extract::ApiPath;
use crate::events::load_attendees;
use crate::state::AppState;

pub async fn events_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let events = state.db(|s| all_events(s)).await?;
    Ok(csv_response("events.csv", events_to_csv(&events)?))
}

pub async fn bookings_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (bookings, events, users) = state
        .db(|s| {
            let bookings = s.list_bookings(&BookingFilter::default())?;
            let events: HashMap<Uuid, Event> = all_events(s)?.into_iter().map(|e| (e.id, e)).collect();
            let users: HashMap<Uuid, User> = s.list_users()?.into_iter().map(|u| (u.id, u)).collect();
            Ok((bookings, events, users))
        })
        .await?;
    Ok(csv_response("bookings.csv", bookings_to_csv(&bookings, &events, &users)?))
}

pub async fn users_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let users = state.db(|s| s.list_users()).await?;
    Ok(csv_response("users.csv", users_to_csv(&users)?))
}

pub async fn attendees_csv(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Response, ApiError> {
    let attendees = load_attendees(&state, event_id).await?;
    Ok(csv_response(
        &format!("attendees-{event_id}.csv"),
        attendees_to_csv(&attendees)?,
    ))
}

fn csv_response(filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

/// Every event regardless of status or date, paging past the listing cap.
fn all_events(storage: &dyn eventmaster_db::Storage) -> eventmaster_db::Result<Vec<Event>> {
    let mut events = Vec::new();
    loop {
        let page = storage.list_events(&EventFilter {
            include_past: true,
            limit: Some(MAX_PAGE_SIZE),
            offset: Some(events.len() as u32),
            ..EventFilter::default()
        })?;
        let done = page.len() < MAX_PAGE_SIZE as usize;
        events.extend(page);
        if done {
            return Ok(events);
        }
    }
}

fn dollars(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ApiError> {
    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("csv flush failed: {e}")))
}

fn csv_error(e: csv::Error) -> ApiError {
    ApiError::Internal(e.into())
}

pub fn events_to_csv(events: &[Event]) -> Result<Vec<u8>, ApiError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record([
        "id", "title", "category", "location", "starts_at", "ends_at", "price",
        "capacity", "attendees", "status", "featured",
    ])
    .map_err(csv_error)?;
    for e in events {
        w.write_record([
            e.id.to_string(),
            e.title.clone(),
            e.category.clone(),
            e.location.clone(),
            e.starts_at.to_rfc3339(),
            e.ends_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            dollars(e.price_cents),
            e.capacity.to_string(),
            e.current_attendees.to_string(),
            e.status.to_string(),
            e.featured.to_string(),
        ])
        .map_err(csv_error)?;
    }
    finish(w)
}

pub fn bookings_to_csv(
    bookings: &[Booking],
    events: &HashMap<Uuid, Event>,
    users: &HashMap<Uuid, User>,
) -> Result<Vec<u8>, ApiError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record([
        "reference", "event", "username", "email", "quantity", "total", "status",
        "payment_status", "created_at",
    ])
    .map_err(csv_error)?;
    for b in bookings {
        let user = users.get(&b.user_id);
        w.write_record([
            b.reference.clone(),
            events.get(&b.event_id).map(|e| e.title.clone()).unwrap_or_default(),
            user.map(|u| u.username.clone()).unwrap_or_default(),
            user.map(|u| u.email.clone()).unwrap_or_default(),
            b.quantity.to_string(),
            dollars(b.total_cents),
            b.status.to_string(),
            b.payment_status.to_string(),
            b.created_at.to_rfc3339(),
        ])
        .map_err(csv_error)?;
    }
    finish(w)
}

pub fn users_to_csv(users: &[User]) -> Result<Vec<u8>, ApiError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(["id", "username", "email", "full_name", "role", "created_at"])
        .map_err(csv_error)?;
    for u in users {
        w.write_record([
            u.id.to_string(),
            u.username.clone(),
            u.email.clone(),
            u.full_name.clone().unwrap_or_default(),
            u.role.to_string(),
            u.created_at.to_rfc3339(),
        ])
        .map_err(csv_error)?;
    }
    finish(w)
}

pub fn attendees_to_csv(attendees: &[Attendee]) -> Result<Vec<u8>, ApiError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(["reference", "username", "email", "full_name", "quantity", "status"])
        .map_err(csv_error)?;
    for a in attendees {
        w.write_record([
            a.reference.clone(),
            a.username.clone(),
            a.email.clone(),
            a.full_name.clone().unwrap_or_default(),
            a.quantity.to_string(),
            a.status.to_string(),
        ])
        .map_err(csv_error)?;
    }
    finish(w)
}
