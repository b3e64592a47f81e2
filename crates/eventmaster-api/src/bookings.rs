use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use eventmaster_db::{Storage, StorageError};
use eventmaster_types::api::{BookingView, CreateBookingRequest, CreateBookingResponse};
use eventmaster_types::filter::BookingFilter;
use eventmaster_types::input::{BookingPatch, NewBooking};
use eventmaster_types::models::{
    Booking, BookingStatus, Event, NotificationKind, PaymentStatus, User,
};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::CurrentUser;
use crate::notifications::notify;
use crate::state::AppState;

pub const MAX_TICKETS_PER_BOOKING: u32 = 10;

/// Free events, and every event while payments are disabled, are confirmed
/// on the spot. Otherwise the booking holds its seats as `pending` until the
/// client completes the returned payment intent and calls `confirm`.
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !(1..=MAX_TICKETS_PER_BOOKING).contains(&req.quantity) {
        return Err(ApiError::BadRequest(format!(
            "quantity must be between 1 and {MAX_TICKETS_PER_BOOKING}"
        )));
    }

    let event_id = req.event_id;
    let event = state
        .db(move |s| s.get_event(event_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("event not found".into()))?;
    if !event.is_bookable(Utc::now()) {
        return Err(ApiError::BadRequest("event is not open for booking".into()));
    }

    let total_cents = booking_total(event.price_cents, req.quantity)?;
    let settle_now = total_cents == 0 || !state.payments.enabled();

    let new = NewBooking {
        user_id: user.id,
        event_id,
        quantity: req.quantity,
        total_cents,
        status: if settle_now { BookingStatus::Confirmed } else { BookingStatus::Pending },
        payment_status: if settle_now { PaymentStatus::Paid } else { PaymentStatus::Unpaid },
        payment_intent_id: None,
    };
    let booking = state.db(move |s| s.create_booking(new)).await?;

    if settle_now {
        info!("Booking {} confirmed for {} ticket(s) to {}", booking.reference, booking.quantity, event.title);
        notify_confirmed(&state, &booking, &event).await;
        return Ok((
            StatusCode::CREATED,
            Json(CreateBookingResponse { booking, client_secret: None }),
        ));
    }

    let intent = match state
        .payments
        .create_intent(total_cents, &state.settings.currency, &booking.reference)
        .await
    {
        Ok(intent) => intent,
        Err(e) => {
            // Release the seats; the booking never reached the client.
            let booking_id = booking.id;
            if let Err(cleanup) = state.db(move |s| s.delete_booking(booking_id)).await {
                warn!("Failed to remove unpaid booking {}: {}", booking_id, cleanup);
            }
            return Err(e.into());
        }
    };

    let booking_id = booking.id;
    let intent_id = intent.id.clone();
    let booking = state
        .db(move |s| {
            s.update_booking(
                booking_id,
                BookingPatch {
                    payment_intent_id: Some(intent_id),
                    ..BookingPatch::default()
                },
            )
        })
        .await?;

    info!("Booking {} awaiting payment ({})", booking.reference, intent.id);
    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking,
            client_secret: intent.client_secret,
        }),
    ))
}

/// Prices are capped on input, but rows written before the cap may not be.
fn booking_total(price_cents: i64, quantity: u32) -> Result<i64, ApiError> {
    price_cents
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| ApiError::BadRequest("booking total is out of range".into()))
}

/// Settles a pending booking once its payment intent has succeeded.
pub async fn confirm_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = load_owned(&state, &user, booking_id).await?;
    match booking.status {
        BookingStatus::Confirmed => return Ok(Json(booking)),
        BookingStatus::Cancelled => {
            return Err(ApiError::Conflict("booking has been cancelled".into()));
        }
        BookingStatus::Pending => {}
    }

    let intent_id = booking
        .payment_intent_id
        .clone()
        .ok_or_else(|| ApiError::Conflict("booking has no payment in progress".into()))?;
    let intent = state.payments.retrieve_intent(&intent_id).await?;
    if !intent.succeeded() {
        return Err(ApiError::Conflict(format!(
            "payment has not completed (status: {})",
            intent.status
        )));
    }

    let (booking, event) = state
        .db(move |s| {
            let booking = s.update_booking(
                booking_id,
                BookingPatch {
                    status: Some(BookingStatus::Confirmed),
                    payment_status: Some(PaymentStatus::Paid),
                    payment_intent_id: None,
                },
            )?;
            let event = s
                .get_event(booking.event_id)?
                .ok_or_else(|| StorageError::not_found("event", booking.event_id))?;
            Ok((booking, event))
        })
        .await?;

    info!("Booking {} paid and confirmed", booking.reference);
    notify_confirmed(&state, &booking, &event).await;
    Ok(Json(booking))
}

/// Owner or admin. Paid bookings are marked refunded.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = load_owned(&state, &user, booking_id).await?;
    if booking.status == BookingStatus::Cancelled {
        return Err(ApiError::Conflict("booking is already cancelled".into()));
    }

    let refund = booking.payment_status == PaymentStatus::Paid;
    let booking = state
        .db(move |s| {
            s.update_booking(
                booking_id,
                BookingPatch {
                    status: Some(BookingStatus::Cancelled),
                    payment_status: refund.then_some(PaymentStatus::Refunded),
                    payment_intent_id: None,
                },
            )
        })
        .await?;

    info!("Booking {} cancelled by {}", booking.reference, user.username);
    notify(
        &state,
        booking.user_id,
        NotificationKind::Booking,
        format!("Booking {} cancelled", booking.reference),
        if refund {
            format!("Booking {} was cancelled and will be refunded.", booking.reference)
        } else {
            format!("Booking {} was cancelled.", booking.reference)
        },
        true,
    )
    .await;

    Ok(Json(booking))
}

pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let views = state
        .db(move |s| with_events(s, s.list_bookings(&BookingFilter::for_user(user.id))?))
        .await?;
    Ok(Json(views))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Json<BookingView>, ApiError> {
    let booking = load_owned(&state, &user, booking_id).await?;
    Ok(Json(view_of(&state, booking).await?))
}

pub async fn get_by_reference(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(reference): ApiPath<String>,
) -> Result<Json<BookingView>, ApiError> {
    let reference = reference.trim().to_uppercase();
    let booking = state
        .db(move |s| s.get_booking_by_reference(&reference))
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;
    check_owner(&user, &booking)?;
    Ok(Json(view_of(&state, booking).await?))
}

// -- Admin --

pub async fn admin_list(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<BookingFilter>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let views = state
        .db(move |s| with_events(s, s.list_bookings(&filter)?))
        .await?;
    Ok(Json(views))
}

pub async fn admin_update(
    State(state): State<AppState>,
    ApiPath(booking_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<BookingPatch>,
) -> Result<Json<Booking>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }

    let new_status = patch.status;
    let (before, booking) = state
        .db(move |s| {
            let before = s
                .get_booking(booking_id)?
                .ok_or_else(|| StorageError::not_found("booking", booking_id))?;
            let booking = s.update_booking(booking_id, patch)?;
            Ok((before.status, booking))
        })
        .await?;

    if let Some(status) = new_status.filter(|s| *s != before) {
        let settled = matches!(status, BookingStatus::Confirmed | BookingStatus::Cancelled);
        notify(
            &state,
            booking.user_id,
            NotificationKind::Booking,
            format!("Booking {} updated", booking.reference),
            format!("Booking {} is now {}.", booking.reference, status),
            settled,
        )
        .await;
    }

    Ok(Json(booking))
}

pub async fn admin_delete(
    State(state): State<AppState>,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db(move |s| s.delete_booking(booking_id)).await?;
    info!("Deleted booking {}", booking_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Bookings are visible to their owner and to admins.
async fn load_owned(state: &AppState, user: &User, booking_id: Uuid) -> Result<Booking, ApiError> {
    let booking = state
        .db(move |s| s.get_booking(booking_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;

    check_owner(user, &booking)?;
    Ok(booking)
}

fn check_owner(user: &User, booking: &Booking) -> Result<(), ApiError> {
    if booking.user_id != user.id && !user.is_admin() {
        return Err(ApiError::Forbidden("not your booking".into()));
    }
    Ok(())
}

async fn view_of(state: &AppState, booking: Booking) -> Result<BookingView, ApiError> {
    let event_id = booking.event_id;
    let event = state.db(move |s| s.get_event(event_id)).await?;
    Ok(BookingView { booking, event })
}

fn with_events(storage: &dyn Storage, bookings: Vec<Booking>) -> eventmaster_db::Result<Vec<BookingView>> {
    let mut events: HashMap<Uuid, Option<Event>> = HashMap::new();
    let mut views = Vec::with_capacity(bookings.len());
    for booking in bookings {
        if !events.contains_key(&booking.event_id) {
            events.insert(booking.event_id, storage.get_event(booking.event_id)?);
        }
        let event = events.get(&booking.event_id).cloned().flatten();
        views.push(BookingView { booking, event });
    }
    Ok(views)
}

async fn notify_confirmed(state: &AppState, booking: &Booking, event: &Event) {
    notify(
        state,
        booking.user_id,
        NotificationKind::Booking,
        format!("Booking confirmed: {}", event.title),
        format!(
            "Your booking {} for {} ticket(s) to {} on {} is confirmed.",
            booking.reference,
            booking.quantity,
            event.title,
            event.starts_at.format("%Y-%m-%d %H:%M UTC"),
        ),
        true,
    )
    .await;
}
