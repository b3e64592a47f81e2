use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, Event, Role, User};

// -- Session claims --

/// Claims carried by the session token, both in the `em_session` cookie and
/// in `Authorization: Bearer` headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Username or email address.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// -- Bookings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBookingRequest {
    pub event_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub booking: Booking,
    /// Present when the client still has to complete payment.
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub event: Option<Event>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attendee {
    pub booking_id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub quantity: u32,
    pub status: BookingStatus,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BroadcastRequest {
    /// Single recipient; every user when absent.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub email: bool,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: u64,
}

// -- Misc --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
