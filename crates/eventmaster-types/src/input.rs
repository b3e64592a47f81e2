//! Inputs accepted by the storage layer. The event and contact inputs double
//! as request bodies, so they carry their own validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::models::{
    BookingStatus, ContactStatus, Event, EventStatus, NotificationKind, PaymentStatus, Role,
};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_CONTACT_MESSAGE_LEN: usize = 5000;
/// Upper bound on a ticket price, so `price * quantity` always fits in an i64.
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub price_cents: i64,
    pub capacity: u32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub status: EventStatus,
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), String> {
        check_event_fields(
            &self.title,
            &self.category,
            &self.location,
            self.starts_at,
            self.ends_at,
            self.price_cents,
            self.capacity,
        )
    }
}

/// Partial update for an event; absent fields are left untouched and an
/// explicit `null` clears the optional ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "nullable")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
    pub price_cents: Option<i64>,
    pub capacity: Option<u32>,
    #[serde(deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    pub featured: Option<bool>,
    pub status: Option<EventStatus>,
}

impl EventPatch {
    /// Applies the patch and validates the merged event.
    pub fn apply_to(&self, event: &mut Event) -> Result<(), String> {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(category) = &self.category {
            event.category = category.clone();
        }
        if let Some(location) = &self.location {
            event.location = location.clone();
        }
        if let Some(starts_at) = self.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            event.ends_at = ends_at;
        }
        if let Some(price_cents) = self.price_cents {
            event.price_cents = price_cents;
        }
        if let Some(capacity) = self.capacity {
            event.capacity = capacity;
        }
        if let Some(image_url) = &self.image_url {
            event.image_url = image_url.clone().filter(|u| !u.is_empty());
        }
        if let Some(featured) = self.featured {
            event.featured = featured;
        }
        if let Some(status) = self.status {
            event.status = status;
        }

        check_event_fields(
            &event.title,
            &event.category,
            &event.location,
            event.starts_at,
            event.ends_at,
            event.price_cents,
            event.capacity,
        )
    }
}

/// Present-but-null becomes `Some(None)`; a missing field stays `None` via
/// the struct default.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn check_event_fields(
    title: &str,
    category: &str,
    location: &str,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    price_cents: i64,
    capacity: u32,
) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title is required".into());
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(format!("title must be at most {MAX_TITLE_LEN} characters"));
    }
    if category.trim().is_empty() {
        return Err("category is required".into());
    }
    if location.trim().is_empty() {
        return Err("location is required".into());
    }
    if !(0..=MAX_PRICE_CENTS).contains(&price_cents) {
        return Err(format!("price_cents must be between 0 and {MAX_PRICE_CENTS}"));
    }
    if capacity == 0 {
        return Err("capacity must be positive".into());
    }
    if let Some(ends_at) = ends_at {
        if ends_at < starts_at {
            return Err("ends_at must not be before starts_at".into());
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub quantity: u32,
    pub total_cents: i64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_intent_id: Option<String>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.payment_status.is_none() && self.payment_intent_id.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewContactMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl NewContactMessage {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if !is_valid_email(&self.email) {
            return Err("a valid email is required".into());
        }
        if self.subject.trim().is_empty() {
            return Err("subject is required".into());
        }
        if self.message.trim().is_empty() {
            return Err("message is required".into());
        }
        if self.message.chars().count() > MAX_CONTACT_MESSAGE_LEN {
            return Err(format!("message must be at most {MAX_CONTACT_MESSAGE_LEN} characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactStatusUpdate {
    pub status: ContactStatus,
}

/// Minimal shape check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
