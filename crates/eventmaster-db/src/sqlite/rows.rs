//! Column lists and row mappers. Ids are stored as hyphenated UUID text and
//! timestamps as fixed-width RFC 3339 text, so both sort correctly as strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use eventmaster_types::models::{Booking, ContactMessage, Event, Notification, User};

pub const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, role, created_at";

pub const EVENT_COLUMNS: &str = "id, title, description, category, location, starts_at, ends_at, \
     price_cents, capacity, current_attendees, image_url, featured, status, created_at, updated_at";

pub const BOOKING_COLUMNS: &str = "id, reference, user_id, event_id, quantity, total_cents, status, \
     payment_status, payment_intent_id, created_at, updated_at";

pub const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, is_read, created_at";

pub const CONTACT_COLUMNS: &str = "id, name, email, subject, message, status, created_at";

pub fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    parsed(row, idx)
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

pub fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        full_name: row.get(4)?,
        role: parsed(row, 5)?,
        created_at: timestamp(row, 6)?,
    })
}

pub fn map_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: uuid(row, 0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        location: row.get(4)?,
        starts_at: timestamp(row, 5)?,
        ends_at: opt_timestamp(row, 6)?,
        price_cents: row.get(7)?,
        capacity: row.get(8)?,
        current_attendees: row.get(9)?,
        image_url: row.get(10)?,
        featured: row.get(11)?,
        status: parsed(row, 12)?,
        created_at: timestamp(row, 13)?,
        updated_at: timestamp(row, 14)?,
    })
}

pub fn map_booking(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: uuid(row, 0)?,
        reference: row.get(1)?,
        user_id: uuid(row, 2)?,
        event_id: uuid(row, 3)?,
        quantity: row.get(4)?,
        total_cents: row.get(5)?,
        status: parsed(row, 6)?,
        payment_status: parsed(row, 7)?,
        payment_intent_id: row.get(8)?,
        created_at: timestamp(row, 9)?,
        updated_at: timestamp(row, 10)?,
    })
}

pub fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: uuid(row, 0)?,
        user_id: uuid(row, 1)?,
        kind: parsed(row, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        read: row.get(5)?,
        created_at: timestamp(row, 6)?,
    })
}

pub fn map_contact(row: &Row<'_>) -> rusqlite::Result<ContactMessage> {
    Ok(ContactMessage {
        id: uuid(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        subject: row.get(3)?,
        message: row.get(4)?,
        status: parsed(row, 5)?,
        created_at: timestamp(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_sortable() {
        let early = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 11, 2, 3, 4, 5).unwrap();
        assert_eq!(ts(&early), "2026-01-02T03:04:05.000000Z");
        assert!(ts(&early) < ts(&late));
        assert_eq!(ts(&early).len(), ts(&late).len());
    }
}
