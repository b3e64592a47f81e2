use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;
use uuid::Uuid;

use eventmaster_types::filter::{BookingFilter, EventFilter, EventSort};
use eventmaster_types::input::{
    BookingPatch, EventPatch, NewBooking, NewContactMessage, NewEvent, NewNotification, NewUser,
    UserPatch,
};
use eventmaster_types::models::{
    Booking, BookingStatus, CategoryCount, ContactMessage, ContactStatus, Event, EventStatus,
    Notification, Stats, User,
};

use super::SqliteStorage;
use super::query::QueryBuilder;
use super::rows::{
    BOOKING_COLUMNS, CONTACT_COLUMNS, EVENT_COLUMNS, NOTIFICATION_COLUMNS, USER_COLUMNS,
    map_booking, map_contact, map_event, map_notification, map_user, ts,
};
use crate::error::{Result, StorageError};
use crate::reference::generate_reference;
use crate::storage::Storage;

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("UNIQUE")
    )
}

fn query_user(conn: &Connection, clause: &str, value: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause} = ?1");
    Ok(conn.query_row(&sql, [value], map_user).optional()?)
}

fn query_event(conn: &Connection, id: Uuid) -> Result<Option<Event>> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], map_event)
        .optional()?)
}

fn query_booking(conn: &Connection, clause: &str, value: &str) -> Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE {clause} = ?1");
    Ok(conn.query_row(&sql, [value], map_booking).optional()?)
}

/// Seats held by confirmed bookings and by pending ones created after
/// `cutoff`, optionally ignoring one booking.
fn held_seats(
    conn: &Connection,
    event_id: Uuid,
    except: Option<Uuid>,
    cutoff: DateTime<Utc>,
) -> Result<u32> {
    let held: i64 = conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0) FROM bookings
         WHERE event_id = ?1 AND id != COALESCE(?2, '')
           AND (status = 'confirmed' OR (status = 'pending' AND created_at > ?3))",
        params![event_id.to_string(), except.map(|id| id.to_string()), ts(&cutoff)],
        |r| r.get(0),
    )?;
    Ok(held as u32)
}

fn recount(conn: &Connection, event_id: Uuid) -> Result<u32> {
    conn.execute(
        "UPDATE events SET current_attendees = (
             SELECT COALESCE(SUM(quantity), 0) FROM bookings
             WHERE event_id = ?1 AND status = 'confirmed'
         ) WHERE id = ?1",
        [event_id.to_string()],
    )?;
    let count: u32 = conn.query_row(
        "SELECT current_attendees FROM events WHERE id = ?1",
        [event_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count)
}

fn exists(conn: &Connection, table: &str, id: Uuid) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)");
    Ok(conn.query_row(&sql, [id.to_string()], |r| r.get(0))?)
}

fn seats_conflict(capacity: u32, held: u32) -> StorageError {
    StorageError::Conflict(format!("only {} seats left", capacity.saturating_sub(held)))
}

impl Storage for SqliteStorage {
    // -- Users --

    fn create_user(&self, new: NewUser) -> Result<User> {
        self.with_conn_mut(|conn| {
            if query_user(conn, "username", &new.username)?.is_some() {
                return Err(StorageError::Conflict("username already taken".into()));
            }
            if query_user(conn, "email", &new.email)?.is_some() {
                return Err(StorageError::Conflict("email already registered".into()));
            }

            let user = User {
                id: Uuid::new_v4(),
                username: new.username,
                email: new.email,
                password_hash: new.password_hash,
                full_name: new.full_name,
                role: new.role,
                created_at: crate::now(),
            };
            conn.execute(
                "INSERT INTO users (id, username, email, password_hash, full_name, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.email,
                    user.password_hash,
                    user.full_name,
                    user.role.as_str(),
                    ts(&user.created_at),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::Conflict("username or email already registered".into())
                } else {
                    e.into()
                }
            })?;
            Ok(user)
        })
    }

    fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id");
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map([], map_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
    }

    fn count_users(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User> {
        self.with_conn_mut(|conn| {
            let mut user = query_user(conn, "id", &id.to_string())?
                .ok_or_else(|| StorageError::not_found("user", id))?;

            if let Some(email) = patch.email {
                if let Some(other) = query_user(conn, "email", &email)? {
                    if other.id != id {
                        return Err(StorageError::Conflict("email already registered".into()));
                    }
                }
                user.email = email;
            }
            if let Some(full_name) = patch.full_name {
                user.full_name = Some(full_name).filter(|n| !n.is_empty());
            }
            if let Some(role) = patch.role {
                user.role = role;
            }
            if let Some(password_hash) = patch.password_hash {
                user.password_hash = password_hash;
            }

            conn.execute(
                "UPDATE users SET email = ?2, full_name = ?3, role = ?4, password_hash = ?5
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    user.email,
                    user.full_name,
                    user.role.as_str(),
                    user.password_hash,
                ],
            )?;
            Ok(user)
        })
    }

    fn delete_user(&self, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let affected: Vec<String> = {
                let mut stmt =
                    tx.prepare("SELECT DISTINCT event_id FROM bookings WHERE user_id = ?1")?;
                stmt.query_map([id.to_string()], |r| r.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };

            // Bookings and notifications go with the user via ON DELETE CASCADE.
            let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            if deleted == 0 {
                return Err(StorageError::not_found("user", id));
            }

            for event_id in affected {
                let event_id: Uuid = event_id
                    .parse()
                    .map_err(|e| StorageError::Backend(anyhow::anyhow!("corrupt event id: {}", e)))?;
                recount(&tx, event_id)?;
            }

            tx.commit()?;
            debug!("Deleted user {}", id);
            Ok(())
        })
    }

    // -- Events --

    fn create_event(&self, new: NewEvent) -> Result<Event> {
        new.validate().map_err(StorageError::Invalid)?;

        let now = crate::now();
        let event = Event {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            category: new.category,
            location: new.location,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            price_cents: new.price_cents,
            capacity: new.capacity,
            current_attendees: 0,
            image_url: new.image_url.filter(|u| !u.is_empty()),
            featured: new.featured,
            status: new.status,
            created_at: now,
            updated_at: now,
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO events (id, title, description, category, location, starts_at, ends_at,
                     price_cents, capacity, current_attendees, image_url, featured, status,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, ?12, ?13, ?13)",
                params![
                    event.id.to_string(),
                    event.title,
                    event.description,
                    event.category,
                    event.location,
                    ts(&event.starts_at),
                    event.ends_at.as_ref().map(ts),
                    event.price_cents,
                    event.capacity,
                    event.image_url,
                    event.featured,
                    event.status.as_str(),
                    ts(&event.created_at),
                ],
            )?;
            Ok(())
        })?;
        Ok(event)
    }

    fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        self.with_conn(|conn| query_event(conn, id))
    }

    fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut q = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1 = 1"));

        if let Some(status) = filter.status {
            q.and("status = ?", status.as_str().to_string());
        }
        if !filter.include_past {
            q.and("starts_at >= ?", ts(&Utc::now()));
        }
        if let Some(term) = filter.search_term() {
            q.and(
                "(instr(lower(title), ?) > 0 OR instr(lower(description), ?) > 0 \
                 OR instr(lower(location), ?) > 0)",
                term.to_lowercase(),
            );
        }
        if let Some(category) = filter.category_term() {
            q.and("lower(category) = ?", category.to_lowercase());
        }
        if let Some(location) = filter.location_term() {
            q.and("instr(lower(location), ?) > 0", location.to_lowercase());
        }
        if let Some(from) = filter.from {
            q.and("starts_at >= ?", ts(&from));
        }
        if let Some(to) = filter.to {
            q.and("starts_at <= ?", ts(&to));
        }
        if let Some(min) = filter.min_price {
            q.and("price_cents >= ?", min);
        }
        if let Some(max) = filter.max_price {
            q.and("price_cents <= ?", max);
        }
        if let Some(featured) = filter.featured {
            q.and("featured = ?", i64::from(featured));
        }

        let order = match filter.sort {
            EventSort::Date => "starts_at ASC, id ASC",
            EventSort::DateDesc => "starts_at DESC, id ASC",
            EventSort::Price => "price_cents ASC, starts_at ASC, id ASC",
            EventSort::PriceDesc => "price_cents DESC, starts_at ASC, id ASC",
            EventSort::Title => "lower(title) ASC, starts_at ASC, id ASC",
        };
        let limit = q.bind(i64::from(filter.limit()));
        let offset = q.bind(i64::from(filter.offset()));
        q.push(&format!("ORDER BY {order} LIMIT {limit} OFFSET {offset}"));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(q.sql())?;
            let events = stmt
                .query_map(params_from_iter(q.args()), map_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
    }

    fn featured_events(&self, limit: u32) -> Result<Vec<Event>> {
        self.list_events(&EventFilter {
            featured: Some(true),
            status: Some(EventStatus::Published),
            limit: Some(limit),
            ..EventFilter::default()
        })
    }

    fn categories(&self) -> Result<Vec<CategoryCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) FROM events
                 WHERE status = 'published' AND starts_at >= ?1
                 GROUP BY category
                 ORDER BY category",
            )?;
            let categories = stmt
                .query_map([ts(&Utc::now())], |r| {
                    Ok(CategoryCount {
                        category: r.get(0)?,
                        count: r.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(categories)
        })
    }

    fn update_event(&self, id: Uuid, patch: EventPatch) -> Result<Event> {
        let cutoff = self.pending_cutoff();
        self.with_conn_mut(|conn| {
            let mut event =
                query_event(conn, id)?.ok_or_else(|| StorageError::not_found("event", id))?;
            patch.apply_to(&mut event).map_err(StorageError::Invalid)?;

            let held = held_seats(conn, id, None, cutoff)?;
            if event.capacity < held {
                return Err(StorageError::Conflict(format!(
                    "capacity {} is below the {} seats already booked",
                    event.capacity, held
                )));
            }
            event.updated_at = crate::now();

            conn.execute(
                "UPDATE events SET title = ?2, description = ?3, category = ?4, location = ?5,
                     starts_at = ?6, ends_at = ?7, price_cents = ?8, capacity = ?9,
                     image_url = ?10, featured = ?11, status = ?12, updated_at = ?13
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    event.title,
                    event.description,
                    event.category,
                    event.location,
                    ts(&event.starts_at),
                    event.ends_at.as_ref().map(ts),
                    event.price_cents,
                    event.capacity,
                    event.image_url,
                    event.featured,
                    event.status.as_str(),
                    ts(&event.updated_at),
                ],
            )?;
            Ok(event)
        })
    }

    fn delete_event(&self, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            // Bookings go with the event via ON DELETE CASCADE.
            let deleted = conn.execute("DELETE FROM events WHERE id = ?1", [id.to_string()])?;
            if deleted == 0 {
                return Err(StorageError::not_found("event", id));
            }
            Ok(())
        })
    }

    // -- Bookings --

    fn create_booking(&self, new: NewBooking) -> Result<Booking> {
        if new.quantity == 0 {
            return Err(StorageError::Invalid("quantity must be positive".into()));
        }

        let cutoff = self.pending_cutoff();
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            if !exists(&tx, "users", new.user_id)? {
                return Err(StorageError::not_found("user", new.user_id));
            }
            let event = query_event(&tx, new.event_id)?
                .ok_or_else(|| StorageError::not_found("event", new.event_id))?;
            if !event.is_bookable(Utc::now()) {
                return Err(StorageError::Invalid("event is not open for booking".into()));
            }

            if new.status != BookingStatus::Cancelled {
                let held = held_seats(&tx, new.event_id, None, cutoff)?;
                if held + new.quantity > event.capacity {
                    return Err(seats_conflict(event.capacity, held));
                }
            }

            let mut reference = generate_reference();
            while query_booking(&tx, "reference", &reference)?.is_some() {
                reference = generate_reference();
            }

            let now = crate::now();
            let booking = Booking {
                id: Uuid::new_v4(),
                reference,
                user_id: new.user_id,
                event_id: new.event_id,
                quantity: new.quantity,
                total_cents: new.total_cents,
                status: new.status,
                payment_status: new.payment_status,
                payment_intent_id: new.payment_intent_id,
                created_at: now,
                updated_at: now,
            };
            tx.execute(
                "INSERT INTO bookings (id, reference, user_id, event_id, quantity, total_cents,
                     status, payment_status, payment_intent_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    booking.id.to_string(),
                    booking.reference,
                    booking.user_id.to_string(),
                    booking.event_id.to_string(),
                    booking.quantity,
                    booking.total_cents,
                    booking.status.as_str(),
                    booking.payment_status.as_str(),
                    booking.payment_intent_id,
                    ts(&booking.created_at),
                ],
            )?;
            recount(&tx, booking.event_id)?;

            tx.commit()?;
            Ok(booking)
        })
    }

    fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        self.with_conn(|conn| query_booking(conn, "id", &id.to_string()))
    }

    fn get_booking_by_reference(&self, reference: &str) -> Result<Option<Booking>> {
        self.with_conn(|conn| query_booking(conn, "reference", &reference.to_uppercase()))
    }

    fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        let mut q =
            QueryBuilder::new(format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE 1 = 1"));
        if let Some(user_id) = filter.user_id {
            q.and("user_id = ?", user_id.to_string());
        }
        if let Some(event_id) = filter.event_id {
            q.and("event_id = ?", event_id.to_string());
        }
        if let Some(status) = filter.status {
            q.and("status = ?", status.as_str().to_string());
        }
        q.push("ORDER BY created_at DESC, id DESC");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(q.sql())?;
            let bookings = stmt
                .query_map(params_from_iter(q.args()), map_booking)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(bookings)
        })
    }

    fn update_booking(&self, id: Uuid, patch: BookingPatch) -> Result<Booking> {
        let cutoff = self.pending_cutoff();
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let mut booking = query_booking(&tx, "id", &id.to_string())?
                .ok_or_else(|| StorageError::not_found("booking", id))?;

            // Cancelled bookings and lapsed pending holds must find room again.
            let reactivating = !booking.holds_seats(cutoff)
                && patch.status.is_some_and(|s| s != BookingStatus::Cancelled);
            if reactivating {
                let event = query_event(&tx, booking.event_id)?
                    .ok_or_else(|| StorageError::not_found("event", booking.event_id))?;
                let held = held_seats(&tx, booking.event_id, Some(id), cutoff)?;
                if held + booking.quantity > event.capacity {
                    return Err(seats_conflict(event.capacity, held));
                }
            }

            if let Some(status) = patch.status {
                booking.status = status;
            }
            if let Some(payment_status) = patch.payment_status {
                booking.payment_status = payment_status;
            }
            if let Some(intent) = patch.payment_intent_id {
                booking.payment_intent_id = Some(intent);
            }
            booking.updated_at = crate::now();

            tx.execute(
                "UPDATE bookings SET status = ?2, payment_status = ?3, payment_intent_id = ?4,
                     updated_at = ?5
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    booking.status.as_str(),
                    booking.payment_status.as_str(),
                    booking.payment_intent_id,
                    ts(&booking.updated_at),
                ],
            )?;
            recount(&tx, booking.event_id)?;

            tx.commit()?;
            Ok(booking)
        })
    }

    fn delete_booking(&self, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let booking = query_booking(&tx, "id", &id.to_string())?
                .ok_or_else(|| StorageError::not_found("booking", id))?;
            tx.execute("DELETE FROM bookings WHERE id = ?1", [id.to_string()])?;
            recount(&tx, booking.event_id)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn recount_attendees(&self, event_id: Uuid) -> Result<u32> {
        self.with_conn_mut(|conn| {
            if !exists(conn, "events", event_id)? {
                return Err(StorageError::not_found("event", event_id));
            }
            recount(conn, event_id)
        })
    }

    // -- Notifications --

    fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        self.with_conn_mut(|conn| {
            if !exists(conn, "users", new.user_id)? {
                return Err(StorageError::not_found("user", new.user_id));
            }

            let notification = Notification {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                kind: new.kind,
                title: new.title,
                message: new.message,
                read: false,
                created_at: crate::now(),
            };
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, title, message, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    notification.id.to_string(),
                    notification.user_id.to_string(),
                    notification.kind.as_str(),
                    notification.title,
                    notification.message,
                    ts(&notification.created_at),
                ],
            )?;
            Ok(notification)
        })
    }

    fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        let mut q = QueryBuilder::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE 1 = 1"
        ));
        q.and("user_id = ?", user_id.to_string());
        if unread_only {
            q.and("is_read = ?", 0i64);
        }
        q.push("ORDER BY created_at DESC, id DESC");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(q.sql())?;
            let notifications = stmt
                .query_map(params_from_iter(q.args()), map_notification)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(notifications)
        })
    }

    fn unread_count(&self, user_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(count as u64)
        })
    }

    fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<Notification> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                [id.to_string(), user_id.to_string()],
            )?;
            if updated == 0 {
                return Err(StorageError::not_found("notification", id));
            }
            let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1");
            Ok(conn.query_row(&sql, [id.to_string()], map_notification)?)
        })
    }

    fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
            )?;
            Ok(changed as u64)
        })
    }

    fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                [id.to_string(), user_id.to_string()],
            )?;
            if deleted == 0 {
                return Err(StorageError::not_found("notification", id));
            }
            Ok(())
        })
    }

    // -- Contact --

    fn create_contact_message(&self, new: NewContactMessage) -> Result<ContactMessage> {
        let message = ContactMessage {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            subject: new.subject,
            message: new.message,
            status: ContactStatus::New,
            created_at: crate::now(),
        };
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO contact_messages (id, name, email, subject, message, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.id.to_string(),
                    message.name,
                    message.email,
                    message.subject,
                    message.message,
                    message.status.as_str(),
                    ts(&message.created_at),
                ],
            )?;
            Ok(())
        })?;
        Ok(message)
    }

    fn list_contact_messages(&self) -> Result<Vec<ContactMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONTACT_COLUMNS} FROM contact_messages ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let messages = stmt
                .query_map([], map_contact)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
    }

    fn update_contact_status(&self, id: Uuid, status: ContactStatus) -> Result<ContactMessage> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE contact_messages SET status = ?2 WHERE id = ?1",
                [id.to_string(), status.as_str().to_string()],
            )?;
            if updated == 0 {
                return Err(StorageError::not_found("contact message", id));
            }
            let sql = format!("SELECT {CONTACT_COLUMNS} FROM contact_messages WHERE id = ?1");
            Ok(conn.query_row(&sql, [id.to_string()], map_contact)?)
        })
    }

    fn delete_contact_message(&self, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let deleted =
                conn.execute("DELETE FROM contact_messages WHERE id = ?1", [id.to_string()])?;
            if deleted == 0 {
                return Err(StorageError::not_found("contact message", id));
            }
            Ok(())
        })
    }

    // -- Dashboard --

    fn stats(&self) -> Result<Stats> {
        let now = ts(&Utc::now());
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64> {
                let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
                Ok(n as u64)
            };

            let upcoming: i64 = conn.query_row(
                "SELECT COUNT(*) FROM events WHERE status = 'published' AND starts_at >= ?1",
                [&now],
                |r| r.get(0),
            )?;
            let revenue_cents: i64 = conn.query_row(
                "SELECT COALESCE(SUM(total_cents), 0) FROM bookings WHERE payment_status = 'paid'",
                [],
                |r| r.get(0),
            )?;

            Ok(Stats {
                users: count("SELECT COUNT(*) FROM users")?,
                events: count("SELECT COUNT(*) FROM events")?,
                upcoming_events: upcoming as u64,
                bookings: count("SELECT COUNT(*) FROM bookings")?,
                confirmed_bookings: count(
                    "SELECT COUNT(*) FROM bookings WHERE status = 'confirmed'",
                )?,
                tickets_sold: count(
                    "SELECT COALESCE(SUM(quantity), 0) FROM bookings WHERE status = 'confirmed'",
                )?,
                revenue_cents,
            })
        })
    }
}
