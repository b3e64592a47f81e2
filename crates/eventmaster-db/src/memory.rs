//! Document-style storage: each entity lives in its own keyed collection and
//! references between them are plain ids. Cascades and attendee recounts are
//! carried out here in application code, mirroring what the relational
//! adapter gets from foreign keys and SQL.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use eventmaster_types::filter::{BookingFilter, EventFilter, EventSort};
use eventmaster_types::input::{
    BookingPatch, EventPatch, NewBooking, NewContactMessage, NewEvent, NewNotification, NewUser,
    UserPatch,
};
use eventmaster_types::models::{
    Booking, BookingStatus, CategoryCount, ContactMessage, ContactStatus,
    DEFAULT_PENDING_HOLD_MINUTES, Event, EventStatus, Notification, PaymentStatus, Stats, User,
};

use crate::error::{Result, StorageError};
use crate::reference::generate_reference;
use crate::storage::Storage;

#[derive(Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    bookings: HashMap<Uuid, Booking>,
    notifications: HashMap<Uuid, Notification>,
    contact_messages: HashMap<Uuid, ContactMessage>,
}

impl Collections {
    fn username_taken(&self, username: &str) -> bool {
        self.users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(username))
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    fn held_seats(&self, event_id: Uuid, except: Option<Uuid>, cutoff: DateTime<Utc>) -> u32 {
        self.bookings
            .values()
            .filter(|b| b.event_id == event_id && b.holds_seats(cutoff) && Some(b.id) != except)
            .map(|b| b.quantity)
            .sum()
    }

    fn recount(&mut self, event_id: Uuid) -> u32 {
        let confirmed: u32 = self
            .bookings
            .values()
            .filter(|b| b.event_id == event_id && b.status == BookingStatus::Confirmed)
            .map(|b| b.quantity)
            .sum();
        if let Some(event) = self.events.get_mut(&event_id) {
            event.current_attendees = confirmed;
        }
        confirmed
    }
}

pub struct MemStorage {
    inner: RwLock<Collections>,
    pending_hold: Duration,
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Collections::default()),
            pending_hold: Duration::minutes(DEFAULT_PENDING_HOLD_MINUTES),
        }
    }

    /// How long a pending booking keeps its seats before others may take them.
    pub fn with_pending_hold(mut self, hold: Duration) -> Self {
        self.pending_hold = hold;
        self
    }

    fn pending_cutoff(&self) -> DateTime<Utc> {
        crate::now() - self.pending_hold
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.inner
            .read()
            .map_err(|e| anyhow::anyhow!("storage lock poisoned: {}", e).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.inner
            .write()
            .map_err(|e| anyhow::anyhow!("storage lock poisoned: {}", e).into())
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, Uuid)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// Unicode case folding, matching the `lower()` registered on SQLite
/// connections.
fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn event_matches(event: &Event, filter: &EventFilter, now: DateTime<Utc>) -> bool {
    if let Some(status) = filter.status {
        if event.status != status {
            return false;
        }
    }
    if !filter.include_past && event.starts_at < now {
        return false;
    }
    if let Some(term) = filter.search_term() {
        let term = term.to_lowercase();
        if !(contains_ci(&event.title, &term)
            || contains_ci(&event.description, &term)
            || contains_ci(&event.location, &term))
        {
            return false;
        }
    }
    if let Some(category) = filter.category_term() {
        if event.category.to_lowercase() != category.to_lowercase() {
            return false;
        }
    }
    if let Some(location) = filter.location_term() {
        if !contains_ci(&event.location, &location.to_lowercase()) {
            return false;
        }
    }
    if filter.from.is_some_and(|from| event.starts_at < from) {
        return false;
    }
    if filter.to.is_some_and(|to| event.starts_at > to) {
        return false;
    }
    if filter.min_price.is_some_and(|min| event.price_cents < min) {
        return false;
    }
    if filter.max_price.is_some_and(|max| event.price_cents > max) {
        return false;
    }
    if filter.featured.is_some_and(|featured| event.featured != featured) {
        return false;
    }
    true
}

fn compare_events(a: &Event, b: &Event, sort: EventSort) -> Ordering {
    let primary = match sort {
        EventSort::Date => a.starts_at.cmp(&b.starts_at),
        EventSort::DateDesc => b.starts_at.cmp(&a.starts_at),
        EventSort::Price => a.price_cents.cmp(&b.price_cents),
        EventSort::PriceDesc => b.price_cents.cmp(&a.price_cents),
        EventSort::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
    };
    primary
        .then_with(|| a.starts_at.cmp(&b.starts_at))
        .then_with(|| a.id.cmp(&b.id))
}

impl Storage for MemStorage {
    // -- Users --

    fn create_user(&self, new: NewUser) -> Result<User> {
        let mut db = self.write()?;
        if db.username_taken(&new.username) {
            return Err(StorageError::Conflict("username already taken".into()));
        }
        if db.email_taken(&new.email, None) {
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
        db.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.read()?.users.values().cloned().collect();
        users.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(users)
    }

    fn count_users(&self) -> Result<u64> {
        Ok(self.read()?.users.len() as u64)
    }

    fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User> {
        let mut db = self.write()?;
        if let Some(email) = &patch.email {
            if db.email_taken(email, Some(id)) {
                return Err(StorageError::Conflict("email already registered".into()));
            }
        }

        let user = db
            .users
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("user", id))?;
        if let Some(email) = patch.email {
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
        Ok(user.clone())
    }

    fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut db = self.write()?;
        if db.users.remove(&id).is_none() {
            return Err(StorageError::not_found("user", id));
        }

        let mut affected = Vec::new();
        db.bookings.retain(|_, b| {
            if b.user_id == id {
                affected.push(b.event_id);
                false
            } else {
                true
            }
        });
        db.notifications.retain(|_, n| n.user_id != id);

        affected.sort();
        affected.dedup();
        for event_id in affected {
            db.recount(event_id);
        }
        debug!("Deleted user {}", id);
        Ok(())
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
        self.write()?.events.insert(event.id, event.clone());
        Ok(event)
    }

    fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        Ok(self.read()?.events.get(&id).cloned())
    }

    fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let now = Utc::now();
        let db = self.read()?;
        let mut events: Vec<Event> = db
            .events
            .values()
            .filter(|e| event_matches(e, filter, now))
            .cloned()
            .collect();
        events.sort_by(|a, b| compare_events(a, b, filter.sort));

        Ok(events
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
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
        let now = Utc::now();
        let db = self.read()?;
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for event in db.events.values() {
            if event.status == EventStatus::Published && event.starts_at >= now {
                *counts.entry(event.category.clone()).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect())
    }

    fn update_event(&self, id: Uuid, patch: EventPatch) -> Result<Event> {
        let cutoff = self.pending_cutoff();
        let mut db = self.write()?;
        let held = db.held_seats(id, None, cutoff);
        let event = db
            .events
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("event", id))?;

        let mut updated = event.clone();
        patch.apply_to(&mut updated).map_err(StorageError::Invalid)?;
        if updated.capacity < held {
            return Err(StorageError::Conflict(format!(
                "capacity {} is below the {} seats already booked",
                updated.capacity, held
            )));
        }
        updated.updated_at = crate::now();
        *event = updated.clone();
        Ok(updated)
    }

    fn delete_event(&self, id: Uuid) -> Result<()> {
        let mut db = self.write()?;
        if db.events.remove(&id).is_none() {
            return Err(StorageError::not_found("event", id));
        }
        db.bookings.retain(|_, b| b.event_id != id);
        Ok(())
    }

    // -- Bookings --

    fn create_booking(&self, new: NewBooking) -> Result<Booking> {
        if new.quantity == 0 {
            return Err(StorageError::Invalid("quantity must be positive".into()));
        }

        let cutoff = self.pending_cutoff();
        let mut db = self.write()?;
        if !db.users.contains_key(&new.user_id) {
            return Err(StorageError::not_found("user", new.user_id));
        }
        let event = db
            .events
            .get(&new.event_id)
            .ok_or_else(|| StorageError::not_found("event", new.event_id))?;
        if !event.is_bookable(Utc::now()) {
            return Err(StorageError::Invalid("event is not open for booking".into()));
        }
        let capacity = event.capacity;

        if new.status != BookingStatus::Cancelled {
            let held = db.held_seats(new.event_id, None, cutoff);
            if held + new.quantity > capacity {
                return Err(StorageError::Conflict(format!(
                    "only {} seats left",
                    capacity.saturating_sub(held)
                )));
            }
        }

        let mut reference = generate_reference();
        while db.bookings.values().any(|b| b.reference == reference) {
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
        db.bookings.insert(booking.id, booking.clone());
        db.recount(booking.event_id);
        Ok(booking)
    }

    fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        Ok(self.read()?.bookings.get(&id).cloned())
    }

    fn get_booking_by_reference(&self, reference: &str) -> Result<Option<Booking>> {
        Ok(self
            .read()?
            .bookings
            .values()
            .find(|b| b.reference.eq_ignore_ascii_case(reference))
            .cloned())
    }

    fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        let db = self.read()?;
        let mut bookings: Vec<Booking> = db
            .bookings
            .values()
            .filter(|b| filter.user_id.is_none_or(|id| b.user_id == id))
            .filter(|b| filter.event_id.is_none_or(|id| b.event_id == id))
            .filter(|b| filter.status.is_none_or(|s| b.status == s))
            .cloned()
            .collect();
        newest_first(&mut bookings, |b| (b.created_at, b.id));
        Ok(bookings)
    }

    fn update_booking(&self, id: Uuid, patch: BookingPatch) -> Result<Booking> {
        let cutoff = self.pending_cutoff();
        let mut db = self.write()?;
        let current = db
            .bookings
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("booking", id))?;

        // Cancelled bookings and lapsed pending holds must find room again.
        let reactivating = !current.holds_seats(cutoff)
            && patch.status.is_some_and(|s| s != BookingStatus::Cancelled);
        if reactivating {
            let capacity = db
                .events
                .get(&current.event_id)
                .map(|e| e.capacity)
                .ok_or_else(|| StorageError::not_found("event", current.event_id))?;
            let held = db.held_seats(current.event_id, Some(id), cutoff);
            if held + current.quantity > capacity {
                return Err(StorageError::Conflict(format!(
                    "only {} seats left",
                    capacity.saturating_sub(held)
                )));
            }
        }

        let mut updated = current;
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if let Some(payment_status) = patch.payment_status {
            updated.payment_status = payment_status;
        }
        if let Some(intent) = patch.payment_intent_id {
            updated.payment_intent_id = Some(intent);
        }
        updated.updated_at = crate::now();

        db.bookings.insert(id, updated.clone());
        db.recount(updated.event_id);
        Ok(updated)
    }

    fn delete_booking(&self, id: Uuid) -> Result<()> {
        let mut db = self.write()?;
        let booking = db
            .bookings
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("booking", id))?;
        db.recount(booking.event_id);
        Ok(())
    }

    fn recount_attendees(&self, event_id: Uuid) -> Result<u32> {
        let mut db = self.write()?;
        if !db.events.contains_key(&event_id) {
            return Err(StorageError::not_found("event", event_id));
        }
        Ok(db.recount(event_id))
    }

    // -- Notifications --

    fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        let mut db = self.write()?;
        if !db.users.contains_key(&new.user_id) {
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
        db.notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        let db = self.read()?;
        let mut notifications: Vec<Notification> = db
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !(unread_only && n.read))
            .cloned()
            .collect();
        newest_first(&mut notifications, |n| (n.created_at, n.id));
        Ok(notifications)
    }

    fn unread_count(&self, user_id: Uuid) -> Result<u64> {
        Ok(self
            .read()?
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.read)
            .count() as u64)
    }

    fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<Notification> {
        let mut db = self.write()?;
        let notification = db
            .notifications
            .get_mut(&id)
            .filter(|n| n.user_id == user_id)
            .ok_or_else(|| StorageError::not_found("notification", id))?;
        notification.read = true;
        Ok(notification.clone())
    }

    fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let mut db = self.write()?;
        let mut changed = 0;
        for n in db.notifications.values_mut() {
            if n.user_id == user_id && !n.read {
                n.read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let mut db = self.write()?;
        let owned = db
            .notifications
            .get(&id)
            .is_some_and(|n| n.user_id == user_id);
        if !owned {
            return Err(StorageError::not_found("notification", id));
        }
        db.notifications.remove(&id);
        Ok(())
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
        self.write()?
            .contact_messages
            .insert(message.id, message.clone());
        Ok(message)
    }

    fn list_contact_messages(&self) -> Result<Vec<ContactMessage>> {
        let mut messages: Vec<ContactMessage> =
            self.read()?.contact_messages.values().cloned().collect();
        newest_first(&mut messages, |m| (m.created_at, m.id));
        Ok(messages)
    }

    fn update_contact_status(&self, id: Uuid, status: ContactStatus) -> Result<ContactMessage> {
        let mut db = self.write()?;
        let message = db
            .contact_messages
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("contact message", id))?;
        message.status = status;
        Ok(message.clone())
    }

    fn delete_contact_message(&self, id: Uuid) -> Result<()> {
        self.write()?
            .contact_messages
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("contact message", id))
    }

    // -- Dashboard --

    fn stats(&self) -> Result<Stats> {
        let now = Utc::now();
        let db = self.read()?;
        let confirmed = || {
            db.bookings
                .values()
                .filter(|b| b.status == BookingStatus::Confirmed)
        };

        Ok(Stats {
            users: db.users.len() as u64,
            events: db.events.len() as u64,
            upcoming_events: db
                .events
                .values()
                .filter(|e| e.status == EventStatus::Published && e.starts_at >= now)
                .count() as u64,
            bookings: db.bookings.len() as u64,
            confirmed_bookings: confirmed().count() as u64,
            tickets_sold: confirmed().map(|b| u64::from(b.quantity)).sum(),
            revenue_cents: db
                .bookings
                .values()
                .filter(|b| b.payment_status == PaymentStatus::Paid)
                .map(|b| b.total_cents)
                .sum(),
        })
    }
}
