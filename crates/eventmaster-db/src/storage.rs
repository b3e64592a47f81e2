use uuid::Uuid;

use eventmaster_types::filter::{BookingFilter, EventFilter};
use eventmaster_types::input::{
    BookingPatch, EventPatch, NewBooking, NewContactMessage, NewEvent, NewNotification, NewUser,
    UserPatch,
};
use eventmaster_types::models::{
    Booking, CategoryCount, ContactMessage, ContactStatus, Event, Notification, Stats, User,
};

use crate::error::Result;

/// The persistence interface the HTTP layer is written against.
///
/// Calls are synchronous; async callers run them on the blocking pool.
/// Every adapter upholds the same rules:
///
/// - `Event::current_attendees` is recomputed from confirmed bookings after
///   any change to a booking's status or existence, never incremented.
/// - Deleting an event deletes its bookings. Deleting a user deletes the
///   user's bookings and notifications and recounts the affected events.
/// - Confirmed bookings hold seats, and pending ones do for the adapter's
///   pending-hold window after creation. A create or re-activation that
///   would exceed capacity fails with `StorageError::Conflict`.
/// - Bookings are only created for published, upcoming events, checked
///   under the same lock as capacity (`StorageError::Invalid` otherwise).
/// - Usernames and emails are unique, compared case-insensitively. Text
///   filters fold case with Unicode lowercasing.
pub trait Storage: Send + Sync {
    // -- Users --

    fn create_user(&self, new: NewUser) -> Result<User>;
    fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn count_users(&self) -> Result<u64>;
    fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User>;
    fn delete_user(&self, id: Uuid) -> Result<()>;

    // -- Events --

    fn create_event(&self, new: NewEvent) -> Result<Event>;
    fn get_event(&self, id: Uuid) -> Result<Option<Event>>;
    fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>>;
    /// Published, upcoming, featured events, soonest first.
    fn featured_events(&self, limit: u32) -> Result<Vec<Event>>;
    /// Categories of published upcoming events with their event counts,
    /// ordered by category name.
    fn categories(&self) -> Result<Vec<CategoryCount>>;
    fn update_event(&self, id: Uuid, patch: EventPatch) -> Result<Event>;
    fn delete_event(&self, id: Uuid) -> Result<()>;

    // -- Bookings --

    fn create_booking(&self, new: NewBooking) -> Result<Booking>;
    fn get_booking(&self, id: Uuid) -> Result<Option<Booking>>;
    fn get_booking_by_reference(&self, reference: &str) -> Result<Option<Booking>>;
    /// Newest first.
    fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>>;
    fn update_booking(&self, id: Uuid, patch: BookingPatch) -> Result<Booking>;
    fn delete_booking(&self, id: Uuid) -> Result<()>;
    /// Recomputes and stores the attendee count, returning the new value.
    fn recount_attendees(&self, event_id: Uuid) -> Result<u32>;

    // -- Notifications --

    fn create_notification(&self, new: NewNotification) -> Result<Notification>;
    /// Newest first.
    fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>>;
    fn unread_count(&self, user_id: Uuid) -> Result<u64>;
    /// Scoped to `user_id`; a notification owned by someone else is not found.
    fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<Notification>;
    /// Returns how many notifications changed.
    fn mark_all_read(&self, user_id: Uuid) -> Result<u64>;
    fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<()>;

    // -- Contact --

    fn create_contact_message(&self, new: NewContactMessage) -> Result<ContactMessage>;
    /// Newest first.
    fn list_contact_messages(&self) -> Result<Vec<ContactMessage>>;
    fn update_contact_status(&self, id: Uuid, status: ContactStatus) -> Result<ContactMessage>;
    fn delete_contact_message(&self, id: Uuid) -> Result<()>;

    // -- Dashboard --

    fn stats(&self) -> Result<Stats>;
}
