//! Behavioral suite every `Storage` adapter must pass. Each adapter's test
//! module instantiates it with `storage_suite!(<constructor>)`.

use chrono::{Duration, Utc};
use uuid::Uuid;

use eventmaster_types::filter::{BookingFilter, EventFilter, EventSort};
use eventmaster_types::input::{
    BookingPatch, EventPatch, NewBooking, NewContactMessage, NewEvent, NewNotification, NewUser,
    UserPatch,
};
use eventmaster_types::models::{
    BookingStatus, ContactStatus, Event, EventStatus, NotificationKind, PaymentStatus, Role, User,
};

use crate::error::StorageError;
use crate::storage::Storage;

macro_rules! storage_suite {
    (@cases $make:expr; $($case:ident),+ $(,)?) => {
        $(
            #[test]
            fn $case() {
                let storage = $make;
                $crate::conformance::$case(&storage);
            }
        )+
    };
    ($make:expr) => {
        #[test]
        fn lapsed_pending_bookings_release_seats() {
            let storage = ($make).with_pending_hold(::chrono::Duration::zero());
            $crate::conformance::lapsed_pending_bookings_release_seats(&storage);
        }

        $crate::conformance::storage_suite!(@cases $make;
            users_are_unique_ignoring_case,
            user_updates,
            event_crud,
            event_filters,
            featured_and_categories,
            confirmed_bookings_drive_attendee_count,
            overselling_is_rejected,
            live_pending_bookings_hold_seats,
            closed_events_reject_bookings,
            search_folds_non_ascii_case,
            deleting_event_cascades_to_bookings,
            deleting_user_cascades_and_recounts,
            booking_lookups,
            notifications_are_scoped_to_owner,
            contact_messages,
            dashboard_stats,
        );
    };
}

pub(crate) use storage_suite;

fn user(storage: &dyn Storage, username: &str) -> User {
    storage
        .create_user(NewUser {
            username: username.into(),
            email: format!("{username}@example.com"),
            password_hash: "hash".into(),
            full_name: None,
            role: Role::User,
        })
        .unwrap()
}

fn new_event(title: &str) -> NewEvent {
    NewEvent {
        title: title.into(),
        description: format!("{title} description"),
        category: "Music".into(),
        location: "Main Hall".into(),
        starts_at: Utc::now() + Duration::days(7),
        ends_at: None,
        price_cents: 1000,
        capacity: 10,
        image_url: None,
        featured: false,
        status: EventStatus::Published,
    }
}

fn event(storage: &dyn Storage, title: &str) -> Event {
    storage.create_event(new_event(title)).unwrap()
}

fn book(
    storage: &dyn Storage,
    user: &User,
    event: &Event,
    quantity: u32,
    status: BookingStatus,
) -> Result<eventmaster_types::models::Booking, StorageError> {
    storage.create_booking(NewBooking {
        user_id: user.id,
        event_id: event.id,
        quantity,
        total_cents: event.price_cents * i64::from(quantity),
        status,
        payment_status: if status == BookingStatus::Confirmed {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Unpaid
        },
        payment_intent_id: None,
    })
}

fn attendees(storage: &dyn Storage, event: &Event) -> u32 {
    storage.get_event(event.id).unwrap().unwrap().current_attendees
}

pub fn users_are_unique_ignoring_case(storage: &dyn Storage) {
    let ada = user(storage, "ada");

    let dup_name = storage.create_user(NewUser {
        username: "ADA".into(),
        email: "other@example.com".into(),
        password_hash: "hash".into(),
        full_name: None,
        role: Role::User,
    });
    assert!(matches!(dup_name, Err(StorageError::Conflict(_))));

    let dup_email = storage.create_user(NewUser {
        username: "lovelace".into(),
        email: "ADA@example.com".into(),
        password_hash: "hash".into(),
        full_name: None,
        role: Role::User,
    });
    assert!(matches!(dup_email, Err(StorageError::Conflict(_))));

    let found = storage.get_user_by_username("Ada").unwrap().unwrap();
    assert_eq!(found.id, ada.id);
    let found = storage.get_user_by_email("ada@EXAMPLE.com").unwrap().unwrap();
    assert_eq!(found.id, ada.id);
    assert_eq!(storage.count_users().unwrap(), 1);
}

pub fn user_updates(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let grace = user(storage, "grace");

    let updated = storage
        .update_user(
            ada.id,
            UserPatch {
                full_name: Some("Ada Lovelace".into()),
                role: Some(Role::Admin),
                ..UserPatch::default()
            },
        )
        .unwrap();
    assert_eq!(updated.full_name.as_deref(), Some("Ada Lovelace"));
    assert!(updated.is_admin());
    assert!(storage.get_user(ada.id).unwrap().unwrap().is_admin());

    let taken = storage.update_user(
        ada.id,
        UserPatch {
            email: Some(grace.email.clone()),
            ..UserPatch::default()
        },
    );
    assert!(matches!(taken, Err(StorageError::Conflict(_))));

    let missing = storage.update_user(Uuid::new_v4(), UserPatch::default());
    assert!(matches!(missing, Err(StorageError::NotFound { .. })));

    let users = storage.list_users().unwrap();
    assert_eq!(users.len(), 2);
}

pub fn event_crud(storage: &dyn Storage) {
    let mut invalid = new_event("Broken");
    invalid.capacity = 0;
    assert!(matches!(
        storage.create_event(invalid),
        Err(StorageError::Invalid(_))
    ));

    let gig = event(storage, "Gig");
    assert_eq!(gig.current_attendees, 0);

    let updated = storage
        .update_event(
            gig.id,
            EventPatch {
                title: Some("Late Gig".into()),
                featured: Some(true),
                ..EventPatch::default()
            },
        )
        .unwrap();
    assert_eq!(updated.title, "Late Gig");
    assert!(updated.featured);
    assert_eq!(storage.get_event(gig.id).unwrap().unwrap().title, "Late Gig");

    let bad_patch = storage.update_event(
        gig.id,
        EventPatch {
            title: Some(String::new()),
            ..EventPatch::default()
        },
    );
    assert!(matches!(bad_patch, Err(StorageError::Invalid(_))));

    let ada = user(storage, "ada");
    book(storage, &ada, &gig, 6, BookingStatus::Pending).unwrap();
    let shrink = storage.update_event(
        gig.id,
        EventPatch {
            capacity: Some(5),
            ..EventPatch::default()
        },
    );
    assert!(matches!(shrink, Err(StorageError::Conflict(_))));

    storage.delete_event(gig.id).unwrap();
    assert!(storage.get_event(gig.id).unwrap().is_none());
    assert!(matches!(
        storage.delete_event(gig.id),
        Err(StorageError::NotFound { .. })
    ));
}

pub fn event_filters(storage: &dyn Storage) {
    let mut jazz = new_event("Jazz Night");
    jazz.price_cents = 2500;
    jazz.location = "Blue Room, Oslo".into();
    let jazz = storage.create_event(jazz).unwrap();

    let mut talk = new_event("Rust Talk");
    talk.category = "Tech".into();
    talk.price_cents = 0;
    talk.starts_at = Utc::now() + Duration::days(2);
    let talk = storage.create_event(talk).unwrap();

    let mut past = new_event("Old Jazz");
    past.starts_at = Utc::now() - Duration::days(2);
    let past = storage.create_event(past).unwrap();

    let mut draft = new_event("Secret Jazz");
    draft.status = EventStatus::Draft;
    storage.create_event(draft).unwrap();

    let published = |f: EventFilter| EventFilter {
        status: Some(EventStatus::Published),
        ..f
    };
    let ids = |events: Vec<Event>| events.into_iter().map(|e| e.id).collect::<Vec<_>>();

    // default: upcoming, date ascending
    let all = ids(storage.list_events(&published(EventFilter::default())).unwrap());
    assert_eq!(all, vec![talk.id, jazz.id]);

    let search = storage
        .list_events(&published(EventFilter {
            search: Some("JAZZ".into()),
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(search), vec![jazz.id]);

    let with_past = storage
        .list_events(&published(EventFilter {
            search: Some("jazz".into()),
            include_past: true,
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(with_past), vec![past.id, jazz.id]);

    let any_status = storage
        .list_events(&EventFilter {
            search: Some("jazz".into()),
            ..EventFilter::default()
        })
        .unwrap();
    assert_eq!(any_status.len(), 2);

    let tech = storage
        .list_events(&published(EventFilter {
            category: Some("tech".into()),
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(tech), vec![talk.id]);

    let oslo = storage
        .list_events(&published(EventFilter {
            location: Some("oslo".into()),
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(oslo), vec![jazz.id]);

    let paid = storage
        .list_events(&published(EventFilter {
            min_price: Some(1),
            max_price: Some(3000),
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(paid), vec![jazz.id]);

    let by_price = storage
        .list_events(&published(EventFilter {
            sort: EventSort::PriceDesc,
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(by_price), vec![jazz.id, talk.id]);

    let by_title = storage
        .list_events(&published(EventFilter {
            sort: EventSort::Title,
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(by_title), vec![jazz.id, talk.id]);

    let window = storage
        .list_events(&published(EventFilter {
            to: Some(Utc::now() + Duration::days(3)),
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(window), vec![talk.id]);

    let page = storage
        .list_events(&published(EventFilter {
            limit: Some(1),
            offset: Some(1),
            ..EventFilter::default()
        }))
        .unwrap();
    assert_eq!(ids(page), vec![jazz.id]);
}

pub fn featured_and_categories(storage: &dyn Storage) {
    let mut headline = new_event("Headline");
    headline.featured = true;
    let headline = storage.create_event(headline).unwrap();

    let mut hidden = new_event("Hidden");
    hidden.featured = true;
    hidden.status = EventStatus::Draft;
    storage.create_event(hidden).unwrap();

    let mut talk = new_event("Talk");
    talk.category = "Tech".into();
    storage.create_event(talk).unwrap();
    event(storage, "Gig");

    let featured = storage.featured_events(6).unwrap();
    assert_eq!(featured.len(), 1);
    assert_eq!(featured[0].id, headline.id);

    let categories = storage.categories().unwrap();
    let pairs: Vec<(String, u64)> = categories
        .into_iter()
        .map(|c| (c.category, c.count))
        .collect();
    assert_eq!(pairs, vec![("Music".to_string(), 2), ("Tech".to_string(), 1)]);
}

pub fn confirmed_bookings_drive_attendee_count(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let gig = event(storage, "Gig");

    let confirmed = book(storage, &ada, &gig, 3, BookingStatus::Confirmed).unwrap();
    assert_eq!(attendees(storage, &gig), 3);

    let pending = book(storage, &ada, &gig, 2, BookingStatus::Pending).unwrap();
    assert_eq!(attendees(storage, &gig), 3);

    storage
        .update_booking(
            pending.id,
            BookingPatch {
                status: Some(BookingStatus::Confirmed),
                payment_status: Some(PaymentStatus::Paid),
                payment_intent_id: Some("pi_123".into()),
            },
        )
        .unwrap();
    assert_eq!(attendees(storage, &gig), 5);
    let reloaded = storage.get_booking(pending.id).unwrap().unwrap();
    assert_eq!(reloaded.payment_intent_id.as_deref(), Some("pi_123"));

    storage
        .update_booking(
            confirmed.id,
            BookingPatch {
                status: Some(BookingStatus::Cancelled),
                ..BookingPatch::default()
            },
        )
        .unwrap();
    assert_eq!(attendees(storage, &gig), 2);

    storage.delete_booking(pending.id).unwrap();
    assert_eq!(attendees(storage, &gig), 0);
    assert_eq!(storage.recount_attendees(gig.id).unwrap(), 0);
    assert!(matches!(
        storage.recount_attendees(Uuid::new_v4()),
        Err(StorageError::NotFound { .. })
    ));
}

pub fn overselling_is_rejected(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let gig = event(storage, "Gig");

    let first = book(storage, &ada, &gig, 8, BookingStatus::Pending).unwrap();
    assert!(matches!(
        book(storage, &ada, &gig, 3, BookingStatus::Confirmed),
        Err(StorageError::Conflict(_))
    ));
    book(storage, &ada, &gig, 2, BookingStatus::Confirmed).unwrap();

    // cancelling frees the seats, re-activating needs them back
    storage
        .update_booking(
            first.id,
            BookingPatch {
                status: Some(BookingStatus::Cancelled),
                ..BookingPatch::default()
            },
        )
        .unwrap();
    book(storage, &ada, &gig, 5, BookingStatus::Confirmed).unwrap();
    let reactivate = storage.update_booking(
        first.id,
        BookingPatch {
            status: Some(BookingStatus::Confirmed),
            ..BookingPatch::default()
        },
    );
    assert!(matches!(reactivate, Err(StorageError::Conflict(_))));
    assert_eq!(attendees(storage, &gig), 7);

    let missing_event = storage.create_booking(NewBooking {
        user_id: ada.id,
        event_id: Uuid::new_v4(),
        quantity: 1,
        total_cents: 0,
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
        payment_intent_id: None,
    });
    assert!(matches!(missing_event, Err(StorageError::NotFound { .. })));
}

pub fn live_pending_bookings_hold_seats(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let gig = event(storage, "Gig");

    book(storage, &ada, &gig, 10, BookingStatus::Pending).unwrap();
    assert!(matches!(
        book(storage, &ada, &gig, 1, BookingStatus::Confirmed),
        Err(StorageError::Conflict(_))
    ));
}

/// Runs against a storage whose pending hold is zero, so every pending
/// booking has already lapsed.
pub fn lapsed_pending_bookings_release_seats(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let grace = user(storage, "grace");
    let gig = event(storage, "Gig");

    let abandoned = book(storage, &ada, &gig, 10, BookingStatus::Pending).unwrap();
    book(storage, &grace, &gig, 10, BookingStatus::Confirmed).unwrap();
    assert_eq!(attendees(storage, &gig), 10);

    // the lapsed hold cannot be confirmed into seats that are gone
    let late = storage.update_booking(
        abandoned.id,
        BookingPatch {
            status: Some(BookingStatus::Confirmed),
            payment_status: Some(PaymentStatus::Paid),
            payment_intent_id: None,
        },
    );
    assert!(matches!(late, Err(StorageError::Conflict(_))));

    // and does not stop the capacity from shrinking to what is confirmed
    storage
        .update_event(
            gig.id,
            EventPatch {
                capacity: Some(10),
                ..EventPatch::default()
            },
        )
        .unwrap();
}

pub fn closed_events_reject_bookings(storage: &dyn Storage) {
    let ada = user(storage, "ada");

    let mut draft = new_event("Draft");
    draft.status = EventStatus::Draft;
    let draft = storage.create_event(draft).unwrap();

    let mut past = new_event("Past");
    past.starts_at = Utc::now() - Duration::hours(1);
    let past = storage.create_event(past).unwrap();

    let gig = event(storage, "Gig");
    storage
        .update_event(
            gig.id,
            EventPatch {
                status: Some(EventStatus::Cancelled),
                ..EventPatch::default()
            },
        )
        .unwrap();
    let cancelled = storage.get_event(gig.id).unwrap().unwrap();

    for closed in [&draft, &past, &cancelled] {
        assert!(matches!(
            book(storage, &ada, closed, 1, BookingStatus::Confirmed),
            Err(StorageError::Invalid(_))
        ));
        assert_eq!(attendees(storage, closed), 0);
    }
}

pub fn search_folds_non_ascii_case(storage: &dyn Storage) {
    let mut fest = new_event("Été Festival");
    fest.location = "Zürich".into();
    fest.category = "Écoute".into();
    let fest = storage.create_event(fest).unwrap();
    event(storage, "Gig");

    let found = |filter: EventFilter| {
        storage
            .list_events(&filter)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect::<Vec<_>>()
    };

    let by_title = found(EventFilter {
        search: Some("été".into()),
        ..EventFilter::default()
    });
    assert_eq!(by_title, vec![fest.id]);

    let by_location = found(EventFilter {
        location: Some("ZÜRICH".into()),
        ..EventFilter::default()
    });
    assert_eq!(by_location, vec![fest.id]);

    let by_category = found(EventFilter {
        category: Some("écoute".into()),
        ..EventFilter::default()
    });
    assert_eq!(by_category, vec![fest.id]);
}

pub fn deleting_event_cascades_to_bookings(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let gig = event(storage, "Gig");
    let other = event(storage, "Other");
    let booking = book(storage, &ada, &gig, 2, BookingStatus::Confirmed).unwrap();
    book(storage, &ada, &other, 1, BookingStatus::Confirmed).unwrap();

    storage.delete_event(gig.id).unwrap();

    assert!(storage.get_booking(booking.id).unwrap().is_none());
    assert!(
        storage
            .list_bookings(&BookingFilter::for_event(gig.id))
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        storage
            .list_bookings(&BookingFilter::for_user(ada.id))
            .unwrap()
            .len(),
        1
    );
}

pub fn deleting_user_cascades_and_recounts(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let grace = user(storage, "grace");
    let gig = event(storage, "Gig");
    book(storage, &ada, &gig, 2, BookingStatus::Confirmed).unwrap();
    book(storage, &grace, &gig, 1, BookingStatus::Confirmed).unwrap();
    storage
        .create_notification(NewNotification {
            user_id: ada.id,
            kind: NotificationKind::System,
            title: "Hi".into(),
            message: "Welcome".into(),
        })
        .unwrap();
    assert_eq!(attendees(storage, &gig), 3);

    storage.delete_user(ada.id).unwrap();

    assert!(storage.get_user(ada.id).unwrap().is_none());
    assert!(
        storage
            .list_bookings(&BookingFilter::for_user(ada.id))
            .unwrap()
            .is_empty()
    );
    assert!(storage.list_notifications(ada.id, false).unwrap().is_empty());
    assert_eq!(attendees(storage, &gig), 1);
    assert!(matches!(
        storage.delete_user(ada.id),
        Err(StorageError::NotFound { .. })
    ));
}

pub fn booking_lookups(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let grace = user(storage, "grace");
    let gig = event(storage, "Gig");
    let mine = book(storage, &ada, &gig, 1, BookingStatus::Confirmed).unwrap();
    book(storage, &grace, &gig, 1, BookingStatus::Pending).unwrap();

    let by_ref = storage
        .get_booking_by_reference(&mine.reference.to_lowercase())
        .unwrap()
        .unwrap();
    assert_eq!(by_ref.id, mine.id);
    assert!(storage.get_booking_by_reference("EM-NOPE0000").unwrap().is_none());

    let confirmed = storage
        .list_bookings(&BookingFilter {
            event_id: Some(gig.id),
            status: Some(BookingStatus::Confirmed),
            ..BookingFilter::default()
        })
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].user_id, ada.id);
    assert_eq!(storage.list_bookings(&BookingFilter::default()).unwrap().len(), 2);
}

pub fn notifications_are_scoped_to_owner(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let grace = user(storage, "grace");
    let notify = |user: &User, title: &str| {
        storage
            .create_notification(NewNotification {
                user_id: user.id,
                kind: NotificationKind::Booking,
                title: title.into(),
                message: "body".into(),
            })
            .unwrap()
    };
    let first = notify(&ada, "first");
    notify(&ada, "second");
    let theirs = notify(&grace, "theirs");

    assert_eq!(storage.unread_count(ada.id).unwrap(), 2);
    assert!(matches!(
        storage.mark_notification_read(ada.id, theirs.id),
        Err(StorageError::NotFound { .. })
    ));

    let read = storage.mark_notification_read(ada.id, first.id).unwrap();
    assert!(read.read);
    assert_eq!(storage.unread_count(ada.id).unwrap(), 1);
    assert_eq!(storage.list_notifications(ada.id, true).unwrap().len(), 1);
    assert_eq!(storage.list_notifications(ada.id, false).unwrap().len(), 2);

    assert_eq!(storage.mark_all_read(ada.id).unwrap(), 1);
    assert_eq!(storage.unread_count(ada.id).unwrap(), 0);
    assert_eq!(storage.unread_count(grace.id).unwrap(), 1);

    assert!(matches!(
        storage.delete_notification(ada.id, theirs.id),
        Err(StorageError::NotFound { .. })
    ));
    storage.delete_notification(grace.id, theirs.id).unwrap();
    assert!(storage.list_notifications(grace.id, false).unwrap().is_empty());

    let orphan = storage.create_notification(NewNotification {
        user_id: Uuid::new_v4(),
        kind: NotificationKind::System,
        title: "x".into(),
        message: "y".into(),
    });
    assert!(matches!(orphan, Err(StorageError::NotFound { .. })));
}

pub fn contact_messages(storage: &dyn Storage) {
    let message = storage
        .create_contact_message(NewContactMessage {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            subject: "Refund".into(),
            message: "Please help".into(),
        })
        .unwrap();
    assert_eq!(message.status, ContactStatus::New);

    let updated = storage
        .update_contact_status(message.id, ContactStatus::Resolved)
        .unwrap();
    assert_eq!(updated.status, ContactStatus::Resolved);
    assert_eq!(storage.list_contact_messages().unwrap().len(), 1);

    storage.delete_contact_message(message.id).unwrap();
    assert!(storage.list_contact_messages().unwrap().is_empty());
    assert!(matches!(
        storage.update_contact_status(message.id, ContactStatus::Read),
        Err(StorageError::NotFound { .. })
    ));
}

pub fn dashboard_stats(storage: &dyn Storage) {
    let ada = user(storage, "ada");
    let gig = event(storage, "Gig");
    let mut past = new_event("Past");
    past.starts_at = Utc::now() - Duration::days(1);
    storage.create_event(past).unwrap();

    book(storage, &ada, &gig, 2, BookingStatus::Confirmed).unwrap();
    book(storage, &ada, &gig, 1, BookingStatus::Pending).unwrap();

    let stats = storage.stats().unwrap();
    assert_eq!(stats.users, 1);
    assert_eq!(stats.events, 2);
    assert_eq!(stats.upcoming_events, 1);
    assert_eq!(stats.bookings, 2);
    assert_eq!(stats.confirmed_bookings, 1);
    assert_eq!(stats.tickets_sold, 2);
    assert_eq!(stats.revenue_cents, 2000);
}
