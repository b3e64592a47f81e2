use chrono::{Duration, Utc};
use tracing::info;

use eventmaster_types::filter::EventFilter;
use eventmaster_types::input::NewEvent;
use eventmaster_types::models::EventStatus;

use crate::error::Result;
use crate::storage::Storage;

struct Demo {
    title: &'static str,
    description: &'static str,
    category: &'static str,
    location: &'static str,
    days_ahead: i64,
    hours: i64,
    price_cents: i64,
    capacity: u32,
    featured: bool,
}

const DEMO_EVENTS: &[Demo] = &[
    Demo {
        title: "Summer Jazz Festival",
        description: "Three stages of live jazz from local and touring acts.",
        category: "Music",
        location: "Riverside Park",
        days_ahead: 14,
        hours: 8,
        price_cents: 4500,
        capacity: 500,
        featured: true,
    },
    Demo {
        title: "Tech Leaders Summit",
        description: "Talks and panels on building reliable software teams.",
        category: "Technology",
        location: "Convention Center, Hall B",
        days_ahead: 21,
        hours: 9,
        price_cents: 19900,
        capacity: 300,
        featured: true,
    },
    Demo {
        title: "Farm-to-Table Cooking Class",
        description: "Hands-on class cooking a seasonal three-course menu.",
        category: "Food & Drink",
        location: "Community Kitchen",
        days_ahead: 5,
        hours: 3,
        price_cents: 7500,
        capacity: 16,
        featured: false,
    },
    Demo {
        title: "City Marathon",
        description: "Full and half marathon through the historic center.",
        category: "Sports",
        location: "Old Town Square",
        days_ahead: 40,
        hours: 6,
        price_cents: 6000,
        capacity: 2000,
        featured: true,
    },
    Demo {
        title: "Modern Art Open Night",
        description: "Free evening entry to the new contemporary wing.",
        category: "Arts",
        location: "City Museum of Art",
        days_ahead: 3,
        hours: 4,
        price_cents: 0,
        capacity: 250,
        featured: false,
    },
    Demo {
        title: "Startup Pitch Night",
        description: "Ten founders, five minutes each, one audience vote.",
        category: "Business",
        location: "Innovation Hub",
        days_ahead: 10,
        hours: 3,
        price_cents: 1500,
        capacity: 120,
        featured: false,
    },
];

/// Inserts a handful of upcoming demo events when there are no events yet.
/// Returns how many were created.
pub fn seed_demo_events(storage: &dyn Storage) -> Result<usize> {
    let existing = storage.list_events(&EventFilter {
        include_past: true,
        limit: Some(1),
        ..EventFilter::default()
    })?;
    if !existing.is_empty() {
        return Ok(0);
    }

    let base = Utc::now();
    for demo in DEMO_EVENTS {
        let starts_at = base + Duration::days(demo.days_ahead);
        storage.create_event(NewEvent {
            title: demo.title.to_string(),
            description: demo.description.to_string(),
            category: demo.category.to_string(),
            location: demo.location.to_string(),
            starts_at,
            ends_at: Some(starts_at + Duration::hours(demo.hours)),
            price_cents: demo.price_cents,
            capacity: demo.capacity,
            image_url: None,
            featured: demo.featured,
            status: EventStatus::Published,
        })?;
    }

    info!("Seeded {} demo events", DEMO_EVENTS.len());
    Ok(DEMO_EVENTS.len())
}
