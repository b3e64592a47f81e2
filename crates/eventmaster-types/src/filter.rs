use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{BookingStatus, EventStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSort {
    #[default]
    Date,
    DateDesc,
    Price,
    PriceDesc,
    Title,
}

/// Listing criteria for events. Deserializes straight from the query string
/// of `GET /api/events`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    /// Case-insensitive substring over title, description and location.
    pub search: Option<String>,
    /// Exact match, case-insensitive.
    pub category: Option<String>,
    /// Case-insensitive substring over location.
    pub location: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub featured: Option<bool>,
    /// Past events are hidden unless this is set.
    pub include_past: bool,
    /// `None` matches every status.
    pub status: Option<EventStatus>,
    pub sort: EventSort,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl EventFilter {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Trimmed search term, `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        non_blank(self.search.as_deref())
    }

    pub fn category_term(&self) -> Option<&str> {
        non_blank(self.category.as_deref())
    }

    pub fn location_term(&self) -> Option<&str> {
        non_blank(self.location.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookingFilter {
    pub user_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn for_event(event_id: Uuid) -> Self {
        Self {
            event_id: Some(event_id),
            ..Self::default()
        }
    }
}
