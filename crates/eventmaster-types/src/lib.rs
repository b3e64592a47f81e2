//! Shared domain types for EventMaster: persisted models, storage inputs,
//! listing filters and the JSON shapes of the HTTP API.

pub mod api;
pub mod filter;
pub mod input;
pub mod models;
