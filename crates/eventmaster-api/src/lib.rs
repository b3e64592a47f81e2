pub mod admin;
pub mod auth;
pub mod bookings;
pub mod contact;
pub mod error;
pub mod events;
pub mod export;
pub mod extract;
pub mod mailer;
pub mod middleware;
pub mod notifications;
pub mod payments;
pub mod routes;
pub mod session;
pub mod state;
pub mod users;

#[cfg(test)]
mod test_support;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner, Settings};
