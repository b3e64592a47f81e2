use std::sync::Arc;

use tracing::error;

use eventmaster_db::Storage;

use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::payments::PaymentGateway;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub storage: Arc<dyn Storage>,
    pub mailer: Arc<dyn Mailer>,
    pub payments: Arc<dyn PaymentGateway>,
    pub settings: Settings,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    /// The first account registered on an empty database becomes admin.
    pub first_user_admin: bool,
    pub currency: String,
    /// Receives a copy of every contact form submission.
    pub admin_email: Option<String>,
}

impl AppStateInner {
    /// Runs a storage call on the blocking pool.
    pub async fn db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&dyn Storage) -> eventmaster_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || f(storage.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
            .map_err(ApiError::from)
    }
}
