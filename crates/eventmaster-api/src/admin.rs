use axum::{Json, extract::State};

use eventmaster_types::models::Stats;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(state.db(|s| s.stats()).await?))
}
