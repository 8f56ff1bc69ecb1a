use axum::{extract::State, routing::get, Json, Router};

use crate::models::Zone;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_zone_router() -> Router<AppState> {
    Router::new().route("/", get(list_active_zones))
}

async fn list_active_zones(State(state): State<AppState>) -> Result<Json<Vec<Zone>>, AppError> {
    Ok(Json(state.store.zones.list_active().await?))
}
