use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::controllers::vehicle_controller::VehicleController;
use crate::dto::vehicle_dto::{
    CommandResponse, LocationResponse, SendCommandRequest, UpdateLocationRequest,
};
use crate::middleware::AuthenticatedUser;
use crate::models::{Position, Vehicle};
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_vehicle_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_vehicles))
        .route("/:id", get(get_vehicle))
        .route("/:id/location", get(get_location).put(update_location))
        .route("/:id/location/history", get(get_location_history))
        .route("/:id/command", post(send_command))
}

fn controller(state: &AppState) -> VehicleController {
    VehicleController::new(state.store.clone(), state.relay.clone())
}

async fn list_vehicles(State(state): State<AppState>) -> Result<Json<Vec<Vehicle>>, AppError> {
    Ok(Json(controller(&state).list().await?))
}

async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, AppError> {
    Ok(Json(controller(&state).get_by_id(id).await?))
}

async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LocationResponse>, AppError> {
    Ok(Json(controller(&state).location(id).await?))
}

async fn get_location_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Position>>, AppError> {
    Ok(Json(controller(&state).location_history(id).await?))
}

async fn update_location(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateLocationRequest>, JsonRejection>,
) -> Result<Json<LocationResponse>, AppError> {
    user.require_admin()?;
    let Json(request) = payload?;
    Ok(Json(controller(&state).correct_location(id, request).await?))
}

async fn send_command(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<SendCommandRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, AppError> {
    user.require_admin()?;
    let Json(request) = payload?;
    Ok(Json(controller(&state).send_command(id, request).await?))
}
