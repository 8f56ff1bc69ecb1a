use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use uuid::Uuid;

use crate::controllers::rental_controller::RentalController;
use crate::dto::rental_dto::{CreateRentalRequest, RentalCreatedResponse};
use crate::middleware::AuthenticatedUser;
use crate::models::Rental;
use crate::services::pricing_service::PriceQuote;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_rental_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rentals).post(create_rental))
        .route("/:id", get(get_rental))
        .route("/:id/end", patch(end_rental))
        .route("/:id/quote", get(quote_rental))
}

fn controller(state: &AppState) -> RentalController {
    RentalController::new(state.rentals.clone())
}

async fn create_rental(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateRentalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RentalCreatedResponse>), AppError> {
    let Json(request) = payload?;
    let response = controller(&state).create(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn end_rental(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Rental>, AppError> {
    Ok(Json(controller(&state).end(id, user.user_id).await?))
}

async fn get_rental(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Rental>, AppError> {
    Ok(Json(controller(&state).get_by_id(id, user.user_id).await?))
}

async fn list_rentals(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Rental>>, AppError> {
    Ok(Json(controller(&state).list_for_user(user.user_id).await?))
}

async fn quote_rental(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PriceQuote>, AppError> {
    Ok(Json(controller(&state).quote(id, user.user_id).await?))
}
