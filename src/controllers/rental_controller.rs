use std::sync::Arc;

use uuid::Uuid;

use crate::dto::rental_dto::{CreateRentalRequest, RentalCreatedResponse};
use crate::models::Rental;
use crate::services::pricing_service::PriceQuote;
use crate::services::rental_service::RentalService;
use crate::utils::errors::AppError;

pub struct RentalController {
    service: Arc<RentalService>,
}

impl RentalController {
    pub fn new(service: Arc<RentalService>) -> Self {
        Self { service }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        request: CreateRentalRequest,
    ) -> Result<RentalCreatedResponse, AppError> {
        let started = self
            .service
            .request_rental(user_id, request.scooter_id)
            .await?;

        Ok(RentalCreatedResponse {
            rental: started.rental,
            vehicle_reachable: started.vehicle_reachable,
        })
    }

    pub async fn end(&self, id: Uuid, user_id: Uuid) -> Result<Rental, AppError> {
        Ok(self.service.end_rental(id, user_id).await?)
    }

    pub async fn get_by_id(&self, id: Uuid, user_id: Uuid) -> Result<Rental, AppError> {
        Ok(self.service.get_rental(id, user_id).await?)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Rental>, AppError> {
        Ok(self.service.list_rentals(user_id).await?)
    }

    pub async fn quote(&self, id: Uuid, user_id: Uuid) -> Result<PriceQuote, AppError> {
        Ok(self.service.quote_rental(id, user_id).await?)
    }
}
