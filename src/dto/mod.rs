pub mod rental_dto;
pub mod vehicle_dto;
