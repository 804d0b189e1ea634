use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::fare::VehicleRates;
use crate::domain::form::Coordinates;
use crate::services::submitter::BookingPayload;

/// Failure of a call to one of the backend collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollaboratorError {
    #[error("credential rejected (status {status})")]
    Unauthorized { status: u16 },
    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },
    #[error("request did not complete: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl CollaboratorError {
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CollaboratorError::Unauthorized { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub id: String,
    pub name: Option<String>,
    pub price_per_day: Decimal,
    pub price_per_km: Option<Decimal>,
    pub available: bool,
}

impl VehicleRecord {
    #[must_use]
    pub fn rates(&self) -> VehicleRates {
        VehicleRates {
            price_per_day: self.price_per_day,
            price_per_km: self.price_per_km,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedBooking {
    pub id: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    Booking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: String,
    pub category: NotificationCategory,
    pub status: String,
    pub booking_id: String,
    pub message: String,
}

#[async_trait]
pub trait VehicleDirectory: Send + Sync {
    async fn vehicle(&self, vehicle_id: &str) -> Result<VehicleRecord, CollaboratorError>;
}

/// Route (driving) distance between two points, in kilometres.
#[async_trait]
pub trait DistanceCalculator: Send + Sync {
    async fn route_distance_km(
        &self,
        pickup: Coordinates,
        dropoff: Coordinates,
    ) -> Result<f64, CollaboratorError>;
}

#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn create_booking(
        &self,
        payload: &BookingPayload,
    ) -> Result<CreatedBooking, CollaboratorError>;
}

#[async_trait]
pub trait AdminRoster: Send + Sync {
    async fn administrator_ids(&self) -> Result<Vec<String>, CollaboratorError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError>;
}
