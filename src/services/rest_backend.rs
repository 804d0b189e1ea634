use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::domain::form::Coordinates;
use crate::services::auth::AuthContext;
use crate::services::backend_error::parse_backend_error;
use crate::services::collaborators::{
    AdminRoster, BookingApi, CollaboratorError, CreatedBooking, DistanceCalculator, Notification,
    NotificationSink, VehicleDirectory, VehicleRecord,
};
use crate::services::submitter::BookingPayload;

/// Backend identifiers arrive as either JSON strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(text) => text,
            WireId::Number(number) => number.to_string(),
        }
    }
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VehicleWire {
    id: WireId,
    #[serde(default)]
    name: Option<String>,
    price_per_day: Decimal,
    #[serde(default)]
    price_per_km: Option<Decimal>,
    #[serde(default = "default_available", alias = "isAvailable")]
    available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DistanceWire {
    #[serde(alias = "distance")]
    distance_km: f64,
}

#[derive(Debug, Deserialize)]
struct CreatedBookingWire {
    id: WireId,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountWire {
    id: WireId,
}

/// All collaborators, served by the rental backend's JSON API.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthContext>,
}

impl RestBackend {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        auth: Arc<dyn AuthContext>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, CollaboratorError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| CollaboratorError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CollaboratorError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| CollaboratorError::Decode(err.to_string()))
    }
}

/// Maps a non-success status and its body onto the collaborator error
/// taxonomy.
#[must_use]
pub fn classify_status(status: StatusCode, body: &str) -> CollaboratorError {
    let fallback = status.canonical_reason().unwrap_or("Request failed");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollaboratorError::Unauthorized {
            status: status.as_u16(),
        },
        status if status.is_client_error() => CollaboratorError::Rejected {
            status: status.as_u16(),
            message: parse_backend_error(body, fallback),
        },
        status => CollaboratorError::Server {
            status: status.as_u16(),
            message: parse_backend_error(body, fallback),
        },
    }
}

#[async_trait]
impl VehicleDirectory for RestBackend {
    async fn vehicle(&self, vehicle_id: &str) -> Result<VehicleRecord, CollaboratorError> {
        let request = self.client.get(self.url(&format!("vehicles/{vehicle_id}")));
        let wire: VehicleWire = self.fetch(request).await?;
        Ok(VehicleRecord {
            id: wire.id.into(),
            name: wire.name,
            price_per_day: wire.price_per_day,
            price_per_km: wire.price_per_km,
            available: wire.available,
        })
    }
}

#[async_trait]
impl DistanceCalculator for RestBackend {
    async fn route_distance_km(
        &self,
        pickup: Coordinates,
        dropoff: Coordinates,
    ) -> Result<f64, CollaboratorError> {
        let request = self
            .client
            .post(self.url("distance"))
            .json(&json!({ "pickup": pickup, "dropoff": dropoff }));
        let wire: DistanceWire = self.fetch(request).await?;
        Ok(wire.distance_km)
    }
}

#[async_trait]
impl BookingApi for RestBackend {
    async fn create_booking(
        &self,
        payload: &BookingPayload,
    ) -> Result<CreatedBooking, CollaboratorError> {
        let request = self.client.post(self.url("bookings")).json(payload);
        let wire: CreatedBookingWire = self.fetch(request).await?;
        Ok(CreatedBooking {
            id: wire.id.into(),
            status: wire.status,
        })
    }
}

#[async_trait]
impl AdminRoster for RestBackend {
    async fn administrator_ids(&self) -> Result<Vec<String>, CollaboratorError> {
        let request = self
            .client
            .get(self.url("users"))
            .query(&[("role", "ADMIN")]);
        let accounts: Vec<AccountWire> = self.fetch(request).await?;
        Ok(accounts.into_iter().map(|account| account.id.into()).collect())
    }
}

#[async_trait]
impl NotificationSink for RestBackend {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        let request = self.client.post(self.url("notifications")).json(notification);
        self.execute(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_statuses_are_unauthorized() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            CollaboratorError::Unauthorized { status: 401 }
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, r#"{"message":"nope"}"#),
            CollaboratorError::Unauthorized { status: 403 }
        );
    }

    #[test]
    fn client_errors_carry_the_normalised_message() {
        assert_eq!(
            classify_status(
                StatusCode::BAD_REQUEST,
                r#"{"errors":["End date must be after start date"]}"#
            ),
            CollaboratorError::Rejected {
                status: 400,
                message: "End date must be after start date".to_string(),
            }
        );
        assert_eq!(
            classify_status(StatusCode::CONFLICT, ""),
            CollaboratorError::Rejected {
                status: 409,
                message: "Conflict".to_string(),
            }
        );
    }

    #[test]
    fn server_errors_are_separate() {
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            CollaboratorError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn numeric_ids_become_strings() {
        let wire: CreatedBookingWire = serde_json::from_str(r#"{"id":42}"#).unwrap();
        assert_eq!(String::from(wire.id), "42");
        assert_eq!(wire.status, None);
    }
}
