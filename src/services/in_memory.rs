use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::form::Coordinates;
use crate::services::collaborators::{
    AdminRoster, BookingApi, CollaboratorError, CreatedBooking, DistanceCalculator, Notification,
    NotificationSink, VehicleDirectory, VehicleRecord,
};
use crate::services::submitter::BookingPayload;

struct Route {
    pickup: Coordinates,
    dropoff: Coordinates,
    result: Result<f64, CollaboratorError>,
    delay: Duration,
}

/// A backend kept entirely in memory. It answers every collaborator seam,
/// records what it was sent, and can be scripted to fail or to answer
/// slowly.
#[derive(Default)]
pub struct InMemoryBackend {
    vehicles: Mutex<HashMap<String, VehicleRecord>>,
    vehicle_delays: Mutex<HashMap<String, Duration>>,
    routes: Mutex<Vec<Route>>,
    booking_failure: Mutex<Option<CollaboratorError>>,
    booking_status: Mutex<Option<String>>,
    admins: Mutex<Vec<String>>,
    roster_failure: Mutex<Option<CollaboratorError>>,
    failing_recipients: Mutex<HashSet<String>>,
    bookings: Mutex<Vec<BookingPayload>>,
    notifications: Mutex<Vec<Notification>>,
    distance_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBackend {
    #[must_use]
    pub fn with_vehicle(self, vehicle: VehicleRecord) -> Self {
        lock(&self.vehicles).insert(vehicle.id.clone(), vehicle);
        self
    }

    /// Answers lookups of `vehicle_id` only after `delay`.
    #[must_use]
    pub fn with_vehicle_delay(self, vehicle_id: &str, delay: Duration) -> Self {
        lock(&self.vehicle_delays).insert(vehicle_id.to_string(), delay);
        self
    }

    /// Answers `km` for the pair after `delay`.
    #[must_use]
    pub fn with_route(
        self,
        pickup: Coordinates,
        dropoff: Coordinates,
        km: f64,
        delay: Duration,
    ) -> Self {
        lock(&self.routes).push(Route {
            pickup,
            dropoff,
            result: Ok(km),
            delay,
        });
        self
    }

    #[must_use]
    pub fn with_route_failure(
        self,
        pickup: Coordinates,
        dropoff: Coordinates,
        failure: CollaboratorError,
    ) -> Self {
        lock(&self.routes).push(Route {
            pickup,
            dropoff,
            result: Err(failure),
            delay: Duration::ZERO,
        });
        self
    }

    #[must_use]
    pub fn with_booking_failure(self, failure: CollaboratorError) -> Self {
        *lock(&self.booking_failure) = Some(failure);
        self
    }

    #[must_use]
    pub fn with_booking_status(self, status: &str) -> Self {
        *lock(&self.booking_status) = Some(status.to_string());
        self
    }

    #[must_use]
    pub fn with_admins(self, admins: Vec<String>) -> Self {
        *lock(&self.admins) = admins;
        self
    }

    #[must_use]
    pub fn with_roster_failure(self, failure: CollaboratorError) -> Self {
        *lock(&self.roster_failure) = Some(failure);
        self
    }

    #[must_use]
    pub fn failing_notifications_for(self, recipient_id: &str) -> Self {
        lock(&self.failing_recipients).insert(recipient_id.to_string());
        self
    }

    pub fn set_booking_failure(&self, failure: Option<CollaboratorError>) {
        *lock(&self.booking_failure) = failure;
    }

    /// Every booking payload received, in order.
    #[must_use]
    pub fn bookings(&self) -> Vec<BookingPayload> {
        lock(&self.bookings).clone()
    }

    /// Every notification attempted, delivered or not, in order.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.notifications).clone()
    }

    #[must_use]
    pub fn distance_calls(&self) -> usize {
        self.distance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VehicleDirectory for InMemoryBackend {
    async fn vehicle(&self, vehicle_id: &str) -> Result<VehicleRecord, CollaboratorError> {
        let delay = lock(&self.vehicle_delays).get(vehicle_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.vehicles)
            .get(vehicle_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::Rejected {
                status: 404,
                message: format!("Vehicle {vehicle_id} not found"),
            })
    }
}

#[async_trait]
impl DistanceCalculator for InMemoryBackend {
    async fn route_distance_km(
        &self,
        pickup: Coordinates,
        dropoff: Coordinates,
    ) -> Result<f64, CollaboratorError> {
        self.distance_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = lock(&self.routes)
            .iter()
            .find(|route| route.pickup == pickup && route.dropoff == dropoff)
            .map(|route| (route.result.clone(), route.delay));

        let Some((result, delay)) = scripted else {
            return Err(CollaboratorError::Rejected {
                status: 404,
                message: "no route between the given points".to_string(),
            });
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl BookingApi for InMemoryBackend {
    async fn create_booking(
        &self,
        payload: &BookingPayload,
    ) -> Result<CreatedBooking, CollaboratorError> {
        if let Some(failure) = lock(&self.booking_failure).clone() {
            return Err(failure);
        }
        let mut bookings = lock(&self.bookings);
        bookings.push(payload.clone());
        Ok(CreatedBooking {
            id: format!("bk-{}", bookings.len()),
            status: lock(&self.booking_status).clone(),
        })
    }
}

#[async_trait]
impl AdminRoster for InMemoryBackend {
    async fn administrator_ids(&self) -> Result<Vec<String>, CollaboratorError> {
        if let Some(failure) = lock(&self.roster_failure).clone() {
            return Err(failure);
        }
        Ok(lock(&self.admins).clone())
    }
}

#[async_trait]
impl NotificationSink for InMemoryBackend {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        lock(&self.notifications).push(notification.clone());
        if lock(&self.failing_recipients).contains(&notification.recipient_id) {
            return Err(CollaboratorError::Server {
                status: 500,
                message: "notification store unavailable".to_string(),
            });
        }
        Ok(())
    }
}
