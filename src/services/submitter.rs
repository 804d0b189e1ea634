use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::commands::SubmissionOutcome;
use crate::domain::fare::FareQuote;
use crate::domain::form::{Coordinates, ValidationErrors, WizardForm};
use crate::domain::validation;
use crate::domain::wizard::{NO_RENTAL_DAYS_MESSAGE, SESSION_EXPIRED_NOTICE, VehicleSnapshot};
use crate::services::auth::ActingUser;
use crate::services::clock::Clock;
use crate::services::collaborators::{
    AdminRoster, BookingApi, CollaboratorError, Notification, NotificationCategory,
    NotificationSink,
};

pub const DEFAULT_BOOKING_STATUS: &str = "PENDING";
pub const SIGN_IN_REQUIRED_NOTICE: &str = "Please sign in to complete your booking.";
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "We could not reach the booking service. Please try again.";
pub const BOOKING_REJECTED_MESSAGE: &str = "The booking request was rejected.";
pub const BOOKING_UNCONFIRMED_MESSAGE: &str = "The booking service accepted the request but its reply could not be read. \
     Please check your bookings before trying again.";

/// What the backend receives for one booking attempt. Built once per attempt
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    pub vehicle_id: String,
    pub customer_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub pickup_coords: Option<Coordinates>,
    pub dropoff_coords: Option<Coordinates>,
    pub total_days: u32,
    pub base_price: Decimal,
    pub distance_km: Decimal,
    pub distance_price: Decimal,
    pub total_price: Decimal,
    pub cardholder_name: String,
    pub card_last_four: String,
}

impl BookingPayload {
    /// `None` when the dates do not describe a bookable rental.
    #[must_use]
    pub fn build(
        form: &WizardForm,
        fare: &FareQuote,
        vehicle: &VehicleSnapshot,
        customer: &ActingUser,
    ) -> Option<Self> {
        if !fare.is_bookable() {
            return None;
        }
        Some(Self {
            vehicle_id: vehicle.vehicle_id.clone(),
            customer_id: customer.id.clone(),
            start_date: form.start_date?,
            end_date: form.end_date?,
            pickup_location: form.pickup_location.trim().to_string(),
            dropoff_location: form.dropoff_location.trim().to_string(),
            pickup_coords: form.pickup_coords,
            dropoff_coords: form.dropoff_coords,
            total_days: fare.total_days,
            base_price: fare.base_price,
            distance_km: fare.distance_km,
            distance_price: fare.distance_price,
            total_price: fare.total_price,
            cardholder_name: form.card_name.trim().to_string(),
            card_last_four: form.card_last_four(),
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BookingError {
    #[error("payment details are invalid")]
    InvalidPayment(ValidationErrors),
    #[error("no authenticated user")]
    NotAuthenticated,
    #[error("booking covers no rental days")]
    NoRentalDays,
    #[error("session expired")]
    SessionExpired,
    #[error("booking rejected: {message}")]
    Rejected { message: String },
    #[error("booking service unavailable: {message}")]
    Unavailable { message: String },
    /// The service answered with success but an unreadable body, so the
    /// booking may exist.
    #[error("booking outcome unknown: {message}")]
    Unconfirmed { message: String },
}

impl BookingError {
    /// The message shown on the payment step.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            BookingError::InvalidPayment(errors) => errors.summary().unwrap_or_default(),
            BookingError::NotAuthenticated => SIGN_IN_REQUIRED_NOTICE.to_string(),
            BookingError::NoRentalDays => NO_RENTAL_DAYS_MESSAGE.to_string(),
            BookingError::SessionExpired => SESSION_EXPIRED_NOTICE.to_string(),
            BookingError::Rejected { message } => message.clone(),
            BookingError::Unavailable { .. } => SERVICE_UNAVAILABLE_MESSAGE.to_string(),
            BookingError::Unconfirmed { .. } => BOOKING_UNCONFIRMED_MESSAGE.to_string(),
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, BookingError::Unavailable { .. })
    }
}

impl From<CollaboratorError> for BookingError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Unauthorized { .. } => BookingError::SessionExpired,
            CollaboratorError::Rejected { message, .. } => BookingError::Rejected { message },
            CollaboratorError::Server { .. } | CollaboratorError::Transport(_) => {
                BookingError::Unavailable {
                    message: err.to_string(),
                }
            }
            CollaboratorError::Decode(_) => BookingError::Unconfirmed {
                message: err.to_string(),
            },
        }
    }
}

/// Who was told about a new booking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    pub user_notified: bool,
    pub admins_attempted: usize,
    pub admins_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingReceipt {
    pub booking_id: String,
    pub status: String,
    pub fan_out: FanOutReport,
}

impl From<Result<BookingReceipt, BookingError>> for SubmissionOutcome {
    fn from(result: Result<BookingReceipt, BookingError>) -> Self {
        match result {
            Ok(receipt) => SubmissionOutcome::Confirmed {
                booking_id: receipt.booking_id,
                status: receipt.status,
            },
            Err(BookingError::InvalidPayment(errors)) => {
                SubmissionOutcome::InvalidPayment { errors }
            }
            Err(err @ (BookingError::NotAuthenticated | BookingError::SessionExpired)) => {
                SubmissionOutcome::SessionRequired {
                    notice: err.user_message(),
                }
            }
            Err(err) => SubmissionOutcome::Failed {
                message: err.user_message(),
                retryable: err.retryable(),
            },
        }
    }
}

/// Creates bookings and tells the customer and every administrator about
/// them.
pub struct BookingSubmitter {
    bookings: Arc<dyn BookingApi>,
    roster: Arc<dyn AdminRoster>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl BookingSubmitter {
    pub fn new(
        bookings: Arc<dyn BookingApi>,
        roster: Arc<dyn AdminRoster>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            roster,
            notifications,
            clock,
        }
    }

    /// Re-validates payment, requires an acting user, sends the booking and,
    /// once it exists, notifies the customer and the administrators.
    ///
    /// # Errors
    ///
    /// Returns a [`BookingError`] classifying why no booking was created.
    /// Notification failures never produce an error.
    pub async fn submit(
        &self,
        form: &WizardForm,
        fare: &FareQuote,
        vehicle: &VehicleSnapshot,
        acting_user: Option<&ActingUser>,
    ) -> Result<BookingReceipt, BookingError> {
        let errors = validation::validate_payment(form, self.clock.today());
        if !errors.is_empty() {
            return Err(BookingError::InvalidPayment(errors));
        }
        let user = acting_user.ok_or(BookingError::NotAuthenticated)?;
        let payload =
            BookingPayload::build(form, fare, vehicle, user).ok_or(BookingError::NoRentalDays)?;

        tracing::info!(
            vehicle_id = %payload.vehicle_id,
            customer_id = %payload.customer_id,
            total_price = %payload.total_price,
            "submitting booking"
        );
        let created = self
            .bookings
            .create_booking(&payload)
            .await
            .map_err(|err| {
                tracing::warn!(vehicle_id = %payload.vehicle_id, error = %err, "booking submission failed");
                BookingError::from(err)
            })?;

        let status = created
            .status
            .filter(|status| !status.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BOOKING_STATUS.to_string());
        tracing::info!(booking_id = %created.id, %status, "booking created");

        let fan_out = self.fan_out(&created.id, &status, user, vehicle).await;

        Ok(BookingReceipt {
            booking_id: created.id,
            status,
            fan_out,
        })
    }

    /// Best-effort: each failure is logged and counted, none is returned.
    async fn fan_out(
        &self,
        booking_id: &str,
        status: &str,
        user: &ActingUser,
        vehicle: &VehicleSnapshot,
    ) -> FanOutReport {
        let vehicle_label = vehicle
            .name
            .clone()
            .unwrap_or_else(|| format!("vehicle {}", vehicle.vehicle_id));
        let mut report = FanOutReport::default();

        let customer_notice = Notification {
            recipient_id: user.id.clone(),
            category: NotificationCategory::Booking,
            status: status.to_string(),
            booking_id: booking_id.to_string(),
            message: format!("Your booking for {vehicle_label} was created with status {status}."),
        };
        report.user_notified = self.deliver(&customer_notice).await;

        let admins = match self.roster.administrator_ids().await {
            Ok(admins) => admins,
            Err(err) => {
                tracing::warn!(%booking_id, error = %err, "could not load administrator roster");
                Vec::new()
            }
        };

        for admin_id in admins {
            report.admins_attempted += 1;
            let admin_notice = Notification {
                recipient_id: admin_id,
                category: NotificationCategory::Booking,
                status: status.to_string(),
                booking_id: booking_id.to_string(),
                message: format!("New booking {booking_id} for {vehicle_label} is {status}."),
            };
            if !self.deliver(&admin_notice).await {
                report.admins_failed += 1;
            }
        }

        report
    }

    async fn deliver(&self, notification: &Notification) -> bool {
        match self.notifications.notify(notification).await {
            Ok(()) => {
                tracing::debug!(
                    recipient_id = %notification.recipient_id,
                    booking_id = %notification.booking_id,
                    "notification sent"
                );
                true
            }
            Err(err) => {
                tracing::warn!(
                    recipient_id = %notification.recipient_id,
                    booking_id = %notification.booking_id,
                    error = %err,
                    "notification failed"
                );
                false
            }
        }
    }
}
