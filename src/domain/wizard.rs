use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::Aggregate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::commands::{DistanceOutcome, SubmissionOutcome, WizardCommand};
use crate::domain::events::WizardEvent;
use crate::domain::fare::{FareQuote, VehicleRates};
use crate::domain::form::{Coordinates, LocationKind, ValidationErrors, WizardForm};
use crate::domain::navigation::{Redirect, RedirectPolicy, RedirectTarget};
use crate::domain::validation;
use crate::services::auth::AuthContext;
use crate::services::clock::Clock;
use crate::services::collaborators::{VehicleDirectory, VehicleRecord};

pub const NO_RENTAL_DAYS_MESSAGE: &str =
    "The selected dates do not cover a full rental day. Please adjust your dates.";
pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please sign in again.";
pub const VEHICLE_UNAVAILABLE_NOTICE: &str = "This vehicle is currently unavailable for booking.";

/// Position of a booking attempt in the wizard. The first three are the
/// user-facing form steps, in order.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WizardStep {
    #[default]
    Dates,
    Locations,
    Payment,
    Submitting,
    Succeeded,
    Aborted,
}

impl WizardStep {
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            WizardStep::Dates => Some(WizardStep::Locations),
            WizardStep::Locations => Some(WizardStep::Payment),
            _ => None,
        }
    }

    #[must_use]
    pub fn previous(self) -> Option<Self> {
        match self {
            WizardStep::Locations => Some(WizardStep::Dates),
            WizardStep::Payment => Some(WizardStep::Locations),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_form_step(self) -> bool {
        matches!(
            self,
            WizardStep::Dates | WizardStep::Locations | WizardStep::Payment
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, WizardStep::Succeeded | WizardStep::Aborted)
    }
}

/// The vehicle as it was when the wizard started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSnapshot {
    pub vehicle_id: String,
    pub name: Option<String>,
    pub rates: VehicleRates,
}

impl From<&VehicleRecord> for VehicleSnapshot {
    fn from(record: &VehicleRecord) -> Self {
        Self {
            vehicle_id: record.id.clone(),
            name: record.name.clone(),
            rates: record.rates(),
        }
    }
}

/// Tracks which distance lookup is the live one. Every issued request and
/// every reset bumps `generation`; only a result carrying the current
/// generation while `pending` is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceTracker {
    pub generation: u64,
    pub pending: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingWizard {
    id: Uuid,
    vehicle: VehicleSnapshot,
    step: WizardStep,
    form: WizardForm,
    errors: ValidationErrors,
    distance: DistanceTracker,
    fare: FareQuote,
    attempts: u32,
    last_error: Option<String>,
    booking_id: Option<String>,
    booking_status: Option<String>,
    redirect: Option<Redirect>,
}

#[async_trait]
impl Aggregate for BookingWizard {
    type Command = WizardCommand;
    type Event = WizardEvent;
    type Error = WizardError;
    type Services = WizardServices;

    fn aggregate_type() -> String {
        "BookingWizard".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        if let WizardCommand::Start { id, vehicle_id } = command {
            return self.start(id, vehicle_id, services).await;
        }
        if self.id == Uuid::default() {
            return Err(WizardError::NotFound);
        }

        match command {
            WizardCommand::Start { .. } => Err(WizardError::AlreadyStarted),
            WizardCommand::Edit { edit } => {
                self.ensure_editable()?;
                Ok(vec![WizardEvent::FieldEdited { edit }])
            }
            WizardCommand::SelectPlace {
                location,
                address,
                coords,
            } => {
                self.ensure_editable()?;
                Ok(self.select_place(location, address, coords))
            }
            WizardCommand::RefreshDistance => {
                self.ensure_editable()?;
                Ok(self
                    .distance_follow_up(self.form.coordinate_pair())
                    .into_iter()
                    .collect())
            }
            WizardCommand::RecordDistance {
                generation,
                outcome,
            } => Ok(self.record_distance(generation, outcome, services)),
            WizardCommand::Next => self.advance(services),
            WizardCommand::Back { to } => self.go_back(to),
            WizardCommand::Submit => self.submit(services),
            WizardCommand::RecordSubmission { attempt, outcome } => {
                Ok(self.record_submission(attempt, outcome, services))
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            WizardEvent::Started { id, vehicle } => {
                self.id = id;
                self.vehicle = vehicle;
                self.step = WizardStep::Dates;
                self.recompute_fare(Decimal::ZERO);
            }
            WizardEvent::FieldEdited { edit } => {
                let touches_dates = edit.touches_dates();
                self.errors.clear(edit.field());
                self.form.apply_edit(edit);
                if touches_dates {
                    self.recompute_fare(self.fare.distance_km);
                }
            }
            WizardEvent::PlaceSelected {
                location,
                address,
                coords,
            } => {
                self.errors.clear(location.field());
                self.form.select_place(location, address, coords);
            }
            WizardEvent::DistanceRequested { generation, .. } => {
                self.distance = DistanceTracker {
                    generation,
                    pending: true,
                };
            }
            WizardEvent::DistanceCleared { generation }
            | WizardEvent::DistanceUnavailable { generation, .. } => {
                self.distance = DistanceTracker {
                    generation,
                    pending: false,
                };
                self.recompute_fare(Decimal::ZERO);
            }
            WizardEvent::DistanceResolved {
                generation,
                distance_km,
            } => {
                self.distance = DistanceTracker {
                    generation,
                    pending: false,
                };
                self.recompute_fare(distance_km);
            }
            WizardEvent::StepRejected { step, errors } => {
                self.step = step;
                self.errors = errors;
            }
            WizardEvent::StepAdvanced { to, .. } | WizardEvent::StepReturned { to, .. } => {
                self.step = to;
                self.errors = ValidationErrors::new();
                self.last_error = None;
            }
            WizardEvent::SubmissionRejected { message } => {
                self.last_error = Some(message);
            }
            WizardEvent::SubmissionStarted { attempt, .. } => {
                self.step = WizardStep::Submitting;
                self.attempts = attempt;
                self.errors = ValidationErrors::new();
                self.last_error = None;
            }
            WizardEvent::BookingConfirmed {
                booking_id,
                status,
                redirect,
            } => {
                self.step = WizardStep::Succeeded;
                self.booking_id = Some(booking_id);
                self.booking_status = Some(status);
                self.redirect = Some(redirect);
            }
            WizardEvent::SubmissionFailed { message, .. } => {
                self.step = WizardStep::Payment;
                self.last_error = Some(message);
            }
            WizardEvent::SessionExpired { redirect } => {
                self.step = WizardStep::Aborted;
                self.last_error.clone_from(&redirect.notice);
                self.redirect = Some(redirect);
            }
        }
    }
}

impl BookingWizard {
    async fn start(
        &self,
        id: Uuid,
        vehicle_id: String,
        services: &WizardServices,
    ) -> Result<Vec<WizardEvent>, WizardError> {
        if self.id != Uuid::default() {
            return Err(WizardError::AlreadyStarted);
        }

        let record = match services.vehicles().vehicle(&vehicle_id).await {
            Ok(record) => record,
            Err(err) if err.is_unauthorized() => {
                services.auth().on_unauthorized();
                return Err(WizardError::SessionExpired);
            }
            Err(err) => return Err(WizardError::VehicleLookup(err.to_string())),
        };

        if !record.available {
            tracing::info!(%vehicle_id, "vehicle unavailable, wizard not started");
            return Err(WizardError::VehicleUnavailable { vehicle_id });
        }

        Ok(vec![WizardEvent::Started {
            id,
            vehicle: VehicleSnapshot::from(&record),
        }])
    }

    fn ensure_editable(&self) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Submitting => Err(WizardError::SubmissionInFlight),
            step if step.is_terminal() => Err(WizardError::Closed),
            _ => Ok(()),
        }
    }

    fn select_place(
        &self,
        location: LocationKind,
        address: String,
        coords: Option<Coordinates>,
    ) -> Vec<WizardEvent> {
        let mut next_form = self.form.clone();
        next_form.select_place(location, address.clone(), coords);

        let mut events = vec![WizardEvent::PlaceSelected {
            location,
            address,
            coords,
        }];
        events.extend(self.distance_follow_up(next_form.coordinate_pair()));
        events
    }

    /// A new lookup when both points are known; otherwise a reset, but only
    /// if there is a shown or pending distance to invalidate.
    fn distance_follow_up(&self, pair: Option<(Coordinates, Coordinates)>) -> Option<WizardEvent> {
        let generation = self.distance.generation + 1;
        match pair {
            Some((pickup, dropoff)) => Some(WizardEvent::DistanceRequested {
                generation,
                pickup,
                dropoff,
            }),
            None if self.distance.pending || self.fare.distance_km > Decimal::ZERO => {
                Some(WizardEvent::DistanceCleared { generation })
            }
            None => None,
        }
    }

    fn record_distance(
        &self,
        generation: u64,
        outcome: DistanceOutcome,
        services: &WizardServices,
    ) -> Vec<WizardEvent> {
        if generation != self.distance.generation || !self.distance.pending {
            tracing::debug!(
                wizard_id = %self.id,
                generation,
                live_generation = self.distance.generation,
                "discarding superseded distance result"
            );
            return vec![];
        }
        if self.step.is_terminal() {
            return vec![];
        }

        match outcome {
            DistanceOutcome::Resolved { distance_km } if distance_km > Decimal::ZERO => {
                vec![WizardEvent::DistanceResolved {
                    generation,
                    distance_km,
                }]
            }
            DistanceOutcome::Resolved { .. } => vec![WizardEvent::DistanceUnavailable {
                generation,
                reason: "distance service returned a non-positive distance".to_string(),
            }],
            DistanceOutcome::Unavailable { reason } => {
                vec![WizardEvent::DistanceUnavailable { generation, reason }]
            }
            DistanceOutcome::Unauthorized => vec![
                WizardEvent::DistanceUnavailable {
                    generation,
                    reason: "credential rejected".to_string(),
                },
                WizardEvent::SessionExpired {
                    redirect: services.redirects().to_sign_in(SESSION_EXPIRED_NOTICE),
                },
            ],
        }
    }

    fn advance(&self, services: &WizardServices) -> Result<Vec<WizardEvent>, WizardError> {
        self.ensure_editable()?;
        let Some(to) = self.step.next() else {
            return Err(WizardError::InvalidTransition {
                step: self.step,
                action: "advance".to_string(),
            });
        };

        let errors = validation::validate(self.step, &self.form, services.clock().today());
        if errors.is_empty() {
            Ok(vec![WizardEvent::StepAdvanced {
                from: self.step,
                to,
            }])
        } else {
            Ok(vec![WizardEvent::StepRejected {
                step: self.step,
                errors,
            }])
        }
    }

    fn go_back(&self, to: Option<WizardStep>) -> Result<Vec<WizardEvent>, WizardError> {
        self.ensure_editable()?;
        let target = match to {
            None => self.step.previous(),
            Some(step) if step.is_form_step() && step < self.step => Some(step),
            Some(_) => None,
        };

        match target {
            Some(to) => Ok(vec![WizardEvent::StepReturned {
                from: self.step,
                to,
            }]),
            None => Err(WizardError::InvalidTransition {
                step: self.step,
                action: "go back".to_string(),
            }),
        }
    }

    fn submit(&self, services: &WizardServices) -> Result<Vec<WizardEvent>, WizardError> {
        match self.step {
            WizardStep::Submitting => {
                tracing::debug!(wizard_id = %self.id, "submission already in flight");
                return Ok(vec![]);
            }
            WizardStep::Payment => {}
            step if step.is_terminal() => return Err(WizardError::Closed),
            step => {
                return Err(WizardError::InvalidTransition {
                    step,
                    action: "submit".to_string(),
                });
            }
        }

        // Earlier steps stay editable after they were passed, so every gate is
        // checked again. A failing earlier step is where the user lands.
        let today = services.clock().today();
        for step in [WizardStep::Dates, WizardStep::Locations, WizardStep::Payment] {
            let errors = validation::validate(step, &self.form, today);
            if !errors.is_empty() {
                return Ok(vec![WizardEvent::StepRejected { step, errors }]);
            }
        }
        if !self.fare.is_bookable() {
            return Ok(vec![WizardEvent::SubmissionRejected {
                message: NO_RENTAL_DAYS_MESSAGE.to_string(),
            }]);
        }

        Ok(vec![WizardEvent::SubmissionStarted {
            attempt: self.attempts + 1,
            form: self.form.clone(),
            fare: self.fare,
            vehicle: self.vehicle.clone(),
        }])
    }

    fn record_submission(
        &self,
        attempt: u32,
        outcome: SubmissionOutcome,
        services: &WizardServices,
    ) -> Vec<WizardEvent> {
        if self.step != WizardStep::Submitting || attempt != self.attempts {
            tracing::debug!(wizard_id = %self.id, attempt, "ignoring outcome of a finished attempt");
            return vec![];
        }

        match outcome {
            SubmissionOutcome::Confirmed { booking_id, status } => {
                vec![WizardEvent::BookingConfirmed {
                    booking_id,
                    status,
                    redirect: services.redirects().to_dashboard(),
                }]
            }
            SubmissionOutcome::InvalidPayment { errors } => vec![
                WizardEvent::SubmissionFailed {
                    message: errors.summary().unwrap_or_default(),
                    retryable: true,
                },
                WizardEvent::StepRejected {
                    step: WizardStep::Payment,
                    errors,
                },
            ],
            SubmissionOutcome::Failed { message, retryable } => {
                vec![WizardEvent::SubmissionFailed { message, retryable }]
            }
            SubmissionOutcome::SessionRequired { notice } => vec![WizardEvent::SessionExpired {
                redirect: services.redirects().to_sign_in(notice),
            }],
        }
    }

    fn recompute_fare(&mut self, distance_km: Decimal) {
        self.fare = FareQuote::compute(
            self.form.start_date,
            self.form.end_date,
            distance_km,
            &self.vehicle.rates,
        );
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum WizardError {
    #[error("Booking wizard not found")]
    NotFound,
    #[error("Booking wizard already started")]
    AlreadyStarted,
    #[error("Vehicle {vehicle_id} is not available for booking")]
    VehicleUnavailable { vehicle_id: String },
    #[error("Vehicle lookup failed: {0}")]
    VehicleLookup(String),
    #[error("Session expired")]
    SessionExpired,
    #[error("Cannot {action} from the {step:?} step")]
    InvalidTransition { step: WizardStep, action: String },
    #[error("A booking submission is already in progress")]
    SubmissionInFlight,
    #[error("Booking wizard is closed")]
    Closed,
}

impl WizardError {
    /// Where the client must go when this error ends the flow.
    #[must_use]
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            WizardError::VehicleUnavailable { vehicle_id } => Some(Redirect::now(
                RedirectTarget::VehicleDetail {
                    vehicle_id: vehicle_id.clone(),
                },
                Some(VEHICLE_UNAVAILABLE_NOTICE.to_string()),
            )),
            WizardError::SessionExpired => Some(Redirect::now(
                RedirectTarget::SignIn,
                Some(SESSION_EXPIRED_NOTICE.to_string()),
            )),
            _ => None,
        }
    }
}

pub struct WizardServices {
    vehicles: Arc<dyn VehicleDirectory>,
    auth: Arc<dyn AuthContext>,
    clock: Arc<dyn Clock>,
    redirects: RedirectPolicy,
}

impl WizardServices {
    pub fn new(
        vehicles: Arc<dyn VehicleDirectory>,
        auth: Arc<dyn AuthContext>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            vehicles,
            auth,
            clock,
            redirects: RedirectPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_redirects(mut self, redirects: RedirectPolicy) -> Self {
        self.redirects = redirects;
        self
    }

    #[must_use]
    pub fn vehicles(&self) -> &Arc<dyn VehicleDirectory> {
        &self.vehicles
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthContext> {
        &self.auth
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn redirects(&self) -> &RedirectPolicy {
        &self.redirects
    }
}

impl BookingWizard {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn step(&self) -> WizardStep {
        self.step
    }

    #[must_use]
    pub fn vehicle(&self) -> &VehicleSnapshot {
        &self.vehicle
    }

    #[must_use]
    pub fn form(&self) -> &WizardForm {
        &self.form
    }

    #[must_use]
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    #[must_use]
    pub fn fare(&self) -> &FareQuote {
        &self.fare
    }

    #[must_use]
    pub fn distance(&self) -> DistanceTracker {
        self.distance
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn booking_id(&self) -> Option<&str> {
        self.booking_id.as_deref()
    }

    #[must_use]
    pub fn booking_status(&self) -> Option<&str> {
        self.booking_status.as_deref()
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }
}
