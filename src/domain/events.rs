use cqrs_es::DomainEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::fare::FareQuote;
use crate::domain::form::{Coordinates, FieldEdit, LocationKind, ValidationErrors, WizardForm};
use crate::domain::navigation::Redirect;
use crate::domain::wizard::{VehicleSnapshot, WizardStep};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WizardEvent {
    Started {
        id: Uuid,
        vehicle: VehicleSnapshot,
    },
    FieldEdited {
        edit: FieldEdit,
    },
    PlaceSelected {
        location: LocationKind,
        address: String,
        coords: Option<Coordinates>,
    },
    DistanceRequested {
        generation: u64,
        pickup: Coordinates,
        dropoff: Coordinates,
    },
    DistanceCleared {
        generation: u64,
    },
    DistanceResolved {
        generation: u64,
        distance_km: Decimal,
    },
    DistanceUnavailable {
        generation: u64,
        reason: String,
    },
    StepRejected {
        step: WizardStep,
        errors: ValidationErrors,
    },
    StepAdvanced {
        from: WizardStep,
        to: WizardStep,
    },
    StepReturned {
        from: WizardStep,
        to: WizardStep,
    },
    SubmissionRejected {
        message: String,
    },
    SubmissionStarted {
        attempt: u32,
        form: WizardForm,
        fare: FareQuote,
        vehicle: VehicleSnapshot,
    },
    BookingConfirmed {
        booking_id: String,
        status: String,
        redirect: Redirect,
    },
    SubmissionFailed {
        message: String,
        retryable: bool,
    },
    SessionExpired {
        redirect: Redirect,
    },
}

impl DomainEvent for WizardEvent {
    fn event_type(&self) -> String {
        let event_type: &str = match self {
            WizardEvent::Started { .. } => "WizardStarted",
            WizardEvent::FieldEdited { .. } => "FieldEdited",
            WizardEvent::PlaceSelected { .. } => "PlaceSelected",
            WizardEvent::DistanceRequested { .. } => "DistanceRequested",
            WizardEvent::DistanceCleared { .. } => "DistanceCleared",
            WizardEvent::DistanceResolved { .. } => "DistanceResolved",
            WizardEvent::DistanceUnavailable { .. } => "DistanceUnavailable",
            WizardEvent::StepRejected { .. } => "StepRejected",
            WizardEvent::StepAdvanced { .. } => "StepAdvanced",
            WizardEvent::StepReturned { .. } => "StepReturned",
            WizardEvent::SubmissionRejected { .. } => "SubmissionRejected",
            WizardEvent::SubmissionStarted { .. } => "SubmissionStarted",
            WizardEvent::BookingConfirmed { .. } => "BookingConfirmed",
            WizardEvent::SubmissionFailed { .. } => "SubmissionFailed",
            WizardEvent::SessionExpired { .. } => "SessionExpired",
        };
        event_type.to_string()
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
