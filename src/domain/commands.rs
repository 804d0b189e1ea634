use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::form::{Coordinates, FieldEdit, LocationKind, ValidationErrors};
use crate::domain::wizard::WizardStep;

#[derive(Debug, Clone, Deserialize)]
pub enum WizardCommand {
    Start {
        id: Uuid,
        vehicle_id: String,
    },
    Edit {
        edit: FieldEdit,
    },
    /// A place chosen (or dropped) in the address search widget. `coords` is
    /// `None` when the address no longer resolves to a point.
    SelectPlace {
        location: LocationKind,
        address: String,
        coords: Option<Coordinates>,
    },
    RefreshDistance,
    RecordDistance {
        generation: u64,
        outcome: DistanceOutcome,
    },
    Next,
    Back {
        #[serde(default)]
        to: Option<WizardStep>,
    },
    Submit,
    RecordSubmission {
        attempt: u32,
        outcome: SubmissionOutcome,
    },
}

/// The commands a client may send. Distance and submission outcomes are
/// only ever reported by the saga, so they have no variant here.
#[derive(Debug, Clone, Deserialize)]
pub enum WizardRequest {
    Start {
        id: Uuid,
        vehicle_id: String,
    },
    Edit {
        edit: FieldEdit,
    },
    SelectPlace {
        location: LocationKind,
        address: String,
        coords: Option<Coordinates>,
    },
    RefreshDistance,
    Next,
    Back {
        #[serde(default)]
        to: Option<WizardStep>,
    },
    Submit,
}

impl From<WizardRequest> for WizardCommand {
    fn from(request: WizardRequest) -> Self {
        match request {
            WizardRequest::Start { id, vehicle_id } => WizardCommand::Start { id, vehicle_id },
            WizardRequest::Edit { edit } => WizardCommand::Edit { edit },
            WizardRequest::SelectPlace {
                location,
                address,
                coords,
            } => WizardCommand::SelectPlace {
                location,
                address,
                coords,
            },
            WizardRequest::RefreshDistance => WizardCommand::RefreshDistance,
            WizardRequest::Next => WizardCommand::Next,
            WizardRequest::Back { to } => WizardCommand::Back { to },
            WizardRequest::Submit => WizardCommand::Submit,
        }
    }
}

/// Result of one route-distance lookup, as reported back by the saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DistanceOutcome {
    Resolved { distance_km: Decimal },
    Unavailable { reason: String },
    Unauthorized,
}

/// Classified result of one booking submission attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    Confirmed {
        booking_id: String,
        status: String,
    },
    InvalidPayment {
        errors: ValidationErrors,
    },
    Failed {
        message: String,
        retryable: bool,
    },
    SessionRequired {
        notice: String,
    },
}
