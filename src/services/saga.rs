use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::{EventEnvelope, Query};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::domain::commands::{SubmissionOutcome, WizardCommand};
use crate::domain::events::WizardEvent;
use crate::domain::fare::FareQuote;
use crate::domain::form::{Coordinates, WizardForm};
use crate::domain::wizard::{BookingWizard, VehicleSnapshot};
use crate::services::auth::AuthContext;
use crate::services::distance_resolver::DistanceResolver;
use crate::services::submitter::{BookingError, BookingSubmitter};

/// A command produced by the saga, to be executed against `wizard_id`.
#[derive(Debug)]
pub struct FollowUp {
    pub wizard_id: String,
    pub command: WizardCommand,
}

pub type FollowUpSender = UnboundedSender<FollowUp>;
pub type FollowUpReceiver = UnboundedReceiver<FollowUp>;

/// Runs the slow collaborator calls the wizard asks for and reports their
/// results back as commands.
///
/// Each call runs in its own task so a slow lookup never delays a newer one;
/// superseded lookups are left to finish and are discarded by the wizard.
pub struct WizardSaga {
    distance: Arc<DistanceResolver>,
    submitter: Arc<BookingSubmitter>,
    auth: Arc<dyn AuthContext>,
    follow_ups: FollowUpSender,
}

impl WizardSaga {
    pub fn new(
        distance: Arc<DistanceResolver>,
        submitter: Arc<BookingSubmitter>,
        auth: Arc<dyn AuthContext>,
        follow_ups: FollowUpSender,
    ) -> Self {
        Self {
            distance,
            submitter,
            auth,
            follow_ups,
        }
    }

    fn resolve_distance(
        &self,
        wizard_id: &str,
        generation: u64,
        pickup: Coordinates,
        dropoff: Coordinates,
    ) {
        let distance = Arc::clone(&self.distance);
        let follow_ups = self.follow_ups.clone();
        let wizard_id = wizard_id.to_string();

        tokio::spawn(async move {
            tracing::debug!(%wizard_id, generation, "distance lookup started");
            let outcome = distance.resolve(pickup, dropoff).await;
            tracing::debug!(%wizard_id, generation, ?outcome, "distance lookup finished");
            send(
                &follow_ups,
                wizard_id,
                WizardCommand::RecordDistance {
                    generation,
                    outcome,
                },
            );
        });
    }

    fn submit_booking(
        &self,
        wizard_id: &str,
        attempt: u32,
        form: WizardForm,
        fare: FareQuote,
        vehicle: VehicleSnapshot,
    ) {
        let submitter = Arc::clone(&self.submitter);
        let auth = Arc::clone(&self.auth);
        let follow_ups = self.follow_ups.clone();
        let wizard_id = wizard_id.to_string();

        tokio::spawn(async move {
            tracing::info!(%wizard_id, attempt, "booking submission started");
            let acting_user = auth.acting_user();
            let result = submitter
                .submit(&form, &fare, &vehicle, acting_user.as_ref())
                .await;

            match &result {
                Ok(receipt) => tracing::info!(
                    %wizard_id,
                    attempt,
                    booking_id = %receipt.booking_id,
                    admins_failed = receipt.fan_out.admins_failed,
                    "booking submission finished"
                ),
                Err(BookingError::SessionExpired) => {
                    auth.on_unauthorized();
                    tracing::warn!(%wizard_id, attempt, "booking submission rejected the session");
                }
                Err(err) => {
                    tracing::warn!(%wizard_id, attempt, error = %err, "booking submission failed");
                }
            }

            send(
                &follow_ups,
                wizard_id,
                WizardCommand::RecordSubmission {
                    attempt,
                    outcome: SubmissionOutcome::from(result),
                },
            );
        });
    }
}

fn send(follow_ups: &FollowUpSender, wizard_id: String, command: WizardCommand) {
    if let Err(err) = follow_ups.send(FollowUp { wizard_id, command }) {
        tracing::error!(wizard_id = %err.0.wizard_id, "follow-up channel closed, result dropped");
    }
}

#[async_trait]
impl Query<BookingWizard> for WizardSaga {
    async fn dispatch(&self, wizard_id: &str, events: &[EventEnvelope<BookingWizard>]) {
        for envelope in events {
            match &envelope.payload {
                WizardEvent::DistanceRequested {
                    generation,
                    pickup,
                    dropoff,
                } => self.resolve_distance(wizard_id, *generation, *pickup, *dropoff),
                WizardEvent::SubmissionStarted {
                    attempt,
                    form,
                    fare,
                    vehicle,
                } => self.submit_booking(wizard_id, *attempt, form.clone(), *fare, vehicle.clone()),
                _ => {}
            }
        }
    }
}
