use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use cqrs_es::mem_store::MemStore;
use cqrs_es::{AggregateError, CqrsFramework};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::domain::commands::WizardCommand;
use crate::domain::wizard::{BookingWizard, WizardError};
use crate::services::saga::{FollowUp, FollowUpReceiver};

pub type WizardCqrs = CqrsFramework<BookingWizard, MemStore<BookingWizard>>;

type Gate = Arc<Mutex<()>>;

/// Entry point for every wizard command, whether it comes from a request or
/// from the saga. Commands for the same wizard run one at a time against the
/// in-memory store, so a follow-up never interleaves with a user command on
/// that wizard. Different wizards do not wait on each other.
pub struct WizardCommandBus {
    cqrs: WizardCqrs,
    gates: std::sync::Mutex<HashMap<String, Gate>>,
}

impl WizardCommandBus {
    #[must_use]
    pub fn new(cqrs: WizardCqrs) -> Self {
        Self {
            cqrs,
            gates: std::sync::Mutex::default(),
        }
    }

    /// # Errors
    ///
    /// Returns the aggregate's rejection, or a store failure.
    pub async fn execute(
        &self,
        wizard_id: &str,
        command: WizardCommand,
    ) -> Result<(), AggregateError<WizardError>> {
        self.execute_with_metadata(wizard_id, command, HashMap::new())
            .await
    }

    /// # Errors
    ///
    /// Returns the aggregate's rejection, or a store failure.
    pub async fn execute_with_metadata(
        &self,
        wizard_id: &str,
        command: WizardCommand,
        metadata: HashMap<String, String>,
    ) -> Result<(), AggregateError<WizardError>> {
        let gate = self.gate(wizard_id);
        let result = {
            let _turn = gate.lock().await;
            self.cqrs
                .execute_with_metadata(wizard_id, command, metadata)
                .await
        };
        self.release(wizard_id, gate);
        result
    }

    /// Number of wizards with a command running or queued.
    #[must_use]
    pub fn busy_wizards(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn gate(&self, wizard_id: &str) -> Gate {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(wizard_id.to_string()).or_default())
    }

    fn release(&self, wizard_id: &str, gate: Gate) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: nobody else is queued.
        let idle = gates
            .get(wizard_id)
            .is_some_and(|current| Arc::ptr_eq(current, &gate))
            && Arc::strong_count(&gate) == 2;
        if idle {
            gates.remove(wizard_id);
        }
    }
}

/// Executes the commands the saga reports back until every sender is gone.
pub fn spawn_follow_up_loop(
    bus: Arc<WizardCommandBus>,
    mut follow_ups: FollowUpReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(FollowUp {
            wizard_id,
            command,
        }) = follow_ups.recv().await
        {
            let metadata = HashMap::from([("origin".to_string(), "saga".to_string())]);
            if let Err(err) = bus
                .execute_with_metadata(&wizard_id, command, metadata)
                .await
            {
                tracing::error!(%wizard_id, error = %err, "follow-up command failed");
            }
        }
        tracing::debug!("follow-up loop stopped");
    })
}
