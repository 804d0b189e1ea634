use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::{EventEnvelope, Query, View};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::wizard::BookingWizard;
use crate::queries::WizardView;

/// Keeps the current [`WizardView`] of every wizard in memory.
#[derive(Clone, Default)]
pub struct WizardViewRepository {
    views: Arc<RwLock<HashMap<Uuid, WizardView>>>,
}

impl WizardViewRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a wizard view by ID.
    pub async fn load(&self, wizard_id: &Uuid) -> Option<WizardView> {
        self.views.read().await.get(wizard_id).cloned()
    }
}

#[async_trait]
impl Query<BookingWizard> for WizardViewRepository {
    async fn dispatch(&self, view_id: &str, events: &[EventEnvelope<BookingWizard>]) {
        let Ok(wizard_id) = Uuid::parse_str(view_id) else {
            tracing::error!(%view_id, "wizard view id is not a UUID, events not projected");
            return;
        };

        let mut views = self.views.write().await;
        let view = views.entry(wizard_id).or_default();
        for event in events {
            view.update(event);
        }
    }
}
