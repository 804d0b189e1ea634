use std::sync::Arc;

use crate::command_bus::WizardCommandBus;
use crate::config::{Collaborators, Settings, cqrs_framework};
use crate::services::auth::{AuthContext, SessionStore};
use crate::services::clock::{Clock, SystemClock};
use crate::services::rest_backend::RestBackend;
use crate::view_repository::WizardViewRepository;

#[derive(Clone)]
pub struct ApplicationState {
    pub cqrs: Arc<WizardCommandBus>,
    pub wizard_query: WizardViewRepository,
    pub session: Arc<SessionStore>,
}

impl ApplicationState {
    /// Wires the wizard against the given collaborators.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        collaborators: Collaborators,
        session: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        let auth: Arc<dyn AuthContext> = session.clone();
        let (cqrs, wizard_query) = cqrs_framework(collaborators, auth, clock, settings.redirects);
        Self {
            cqrs,
            wizard_query,
            session,
        }
    }
}

/// Application state talking to the rental backend over HTTP.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn new_application_state(settings: &Settings) -> Result<ApplicationState, reqwest::Error> {
    let session = Arc::new(SessionStore::new(settings.session.clone()));
    let backend = Arc::new(RestBackend::new(
        &settings.backend_base_url,
        settings.http_timeout,
        session.clone(),
    )?);
    Ok(ApplicationState::new(
        Collaborators::shared(backend),
        session,
        Arc::new(SystemClock),
        settings,
    ))
}
