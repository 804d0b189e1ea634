use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActingUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: ActingUser,
    pub token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Identity and bearer credential of whoever drives the wizard.
///
/// Every collaborator call reads the credential from here, and a rejected
/// credential is reported through `on_unauthorized` only.
pub trait AuthContext: Send + Sync {
    fn current_session(&self) -> Option<Session>;

    fn acting_user(&self) -> Option<ActingUser> {
        self.current_session().map(|session| session.user)
    }

    fn bearer_token(&self) -> Option<String> {
        self.current_session().map(|session| session.token)
    }

    /// Called when a collaborator rejected the credential. Implementations
    /// clear whatever they store.
    fn on_unauthorized(&self);
}

/// In-process session holder: at most one signed-in user.
#[derive(Debug, Default)]
pub struct SessionStore {
    session: RwLock<Option<Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(session: Option<Session>) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }

    pub fn sign_in(&self, session: Session) {
        tracing::info!(user_id = %session.user.id, "session started");
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub fn sign_out(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl AuthContext for SessionStore {
    fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn on_unauthorized(&self) {
        tracing::warn!("credential rejected, clearing session");
        self.sign_out();
    }
}
