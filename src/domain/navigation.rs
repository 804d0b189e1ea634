use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RedirectTarget {
    Dashboard,
    SignIn,
    VehicleDetail { vehicle_id: String },
}

impl RedirectTarget {
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            RedirectTarget::Dashboard => "/dashboard".to_string(),
            RedirectTarget::SignIn => "/login".to_string(),
            RedirectTarget::VehicleDetail { vehicle_id } => format!("/vehicles/{vehicle_id}"),
        }
    }
}

/// A navigation the client should perform, optionally after a delay so an
/// acknowledgment stays visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub target: RedirectTarget,
    pub delay_ms: u64,
    pub notice: Option<String>,
}

impl Redirect {
    #[must_use]
    pub fn now(target: RedirectTarget, notice: Option<String>) -> Self {
        Self {
            target,
            delay_ms: 0,
            notice,
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.target.path()
    }
}

/// Delays applied to the redirects the wizard schedules itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPolicy {
    pub after_success: Duration,
    pub after_session_expiry: Duration,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            after_success: Duration::from_millis(2000),
            after_session_expiry: Duration::from_millis(2000),
        }
    }
}

impl RedirectPolicy {
    #[must_use]
    pub fn to_dashboard(&self) -> Redirect {
        Redirect {
            target: RedirectTarget::Dashboard,
            delay_ms: millis(self.after_success),
            notice: Some("Booking created successfully".to_string()),
        }
    }

    #[must_use]
    pub fn to_sign_in(&self, notice: impl Into<String>) -> Redirect {
        Redirect {
            target: RedirectTarget::SignIn,
            delay_ms: millis(self.after_session_expiry),
            notice: Some(notice.into()),
        }
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
