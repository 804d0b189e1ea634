use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cqrs_es::{CqrsFramework, Query};
use cqrs_es::mem_store::MemStore;
use thiserror::Error;

use crate::TracingQuery;
use crate::command_bus::{WizardCommandBus, WizardCqrs, spawn_follow_up_loop};
use crate::domain::navigation::RedirectPolicy;
use crate::domain::wizard::{BookingWizard, WizardServices};
use crate::services::auth::{ActingUser, AuthContext, Session};
use crate::services::clock::Clock;
use crate::services::collaborators::{
    AdminRoster, BookingApi, DistanceCalculator, NotificationSink, VehicleDirectory,
};
use crate::services::distance_resolver::DistanceResolver;
use crate::services::saga::WizardSaga;
use crate::services::submitter::BookingSubmitter;
use crate::view_repository::WizardViewRepository;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3030";
const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REDIRECT_DELAY_MS: u64 = 2000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{present} is set but {missing} is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    pub backend_base_url: String,
    pub http_timeout: Duration,
    pub redirects: RedirectPolicy,
    /// Session to start with, seeded from `BOOKING_USER_ID` and
    /// `BOOKING_API_TOKEN`.
    pub session: Option<Session>,
}

impl Settings {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed values or a half-configured
    /// session.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed values or a half-configured
    /// session.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = parse_or(&lookup, "LISTEN_ADDR", || {
            SocketAddr::from_str(DEFAULT_LISTEN_ADDR).map_err(|err| err.to_string())
        })?;
        let backend_base_url = lookup("BACKEND_BASE_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_BASE_URL.to_string());
        let http_timeout = Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", || {
            Ok(DEFAULT_HTTP_TIMEOUT_SECS)
        })?);
        let after_success = parse_or(&lookup, "SUCCESS_REDIRECT_DELAY_MS", || {
            Ok(DEFAULT_REDIRECT_DELAY_MS)
        })?;
        let after_session_expiry = parse_or(&lookup, "SESSION_REDIRECT_DELAY_MS", || {
            Ok(DEFAULT_REDIRECT_DELAY_MS)
        })?;

        let session = match (lookup("BOOKING_USER_ID"), lookup("BOOKING_API_TOKEN")) {
            (Some(id), Some(token)) => Some(Session {
                user: ActingUser { id, name: None },
                token,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    present: "BOOKING_USER_ID",
                    missing: "BOOKING_API_TOKEN",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    present: "BOOKING_API_TOKEN",
                    missing: "BOOKING_USER_ID",
                });
            }
        };

        Ok(Self {
            listen_addr,
            backend_base_url,
            http_timeout,
            redirects: RedirectPolicy {
                after_success: Duration::from_millis(after_success),
                after_session_expiry: Duration::from_millis(after_session_expiry),
            },
            session,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: impl FnOnce() -> Result<T, String>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let invalid = |value: String, reason: String| ConfigError::Invalid { key, value, reason };
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| invalid(value.clone(), err.to_string())),
        None => default().map_err(|reason| invalid(String::new(), reason)),
    }
}

/// The backend seams the wizard talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub vehicles: Arc<dyn VehicleDirectory>,
    pub distance: Arc<dyn DistanceCalculator>,
    pub bookings: Arc<dyn BookingApi>,
    pub roster: Arc<dyn AdminRoster>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl Collaborators {
    /// Every seam served by the same backend.
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: VehicleDirectory
            + DistanceCalculator
            + BookingApi
            + AdminRoster
            + NotificationSink
            + 'static,
    {
        Self {
            vehicles: backend.clone(),
            distance: backend.clone(),
            bookings: backend.clone(),
            roster: backend.clone(),
            notifications: backend,
        }
    }
}

/// Wires the event-sourced wizard: the in-memory store, the committed-event
/// log, the read model and the saga, plus the loop that feeds saga results
/// back in as commands.
///
/// Must be called from within a Tokio runtime.
pub fn cqrs_framework(
    collaborators: Collaborators,
    auth: Arc<dyn AuthContext>,
    clock: Arc<dyn Clock>,
    redirects: RedirectPolicy,
) -> (Arc<WizardCommandBus>, WizardViewRepository) {
    let wizard_query = WizardViewRepository::new();
    let (follow_up_sender, follow_up_receiver) = tokio::sync::mpsc::unbounded_channel();

    let saga = WizardSaga::new(
        Arc::new(DistanceResolver::new(
            collaborators.distance,
            Arc::clone(&auth),
        )),
        Arc::new(BookingSubmitter::new(
            collaborators.bookings,
            collaborators.roster,
            collaborators.notifications,
            Arc::clone(&clock),
        )),
        Arc::clone(&auth),
        follow_up_sender,
    );

    // The read model must see events before the saga acts on them.
    let queries: Vec<Box<dyn Query<BookingWizard>>> = vec![
        Box::new(TracingQuery {}),
        Box::new(wizard_query.clone()),
        Box::new(saga),
    ];
    let services =
        WizardServices::new(collaborators.vehicles, auth, clock).with_redirects(redirects);
    let cqrs: WizardCqrs = CqrsFramework::new(MemStore::default(), queries, services);

    let bus = Arc::new(WizardCommandBus::new(cqrs));
    spawn_follow_up_loop(Arc::clone(&bus), follow_up_receiver);
    (bus, wizard_query)
}
