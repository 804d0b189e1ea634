use std::sync::Arc;

use crate::domain::commands::DistanceOutcome;
use crate::domain::fare;
use crate::domain::form::Coordinates;
use crate::services::auth::AuthContext;
use crate::services::collaborators::DistanceCalculator;

/// Turns one route-distance lookup into a [`DistanceOutcome`].
///
/// Which lookup is current is decided by the wizard, which stamps every
/// request with a generation and ignores results from older ones. The
/// resolver only performs the call and classifies the answer; failed and
/// non-positive answers are not errors, they mean "no distance yet".
pub struct DistanceResolver {
    calculator: Arc<dyn DistanceCalculator>,
    auth: Arc<dyn AuthContext>,
}

impl DistanceResolver {
    pub fn new(calculator: Arc<dyn DistanceCalculator>, auth: Arc<dyn AuthContext>) -> Self {
        Self { calculator, auth }
    }

    pub async fn resolve(&self, pickup: Coordinates, dropoff: Coordinates) -> DistanceOutcome {
        tracing::debug!(?pickup, ?dropoff, "resolving route distance");

        match self.calculator.route_distance_km(pickup, dropoff).await {
            Ok(km) => match fare::distance_from_km(km) {
                Some(distance_km) => {
                    tracing::debug!(%distance_km, "route distance resolved");
                    DistanceOutcome::Resolved { distance_km }
                }
                None => {
                    tracing::info!(km, "distance service returned no usable distance");
                    DistanceOutcome::Unavailable {
                        reason: format!("non-positive distance {km}"),
                    }
                }
            },
            Err(err) if err.is_unauthorized() => {
                self.auth.on_unauthorized();
                DistanceOutcome::Unauthorized
            }
            Err(err) => {
                tracing::warn!(error = %err, "route distance lookup failed");
                DistanceOutcome::Unavailable {
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;
    use crate::services::auth::{ActingUser, Session, SessionStore};
    use crate::services::collaborators::CollaboratorError;
    use crate::services::in_memory::InMemoryBackend;

    fn colombo() -> (Coordinates, Coordinates) {
        (
            Coordinates::new(6.9271, 79.8612),
            Coordinates::new(6.9344, 79.8428),
        )
    }

    fn signed_in() -> Arc<SessionStore> {
        Arc::new(SessionStore::new(Some(Session {
            user: ActingUser {
                id: "cust-1".to_string(),
                name: None,
            },
            token: "t".to_string(),
        })))
    }

    #[tokio::test]
    async fn resolves_route_distance() {
        let (pickup, dropoff) = colombo();
        let backend =
            Arc::new(InMemoryBackend::default().with_route(pickup, dropoff, 5.2, Duration::ZERO));
        let resolver = DistanceResolver::new(backend, signed_in());

        assert_eq!(
            resolver.resolve(pickup, dropoff).await,
            DistanceOutcome::Resolved {
                distance_km: Decimal::new(52, 1)
            }
        );
    }

    #[tokio::test]
    async fn zero_distance_is_unavailable() {
        let (pickup, dropoff) = colombo();
        let backend =
            Arc::new(InMemoryBackend::default().with_route(pickup, dropoff, 0.0, Duration::ZERO));
        let resolver = DistanceResolver::new(backend, signed_in());

        assert!(matches!(
            resolver.resolve(pickup, dropoff).await,
            DistanceOutcome::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn rejected_credential_clears_the_session() {
        let (pickup, dropoff) = colombo();
        let backend = Arc::new(InMemoryBackend::default().with_route_failure(
            pickup,
            dropoff,
            CollaboratorError::Unauthorized { status: 401 },
        ));
        let auth = signed_in();
        let resolver = DistanceResolver::new(backend, auth.clone());

        assert_eq!(
            resolver.resolve(pickup, dropoff).await,
            DistanceOutcome::Unauthorized
        );
        assert_eq!(auth.current_session(), None);
    }
}
