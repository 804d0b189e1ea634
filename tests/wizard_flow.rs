use std::sync::Arc;
use std::time::Duration;

use booking_wizard::command_bus::WizardCommandBus;
use booking_wizard::config::{Collaborators, cqrs_framework};
use booking_wizard::domain::commands::WizardCommand;
use booking_wizard::domain::form::{Coordinates, FieldEdit, FormField, LocationKind};
use booking_wizard::domain::navigation::RedirectPolicy;
use booking_wizard::domain::wizard::{SESSION_EXPIRED_NOTICE, WizardError, WizardStep};
use booking_wizard::queries::WizardView;
use booking_wizard::services::auth::{ActingUser, AuthContext, Session, SessionStore};
use booking_wizard::services::clock::FixedClock;
use booking_wizard::services::collaborators::{CollaboratorError, VehicleRecord};
use booking_wizard::services::in_memory::InMemoryBackend;
use booking_wizard::services::submitter::{SERVICE_UNAVAILABLE_MESSAGE, SIGN_IN_REQUIRED_NOTICE};
use booking_wizard::view_repository::WizardViewRepository;
use chrono::NaiveDate;
use cqrs_es::AggregateError;
use rust_decimal::Decimal;
use uuid::Uuid;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

fn colombo() -> Coordinates {
    Coordinates::new(6.9271, 79.8612)
}

fn galle_face() -> Coordinates {
    Coordinates::new(6.9344, 79.8428)
}

fn kandy() -> Coordinates {
    Coordinates::new(7.2906, 80.6337)
}

fn vehicle() -> VehicleRecord {
    VehicleRecord {
        id: "veh-1".to_string(),
        name: Some("Toyota Axio".to_string()),
        price_per_day: Decimal::from(100),
        price_per_km: Some(Decimal::new(200, 2)),
        available: true,
    }
}

fn customer() -> Session {
    Session {
        user: ActingUser {
            id: "cust-1".to_string(),
            name: Some("Nimal".to_string()),
        },
        token: "token-1".to_string(),
    }
}

fn backend() -> InMemoryBackend {
    InMemoryBackend::default()
        .with_vehicle(vehicle())
        .with_route(colombo(), galle_face(), 5.2, Duration::ZERO)
}

struct Harness {
    bus: Arc<WizardCommandBus>,
    views: WizardViewRepository,
    backend: Arc<InMemoryBackend>,
    session: Arc<SessionStore>,
    id: Uuid,
}

impl Harness {
    fn new(backend: InMemoryBackend, session: Option<Session>) -> Self {
        let backend = Arc::new(backend);
        let session = Arc::new(SessionStore::new(session));
        let (bus, views) = cqrs_framework(
            Collaborators::shared(backend.clone()),
            session.clone(),
            Arc::new(FixedClock(NaiveDate::from_ymd_opt(2025, 5, 20).unwrap())),
            RedirectPolicy::default(),
        );
        Self {
            bus,
            views,
            backend,
            session,
            id: Uuid::new_v4(),
        }
    }

    async fn send(&self, command: WizardCommand) {
        self.bus
            .execute(&self.id.to_string(), command)
            .await
            .unwrap();
    }

    async fn edit(&self, edit: FieldEdit) {
        self.send(WizardCommand::Edit { edit }).await;
    }

    async fn view(&self) -> WizardView {
        self.views.load(&self.id).await.unwrap()
    }

    async fn wait_for(&self, settled: impl Fn(&WizardView) -> bool) -> WizardView {
        let poll = async {
            loop {
                let view = self.view().await;
                if settled(&view) {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(SETTLE_TIMEOUT, poll)
            .await
            .unwrap_or_else(|_| panic!("wizard did not settle"))
    }

    async fn start(&self) {
        self.send(WizardCommand::Start {
            id: self.id,
            vehicle_id: "veh-1".to_string(),
        })
        .await;
    }

    async fn fill_dates(&self) {
        self.edit(FieldEdit::StartDate(NaiveDate::from_ymd_opt(2025, 6, 1)))
            .await;
        self.edit(FieldEdit::EndDate(NaiveDate::from_ymd_opt(2025, 6, 4)))
            .await;
    }

    async fn select(&self, location: LocationKind, address: &str, coords: Coordinates) {
        self.send(WizardCommand::SelectPlace {
            location,
            address: address.to_string(),
            coords: Some(coords),
        })
        .await;
    }

    async fn fill_payment(&self, card_number: &str, expiry: &str) {
        self.edit(FieldEdit::CardNumber(card_number.to_string()))
            .await;
        self.edit(FieldEdit::Expiry(expiry.to_string())).await;
        self.edit(FieldEdit::Cvv("123".to_string())).await;
        self.edit(FieldEdit::CardName("Nimal Perera".to_string()))
            .await;
    }

    /// Dates, both places with a resolved distance, and the payment step.
    async fn reach_payment(&self) {
        self.start().await;
        self.fill_dates().await;
        self.send(WizardCommand::Next).await;
        self.select(LocationKind::Pickup, "Colombo Fort", colombo())
            .await;
        self.select(LocationKind::Dropoff, "Galle Face", galle_face())
            .await;
        self.wait_for(|view| !view.distance_pending).await;
        self.send(WizardCommand::Next).await;
        assert_eq!(self.view().await.step, WizardStep::Payment);
    }
}

#[tokio::test]
async fn rental_days_and_route_distance_make_up_the_fare() {
    let harness = Harness::new(backend(), Some(customer()));
    harness.start().await;
    harness.fill_dates().await;

    let view = harness.view().await;
    assert_eq!(view.fare.total_days, 3);
    assert_eq!(view.fare.base_price, Decimal::from(300));
    assert_eq!(view.fare.total_price, Decimal::from(300));

    harness.send(WizardCommand::Next).await;
    harness
        .select(LocationKind::Pickup, "Colombo Fort", colombo())
        .await;
    harness
        .select(LocationKind::Dropoff, "Galle Face", galle_face())
        .await;

    let view = harness
        .wait_for(|view| !view.distance_pending && view.fare.distance_km > Decimal::ZERO)
        .await;
    assert_eq!(view.fare.distance_km, Decimal::new(52, 1));
    assert_eq!(view.fare.distance_price, Decimal::new(1040, 2));
    assert_eq!(view.fare.total_price, Decimal::new(31040, 2));
}

#[tokio::test]
async fn card_number_and_expiry_are_checked_before_submitting() {
    let harness = Harness::new(backend(), Some(customer()));
    harness.reach_payment().await;

    harness.fill_payment("411111111111", "01/20").await;
    harness.send(WizardCommand::Submit).await;

    let view = harness.view().await;
    assert_eq!(view.step, WizardStep::Payment);
    assert_eq!(
        view.errors.get(FormField::CardNumber),
        Some("Card number must be 16 digits")
    );
    assert_eq!(view.errors.get(FormField::Expiry), Some("Card has expired"));
    assert!(view.error_summary.is_some());
    assert!(harness.backend.bookings().is_empty());

    harness.fill_payment("4111111111111111", "01/99").await;
    let view = harness.view().await;
    assert!(view.errors.is_empty());

    harness.send(WizardCommand::Submit).await;
    let view = harness
        .wait_for(|view| view.step == WizardStep::Succeeded)
        .await;
    assert_eq!(view.booking_id.as_deref(), Some("bk-1"));
}

#[tokio::test]
async fn confirmed_booking_notifies_customer_and_every_admin() {
    let harness = Harness::new(
        backend()
            .with_admins(vec![
                "adm-1".to_string(),
                "adm-2".to_string(),
                "adm-3".to_string(),
            ])
            .failing_notifications_for("adm-2"),
        Some(customer()),
    );
    harness.reach_payment().await;
    harness.fill_payment("4111 1111 1111 1111", "01/99").await;

    harness.send(WizardCommand::Submit).await;
    let repeated = harness
        .bus
        .execute(&harness.id.to_string(), WizardCommand::Submit)
        .await;
    assert!(matches!(
        repeated,
        Ok(()) | Err(AggregateError::UserError(WizardError::Closed))
    ));

    let view = harness
        .wait_for(|view| view.step == WizardStep::Succeeded)
        .await;
    assert_eq!(view.booking_status.as_deref(), Some("PENDING"));
    let redirect = view.redirect.unwrap();
    assert_eq!(redirect.path(), "/dashboard");
    assert_eq!(redirect.delay_ms, 2000);

    let bookings = harness.backend.bookings();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].total_price, Decimal::new(31040, 2));
    assert_eq!(bookings[0].customer_id, "cust-1");

    let notifications = harness.backend.notifications();
    assert_eq!(notifications.len(), 4);
    assert_eq!(
        notifications
            .iter()
            .filter(|n| n.recipient_id == "cust-1")
            .count(),
        1
    );
    assert!(notifications.iter().all(|n| n.booking_id == "bk-1"));
}

#[tokio::test]
async fn only_the_latest_distance_lookup_is_shown() {
    let harness = Harness::new(
        InMemoryBackend::default()
            .with_vehicle(vehicle())
            .with_route(colombo(), galle_face(), 5.2, Duration::from_millis(300))
            .with_route(colombo(), kandy(), 115.0, Duration::ZERO),
        Some(customer()),
    );
    harness.start().await;
    harness.fill_dates().await;
    harness
        .select(LocationKind::Pickup, "Colombo Fort", colombo())
        .await;
    harness
        .select(LocationKind::Dropoff, "Galle Face", galle_face())
        .await;
    harness
        .select(LocationKind::Dropoff, "Kandy", kandy())
        .await;

    let view = harness
        .wait_for(|view| !view.distance_pending && view.fare.distance_km > Decimal::ZERO)
        .await;
    assert_eq!(view.fare.distance_km, Decimal::from(115));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(harness.backend.distance_calls(), 2);
    let view = harness.view().await;
    assert_eq!(view.fare.distance_km, Decimal::from(115));
    assert_eq!(view.fare.distance_price, Decimal::from(230));
}

#[tokio::test]
async fn failed_lookup_leaves_no_distance_until_refreshed() {
    let harness = Harness::new(
        InMemoryBackend::default()
            .with_vehicle(vehicle())
            .with_route_failure(
                colombo(),
                galle_face(),
                CollaboratorError::Transport("timed out".to_string()),
            ),
        Some(customer()),
    );
    harness.start().await;
    harness.fill_dates().await;
    harness
        .select(LocationKind::Pickup, "Colombo Fort", colombo())
        .await;
    harness
        .select(LocationKind::Dropoff, "Galle Face", galle_face())
        .await;

    let view = harness.wait_for(|view| !view.distance_pending).await;
    assert_eq!(view.fare.distance_km, Decimal::ZERO);
    assert_eq!(view.fare.total_price, Decimal::from(300));

    harness.send(WizardCommand::RefreshDistance).await;
    harness.wait_for(|view| !view.distance_pending).await;
    assert_eq!(harness.backend.distance_calls(), 2);
}

#[tokio::test]
async fn rejected_credential_on_distance_lookup_signs_out() {
    let harness = Harness::new(
        InMemoryBackend::default()
            .with_vehicle(vehicle())
            .with_route_failure(
                colombo(),
                galle_face(),
                CollaboratorError::Unauthorized { status: 401 },
            ),
        Some(customer()),
    );
    harness.start().await;
    harness
        .select(LocationKind::Pickup, "Colombo Fort", colombo())
        .await;
    harness
        .select(LocationKind::Dropoff, "Galle Face", galle_face())
        .await;

    let view = harness
        .wait_for(|view| view.step == WizardStep::Aborted)
        .await;
    assert_eq!(view.redirect.unwrap().path(), "/login");
    assert_eq!(view.last_error.as_deref(), Some(SESSION_EXPIRED_NOTICE));
    assert_eq!(harness.session.current_session(), None);
}

#[tokio::test]
async fn rejected_credential_on_submission_signs_out() {
    let harness = Harness::new(
        backend().with_booking_failure(CollaboratorError::Unauthorized { status: 401 }),
        Some(customer()),
    );
    harness.reach_payment().await;
    harness.fill_payment("4111111111111111", "01/99").await;
    harness.send(WizardCommand::Submit).await;

    let view = harness
        .wait_for(|view| view.step == WizardStep::Aborted)
        .await;
    assert_eq!(view.redirect.unwrap().path(), "/login");
    assert_eq!(harness.session.current_session(), None);
    assert!(harness.backend.notifications().is_empty());
}

#[tokio::test]
async fn submitting_without_a_session_asks_to_sign_in() {
    let harness = Harness::new(backend(), None);
    harness.reach_payment().await;
    harness.fill_payment("4111111111111111", "01/99").await;
    harness.send(WizardCommand::Submit).await;

    let view = harness
        .wait_for(|view| view.step == WizardStep::Aborted)
        .await;
    assert_eq!(view.last_error.as_deref(), Some(SIGN_IN_REQUIRED_NOTICE));
    assert!(harness.backend.bookings().is_empty());
}

#[tokio::test]
async fn unreachable_booking_service_can_be_retried_by_the_user() {
    let harness = Harness::new(
        backend().with_booking_failure(CollaboratorError::Server {
            status: 503,
            message: "maintenance".to_string(),
        }),
        Some(customer()),
    );
    harness.reach_payment().await;
    harness.fill_payment("4111111111111111", "01/99").await;
    harness.send(WizardCommand::Submit).await;

    let view = harness
        .wait_for(|view| view.step == WizardStep::Payment && view.last_error.is_some())
        .await;
    assert_eq!(view.last_error.as_deref(), Some(SERVICE_UNAVAILABLE_MESSAGE));
    assert_eq!(view.attempts, 1);

    harness.backend.set_booking_failure(None);
    harness.send(WizardCommand::Submit).await;

    let view = harness
        .wait_for(|view| view.step == WizardStep::Succeeded)
        .await;
    assert_eq!(view.attempts, 2);
    assert_eq!(view.last_error, None);
    assert_eq!(harness.backend.bookings().len(), 1);
}

#[tokio::test]
async fn a_slow_start_does_not_hold_up_other_wizards() {
    let slow_vehicle = VehicleRecord {
        id: "veh-slow".to_string(),
        ..vehicle()
    };
    let backend = backend()
        .with_vehicle(slow_vehicle)
        .with_vehicle_delay("veh-slow", Duration::from_secs(2));
    let harness = Harness::new(backend, Some(customer()));
    harness.start().await;

    let bus = harness.bus.clone();
    let slow_id = Uuid::new_v4();
    let slow_start = tokio::spawn(async move {
        bus.execute(
            &slow_id.to_string(),
            WizardCommand::Start {
                id: slow_id,
                vehicle_id: "veh-slow".to_string(),
            },
        )
        .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let edit = harness.edit(FieldEdit::StartDate(NaiveDate::from_ymd_opt(2025, 6, 1)));
    tokio::time::timeout(Duration::from_millis(500), edit)
        .await
        .unwrap_or_else(|_| panic!("edit waited for another wizard's start"));
    assert!(!slow_start.is_finished());

    slow_start.await.unwrap().unwrap();
    assert_eq!(harness.bus.busy_wizards(), 0);
}
