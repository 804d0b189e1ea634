use cqrs_es::{Aggregate, EventEnvelope, View};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::fare::FareQuote;
use crate::domain::form::{ValidationErrors, WizardForm};
use crate::domain::navigation::Redirect;
use crate::domain::wizard::{BookingWizard, WizardStep};

/// What the UI renders for one wizard. The card number is masked and the
/// CVV never leaves the aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardView {
    pub id: Uuid,
    pub vehicle_id: String,
    pub vehicle_name: Option<String>,
    pub step: WizardStep,
    pub form: WizardForm,
    pub errors: ValidationErrors,
    pub error_summary: Option<String>,
    pub fare: FareQuote,
    pub distance_pending: bool,
    pub last_error: Option<String>,
    pub attempts: u32,
    pub booking_id: Option<String>,
    pub booking_status: Option<String>,
    pub redirect: Option<Redirect>,
    pub version: usize,
    #[serde(skip)]
    replica: BookingWizard,
}

// Events are replayed into a private copy of the aggregate and the view is
// projected from that copy.
impl View<BookingWizard> for WizardView {
    fn update(&mut self, event: &EventEnvelope<BookingWizard>) {
        self.replica.apply(event.payload.clone());
        self.version = event.sequence;
        self.refresh();
    }
}

impl WizardView {
    fn refresh(&mut self) {
        let wizard = &self.replica;
        self.id = wizard.id();
        self.vehicle_id.clone_from(&wizard.vehicle().vehicle_id);
        self.vehicle_name.clone_from(&wizard.vehicle().name);
        self.step = wizard.step();
        self.form = wizard.form().masked();
        self.errors = wizard.errors().clone();
        self.error_summary = wizard.errors().summary();
        self.fare = *wizard.fare();
        self.distance_pending = wizard.distance().pending;
        self.last_error = wizard.last_error().map(str::to_string);
        self.attempts = wizard.attempts();
        self.booking_id = wizard.booking_id().map(str::to_string);
        self.booking_status = wizard.booking_status().map(str::to_string);
        self.redirect = wizard.redirect().cloned();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::events::WizardEvent;
    use crate::domain::fare::VehicleRates;
    use crate::domain::form::FieldEdit;
    use crate::domain::wizard::VehicleSnapshot;

    fn envelope(sequence: usize, payload: WizardEvent) -> EventEnvelope<BookingWizard> {
        EventEnvelope {
            aggregate_id: "w-1".to_string(),
            sequence,
            payload,
            metadata: HashMap::default(),
        }
    }

    #[test]
    fn view_masks_the_card_and_tracks_the_fare() {
        let id = Uuid::from_u128(1);
        let mut view = WizardView::default();
        let events = [
            WizardEvent::Started {
                id,
                vehicle: VehicleSnapshot {
                    vehicle_id: "veh-1".to_string(),
                    name: Some("Toyota Axio".to_string()),
                    rates: VehicleRates {
                        price_per_day: Decimal::from(100),
                        price_per_km: None,
                    },
                },
            },
            WizardEvent::FieldEdited {
                edit: FieldEdit::StartDate(NaiveDate::from_ymd_opt(2025, 6, 1)),
            },
            WizardEvent::FieldEdited {
                edit: FieldEdit::EndDate(NaiveDate::from_ymd_opt(2025, 6, 4)),
            },
            WizardEvent::FieldEdited {
                edit: FieldEdit::CardNumber("4111 1111 1111 1234".to_string()),
            },
            WizardEvent::FieldEdited {
                edit: FieldEdit::Cvv("999".to_string()),
            },
        ];
        for (index, event) in events.into_iter().enumerate() {
            view.update(&envelope(index + 1, event));
        }

        assert_eq!(view.id, id);
        assert_eq!(view.version, 5);
        assert_eq!(view.fare.total_price, Decimal::from(300));
        assert_eq!(view.form.card_number, "**** **** **** 1234");
        assert_eq!(view.form.cvv, "");

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("4111"));
        assert!(!json.contains("999"));
    }
}
