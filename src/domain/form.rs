use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A geocoded point as supplied by the address search widget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationKind {
    Pickup,
    Dropoff,
}

impl LocationKind {
    #[must_use]
    pub fn field(self) -> FormField {
        match self {
            LocationKind::Pickup => FormField::PickupLocation,
            LocationKind::Dropoff => FormField::DropoffLocation,
        }
    }
}

/// Every user-editable field of the wizard. The declaration order is the
/// order in which errors are reported in a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    StartDate,
    EndDate,
    PickupLocation,
    DropoffLocation,
    CardNumber,
    Expiry,
    Cvv,
    CardName,
}

/// A single field edit coming from the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FieldEdit {
    StartDate(Option<NaiveDate>),
    EndDate(Option<NaiveDate>),
    PickupLocation(String),
    DropoffLocation(String),
    CardNumber(String),
    Expiry(String),
    Cvv(String),
    CardName(String),
}

impl FieldEdit {
    #[must_use]
    pub fn field(&self) -> FormField {
        match self {
            FieldEdit::StartDate(_) => FormField::StartDate,
            FieldEdit::EndDate(_) => FormField::EndDate,
            FieldEdit::PickupLocation(_) => FormField::PickupLocation,
            FieldEdit::DropoffLocation(_) => FormField::DropoffLocation,
            FieldEdit::CardNumber(_) => FormField::CardNumber,
            FieldEdit::Expiry(_) => FormField::Expiry,
            FieldEdit::Cvv(_) => FormField::Cvv,
            FieldEdit::CardName(_) => FormField::CardName,
        }
    }

    #[must_use]
    pub fn touches_dates(&self) -> bool {
        matches!(self, FieldEdit::StartDate(_) | FieldEdit::EndDate(_))
    }
}

/// The record edited across the wizard steps.
///
/// Coordinates are independent of their address text: editing the text never
/// touches them, only a place selection does.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardForm {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub pickup_coords: Option<Coordinates>,
    pub dropoff_coords: Option<Coordinates>,
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
    pub card_name: String,
}

impl WizardForm {
    pub fn apply_edit(&mut self, edit: FieldEdit) {
        match edit {
            FieldEdit::StartDate(date) => self.start_date = date,
            FieldEdit::EndDate(date) => self.end_date = date,
            FieldEdit::PickupLocation(text) => self.pickup_location = text,
            FieldEdit::DropoffLocation(text) => self.dropoff_location = text,
            FieldEdit::CardNumber(text) => self.card_number = text,
            FieldEdit::Expiry(text) => self.expiry = text,
            FieldEdit::Cvv(text) => self.cvv = text,
            FieldEdit::CardName(text) => self.card_name = text,
        }
    }

    pub fn select_place(
        &mut self,
        location: LocationKind,
        address: String,
        coords: Option<Coordinates>,
    ) {
        match location {
            LocationKind::Pickup => {
                self.pickup_location = address;
                self.pickup_coords = coords;
            }
            LocationKind::Dropoff => {
                self.dropoff_location = address;
                self.dropoff_coords = coords;
            }
        }
    }

    /// Both coordinates, if both places were resolved to a point.
    #[must_use]
    pub fn coordinate_pair(&self) -> Option<(Coordinates, Coordinates)> {
        self.pickup_coords.zip(self.dropoff_coords)
    }

    /// The card number with all whitespace removed.
    #[must_use]
    pub fn card_digits(&self) -> String {
        self.card_number.split_whitespace().collect()
    }

    #[must_use]
    pub fn card_last_four(&self) -> String {
        let digits = self.card_digits();
        let skip = digits.chars().count().saturating_sub(4);
        digits.chars().skip(skip).collect()
    }

    /// A copy safe to hand out in read models: the card number is reduced to
    /// its last four digits and the CVV is dropped.
    #[must_use]
    pub fn masked(&self) -> Self {
        let card_number = if self.card_number.is_empty() {
            String::new()
        } else {
            format!("**** **** **** {}", self.card_last_four())
        };
        Self {
            card_number,
            cvv: String::new(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for WizardForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardForm")
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("pickup_location", &self.pickup_location)
            .field("dropoff_location", &self.dropoff_location)
            .field("pickup_coords", &self.pickup_coords)
            .field("dropoff_coords", &self.dropoff_coords)
            .field("card_number", &format_args!("****{}", self.card_last_four()))
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .field("card_name", &self.card_name)
            .finish()
    }
}

/// One optional message per form field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<FormField, String>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: FormField, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn clear(&mut self, field: FormField) {
        self.0.remove(&field);
    }

    #[must_use]
    pub fn get(&self, field: FormField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, field: FormField) -> bool {
        self.0.contains_key(&field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FormField, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }

    /// Aggregated, human-readable summary of every message, or `None` when
    /// there is nothing to report.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let messages: Vec<&str> = self.0.values().map(String::as_str).collect();
        Some(format!(
            "Please correct the following: {}",
            messages.join("; ")
        ))
    }
}
