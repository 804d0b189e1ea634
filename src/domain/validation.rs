use chrono::{Datelike, NaiveDate};

use crate::domain::form::{FormField, ValidationErrors, WizardForm};
use crate::domain::wizard::WizardStep;

const MIN_ADDRESS_LEN: usize = 3;
const MIN_CARD_NAME_LEN: usize = 3;
const CARD_NUMBER_LEN: usize = 16;
const CVV_LEN: usize = 3;

/// Validates the fields gated by `step`. An empty result means the step may
/// be left. Steps without fields always validate.
#[must_use]
pub fn validate(step: WizardStep, form: &WizardForm, today: NaiveDate) -> ValidationErrors {
    match step {
        WizardStep::Dates => validate_dates(form, today),
        WizardStep::Locations => validate_locations(form),
        WizardStep::Payment => validate_payment(form, today),
        _ => ValidationErrors::new(),
    }
}

#[must_use]
pub fn validate_dates(form: &WizardForm, today: NaiveDate) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    match form.start_date {
        None => errors.insert(FormField::StartDate, "Start date is required"),
        Some(start) if start < today => {
            errors.insert(FormField::StartDate, "Start date cannot be in the past");
        }
        Some(_) => {}
    }

    match (form.start_date, form.end_date) {
        (_, None) => errors.insert(FormField::EndDate, "End date is required"),
        (Some(start), Some(end)) if end <= start => {
            errors.insert(FormField::EndDate, "End date must be after start date");
        }
        _ => {}
    }

    errors
}

#[must_use]
pub fn validate_locations(form: &WizardForm) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    check_address(
        &mut errors,
        FormField::PickupLocation,
        "Pickup location",
        &form.pickup_location,
    );
    check_address(
        &mut errors,
        FormField::DropoffLocation,
        "Drop-off location",
        &form.dropoff_location,
    );
    errors
}

fn check_address(errors: &mut ValidationErrors, field: FormField, label: &str, address: &str) {
    let address = address.trim();
    if address.is_empty() {
        errors.insert(field, format!("{label} is required"));
    } else if address.chars().count() < MIN_ADDRESS_LEN {
        errors.insert(
            field,
            format!("{label} must be at least {MIN_ADDRESS_LEN} characters"),
        );
    }
}

#[must_use]
pub fn validate_payment(form: &WizardForm, today: NaiveDate) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    let digits = form.card_digits();
    if digits.is_empty() {
        errors.insert(FormField::CardNumber, "Card number is required");
    } else if !is_digits(&digits, CARD_NUMBER_LEN) {
        errors.insert(FormField::CardNumber, "Card number must be 16 digits");
    }

    let expiry = form.expiry.trim();
    if expiry.is_empty() {
        errors.insert(FormField::Expiry, "Expiry date is required");
    } else {
        match parse_expiry(expiry) {
            None => errors.insert(FormField::Expiry, "Expiry must be in MM/YY format"),
            Some((year, month)) if (year, month) < (today.year(), today.month()) => {
                errors.insert(FormField::Expiry, "Card has expired");
            }
            Some(_) => {}
        }
    }

    if !is_digits(form.cvv.trim(), CVV_LEN) {
        errors.insert(FormField::Cvv, "CVV must be 3 digits");
    }

    let card_name = form.card_name.trim();
    if card_name.is_empty() {
        errors.insert(FormField::CardName, "Cardholder name is required");
    } else if card_name.chars().count() < MIN_CARD_NAME_LEN {
        errors.insert(
            FormField::CardName,
            format!("Cardholder name must be at least {MIN_CARD_NAME_LEN} characters"),
        );
    }

    errors
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// Parses `MM/YY` into `(year, month)`; two-digit years are in the 2000s.
fn parse_expiry(expiry: &str) -> Option<(i32, u32)> {
    let (month, year) = expiry.split_once('/')?;
    if !is_digits(month, 2) || !is_digits(year, 2) {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    (1..=12).contains(&month).then_some((2000 + year, month))
}
