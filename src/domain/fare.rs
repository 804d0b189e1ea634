use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-km rate used when the vehicle record carries none (2.00).
pub const DEFAULT_PRICE_PER_KM: Decimal = Decimal::from_parts(200, 0, 0, false, 2);

const PRICE_SCALE: u32 = 2;
const DISTANCE_SCALE: u32 = 3;

/// Rates of the vehicle being booked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRates {
    pub price_per_day: Decimal,
    pub price_per_km: Option<Decimal>,
}

impl VehicleRates {
    /// The per-km rate, falling back to the default when unset or zero.
    #[must_use]
    pub fn effective_price_per_km(&self) -> Decimal {
        match self.price_per_km {
            Some(rate) if rate > Decimal::ZERO => rate,
            _ => DEFAULT_PRICE_PER_KM,
        }
    }
}

/// Derived price breakdown. Never edited directly, always recomputed from the
/// dates, the resolved distance and the vehicle rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FareQuote {
    pub total_days: u32,
    pub base_price: Decimal,
    pub distance_km: Decimal,
    pub distance_price: Decimal,
    pub total_price: Decimal,
}

impl FareQuote {
    /// Prices the rental. A distance whose price does not fit is dropped, and
    /// a base price that does not fit leaves the quote with no bookable days.
    #[must_use]
    pub fn compute(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        distance_km: Decimal,
        rates: &VehicleRates,
    ) -> Self {
        let distance_km = distance_km.max(Decimal::ZERO);
        let (distance_km, distance_price) =
            match distance_km.checked_mul(rates.effective_price_per_km()) {
                Some(price) => (distance_km, price.round_dp(PRICE_SCALE)),
                None => {
                    tracing::warn!(%distance_km, "distance price out of range, distance ignored");
                    (Decimal::ZERO, Decimal::ZERO)
                }
            };

        let total_days = total_days(start, end);
        let priced = Decimal::from(total_days)
            .checked_mul(rates.price_per_day)
            .map(|base| base.round_dp(PRICE_SCALE))
            .and_then(|base| Some((base, base.checked_add(distance_price)?)));
        let Some((base_price, total_price)) = priced else {
            tracing::warn!(total_days, price_per_day = %rates.price_per_day, "rental price out of range");
            return Self {
                distance_km,
                distance_price,
                ..Self::default()
            };
        };

        Self {
            total_days,
            base_price,
            distance_km,
            distance_price,
            total_price: total_price.max(Decimal::ZERO),
        }
    }

    /// A quote with no rental days cannot be booked even when both dates
    /// passed their own checks.
    #[must_use]
    pub fn is_bookable(&self) -> bool {
        self.total_days > 0
    }
}

/// Whole rental days between the two dates, never negative. Calendar dates
/// carry no time of day, so the day difference is already the rounded-up
/// count.
#[must_use]
pub fn total_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> u32 {
    match (start, end) {
        (Some(start), Some(end)) => {
            u32::try_from(end.signed_duration_since(start).num_days().max(0)).unwrap_or(u32::MAX)
        }
        _ => 0,
    }
}

/// Converts a route distance reported by the distance service. Non-finite
/// and non-positive values mean no distance is available.
#[must_use]
pub fn distance_from_km(km: f64) -> Option<Decimal> {
    if !km.is_finite() || km <= 0.0 {
        return None;
    }
    Decimal::try_from(km)
        .ok()
        .map(|km| km.round_dp(DISTANCE_SCALE))
        .filter(|km| *km > Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn rates(per_day: i64, per_km: Option<Decimal>) -> VehicleRates {
        VehicleRates {
            price_per_day: Decimal::from(per_day),
            price_per_km: per_km,
        }
    }

    #[test]
    fn three_day_rental_at_one_hundred_per_day() {
        let quote = FareQuote::compute(
            date(2025, 6, 1),
            date(2025, 6, 4),
            Decimal::ZERO,
            &rates(100, None),
        );

        assert_eq!(quote.total_days, 3);
        assert_eq!(quote.base_price, Decimal::from(300));
        assert_eq!(quote.total_price, Decimal::from(300));
    }

    #[test]
    fn distance_component_is_added_to_base_price() {
        let distance = distance_from_km(5.2).unwrap();
        let quote = FareQuote::compute(
            date(2025, 6, 1),
            date(2025, 6, 4),
            distance,
            &rates(100, Some(Decimal::new(200, 2))),
        );

        assert_eq!(quote.distance_km, Decimal::new(52, 1));
        assert_eq!(quote.distance_price, Decimal::new(1040, 2));
        assert_eq!(quote.total_price, Decimal::new(31040, 2));
    }

    #[test]
    fn missing_or_zero_per_km_rate_uses_default() {
        assert_eq!(rates(50, None).effective_price_per_km(), DEFAULT_PRICE_PER_KM);
        assert_eq!(
            rates(50, Some(Decimal::ZERO)).effective_price_per_km(),
            DEFAULT_PRICE_PER_KM
        );
        assert_eq!(
            rates(50, Some(Decimal::new(350, 2))).effective_price_per_km(),
            Decimal::new(350, 2)
        );
    }

    #[test]
    fn missing_dates_give_zero_days() {
        assert_eq!(total_days(None, date(2025, 6, 4)), 0);
        assert_eq!(total_days(date(2025, 6, 1), None), 0);

        let quote = FareQuote::compute(None, None, Decimal::ZERO, &rates(100, None));
        assert_eq!(quote.base_price, Decimal::ZERO);
        assert!(!quote.is_bookable());
    }

    #[test]
    fn reversed_dates_never_go_negative() {
        assert_eq!(total_days(date(2025, 6, 4), date(2025, 6, 1)), 0);
    }

    #[test]
    fn every_valid_range_has_at_least_one_day() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        for offset in 1..400 {
            let end = start + chrono::Days::new(offset);
            assert_eq!(u64::from(total_days(Some(start), Some(end))), offset);
        }
    }

    #[test]
    fn out_of_range_distance_is_ignored() {
        let distance = distance_from_km(5e28).unwrap();
        let quote = FareQuote::compute(
            date(2025, 6, 1),
            date(2025, 6, 4),
            distance,
            &rates(100, None),
        );

        assert_eq!(quote.distance_km, Decimal::ZERO);
        assert_eq!(quote.distance_price, Decimal::ZERO);
        assert_eq!(quote.total_price, Decimal::from(300));
        assert!(quote.is_bookable());
    }

    #[test]
    fn out_of_range_daily_rate_cannot_be_booked() {
        let quote = FareQuote::compute(
            date(2025, 6, 1),
            date(2025, 6, 4),
            Decimal::new(52, 1),
            &VehicleRates {
                price_per_day: Decimal::MAX,
                price_per_km: None,
            },
        );

        assert!(!quote.is_bookable());
        assert_eq!(quote.total_price, Decimal::ZERO);
        assert_eq!(quote.distance_price, Decimal::new(1040, 2));
    }

    #[test]
    fn non_positive_distances_are_unavailable() {
        assert_eq!(distance_from_km(0.0), None);
        assert_eq!(distance_from_km(-3.0), None);
        assert_eq!(distance_from_km(f64::NAN), None);
        assert_eq!(distance_from_km(12.3456), Some(Decimal::new(12346, 3)));
    }
}
