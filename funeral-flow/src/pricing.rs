//! Price calculation for a booking in progress.
//!
//! Everything here is pure: a [`FormSnapshot`] plus the selected
//! [`CemeteryCategory`] map to a total and an itemized [`PriceBreakdown`].
//! Malformed input never fails the computation, it only contributes zero.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{BookingError, Result};
use crate::form::FormSnapshot;

/// Hall rental is quoted per hour; durations are in minutes.
pub const HALL_REFERENCE_MINUTES: f64 = 60.0;

/// Pricing tier of the chosen cemetery, selected independently of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CemeteryCategory {
    Standard,
    Comfort,
    Premium,
}

impl CemeteryCategory {
    pub const ALL: [CemeteryCategory; 3] = [Self::Standard, Self::Comfort, Self::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Comfort => "comfort",
            Self::Premium => "premium",
        }
    }

    /// Lenient lookup used for values coming from the category chooser.
    /// Unknown names yield `None`, which prices the base at zero.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CemeteryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CemeteryCategory {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
            .ok_or_else(|| BookingError::invalid("cemeteryCategory", format!("unknown category '{s}'")))
    }
}

/// Coerce a loosely-typed JSON value to a finite number.
///
/// Numbers pass through, strings are trimmed and parsed after turning a
/// decimal comma into a point. Everything else, and any non-finite result,
/// is `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// [`coerce_number`] with a fallback for missing or unusable values.
pub fn number_or(value: Option<&Value>, fallback: f64) -> f64 {
    value.and_then(coerce_number).unwrap_or(fallback)
}

/// What a breakdown line charges for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    BasePackage,
    Hall,
    FamilyTransport,
    AdditionalServices,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub kind: LineItemKind,
    pub label: String,
    pub amount: i64,
}

impl LineItem {
    fn new(kind: LineItemKind, label: String, amount: i64) -> Self {
        Self {
            kind,
            label,
            amount,
        }
    }
}

/// Itemized price, recomputed on every read and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub items: Vec<LineItem>,
    pub total: i64,
}

/// Rates used by the calculator, in whole currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PriceTable {
    /// Base package price per cemetery category. Missing categories price at zero.
    pub base: BTreeMap<CemeteryCategory, i64>,
    /// Memorial hall rental for [`HALL_REFERENCE_MINUTES`].
    pub hall_per_hour: i64,
    pub family_transport_per_seat: i64,
    pub additional_service: i64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            base: BTreeMap::from([
                (CemeteryCategory::Standard, 50_000),
                (CemeteryCategory::Comfort, 80_000),
                (CemeteryCategory::Premium, 120_000),
            ]),
            hall_per_hour: 8_000,
            family_transport_per_seat: 1_500,
            additional_service: 5_000,
        }
    }
}

static DEFAULT_TABLE: LazyLock<PriceTable> = LazyLock::new(PriceTable::default);

impl PriceTable {
    /// Reject tables that could produce negative charges.
    pub fn validate(&self) -> Result<()> {
        if let Some((category, price)) = self.base.iter().find(|(_, price)| **price < 0) {
            return Err(BookingError::Config(format!(
                "base price for {category} is negative: {price}"
            )));
        }
        let rates = [
            ("hallPerHour", self.hall_per_hour),
            ("familyTransportPerSeat", self.family_transport_per_seat),
            ("additionalService", self.additional_service),
        ];
        for (name, rate) in rates {
            if rate < 0 {
                return Err(BookingError::Config(format!("{name} is negative: {rate}")));
            }
        }
        Ok(())
    }

    pub fn base_price(&self, category: Option<CemeteryCategory>) -> i64 {
        category
            .and_then(|category| self.base.get(&category).copied())
            .unwrap_or(0)
    }

    pub fn breakdown(
        &self,
        form: &FormSnapshot,
        category: impl Into<Option<CemeteryCategory>>,
    ) -> PriceBreakdown {
        let category = category.into();
        let mut items = Vec::with_capacity(4);

        let tier = category.map(|c| c.as_str()).unwrap_or("unspecified");
        items.push(LineItem::new(
            LineItemKind::BasePackage,
            format!("Base package ({tier})"),
            self.base_price(category),
        ));

        if form.has_hall {
            let minutes = form.hall_duration;
            let amount = self.hall_per_hour as f64 * f64::from(minutes) / HALL_REFERENCE_MINUTES;
            items.push(LineItem::new(
                LineItemKind::Hall,
                format!("Memorial hall, {minutes} min"),
                amount.round() as i64,
            ));
        }

        if form.needs_family_transport {
            let seats = form.family_transport_seats;
            items.push(LineItem::new(
                LineItemKind::FamilyTransport,
                format!("Family transport, {seats} seats"),
                self.family_transport_per_seat.saturating_mul(i64::from(seats)),
            ));
        }

        let services = form.selected_additional_services.len();
        if services > 0 {
            items.push(LineItem::new(
                LineItemKind::AdditionalServices,
                format!("Additional services ({services})"),
                self.additional_service
                    .saturating_mul(i64::try_from(services).unwrap_or(i64::MAX)),
            ));
        }

        // Configured rates are unbounded; saturate rather than overflow.
        let total = items
            .iter()
            .fold(0i64, |acc, item| acc.saturating_add(item.amount))
            .max(0);
        PriceBreakdown { items, total }
    }

    pub fn total(&self, form: &FormSnapshot, category: impl Into<Option<CemeteryCategory>>) -> i64 {
        self.breakdown(form, category).total
    }
}

/// Total price with the default rates. Always equals
/// `calculate_breakdown(form, category).total`.
pub fn calculate_total(form: &FormSnapshot, category: impl Into<Option<CemeteryCategory>>) -> i64 {
    DEFAULT_TABLE.total(form, category)
}

/// Itemized price with the default rates: base first, then hall, family
/// transport and additional services when they apply.
pub fn calculate_breakdown(
    form: &FormSnapshot,
    category: impl Into<Option<CemeteryCategory>>,
) -> PriceBreakdown {
    DEFAULT_TABLE.breakdown(form, category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bare_form() -> FormSnapshot {
        FormSnapshot {
            has_hall: false,
            needs_family_transport: false,
            selected_additional_services: Vec::new(),
            ..FormSnapshot::default()
        }
    }

    fn base(category: CemeteryCategory) -> i64 {
        PriceTable::default().base[&category]
    }

    #[test]
    fn test_bare_form_costs_exactly_the_base_price() {
        let form = bare_form();
        for category in CemeteryCategory::ALL {
            assert_eq!(calculate_total(&form, category), base(category));
        }
        assert!(base(CemeteryCategory::Standard) < base(CemeteryCategory::Comfort));
        assert!(base(CemeteryCategory::Comfort) < base(CemeteryCategory::Premium));
    }

    #[test]
    fn test_standard_with_one_hour_hall() {
        let form = FormSnapshot {
            has_hall: true,
            hall_duration: 60,
            ..bare_form()
        };
        assert_eq!(
            calculate_total(&form, CemeteryCategory::Standard),
            base(CemeteryCategory::Standard) + 8000
        );
    }

    #[test]
    fn test_premium_with_hall_transport_and_services() {
        let form = FormSnapshot {
            has_hall: true,
            hall_duration: 30,
            needs_family_transport: true,
            family_transport_seats: 3,
            selected_additional_services: vec!["flowers".to_string(), "music".to_string()],
            ..bare_form()
        };

        let breakdown = calculate_breakdown(&form, CemeteryCategory::Premium);
        let kinds: Vec<_> = breakdown.items.iter().map(|item| item.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LineItemKind::BasePackage,
                LineItemKind::Hall,
                LineItemKind::FamilyTransport,
                LineItemKind::AdditionalServices,
            ]
        );
        let amounts: Vec<_> = breakdown.items.iter().map(|item| item.amount).collect();
        assert_eq!(amounts, vec![base(CemeteryCategory::Premium), 4000, 4500, 10000]);
        assert_eq!(
            calculate_total(&form, CemeteryCategory::Premium),
            base(CemeteryCategory::Premium) + 4000 + 4500 + 10000
        );
    }

    #[test]
    fn test_total_matches_breakdown_across_inputs() {
        let categories = [
            None,
            Some(CemeteryCategory::Standard),
            Some(CemeteryCategory::Comfort),
            Some(CemeteryCategory::Premium),
        ];
        for category in categories {
            for has_hall in [false, true] {
                for hall_duration in [0, 1, 7, 45, 60, 95, 240] {
                    for seats in [0, 1, 5, 12] {
                        for services in 0..3 {
                            let form = FormSnapshot {
                                has_hall,
                                hall_duration,
                                needs_family_transport: seats % 2 == 1,
                                family_transport_seats: seats,
                                selected_additional_services: (0..services)
                                    .map(|i| format!("service-{i}"))
                                    .collect(),
                                ..FormSnapshot::default()
                            };
                            let breakdown = calculate_breakdown(&form, category);
                            let sum: i64 = breakdown.items.iter().map(|i| i.amount).sum();
                            assert_eq!(calculate_total(&form, category), breakdown.total);
                            assert_eq!(breakdown.total, sum);
                            assert!(breakdown.total >= 0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_odd_hall_duration_is_rounded_per_item() {
        let form = FormSnapshot {
            has_hall: true,
            hall_duration: 7,
            ..bare_form()
        };
        let breakdown = calculate_breakdown(&form, CemeteryCategory::Standard);
        // 8000 * 7 / 60 = 933.33...
        assert_eq!(breakdown.items[1].amount, 933);
        assert_eq!(breakdown.total, base(CemeteryCategory::Standard) + 933);
    }

    #[test]
    fn test_missing_category_prices_base_at_zero() {
        let form = bare_form();
        let breakdown = calculate_breakdown(&form, None);
        assert_eq!(breakdown.items.len(), 1);
        assert_eq!(breakdown.items[0].amount, 0);
        assert_eq!(breakdown.total, 0);

        let mut table = PriceTable::default();
        table.base.remove(&CemeteryCategory::Comfort);
        assert_eq!(table.total(&form, CemeteryCategory::Comfort), 0);
    }

    #[test]
    fn test_category_parse_is_lenient() {
        assert_eq!(CemeteryCategory::parse(" Premium "), Some(CemeteryCategory::Premium));
        assert_eq!(CemeteryCategory::parse("vip"), None);
        assert!("vip".parse::<CemeteryCategory>().is_err());
        assert_eq!("comfort".parse::<CemeteryCategory>().unwrap(), CemeteryCategory::Comfort);
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&json!(45)), Some(45.0));
        assert_eq!(coerce_number(&json!("45")), Some(45.0));
        assert_eq!(coerce_number(&json!(" 12,5 ")), Some(12.5));
        assert_eq!(coerce_number(&json!("abc")), None);
        assert_eq!(coerce_number(&json!("")), None);
        assert_eq!(coerce_number(&json!("inf")), None);
        assert_eq!(coerce_number(&json!("NaN")), None);
        assert_eq!(coerce_number(&json!(true)), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(number_or(None, 60.0), 60.0);
        assert_eq!(number_or(Some(&json!("x")), 0.0), 0.0);
    }

    #[test]
    fn test_validate_rejects_negative_rates() {
        assert!(PriceTable::default().validate().is_ok());

        let table = PriceTable {
            hall_per_hour: -1,
            ..PriceTable::default()
        };
        assert!(matches!(table.validate(), Err(BookingError::Config(_))));

        let mut table = PriceTable::default();
        table.base.insert(CemeteryCategory::Premium, -10);
        assert!(matches!(table.validate(), Err(BookingError::Config(_))));
    }

    #[test]
    fn test_huge_rates_saturate_instead_of_overflowing() {
        let table = PriceTable {
            family_transport_per_seat: i64::MAX / 2,
            additional_service: i64::MAX / 2,
            ..PriceTable::default()
        };
        assert!(table.validate().is_ok());

        let form = FormSnapshot {
            needs_family_transport: true,
            family_transport_seats: 5,
            selected_additional_services: vec!["flowers".to_string(), "music".to_string()],
            ..FormSnapshot::default()
        };
        let breakdown = table.breakdown(&form, CemeteryCategory::Premium);
        assert_eq!(breakdown.items[2].amount, i64::MAX);
        assert_eq!(breakdown.total, i64::MAX);
        assert_eq!(table.total(&form, CemeteryCategory::Premium), breakdown.total);
    }

    #[test]
    fn test_price_table_from_partial_json() {
        let table: PriceTable =
            serde_json::from_value(json!({"base": {"standard": 1000}, "hallPerHour": 600})).unwrap();
        assert_eq!(table.base_price(Some(CemeteryCategory::Standard)), 1000);
        assert_eq!(table.base_price(Some(CemeteryCategory::Premium)), 0);
        assert_eq!(table.hall_per_hour, 600);
        assert_eq!(table.additional_service, 5_000);
    }
}
