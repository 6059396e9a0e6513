//! The booking form snapshot and the field-level update surface.
//!
//! Values arrive loosely typed (from a form UI or from a persisted draft), so
//! every field update goes through [`FormSnapshot::apply`], which either
//! stores a well-formed value or rejects the update and leaves the snapshot
//! untouched. [`merge_with_defaults`] builds a complete snapshot from a
//! partial one by applying each stored field onto the canonical defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{BookingError, Result};
use crate::pricing::number_or;
use crate::workflow::Step;

/// Shown by the documents step for a date that was never entered.
pub const UNSET_DATE_PLACEHOLDER: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    #[default]
    Burial,
    Cremation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyType {
    #[default]
    Civil,
    Religious,
    Combined,
}

/// Which part of a combined ceremony comes first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CeremonyOrder {
    #[default]
    CivilFirst,
    ReligiousFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    #[default]
    #[serde(rename = "")]
    Unselected,
    Basic,
    Standard,
    Premium,
    Custom,
}

/// Legs of the trip the hearse covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HearseRoute {
    pub morgue: bool,
    pub hall: bool,
    pub church: bool,
    pub cemetery: bool,
}

impl Default for HearseRoute {
    fn default() -> Self {
        Self {
            morgue: true,
            hall: true,
            church: true,
            cemetery: true,
        }
    }
}

impl HearseRoute {
    /// Overlay the legs present in `partial`, keeping the current value for
    /// every leg it does not mention. Unknown keys are ignored.
    pub fn merged(&self, partial: &Map<String, Value>) -> Result<Self> {
        let mut route = *self;
        for (leg, value) in partial {
            let slot = match leg.as_str() {
                "morgue" => &mut route.morgue,
                "hall" => &mut route.hall,
                "church" => &mut route.church,
                "cemetery" => &mut route.cemetery,
                other => {
                    debug!(leg = %other, "Ignoring unknown hearse route leg");
                    continue;
                }
            };
            *slot = value
                .as_bool()
                .ok_or_else(|| BookingError::invalid("hearseRoute", format!("leg '{leg}' must be a boolean")))?;
        }
        Ok(route)
    }

    /// Like [`merged`](Self::merged), but a leg that is not a boolean keeps
    /// its current value instead of failing the whole route.
    pub fn merged_lossy(&self, partial: &Map<String, Value>) -> Self {
        let mut route = *self;
        for (leg, value) in partial {
            let single = Map::from_iter([(leg.clone(), value.clone())]);
            match route.merged(&single) {
                Ok(next) => route = next,
                Err(e) => debug!(leg = %leg, error = %e, "Keeping current hearse route leg"),
            }
        }
        route
    }
}

/// Complete state of a booking in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot {
    // Format
    pub service_type: ServiceType,
    pub has_hall: bool,
    pub hall_duration: u32,
    pub ceremony_type: CeremonyType,
    pub confession: String,
    pub ceremony_order: CeremonyOrder,

    // Logistics
    pub cemetery: String,
    pub selected_slot: String,
    pub needs_hearse: bool,
    pub hearse_route: HearseRoute,
    pub needs_family_transport: bool,
    pub family_transport_seats: u32,
    pub distance: String,
    pub needs_pallbearers: bool,

    // Package
    pub package_type: PackageType,
    pub selected_additional_services: Vec<String>,
    pub special_requests: String,

    // Documents
    pub full_name: String,
    pub birth_date: String,
    pub death_date: String,
    pub death_certificate: String,
    pub relationship: String,
    pub data_consent: bool,
}

impl Default for FormSnapshot {
    fn default() -> Self {
        Self {
            service_type: ServiceType::Burial,
            has_hall: true,
            hall_duration: 60,
            ceremony_type: CeremonyType::Civil,
            confession: String::new(),
            ceremony_order: CeremonyOrder::CivilFirst,

            cemetery: String::new(),
            selected_slot: String::new(),
            needs_hearse: true,
            hearse_route: HearseRoute::default(),
            needs_family_transport: false,
            family_transport_seats: 5,
            distance: String::new(),
            needs_pallbearers: true,

            package_type: PackageType::Unselected,
            selected_additional_services: Vec::new(),
            special_requests: String::new(),

            full_name: String::new(),
            birth_date: String::new(),
            death_date: String::new(),
            death_certificate: String::new(),
            relationship: String::new(),
            data_consent: false,
        }
    }
}

/// Every field of [`FormSnapshot`], named as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    ServiceType,
    HasHall,
    HallDuration,
    CeremonyType,
    Confession,
    CeremonyOrder,
    Cemetery,
    SelectedSlot,
    NeedsHearse,
    HearseRoute,
    NeedsFamilyTransport,
    FamilyTransportSeats,
    Distance,
    NeedsPallbearers,
    PackageType,
    SelectedAdditionalServices,
    SpecialRequests,
    FullName,
    BirthDate,
    DeathDate,
    DeathCertificate,
    Relationship,
    DataConsent,
}

impl FormField {
    pub const ALL: [FormField; 23] = [
        Self::ServiceType,
        Self::HasHall,
        Self::HallDuration,
        Self::CeremonyType,
        Self::Confession,
        Self::CeremonyOrder,
        Self::Cemetery,
        Self::SelectedSlot,
        Self::NeedsHearse,
        Self::HearseRoute,
        Self::NeedsFamilyTransport,
        Self::FamilyTransportSeats,
        Self::Distance,
        Self::NeedsPallbearers,
        Self::PackageType,
        Self::SelectedAdditionalServices,
        Self::SpecialRequests,
        Self::FullName,
        Self::BirthDate,
        Self::DeathDate,
        Self::DeathCertificate,
        Self::Relationship,
        Self::DataConsent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceType => "serviceType",
            Self::HasHall => "hasHall",
            Self::HallDuration => "hallDuration",
            Self::CeremonyType => "ceremonyType",
            Self::Confession => "confession",
            Self::CeremonyOrder => "ceremonyOrder",
            Self::Cemetery => "cemetery",
            Self::SelectedSlot => "selectedSlot",
            Self::NeedsHearse => "needsHearse",
            Self::HearseRoute => "hearseRoute",
            Self::NeedsFamilyTransport => "needsFamilyTransport",
            Self::FamilyTransportSeats => "familyTransportSeats",
            Self::Distance => "distance",
            Self::NeedsPallbearers => "needsPallbearers",
            Self::PackageType => "packageType",
            Self::SelectedAdditionalServices => "selectedAdditionalServices",
            Self::SpecialRequests => "specialRequests",
            Self::FullName => "fullName",
            Self::BirthDate => "birthDate",
            Self::DeathDate => "deathDate",
            Self::DeathCertificate => "deathCertificate",
            Self::Relationship => "relationship",
            Self::DataConsent => "dataConsent",
        }
    }

    /// The wizard step whose page edits this field
    pub fn step(&self) -> Step {
        match self {
            Self::ServiceType
            | Self::HasHall
            | Self::HallDuration
            | Self::CeremonyType
            | Self::Confession
            | Self::CeremonyOrder => Step::Format,
            Self::Cemetery
            | Self::SelectedSlot
            | Self::NeedsHearse
            | Self::HearseRoute
            | Self::NeedsFamilyTransport
            | Self::FamilyTransportSeats
            | Self::Distance
            | Self::NeedsPallbearers => Step::Logistics,
            Self::PackageType | Self::SelectedAdditionalServices | Self::SpecialRequests => {
                Step::Package
            }
            Self::FullName
            | Self::BirthDate
            | Self::DeathDate
            | Self::DeathCertificate
            | Self::Relationship
            | Self::DataConsent => Step::Documents,
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormField {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| BookingError::UnknownField(s.to_string()))
    }
}

/// A single `(fieldName, newValue)` edit as sent by the form UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

impl FieldUpdate {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

fn bool_value(field: FormField, value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        _ => Err(BookingError::invalid(field.as_str(), "expected a boolean")),
    }
}

fn text_value(field: FormField, value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(BookingError::invalid(field.as_str(), "expected a string")),
    }
}

fn date_value(field: FormField, value: Value) -> Result<Option<String>> {
    Ok(text_value(field, value)?.map(|date| {
        if date == UNSET_DATE_PLACEHOLDER {
            String::new()
        } else {
            date
        }
    }))
}

fn enum_value<T: DeserializeOwned>(field: FormField, value: Value) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| BookingError::invalid(field.as_str(), e.to_string()))
}

/// Numeric fields never reject input: unusable values fall back to the
/// default and everything else is rounded up to at least 1.
fn count_value(value: &Value, fallback: u32) -> u32 {
    let n = number_or(Some(value), f64::from(fallback));
    n.round().clamp(1.0, f64::from(u32::MAX)) as u32
}

fn services_value(field: FormField, value: Value) -> Result<Vec<String>> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(BookingError::invalid(field.as_str(), "expected a list of strings")),
    };

    let mut services: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(service) = item else {
            return Err(BookingError::invalid(field.as_str(), "expected a list of strings"));
        };
        if !services.contains(&service) {
            services.push(service);
        }
    }
    Ok(services)
}

impl FormSnapshot {
    /// Apply one field update. `null` resets the field to its default.
    ///
    /// On error the snapshot is left unchanged.
    pub fn apply(&mut self, field: FormField, value: Value) -> Result<()> {
        let defaults = FormSnapshot::default();
        match field {
            FormField::ServiceType => {
                self.service_type = enum_value(field, value)?.unwrap_or(defaults.service_type)
            }
            FormField::HasHall => {
                self.has_hall = bool_value(field, &value)?.unwrap_or(defaults.has_hall)
            }
            FormField::HallDuration => {
                self.hall_duration = count_value(&value, defaults.hall_duration)
            }
            FormField::CeremonyType => {
                self.ceremony_type = enum_value(field, value)?.unwrap_or(defaults.ceremony_type)
            }
            FormField::Confession => {
                self.confession = text_value(field, value)?.unwrap_or(defaults.confession)
            }
            FormField::CeremonyOrder => {
                self.ceremony_order = enum_value(field, value)?.unwrap_or(defaults.ceremony_order)
            }
            FormField::Cemetery => {
                self.cemetery = text_value(field, value)?.unwrap_or(defaults.cemetery)
            }
            FormField::SelectedSlot => {
                self.selected_slot = text_value(field, value)?.unwrap_or(defaults.selected_slot)
            }
            FormField::NeedsHearse => {
                self.needs_hearse = bool_value(field, &value)?.unwrap_or(defaults.needs_hearse)
            }
            FormField::HearseRoute => {
                self.hearse_route = match value {
                    Value::Null => defaults.hearse_route,
                    Value::Object(partial) => self.hearse_route.merged(&partial)?,
                    _ => return Err(BookingError::invalid(field.as_str(), "expected an object")),
                }
            }
            FormField::NeedsFamilyTransport => {
                self.needs_family_transport =
                    bool_value(field, &value)?.unwrap_or(defaults.needs_family_transport)
            }
            FormField::FamilyTransportSeats => {
                self.family_transport_seats = count_value(&value, defaults.family_transport_seats)
            }
            FormField::Distance => {
                self.distance = text_value(field, value)?.unwrap_or(defaults.distance)
            }
            FormField::NeedsPallbearers => {
                self.needs_pallbearers =
                    bool_value(field, &value)?.unwrap_or(defaults.needs_pallbearers)
            }
            FormField::PackageType => {
                self.package_type = enum_value(field, value)?.unwrap_or(defaults.package_type)
            }
            FormField::SelectedAdditionalServices => {
                self.selected_additional_services = services_value(field, value)?
            }
            FormField::SpecialRequests => {
                self.special_requests = text_value(field, value)?.unwrap_or(defaults.special_requests)
            }
            FormField::FullName => {
                self.full_name = text_value(field, value)?.unwrap_or(defaults.full_name)
            }
            FormField::BirthDate => {
                self.birth_date = date_value(field, value)?.unwrap_or(defaults.birth_date)
            }
            FormField::DeathDate => {
                self.death_date = date_value(field, value)?.unwrap_or(defaults.death_date)
            }
            FormField::DeathCertificate => {
                self.death_certificate =
                    text_value(field, value)?.unwrap_or(defaults.death_certificate)
            }
            FormField::Relationship => {
                self.relationship = text_value(field, value)?.unwrap_or(defaults.relationship)
            }
            FormField::DataConsent => {
                self.data_consent = bool_value(field, &value)?.unwrap_or(defaults.data_consent)
            }
        }
        Ok(())
    }

    /// Apply an update addressed by wire name.
    pub fn apply_update(&mut self, update: FieldUpdate) -> Result<()> {
        let field: FormField = update.field.parse()?;
        self.apply(field, update.value)
    }

    /// Apply several updates, all or nothing.
    pub fn apply_all(&mut self, updates: impl IntoIterator<Item = FieldUpdate>) -> Result<()> {
        let mut next = self.clone();
        for update in updates {
            next.apply_update(update)?;
        }
        *self = next;
        Ok(())
    }
}

/// Build a complete snapshot from a partial, loosely-typed one.
///
/// Each known field present in `partial` is applied onto the canonical
/// defaults; unknown or malformed fields keep their default. `hearseRoute`
/// is merged leg by leg, so drafts written before a leg existed still get it
/// and a single bad leg only costs that leg. Non-string services are dropped
/// one by one.
pub fn merge_with_defaults(partial: &Map<String, Value>) -> FormSnapshot {
    let mut form = FormSnapshot::default();
    for (name, value) in partial {
        let field = match name.parse::<FormField>() {
            Ok(field) => field,
            Err(_) => {
                debug!(field = %name, "Ignoring unknown draft field");
                continue;
            }
        };
        let applied = match (field, value) {
            (FormField::HearseRoute, Value::Object(legs)) => {
                form.hearse_route = form.hearse_route.merged_lossy(legs);
                Ok(())
            }
            (FormField::SelectedAdditionalServices, Value::Array(items)) => {
                let services: Vec<Value> = items.iter().filter(|item| item.is_string()).cloned().collect();
                if services.len() < items.len() {
                    debug!(
                        field = %name,
                        dropped = items.len() - services.len(),
                        "Dropping non-string draft services"
                    );
                }
                form.apply(field, Value::Array(services))
            }
            _ => form.apply(field, value.clone()),
        };
        if let Err(e) = applied {
            debug!(field = %name, error = %e, "Keeping default for malformed draft field");
        }
    }
    form
}
