//! Booking core configuration.
//!
//! Resolved once at startup and handed to the services that need it, so
//! nothing reads the environment while a booking is being edited.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BookingError, Result};
use crate::pricing::PriceTable;

/// Storage slot holding the current draft
pub const DEFAULT_DRAFT_KEY: &str = "funeral-workflow-draft";

pub const ENV_DRAFT_KEY: &str = "FUNERAL_DRAFT_KEY";
pub const ENV_SAVE_CEILING: &str = "FUNERAL_SAVE_CEILING";
pub const ENV_READ_CEILING: &str = "FUNERAL_READ_CEILING";
pub const ENV_CLEANUP_THRESHOLD: &str = "FUNERAL_CLEANUP_THRESHOLD";
pub const ENV_PRICE_TABLE: &str = "FUNERAL_PRICE_TABLE";

/// Size guards for draft persistence, in characters (UTF-16 code units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLimits {
    /// Drafts serializing larger than this are not written.
    pub save_ceiling: usize,
    /// Stored drafts larger than this are discarded unread.
    pub read_ceiling: usize,
    /// After a failed write, other entries larger than this are evicted.
    pub cleanup_threshold: usize,
}

impl Default for DraftLimits {
    fn default() -> Self {
        Self {
            save_ceiling: 500_000,
            read_ceiling: 1_000_000,
            cleanup_threshold: 100_000,
        }
    }
}

impl DraftLimits {
    pub fn validate(&self) -> Result<()> {
        if self.read_ceiling < self.save_ceiling {
            return Err(BookingError::Config(format!(
                "read ceiling ({}) is below save ceiling ({}); saved drafts would be unreadable",
                self.read_ceiling, self.save_ceiling
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfig {
    pub draft_key: String,
    pub limits: DraftLimits,
    pub prices: PriceTable,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            draft_key: DEFAULT_DRAFT_KEY.to_string(),
            limits: DraftLimits::default(),
            prices: PriceTable::default(),
        }
    }
}

impl BookingConfig {
    /// Resolve configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration from an arbitrary variable lookup.
    ///
    /// Unset or blank variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();

        if let Some(key) = var(ENV_DRAFT_KEY) {
            config.draft_key = key;
        }
        if let Some(value) = var(ENV_SAVE_CEILING) {
            config.limits.save_ceiling = parse_size(ENV_SAVE_CEILING, &value)?;
        }
        if let Some(value) = var(ENV_READ_CEILING) {
            config.limits.read_ceiling = parse_size(ENV_READ_CEILING, &value)?;
        }
        if let Some(value) = var(ENV_CLEANUP_THRESHOLD) {
            config.limits.cleanup_threshold = parse_size(ENV_CLEANUP_THRESHOLD, &value)?;
        }
        if let Some(path) = var(ENV_PRICE_TABLE) {
            config.prices = load_price_table(Path::new(&path))?;
        }

        config.limits.validate()?;
        Ok(config)
    }
}

pub fn parse_size(name: &str, value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|e| BookingError::Config(format!("{name}={value:?} is not a size: {e}")))
}

/// Read a JSON price table. Omitted rates keep their defaults.
pub fn load_price_table(path: &Path) -> Result<PriceTable> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BookingError::Config(format!("cannot read price table {}: {e}", path.display()))
    })?;
    let table: PriceTable = serde_json::from_str(&raw).map_err(|e| {
        BookingError::Config(format!("invalid price table {}: {e}", path.display()))
    })?;
    table.validate()?;
    Ok(table)
}
