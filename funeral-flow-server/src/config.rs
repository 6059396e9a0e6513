use funeral_flow::{BookingConfig, BookingError, config::parse_size};
use std::path::PathBuf;

pub const ENV_BIND_ADDR: &str = "FUNERAL_BIND_ADDR";
pub const ENV_DATA_DIR: &str = "FUNERAL_DATA_DIR";
pub const ENV_STORE_QUOTA: &str = "FUNERAL_STORE_QUOTA";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Service configuration resolved at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    /// Directory holding one store per session; in-memory stores when unset
    pub data_dir: Option<PathBuf>,
    /// Per-session store capacity in characters
    pub store_quota: Option<usize>,
    pub booking: BookingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            data_dir: None,
            store_quota: None,
            booking: BookingConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> funeral_flow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> funeral_flow::Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let store_quota = var(ENV_STORE_QUOTA)
            .map(|value| parse_size(ENV_STORE_QUOTA, &value))
            .transpose()?;
        if store_quota == Some(0) {
            return Err(BookingError::Config(format!("{ENV_STORE_QUOTA} must be positive")));
        }

        Ok(Self {
            bind_addr: var(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            data_dir: var(ENV_DATA_DIR).map(PathBuf::from),
            store_quota,
            booking: BookingConfig::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_from_lookup() {
        let config = ServiceConfig::from_lookup(|name| match name {
            ENV_BIND_ADDR => Some("127.0.0.1:8080".into()),
            ENV_DATA_DIR => Some("/var/lib/funeral".into()),
            ENV_STORE_QUOTA => Some("5000000".into()),
            "FUNERAL_DRAFT_KEY" => Some("draft".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/funeral")));
        assert_eq!(config.store_quota, Some(5_000_000));
        assert_eq!(config.booking.draft_key, "draft");
    }

    #[test]
    fn test_service_config_defaults_and_errors() {
        let config = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(config.data_dir.is_none());
        assert!(config.store_quota.is_none());

        assert!(ServiceConfig::from_lookup(|name| (name == ENV_STORE_QUOTA).then(|| "0".into())).is_err());
        assert!(ServiceConfig::from_lookup(|name| (name == ENV_STORE_QUOTA).then(|| "big".into())).is_err());
    }
}
