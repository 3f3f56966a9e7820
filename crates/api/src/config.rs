//! Environment-driven settings for the API binary.

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_STORE_NAME: &str = "Toko";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a socket address: {value}")]
    InvalidAddress { name: &'static str, value: String },

    #[error("{name} must be a whole number of basis points between 0 and 10000, got {value}")]
    InvalidTaxRate { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind: SocketAddr,
    pub jwt_secret: String,
    /// Sales tax in basis points (1% = 100).
    pub tax_bps: u32,
    /// Printed at the top of receipts.
    pub store_name: String,
}

impl ApiConfig {
    /// Settings for tests and embedding: ephemeral-friendly defaults.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: jwt_secret.into(),
            tax_bps: 0,
            store_name: DEFAULT_STORE_NAME.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_raw = lookup("TOKOLEDGER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::InvalidAddress {
            name: "TOKOLEDGER_BIND",
            value: bind_raw.clone(),
        })?;

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let tax_bps = match lookup("TOKOLEDGER_TAX_BPS") {
            None => 0,
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|bps| *bps <= 10_000)
                .ok_or(ConfigError::InvalidTaxRate {
                    name: "TOKOLEDGER_TAX_BPS",
                    value: raw,
                })?,
        };

        let store_name = lookup("TOKOLEDGER_STORE_NAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_STORE_NAME.to_string());

        Ok(Self {
            bind,
            jwt_secret,
            tax_bps,
            store_name,
        })
    }
}
