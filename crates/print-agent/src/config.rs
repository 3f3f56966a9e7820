//! Environment-driven settings for the print agent.

use std::net::SocketAddr;

use thiserror::Error;

use crate::printer::{PrinterTarget, TargetError};

pub const DEFAULT_BIND: &str = "127.0.0.1:18080";
pub const DEFAULT_PAPER_MM: u32 = 80;
pub const DEFAULT_CURRENCY: &str = "Rp";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a socket address: {value}")]
    InvalidAddress { name: &'static str, value: String },

    #[error("PRINTER_PAPER_MM must be 58 or 80, got {0}")]
    InvalidPaper(String),

    #[error("PRINTER_TARGET: {0}")]
    InvalidTarget(#[from] TargetError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub bind: SocketAddr,
    pub target: PrinterTarget,
    /// Width of the loaded roll; overrides whatever the receipt asks for.
    pub paper_mm: u32,
    pub currency: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 18080)),
            target: PrinterTarget::Memory,
            paper_mm: DEFAULT_PAPER_MM,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_bind = lookup("PRINT_AGENT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = raw_bind.parse().map_err(|_| ConfigError::InvalidAddress {
            name: "PRINT_AGENT_BIND",
            value: raw_bind.clone(),
        })?;

        let target = match lookup("PRINTER_TARGET") {
            Some(raw) => raw.parse()?,
            None => PrinterTarget::Memory,
        };

        let paper_mm = match lookup("PRINTER_PAPER_MM") {
            Some(raw) => match raw.trim() {
                "58" => 58,
                "80" => 80,
                _ => return Err(ConfigError::InvalidPaper(raw)),
            },
            None => DEFAULT_PAPER_MM,
        };

        let currency = lookup("PRINTER_CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        Ok(Self {
            bind,
            target,
            paper_mm,
            currency,
        })
    }
}
