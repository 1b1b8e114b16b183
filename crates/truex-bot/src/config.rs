//! Application configuration.
//!
//! Flat TOML file mirroring the recognized options, with serde defaults
//! for everything the exchange does not require. Credentials can be
//! overridden from the environment so secrets stay out of config files.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use truex_book::BookConfig;
use truex_feed::KrakenConfig;
use truex_session::SessionConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream FIX endpoint.
    pub host: String,
    pub port: u16,
    /// Session identifiers.
    pub sender_comp_id: String,
    pub target_comp_id: String,
    /// HMAC credentials. Overridable via TRUEX_USERNAME / TRUEX_SECRET.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub secret: String,
    /// PartyID (tag 448) stamped on orders.
    #[serde(default)]
    pub client_party_id: String,
    /// Symbols to subscribe on logon.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Requested market depth.
    #[serde(default = "default_market_depth")]
    pub market_depth: u32,

    /// HeartBtInt and timer base (seconds). Default: 30.
    #[serde(default = "default_heartbeat_interval_s")]
    pub heartbeat_interval_s: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_logon_timeout_ms")]
    pub logon_timeout_ms: u64,

    /// Volatility window length. Default: 20.
    #[serde(default = "default_book_buffer_size")]
    pub book_buffer_size: usize,
    /// Accept bid >= ask up to this deviation. Default: 1.0.
    #[serde(default = "default_inversion_tolerance_pct")]
    pub inversion_tolerance_pct: f64,
    /// Spread-deviation ratio for the volatile flag. Default: 0.5.
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,

    /// Optional Kraken WS ingress.
    #[serde(default)]
    pub kraken_enabled: bool,
    #[serde(default = "default_kraken_url")]
    pub kraken_url: String,
    #[serde(default)]
    pub kraken_pairs: Vec<String>,
}

fn default_market_depth() -> u32 {
    10
}

fn default_heartbeat_interval_s() -> u64 {
    30
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_cap_ms() -> u64 {
    30000
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

fn default_logon_timeout_ms() -> u64 {
    5000
}

fn default_book_buffer_size() -> usize {
    20
}

fn default_inversion_tolerance_pct() -> f64 {
    1.0
}

fn default_volatility_threshold() -> f64 {
    0.5
}

fn default_kraken_url() -> String {
    "wss://ws.kraken.com".to_string()
}

impl AppConfig {
    /// Load from a specific file, then apply environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from the default path or fall back to env-only configuration.
    pub fn load(path: Option<String>) -> AppResult<Self> {
        let config_path = path
            .or_else(|| std::env::var("TRUEX_CONFIG").ok())
            .unwrap_or_else(|| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            Err(AppError::Config(format!(
                "config file not found: {config_path}"
            )))
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("TRUEX_USERNAME") {
            self.username = username;
        }
        if let Ok(secret) = std::env::var("TRUEX_SECRET") {
            self.secret = secret;
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.sender_comp_id.is_empty() || self.target_comp_id.is_empty() {
            return Err(AppError::Config(
                "sender_comp_id and target_comp_id are required".to_string(),
            ));
        }
        if self.username.is_empty() || self.secret.is_empty() {
            return Err(AppError::Config(
                "username and secret are required (TRUEX_USERNAME / TRUEX_SECRET)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.host.clone(),
            port: self.port,
            sender_comp_id: self.sender_comp_id.clone(),
            target_comp_id: self.target_comp_id.clone(),
            heartbeat_interval_s: self.heartbeat_interval_s,
            reconnect_base_ms: self.reconnect_base_ms,
            reconnect_cap_ms: self.reconnect_cap_ms,
            reconnect_max_attempts: self.reconnect_max_attempts,
            logon_timeout_ms: self.logon_timeout_ms,
        }
    }

    pub fn book_config(&self) -> BookConfig {
        BookConfig {
            buffer_size: self.book_buffer_size,
            inversion_tolerance_pct: self.inversion_tolerance_pct,
            volatility_threshold: self.volatility_threshold,
        }
    }

    pub fn kraken_config(&self) -> Option<KrakenConfig> {
        if !self.kraken_enabled || self.kraken_pairs.is_empty() {
            return None;
        }
        Some(KrakenConfig {
            url: self.kraken_url.clone(),
            pairs: self.kraken_pairs.clone(),
            depth: self.market_depth,
            reconnect_base_ms: self.reconnect_base_ms,
            reconnect_cap_ms: self.reconnect_cap_ms,
        })
    }
}
