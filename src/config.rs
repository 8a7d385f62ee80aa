use anyhow::{Context, Result, bail};
use std::time::Duration;

// -----------------------------------------------
// KITE API ENDPOINTS
// -----------------------------------------------
pub const KITE_BASE_URL: &str = "https://api.kite.trade";
pub const KITE_API_VERSION: &str = "3";

pub fn kite_instruments_url() -> String {
    format!("{}/instruments", KITE_BASE_URL)
}

pub fn kite_quote_url() -> String {
    format!("{}/quote", KITE_BASE_URL)
}

pub fn kite_ltp_url() -> String {
    format!("{}/quote/ltp", KITE_BASE_URL)
}

// -----------------------------------------------
// UNDERLYING → SPOT SYMBOL MAP
// -----------------------------------------------
pub const SPOT_SYMBOLS: &[(&str, &str)] = &[
    ("NIFTY", "NSE:NIFTY 50"),
    ("BANKNIFTY", "NSE:NIFTY BANK"),
    ("FINNIFTY", "NSE:NIFTY FIN SERVICE"),
];

pub fn spot_symbol(underlying: &str) -> Option<&'static str> {
    SPOT_SYMBOLS
        .iter()
        .find(|(u, _)| *u == underlying)
        .map(|(_, s)| *s)
}

// -----------------------------------------------
// HTTP CLIENT CONFIG
// -----------------------------------------------
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

// -----------------------------------------------
// RETRY CONFIG (fixed interval, bounded)
// -----------------------------------------------
pub const RETRY_DELAY_MS: u64 = 500;
pub const RETRY_MAX_ATTEMPTS: usize = 3;

// -----------------------------------------------
// DEFAULTS
// -----------------------------------------------
pub const DEFAULT_UNDERLYINGS: &str = "NIFTY";
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.06;
pub const DEFAULT_DELTA_MIN: f64 = 0.05;
pub const DEFAULT_DELTA_MAX: f64 = 0.60;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_QUOTE_BATCH_SIZE: usize = 500;

pub const DEFAULT_LOG_PATH: &str = "greeks_log.csv";
pub const DEFAULT_OPEN_PATH: &str = "greeks_open.csv";
pub const DEFAULT_ARCHIVE_PATH: &str = "greeks_archive.csv";
pub const DEFAULT_INSTRUMENTS_CACHE: &str = "instruments.csv";

// -----------------------------------------------
// RUNTIME CONFIGURATION
// -----------------------------------------------

/// All knobs for one pipeline run, loaded once in main and passed down.
/// Nothing reads the environment after this point.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub underlyings: Vec<String>,
    pub risk_free_rate: f64,
    pub delta_min: f64,
    pub delta_max: f64,
    pub retention_days: i64,
    pub quote_batch_size: usize,
    pub api_key: String,
    pub access_token: String,
    pub log_path: String,
    pub open_path: String,
    pub archive_path: String,
    pub instruments_cache: String,
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("KITE_API_KEY").context("KITE_API_KEY not set")?;
        let access_token =
            std::env::var("KITE_ACCESS_TOKEN").context("KITE_ACCESS_TOKEN not set")?;

        let underlyings: Vec<String> = env_or("GREEKS_UNDERLYINGS", DEFAULT_UNDERLYINGS)
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let cfg = Self {
            underlyings,
            risk_free_rate: parse_env("RISK_FREE_RATE", DEFAULT_RISK_FREE_RATE)?,
            delta_min: parse_env("DELTA_BAND_MIN", DEFAULT_DELTA_MIN)?,
            delta_max: parse_env("DELTA_BAND_MAX", DEFAULT_DELTA_MAX)?,
            retention_days: parse_env("RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?,
            quote_batch_size: parse_env("QUOTE_BATCH_SIZE", DEFAULT_QUOTE_BATCH_SIZE)?,
            api_key,
            access_token,
            log_path: env_or("GREEKS_LOG_PATH", DEFAULT_LOG_PATH),
            open_path: env_or("GREEKS_OPEN_PATH", DEFAULT_OPEN_PATH),
            archive_path: env_or("GREEKS_ARCHIVE_PATH", DEFAULT_ARCHIVE_PATH),
            instruments_cache: env_or("INSTRUMENTS_CACHE_PATH", DEFAULT_INSTRUMENTS_CACHE),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.underlyings.is_empty() {
            bail!("no underlyings configured");
        }
        for u in &self.underlyings {
            if spot_symbol(u).is_none() {
                bail!("no spot symbol mapping for underlying '{}'", u);
            }
        }
        if !(0.0..=1.0).contains(&self.delta_min)
            || !(0.0..=1.0).contains(&self.delta_max)
            || self.delta_min > self.delta_max
        {
            bail!(
                "invalid delta band [{}, {}]",
                self.delta_min,
                self.delta_max
            );
        }
        if self.quote_batch_size == 0 {
            bail!("quote batch size must be positive");
        }
        if self.retention_days <= 0 {
            bail!(
                "retention window must be at least one day, got {}",
                self.retention_days
            );
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_symbol_mapping() {
        assert_eq!(spot_symbol("NIFTY"), Some("NSE:NIFTY 50"));
        assert_eq!(spot_symbol("BANKNIFTY"), Some("NSE:NIFTY BANK"));
        assert_eq!(spot_symbol("SENSEX"), None);
    }

    #[test]
    fn test_validate_rejects_bad_band() {
        let cfg = TrackerConfig {
            underlyings: vec!["NIFTY".to_string()],
            risk_free_rate: 0.06,
            delta_min: 0.7,
            delta_max: 0.2,
            retention_days: 7,
            quote_batch_size: 500,
            api_key: "k".to_string(),
            access_token: "t".to_string(),
            log_path: String::new(),
            open_path: String::new(),
            archive_path: String::new(),
            instruments_cache: String::new(),
        };
        assert!(cfg.validate().is_err());
    }
}
