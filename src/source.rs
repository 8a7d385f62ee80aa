use crate::models::{Instrument, InstrumentRow, Quote};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Seam between the pipeline and whatever supplies market data.
///
/// The live implementation is `KiteClient`; `SnapshotSource` replays a saved
/// snapshot file (alternate vendor dumps, backtests, integration tests).
/// The pipeline is generic over this trait, so swapping sources is a
/// configuration decision, not a code fork.
#[async_trait]
pub trait QuoteSource {
    /// Bulk instrument listing for the exchange, filterable downstream by
    /// segment/underlying/expiry.
    async fn instruments(&self) -> Result<Vec<InstrumentRow>>;

    /// Current spot for an underlying, e.g. NIFTY → last price of NSE:NIFTY 50.
    async fn spot(&self, underlying: &str) -> Result<f64>;

    /// Quotes for a batch of instruments. Instruments the source knows
    /// nothing about come back with both fields unset; the pipeline skips
    /// them per-instrument instead of failing the run.
    async fn quotes(&self, instruments: &[Instrument]) -> Result<Vec<Quote>>;
}

/// Per-symbol payload in a snapshot file.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotQuote {
    pub last_price: Option<f64>,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    instruments: Vec<InstrumentRow>,
    spots: HashMap<String, f64>,
    quotes: HashMap<String, SnapshotQuote>,
}

/// File-backed quote source: one JSON document with spot prices keyed by
/// underlying and quotes keyed by exchange-qualified tradingsymbol.
pub struct SnapshotSource {
    data: SnapshotFile,
    path: PathBuf,
}

impl SnapshotSource {
    pub fn load<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read snapshot {}", path.display()))?;
        let data: SnapshotFile = serde_json::from_str(&text)
            .with_context(|| format!("malformed snapshot {}", path.display()))?;
        Ok(Self { data, path })
    }
}

#[async_trait]
impl QuoteSource for SnapshotSource {
    async fn instruments(&self) -> Result<Vec<InstrumentRow>> {
        Ok(self.data.instruments.clone())
    }

    async fn spot(&self, underlying: &str) -> Result<f64> {
        self.data
            .spots
            .get(underlying)
            .copied()
            .with_context(|| {
                format!(
                    "snapshot {} has no spot for {}",
                    self.path.display(),
                    underlying
                )
            })
    }

    async fn quotes(&self, instruments: &[Instrument]) -> Result<Vec<Quote>> {
        Ok(instruments
            .iter()
            .map(|inst| {
                let payload = self.data.quotes.get(&inst.quote_key());
                Quote {
                    instrument: inst.clone(),
                    last_price: payload.and_then(|p| p.last_price),
                    implied_vol: payload.and_then(|p| p.implied_volatility),
                }
            })
            .collect())
    }
}
