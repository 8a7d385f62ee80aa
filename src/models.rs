use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionSide {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::Call => "CE",
            OptionSide::Put => "PE",
        }
    }
}

/// One row of the Kite instrument dump CSV.
/// Columns beyond what the pipeline needs are ignored by the csv reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentRow {
    pub instrument_token: u64,

    pub tradingsymbol: String,

    /// Underlying name, e.g. "NIFTY"
    pub name: String,

    pub expiry: String,

    pub strike: f64,

    /// "CE", "PE", "FUT", "EQ", ...
    pub instrument_type: String,

    /// "NFO-OPT" for the option chain
    pub segment: String,

    pub exchange: String,
}

/// A resolved option instrument, immutable for the rest of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub token: u64,
    pub tradingsymbol: String,
    pub underlying: String,
    pub strike: f64,
    pub side: OptionSide,
    pub expiry: NaiveDate,
    pub exchange: String,
}

impl Instrument {
    /// Exchange-qualified symbol used by the quote API, e.g. "NFO:NIFTY25AUG20000CE"
    pub fn quote_key(&self) -> String {
        format!("{}:{}", self.exchange, self.tradingsymbol)
    }
}

/// Market data for one instrument. At least one of the two fields must be
/// present for the Greeks engine to proceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub instrument: Instrument,
    pub last_price: Option<f64>,
    pub implied_vol: Option<f64>,
}

/// Raw per-unit Greeks, recomputed every run and never persisted individually.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub vega: f64,
    pub theta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreeksResult {
    pub instrument: Instrument,
    pub greeks: Greeks,
}

/// Per-side sums of included Greeks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideSums {
    pub delta: f64,
    pub vega: f64,
    pub theta: f64,
}

impl SideSums {
    pub fn add(&mut self, g: &Greeks) {
        self.delta += g.delta;
        self.vega += g.vega;
        self.theta += g.theta;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnderlyingSums {
    pub underlying: String,
    pub ce: SideSums,
    pub pe: SideSums,
}

/// One persisted log row: per-(underlying, side) Greek sums at a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRow {
    pub timestamp: DateTime<FixedOffset>,
    pub entries: Vec<UnderlyingSums>,
}

impl AggregateRow {
    /// CSV header contract: `timestamp` then six columns per underlying.
    pub fn header(underlyings: &[String]) -> Vec<String> {
        let mut cols = vec!["timestamp".to_string()];
        for u in underlyings {
            let p = u.to_lowercase();
            for col in [
                "ce_delta", "ce_vega", "ce_theta", "pe_delta", "pe_vega", "pe_theta",
            ] {
                cols.push(format!("{}_{}", p, col));
            }
        }
        cols
    }

    pub fn underlyings(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.underlying.clone()).collect()
    }

    /// Numeric values in header order (without the timestamp).
    pub fn values(&self) -> Vec<f64> {
        let mut vals = Vec::with_capacity(self.entries.len() * 6);
        for e in &self.entries {
            vals.extend([
                e.ce.delta, e.ce.vega, e.ce.theta, e.pe.delta, e.pe.vega, e.pe.theta,
            ]);
        }
        vals
    }
}
