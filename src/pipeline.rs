use crate::aggregator::{DeltaBand, aggregate_row};
use crate::calendar;
use crate::config::TrackerConfig;
use crate::error::StageError;
use crate::greeks::{implied_vol, option_greeks};
use crate::models::{AggregateRow, GreeksResult, Quote};
use crate::resolver::resolve_chain;
use crate::sink::{BaselineOutcome, BaselineStore, CsvSink};
use crate::source::QuoteSource;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::path::Path;
use tracing::{debug, info};

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Market IVs above this are assumed to be quoted in percent, not decimal.
/// A genuine 300%+ vol on an index option is not a thing.
const IV_PERCENT_THRESHOLD: f64 = 3.0;

/// What one run produced, for the caller's summary output.
#[derive(Debug)]
pub struct RunSummary {
    pub row: AggregateRow,
    pub baseline: BaselineOutcome,
    pub archived: usize,
    pub instruments_considered: usize,
    pub instruments_priced: usize,
}

/// One full resolve → fetch → compute → aggregate → sink pass.
///
/// Generic over the quote source so the Kite adapter and the snapshot
/// replay adapter run through identical code. Stage failures abort the run
/// with a stage-tagged error; per-instrument problems only skip that
/// instrument.
pub struct GreeksPipeline<S: QuoteSource> {
    cfg: TrackerConfig,
    source: S,
}

impl<S: QuoteSource> GreeksPipeline<S> {
    pub fn new(cfg: TrackerConfig, source: S) -> Self {
        Self { cfg, source }
    }

    pub async fn run(&self, now: DateTime<FixedOffset>) -> Result<RunSummary> {
        let reference = calendar::last_trading_day(now.date_naive());

        // ---- resolve ----
        let rows = self
            .source
            .instruments()
            .await
            .map_err(|e| StageError::Fetch(format!("instrument listing: {e:#}")))?;

        let mut chains = Vec::new();
        for underlying in &self.cfg.underlyings {
            let chain = resolve_chain(&rows, underlying, reference)
                .map_err(|e| StageError::Resolve(format!("{e:#}")))?;
            info!(
                "{}: {} instruments at expiry {}",
                underlying,
                chain.len(),
                chain.expiry
            );
            chains.push(chain);
        }

        // ---- fetch + compute ----
        let mut per_underlying = Vec::new();
        let mut considered = 0usize;
        let mut priced = 0usize;

        for chain in &chains {
            let spot = self
                .source
                .spot(&chain.underlying)
                .await
                .map_err(|e| StageError::Fetch(format!("spot {}: {e:#}", chain.underlying)))?;

            let quotes = self
                .source
                .quotes(&chain.all())
                .await
                .map_err(|e| StageError::Fetch(format!("quotes {}: {e:#}", chain.underlying)))?;

            let t = time_to_expiry(now, chain.expiry);
            let mut results = Vec::with_capacity(quotes.len());
            for quote in &quotes {
                considered += 1;
                match compute_one(quote, spot, t, self.cfg.risk_free_rate) {
                    Some(result) => {
                        priced += 1;
                        results.push(result);
                    }
                    None => {
                        debug!("skipping {} (no usable price or iv)", quote.instrument.tradingsymbol);
                    }
                }
            }
            // A chain where nothing priced would log a zeroed row that looks
            // like real data; refuse instead of pretending
            if !quotes.is_empty() && results.is_empty() {
                return Err(StageError::Compute(format!(
                    "no {} instrument could be priced",
                    chain.underlying
                ))
                .into());
            }
            per_underlying.push((chain.underlying.clone(), results));
        }

        // ---- aggregate ----
        let band = DeltaBand::new(self.cfg.delta_min, self.cfg.delta_max);
        let row = aggregate_row(now, &per_underlying, band);

        // ---- sink ----
        let sink = CsvSink::new(&self.cfg.log_path, &self.cfg.underlyings);
        sink.append(&row)
            .map_err(|e| StageError::Write(format!("{e:#}")))?;

        let baseline_store = BaselineStore::new(&self.cfg.open_path, &self.cfg.underlyings);
        let baseline = baseline_store
            .record(&row)
            .map_err(|e| StageError::Write(format!("baseline: {e:#}")))?;

        let archived = sink
            .archive_old(
                Path::new(&self.cfg.archive_path),
                now,
                self.cfg.retention_days,
            )
            .map_err(|e| StageError::Write(format!("archive: {e:#}")))?;

        Ok(RunSummary {
            row,
            baseline,
            archived,
            instruments_considered: considered,
            instruments_priced: priced,
        })
    }
}

/// Year fraction from `now` to expiry midnight, matching how the log has
/// always measured it. Expired instruments come out <= 0 and the engine
/// zeroes them.
pub fn time_to_expiry(now: DateTime<FixedOffset>, expiry: NaiveDate) -> f64 {
    let expiry_midnight = expiry
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight")
        .and_local_timezone(calendar::ist())
        .unwrap()
        .fixed_offset();
    (expiry_midnight - now).num_seconds() as f64 / SECONDS_PER_YEAR
}

/// Normalize a market-quoted IV: percent figures become decimals, junk
/// (zero/negative) becomes None so the price fallback can take over.
fn normalize_iv(iv: f64) -> Option<f64> {
    if iv <= 0.0 {
        None
    } else if iv > IV_PERCENT_THRESHOLD {
        Some(iv / 100.0)
    } else {
        Some(iv)
    }
}

/// Greeks for one quote: prefer a quoted IV, fall back to inverting the
/// last traded price, skip the instrument when neither works.
fn compute_one(quote: &Quote, spot: f64, t: f64, rate: f64) -> Option<GreeksResult> {
    let inst = &quote.instrument;

    let sigma = match quote.implied_vol.and_then(normalize_iv) {
        Some(iv) => Some(iv),
        None => match quote.last_price {
            Some(price) => implied_vol(inst.side, spot, inst.strike, t, rate, price),
            None => None,
        },
    };

    let Some(sigma) = sigma else {
        return None;
    };

    Some(GreeksResult {
        instrument: inst.clone(),
        greeks: option_greeks(inst.side, spot, inst.strike, t, rate, sigma),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greeks::bs_price;
    use crate::models::{Instrument, OptionSide};
    use chrono::NaiveDate;

    fn ist_ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
            .and_local_timezone(calendar::ist())
            .unwrap()
            .fixed_offset()
    }

    fn inst(side: OptionSide, strike: f64, expiry: NaiveDate) -> Instrument {
        Instrument {
            token: 7,
            tradingsymbol: "NIFTY25AUG20000CE".to_string(),
            underlying: "NIFTY".to_string(),
            strike,
            side,
            expiry,
            exchange: "NFO".to_string(),
        }
    }

    #[test]
    fn test_time_to_expiry_positive_before_expiry() {
        let now = ist_ts(2025, 8, 27, 9, 15);
        let t = time_to_expiry(now, NaiveDate::from_ymd_opt(2025, 8, 28).unwrap());
        assert!(t > 0.0 && t < 1.0 / 365.0);
    }

    #[test]
    fn test_time_to_expiry_nonpositive_after_expiry() {
        let now = ist_ts(2025, 8, 29, 9, 15);
        let t = time_to_expiry(now, NaiveDate::from_ymd_opt(2025, 8, 28).unwrap());
        assert!(t <= 0.0);
    }

    #[test]
    fn test_normalize_iv_units() {
        assert_eq!(normalize_iv(0.14), Some(0.14));
        assert_eq!(normalize_iv(14.0), Some(0.14));
        assert_eq!(normalize_iv(0.0), None);
        assert_eq!(normalize_iv(-1.0), None);
    }

    #[test]
    fn test_compute_one_prefers_quoted_iv() {
        let expiry = NaiveDate::from_ymd_opt(2025, 9, 25).unwrap();
        let quote = Quote {
            instrument: inst(OptionSide::Call, 20000.0, expiry),
            last_price: Some(1.0), // implies a very different vol
            implied_vol: Some(14.0),
        };
        let t = 30.0 / 365.0;
        let r = compute_one(&quote, 20000.0, t, 0.06).unwrap();
        let expected = option_greeks(OptionSide::Call, 20000.0, 20000.0, t, 0.06, 0.14);
        assert!((r.greeks.delta - expected.delta).abs() < 1e-12);
    }

    #[test]
    fn test_compute_one_falls_back_to_price_inversion() {
        let expiry = NaiveDate::from_ymd_opt(2025, 9, 25).unwrap();
        let t = 30.0 / 365.0;
        let price = bs_price(OptionSide::Put, 20000.0, 19800.0, t, 0.06, 0.18);
        let quote = Quote {
            instrument: inst(OptionSide::Put, 19800.0, expiry),
            last_price: Some(price),
            implied_vol: None,
        };
        let r = compute_one(&quote, 20000.0, t, 0.06).unwrap();
        let expected = option_greeks(OptionSide::Put, 20000.0, 19800.0, t, 0.06, 0.18);
        assert!((r.greeks.delta - expected.delta).abs() < 1e-6);
        assert!((r.greeks.vega - expected.vega).abs() < 1e-3);
    }

    #[test]
    fn test_compute_one_skips_unpriceable_quote() {
        let expiry = NaiveDate::from_ymd_opt(2025, 9, 25).unwrap();
        let quote = Quote {
            instrument: inst(OptionSide::Call, 20000.0, expiry),
            last_price: None,
            implied_vol: None,
        };
        assert!(compute_one(&quote, 20000.0, 30.0 / 365.0, 0.06).is_none());
    }
}
