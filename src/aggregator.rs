use crate::models::{AggregateRow, GreeksResult, OptionSide, SideSums, UnderlyingSums};
use chrono::{DateTime, FixedOffset};

/// Inclusive |delta| band for aggregation. An instrument sitting exactly on
/// either boundary is counted.
#[derive(Debug, Clone, Copy)]
pub struct DeltaBand {
    pub min: f64,
    pub max: f64,
}

impl DeltaBand {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, delta: f64) -> bool {
        let d = delta.abs();
        self.min <= d && d <= self.max
    }
}

/// Sum delta/vega/theta per side over the instruments whose |delta| falls in
/// the band. Entries that degenerated to (0,0,0) in the engine land outside
/// any band with min > 0 and so contribute nothing.
pub fn aggregate_side(results: &[GreeksResult], side: OptionSide, band: DeltaBand) -> SideSums {
    let mut sums = SideSums::default();
    for r in results {
        if r.instrument.side == side && band.contains(r.greeks.delta) {
            sums.add(&r.greeks);
        }
    }
    sums
}

/// Build the persisted row for one run: per-underlying CE/PE sums in the
/// order the underlyings were configured (which fixes the column order).
pub fn aggregate_row(
    timestamp: DateTime<FixedOffset>,
    per_underlying: &[(String, Vec<GreeksResult>)],
    band: DeltaBand,
) -> AggregateRow {
    let entries = per_underlying
        .iter()
        .map(|(underlying, results)| UnderlyingSums {
            underlying: underlying.clone(),
            ce: aggregate_side(results, OptionSide::Call, band),
            pe: aggregate_side(results, OptionSide::Put, band),
        })
        .collect();

    AggregateRow { timestamp, entries }
}
