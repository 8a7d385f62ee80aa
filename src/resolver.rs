use crate::models::{Instrument, InstrumentRow, OptionSide};
use anyhow::{Result, bail};
use chrono::NaiveDate;

/// Calls and puts for one underlying at the nearest unexpired expiry.
#[derive(Debug, Clone)]
pub struct OptionChain {
    pub underlying: String,
    pub expiry: NaiveDate,
    pub calls: Vec<Instrument>,
    pub puts: Vec<Instrument>,
}

impl OptionChain {
    pub fn all(&self) -> Vec<Instrument> {
        self.calls.iter().chain(self.puts.iter()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len() + self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.puts.is_empty()
    }
}

/// Select the option chain for `underlying` at the smallest expiry on or
/// after `reference`. The reference date must already be a trading day;
/// weekend/holiday rolling is the calendar's job, not the resolver's.
///
/// No expiry >= reference means the instrument dump is stale; that is a
/// fatal configuration error, not something to paper over.
pub fn resolve_chain(
    rows: &[InstrumentRow],
    underlying: &str,
    reference: NaiveDate,
) -> Result<OptionChain> {
    let mut calls = Vec::new();
    let mut puts = Vec::new();
    let mut nearest: Option<NaiveDate> = None;

    // Two passes: find the nearest expiry, then collect its instruments.
    for row in rows {
        if row.segment != "NFO-OPT" || row.name != underlying {
            continue;
        }
        let Some(expiry) = parse_expiry(&row.expiry) else {
            continue;
        };
        if expiry < reference {
            continue;
        }
        nearest = Some(match nearest {
            Some(cur) if cur <= expiry => cur,
            _ => expiry,
        });
    }

    let Some(expiry) = nearest else {
        bail!(
            "no unexpired {} option expiry on or after {} - stale instrument list?",
            underlying,
            reference
        );
    };

    for row in rows {
        if row.segment != "NFO-OPT" || row.name != underlying {
            continue;
        }
        if parse_expiry(&row.expiry) != Some(expiry) {
            continue;
        }
        let side = match row.instrument_type.as_str() {
            "CE" => OptionSide::Call,
            "PE" => OptionSide::Put,
            _ => continue,
        };
        let inst = Instrument {
            token: row.instrument_token,
            tradingsymbol: row.tradingsymbol.clone(),
            underlying: row.name.clone(),
            strike: row.strike,
            side,
            expiry,
            exchange: row.exchange.clone(),
        };
        match side {
            OptionSide::Call => calls.push(inst),
            OptionSide::Put => puts.push(inst),
        }
    }

    Ok(OptionChain {
        underlying: underlying.to_string(),
        expiry,
        calls,
        puts,
    })
}

fn parse_expiry(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, typ: &str, expiry: &str, strike: f64) -> InstrumentRow {
        InstrumentRow {
            instrument_token: 12345,
            tradingsymbol: format!("{}{}{}", name, strike as i64, typ),
            name: name.to_string(),
            expiry: expiry.to_string(),
            strike,
            instrument_type: typ.to_string(),
            segment: "NFO-OPT".to_string(),
            exchange: "NFO".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_picks_nearest_future_expiry() {
        let rows = vec![
            row("NIFTY", "CE", "2025-08-21", 20000.0), // already expired
            row("NIFTY", "CE", "2025-08-28", 20000.0),
            row("NIFTY", "PE", "2025-08-28", 20000.0),
            row("NIFTY", "CE", "2025-09-04", 20000.0),
        ];
        let chain = resolve_chain(&rows, "NIFTY", date(2025, 8, 27)).unwrap();
        assert_eq!(chain.expiry, date(2025, 8, 28));
        assert_eq!(chain.calls.len(), 1);
        assert_eq!(chain.puts.len(), 1);
    }

    #[test]
    fn test_expiry_on_reference_date_is_kept() {
        let rows = vec![row("NIFTY", "CE", "2025-08-28", 20000.0)];
        let chain = resolve_chain(&rows, "NIFTY", date(2025, 8, 28)).unwrap();
        assert_eq!(chain.expiry, date(2025, 8, 28));
    }

    #[test]
    fn test_stale_dump_is_fatal() {
        let rows = vec![row("NIFTY", "CE", "2025-08-21", 20000.0)];
        assert!(resolve_chain(&rows, "NIFTY", date(2025, 8, 27)).is_err());
    }

    #[test]
    fn test_other_underlyings_and_segments_ignored() {
        let mut futures_row = row("NIFTY", "FUT", "2025-08-28", 0.0);
        futures_row.segment = "NFO-FUT".to_string();
        let rows = vec![
            row("BANKNIFTY", "CE", "2025-08-28", 45000.0),
            futures_row,
            row("NIFTY", "CE", "2025-08-28", 20000.0),
        ];
        let chain = resolve_chain(&rows, "NIFTY", date(2025, 8, 27)).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.calls[0].underlying, "NIFTY");
    }
}
