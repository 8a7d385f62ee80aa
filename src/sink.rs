use crate::models::AggregateRow;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Timestamps are serialized as RFC 3339 with the IST offset; Greek sums with
/// six decimals, comfortably above the 4-decimal round-trip contract.
const VALUE_PRECISION: usize = 6;

/// Append-only CSV log with a fixed header contract.
///
/// If the file on disk carries a different header (older column layout, a
/// changed underlying set), the store is reset: cleared and the expected
/// header rewritten. Appending mismatched columns to a time series is worse
/// than starting it over.
pub struct CsvSink {
    path: PathBuf,
    expected_header: Vec<String>,
}

impl CsvSink {
    pub fn new<P: Into<PathBuf>>(path: P, underlyings: &[String]) -> Self {
        Self {
            path: path.into(),
            expected_header: AggregateRow::header(underlyings),
        }
    }

    /// Append one row, retrying once on I/O failure before giving up.
    pub fn append(&self, row: &AggregateRow) -> Result<()> {
        if let Err(e) = self.append_once(row) {
            warn!("sink append failed, retrying once: {:#}", e);
            self.append_once(row)
                .context("sink append failed after retry")?;
        }
        Ok(())
    }

    fn append_once(&self, row: &AggregateRow) -> Result<()> {
        self.heal_header()?;

        let record = encode_row(row)?;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("cannot open {}", self.path.display()))?;
        // One write call per row so a concurrent reader never sees a torn line
        file.write_all(&record)?;
        file.flush()?;
        Ok(())
    }

    /// Ensure the file exists and starts with the expected header, resetting
    /// the store when it does not.
    fn heal_header(&self) -> Result<()> {
        let stored = stored_header(&self.path)?;
        match stored {
            Some(ref header) if *header == self.expected_header => Ok(()),
            Some(_) => {
                warn!(
                    "header mismatch in {}, clearing and rewriting",
                    self.path.display()
                );
                self.reset()
            }
            None => self.reset(),
        }
    }

    fn reset(&self) -> Result<()> {
        let mut wtr = csv::Writer::from_path(&self.path)
            .with_context(|| format!("cannot create {}", self.path.display()))?;
        wtr.write_record(&self.expected_header)?;
        wtr.flush()?;
        Ok(())
    }

    /// Read all rows back as (timestamp, values-in-header-order).
    pub fn read_rows(&self) -> Result<Vec<(DateTime<FixedOffset>, Vec<f64>)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_rows_from(&self.path)
    }

    /// Move rows older than `retention_days` to the archive file. Returns the
    /// number of rows moved. The archive gets the same header contract.
    pub fn archive_old(
        &self,
        archive_path: &Path,
        now: DateTime<FixedOffset>,
        retention_days: i64,
    ) -> Result<usize> {
        let rows = self.read_rows()?;
        if rows.is_empty() {
            return Ok(0);
        }
        let cutoff = now - Duration::days(retention_days);
        let (old, recent): (Vec<_>, Vec<_>) = rows.into_iter().partition(|(ts, _)| *ts < cutoff);
        if old.is_empty() {
            return Ok(0);
        }

        let archive = CsvSink {
            path: archive_path.to_path_buf(),
            expected_header: self.expected_header.clone(),
        };
        archive.heal_header()?;
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(archive_path)
                .with_context(|| format!("cannot open {}", archive_path.display()))?;
            for (ts, vals) in &old {
                file.write_all(&encode_record(*ts, vals)?)?;
            }
            file.flush()?;
        }

        // Rewrite the main log with only the recent rows
        self.reset()?;
        let mut file = std::fs::OpenOptions::new().append(true).open(&self.path)?;
        for (ts, vals) in &recent {
            file.write_all(&encode_record(*ts, vals)?)?;
        }
        file.flush()?;

        info!(
            "archived {} rows older than {} days to {}",
            old.len(),
            retention_days,
            archive_path.display()
        );
        Ok(old.len())
    }
}

/// What `BaselineStore::record` did with the candidate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineOutcome {
    /// No baseline, or the stored one was from a previous day: overwritten.
    Set,
    /// A baseline for the row's calendar day already exists: untouched.
    AlreadySet,
}

/// Single-row store for the opening snapshot of the trading day.
///
/// The baseline lives on disk, not in process memory: every cron invocation
/// is a fresh process and the first run after midnight must see yesterday's
/// row as stale.
pub struct BaselineStore {
    path: PathBuf,
    expected_header: Vec<String>,
}

impl BaselineStore {
    pub fn new<P: Into<PathBuf>>(path: P, underlyings: &[String]) -> Self {
        Self {
            path: path.into(),
            expected_header: AggregateRow::header(underlyings),
        }
    }

    /// Record `row` as the opening baseline unless one is already set for the
    /// same calendar day. Stale or missing baselines are overwritten in full.
    pub fn record(&self, row: &AggregateRow) -> Result<BaselineOutcome> {
        if let Some((stored_ts, _)) = self.read()? {
            if same_day(stored_ts, row.timestamp) {
                return Ok(BaselineOutcome::AlreadySet);
            }
        }

        let mut wtr = csv::Writer::from_path(&self.path)
            .with_context(|| format!("cannot create {}", self.path.display()))?;
        wtr.write_record(&self.expected_header)?;
        wtr.flush()?;
        drop(wtr);

        let mut file = std::fs::OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&encode_row(row)?)?;
        file.flush()?;
        Ok(BaselineOutcome::Set)
    }

    /// The stored baseline, if any. A header mismatch counts as no baseline
    /// (the next record() rewrites the file with the current contract).
    pub fn read(&self) -> Result<Option<(DateTime<FixedOffset>, Vec<f64>)>> {
        if !self.path.exists() {
            return Ok(None);
        }
        if stored_header(&self.path)? != Some(self.expected_header.clone()) {
            return Ok(None);
        }
        Ok(read_rows_from(&self.path)?.into_iter().next())
    }
}

fn same_day(a: DateTime<FixedOffset>, b: DateTime<FixedOffset>) -> bool {
    a.date_naive() == b.date_naive()
}

fn stored_header(path: &Path) -> Result<Option<Vec<String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    match rdr.headers() {
        Ok(h) if !h.is_empty() => Ok(Some(h.iter().map(String::from).collect())),
        _ => Ok(None),
    }
}

fn encode_row(row: &AggregateRow) -> Result<Vec<u8>> {
    encode_record(row.timestamp, &row.values())
}

fn encode_record(ts: DateTime<FixedOffset>, values: &[f64]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    let mut fields = vec![ts.to_rfc3339()];
    fields.extend(values.iter().map(|v| format!("{:.*}", VALUE_PRECISION, v)));
    wtr.write_record(&fields)?;
    wtr.flush()?;
    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("csv buffer flush: {}", e))
}

fn read_rows_from(path: &Path) -> Result<Vec<(DateTime<FixedOffset>, Vec<f64>)>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let mut iter = record.iter();
        let Some(ts_field) = iter.next() else {
            continue;
        };
        let ts = DateTime::parse_from_rfc3339(ts_field)
            .with_context(|| format!("bad timestamp in {}: {}", path.display(), ts_field))?;
        let values = iter
            .map(|v| v.parse::<f64>().context("bad numeric field"))
            .collect::<Result<Vec<f64>>>()?;
        rows.push((ts, values));
    }
    Ok(rows)
}
