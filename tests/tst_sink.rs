use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use greeks_tracker::models::{AggregateRow, SideSums, UnderlyingSums};
use greeks_tracker::sink::{BaselineOutcome, BaselineStore, CsvSink};

fn ist_ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
        .and_local_timezone(greeks_tracker::calendar::ist())
        .unwrap()
        .fixed_offset()
}

fn row(ts: DateTime<FixedOffset>, ce_delta: f64) -> AggregateRow {
    AggregateRow {
        timestamp: ts,
        entries: vec![UnderlyingSums {
            underlying: "NIFTY".to_string(),
            ce: SideSums {
                delta: ce_delta,
                vega: 123.456789,
                theta: -98.7654,
            },
            pe: SideSums {
                delta: -0.4321,
                vega: 87.65,
                theta: -45.0001,
            },
        }],
    }
}

fn underlyings() -> Vec<String> {
    vec!["NIFTY".to_string()]
}

#[test]
fn test_append_then_read_round_trips_to_four_decimals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeks_log.csv");
    let sink = CsvSink::new(&path, &underlyings());

    let ts = ist_ts(2025, 8, 26, 9, 20);
    let original = row(ts, 2.718281);
    sink.append(&original).unwrap();

    let rows = sink.read_rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, ts);
    for (read, expected) in rows[0].1.iter().zip(original.values()) {
        assert!(
            (read - expected).abs() < 1e-4,
            "{} vs {}",
            read,
            expected
        );
    }
}

#[test]
fn test_header_written_once_across_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeks_log.csv");
    let sink = CsvSink::new(&path, &underlyings());

    sink.append(&row(ist_ts(2025, 8, 26, 9, 20), 1.0)).unwrap();
    sink.append(&row(ist_ts(2025, 8, 26, 9, 25), 2.0)).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let header_lines = text
        .lines()
        .filter(|l| l.starts_with("timestamp"))
        .count();
    assert_eq!(header_lines, 1);
    assert_eq!(text.lines().count(), 3); // header + 2 rows
}

#[test]
fn test_header_mismatch_resets_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeks_log.csv");

    // A log from an older column layout with data in it
    std::fs::write(
        &path,
        "time,delta_sum,vega_sum,theta_sum\n2025-08-25 09:20:00,1.0,2.0,3.0\n",
    )
    .unwrap();

    let sink = CsvSink::new(&path, &underlyings());
    sink.append(&row(ist_ts(2025, 8, 26, 9, 20), 1.5)).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2); // fresh header + the new row only
    assert!(lines[0].starts_with("timestamp,nifty_ce_delta"));
    assert!(!text.contains("delta_sum"));

    let rows = sink.read_rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert!((rows[0].1[0] - 1.5).abs() < 1e-9);
}

#[test]
fn test_baseline_set_once_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeks_open.csv");
    let store = BaselineStore::new(&path, &underlyings());

    // First run of the day captures the baseline
    let opening = row(ist_ts(2025, 8, 26, 9, 16), 10.0);
    assert_eq!(store.record(&opening).unwrap(), BaselineOutcome::Set);

    // Later run the same day leaves it untouched
    let later = row(ist_ts(2025, 8, 26, 14, 30), 99.0);
    assert_eq!(store.record(&later).unwrap(), BaselineOutcome::AlreadySet);
    let stored = store.read().unwrap().unwrap();
    assert!((stored.1[0] - 10.0).abs() < 1e-6);

    // Next trading day: stale, overwritten in full
    let next_day = row(ist_ts(2025, 8, 28, 9, 17), 20.0);
    assert_eq!(store.record(&next_day).unwrap(), BaselineOutcome::Set);
    let stored = store.read().unwrap().unwrap();
    assert_eq!(stored.0, next_day.timestamp);
    assert!((stored.1[0] - 20.0).abs() < 1e-6);
}

#[test]
fn test_archive_moves_only_old_rows() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("greeks_log.csv");
    let archive_path = dir.path().join("greeks_archive.csv");
    let sink = CsvSink::new(&log_path, &underlyings());

    let now = ist_ts(2025, 8, 26, 15, 30);
    let old_ts = now - Duration::days(10);
    let recent_ts = now - Duration::days(2);
    sink.append(&row(old_ts, 1.0)).unwrap();
    sink.append(&row(recent_ts, 2.0)).unwrap();

    let moved = sink.archive_old(&archive_path, now, 7).unwrap();
    assert_eq!(moved, 1);

    let remaining = sink.read_rows().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].0, recent_ts);

    let archive = CsvSink::new(&archive_path, &underlyings());
    let archived = archive.read_rows().unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].0, old_ts);

    // Second pass is a no-op
    assert_eq!(sink.archive_old(&archive_path, now, 7).unwrap(), 0);
}
