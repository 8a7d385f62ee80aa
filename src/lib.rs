pub mod aggregator;
pub mod calendar;
pub mod config;
pub mod error;
pub mod greeks;
pub mod kite_client;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod sink;
pub mod source;

// Re-exports for convenience
pub use aggregator::DeltaBand;
pub use config::TrackerConfig;
pub use kite_client::KiteClient;
pub use models::{AggregateRow, Greeks, GreeksResult, Instrument, OptionSide, Quote, SideSums};
pub use pipeline::{GreeksPipeline, RunSummary};
pub use sink::{BaselineOutcome, BaselineStore, CsvSink};
pub use source::{QuoteSource, SnapshotSource};
