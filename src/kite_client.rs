use crate::config::{self, TrackerConfig};
use crate::models::{Instrument, InstrumentRow, Quote};
use crate::source::QuoteSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info};

// -----------------------------------------------
// KITE RESPONSE ENVELOPE
// -----------------------------------------------
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    status: String,
    data: T,
}

#[derive(Debug, Clone, Deserialize)]
struct QuotePayload {
    last_price: Option<f64>,
    /// Present on some vendor feeds, absent on plain Kite quotes; the
    /// pipeline falls back to price inversion when it is missing.
    #[serde(default)]
    implied_volatility: Option<f64>,
}

// -----------------------------------------------
// CLIENT WRAPPER
// -----------------------------------------------
pub struct KiteClient {
    client: Client,
    quote_batch_size: usize,
    instruments_cache: PathBuf,
}

impl KiteClient {
    pub fn new(cfg: &TrackerConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(&cfg.api_key, &cfg.access_token)?,
            quote_batch_size: cfg.quote_batch_size,
            instruments_cache: PathBuf::from(&cfg.instruments_cache),
        })
    }

    /// Fixed-interval retry fetch: 429 and 5xx are worth retrying, anything
    /// else in 4xx is a credential/request problem and retries cannot help.
    /// Exhausted retries surface as a fatal error for the run.
    async fn fetch_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let strategy = FixedInterval::from_millis(config::RETRY_DELAY_MS)
            .take(config::RETRY_MAX_ATTEMPTS - 1);

        Retry::spawn(strategy, || async {
            let res = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .context("request send failed")?;

            let status = res.status();
            if status.is_success() {
                res.text().await.context("failed to read body")
            } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                anyhow::bail!("retryable error: {}", status)
            } else {
                let body = res.text().await.unwrap_or_default();
                let preview: String = body.chars().take(200).collect();
                anyhow::bail!("client error {}: {}", status, preview)
            }
        })
        .await
    }

    // -----------------------------------------------
    // INSTRUMENT DUMP (CSV, cached for the day)
    // -----------------------------------------------
    async fn fetch_instruments(&self) -> Result<Vec<InstrumentRow>> {
        let text = if cache_is_fresh(&self.instruments_cache) {
            debug!("using cached instrument dump {}", self.instruments_cache.display());
            std::fs::read_to_string(&self.instruments_cache)?
        } else {
            info!("downloading instrument dump");
            let text = self
                .fetch_text(&config::kite_instruments_url(), &[])
                .await
                .context("failed to download instrument dump")?;
            std::fs::write(&self.instruments_cache, &text)
                .with_context(|| format!("cannot cache {}", self.instruments_cache.display()))?;
            text
        };

        let mut rdr = csv::Reader::from_reader(text.as_bytes());
        let mut rows = Vec::new();
        for record in rdr.deserialize::<InstrumentRow>() {
            // The dump covers every exchange segment; a malformed row is
            // skipped, not a reason to fail the whole download
            match record {
                Ok(row) => rows.push(row),
                Err(_) => continue,
            }
        }
        if rows.is_empty() {
            anyhow::bail!("instrument dump parsed to zero rows");
        }
        Ok(rows)
    }

    // -----------------------------------------------
    // QUOTES (chunked, bounded concurrency)
    // -----------------------------------------------
    async fn fetch_quote_chunk(&self, keys: &[String]) -> Result<HashMap<String, QuotePayload>> {
        let query: Vec<(&str, String)> = keys.iter().map(|k| ("i", k.clone())).collect();
        let text = self.fetch_text(&config::kite_quote_url(), &query).await?;
        let envelope: Envelope<HashMap<String, QuotePayload>> =
            serde_json::from_str(&text).context("failed to parse quote response")?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl QuoteSource for KiteClient {
    async fn instruments(&self) -> Result<Vec<InstrumentRow>> {
        self.fetch_instruments().await
    }

    async fn spot(&self, underlying: &str) -> Result<f64> {
        let symbol = config::spot_symbol(underlying)
            .with_context(|| format!("no spot symbol mapping for '{}'", underlying))?;
        let query = [("i", symbol.to_string())];
        let text = self.fetch_text(&config::kite_ltp_url(), &query).await?;
        let envelope: Envelope<HashMap<String, QuotePayload>> =
            serde_json::from_str(&text).context("failed to parse ltp response")?;
        envelope
            .data
            .get(symbol)
            .and_then(|p| p.last_price)
            .with_context(|| format!("no ltp for {}", symbol))
    }

    /// One pass per batch-size chunk, sequentially: the quote endpoint caps
    /// how many symbols fit in a request, and one cron run has no business
    /// hammering it in parallel.
    async fn quotes(&self, instruments: &[Instrument]) -> Result<Vec<Quote>> {
        let mut merged: HashMap<String, QuotePayload> = HashMap::new();
        for chunk in instruments.chunks(self.quote_batch_size) {
            let keys: Vec<String> = chunk.iter().map(|i| i.quote_key()).collect();
            let data = self.fetch_quote_chunk(&keys).await?;
            merged.extend(data);
        }

        Ok(instruments
            .iter()
            .map(|inst| {
                let payload = merged.get(&inst.quote_key());
                Quote {
                    instrument: inst.clone(),
                    last_price: payload.and_then(|p| p.last_price),
                    implied_vol: payload.and_then(|p| p.implied_volatility),
                }
            })
            .collect())
    }
}

fn cache_is_fresh(path: &std::path::Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    match modified.elapsed() {
        // The dump refreshes before market open; a day-old cache is stale
        Ok(age) => age < Duration::from_secs(24 * 3600),
        Err(_) => false,
    }
}

// -----------------------------------------------
// HTTP CLIENT BUILDER
// -----------------------------------------------
fn build_client(api_key: &str, access_token: &str) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        "X-Kite-Version",
        header::HeaderValue::from_static(config::KITE_API_VERSION),
    );
    let auth = format!("token {}:{}", api_key, access_token);
    let mut auth_value =
        header::HeaderValue::from_str(&auth).context("invalid credentials for auth header")?;
    auth_value.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, auth_value);
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));

    Ok(Client::builder()
        .default_headers(headers)
        .gzip(true)
        .timeout(config::HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?)
}
