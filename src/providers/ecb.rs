//! European Central Bank euro foreign exchange reference rates.
//!
//! The ECB publishes the same daily table as XML and as a zipped CSV. Both
//! are requested at once and the first one that decodes wins.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use futures::FutureExt;
use futures::future::{BoxFuture, select_ok};
use std::io::{Cursor, Read};
use tracing::{debug, instrument};
use zip::ZipArchive;

use super::http::HttpFetcher;
use super::markup::{self, Token};
use super::{AnchorFeed, RateSource, parse_rate, start_of_day};
use crate::core::{ExchangeRate, triangulate};

pub const ECB_BASE_URL: &str = "https://www.ecb.europa.eu";
const LATEST_XML_PATH: &str = "/stats/eurofxref/eurofxref-daily.xml";
const LATEST_ZIP_PATH: &str = "/stats/eurofxref/eurofxref.zip";
const ANCHOR: &str = "EUR";

static EXCHANGEABLE: &[&str] = &[
    "USD", "EUR", "JPY", "BGN", "CZK", "DKK", "GBP", "HUF", "PLN", "RON", "SEK", "CHF", "ISK",
    "NOK", "HRK", "RUB", "TRY", "AUD", "BRL", "CAD", "CNY", "HKD", "IDR", "ILS", "INR", "KRW",
    "MXN", "MYR", "NZD", "PHP", "SGD", "THB", "ZAR",
];

type Decoder = fn(&[u8]) -> Result<AnchorFeed>;

pub struct EcbSource {
    base_url: String,
    http: HttpFetcher,
}

impl EcbSource {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self::with_fetcher(base_url, HttpFetcher::new()?))
    }

    pub fn with_fetcher(base_url: &str, http: HttpFetcher) -> Self {
        EcbSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn fetch_feed(&self, path: &'static str, decode: Decoder) -> BoxFuture<'_, Result<AnchorFeed>> {
        async move {
            let url = format!("{}{}", self.base_url, path);
            let body = self.http.get(&url).await?;
            decode(&body).with_context(|| format!("Failed to decode {url}"))
        }
        .boxed()
    }
}

#[async_trait]
impl RateSource for EcbSource {
    #[instrument(name = "EcbFetch", skip(self), fields(base_url = %self.base_url))]
    async fn fetch_latest(&self) -> Result<Vec<ExchangeRate>> {
        let endpoints = vec![
            self.fetch_feed(LATEST_XML_PATH, decode_xml_body),
            self.fetch_feed(LATEST_ZIP_PATH, decode_zip),
        ];
        let (feed, _) = select_ok(endpoints)
            .await
            .context("No ECB endpoint returned reference rates")?;
        debug!(quotes = feed.quotes.len(), time = %feed.time, "Decoded ECB feed");

        Ok(triangulate(ANCHOR, feed.time, &feed.quotes))
    }

    fn exchangeable(&self) -> &[&'static str] {
        EXCHANGEABLE
    }
}

fn decode_xml_body(body: &[u8]) -> Result<AnchorFeed> {
    decode_xml(&String::from_utf8_lossy(body))
}

/// Reads the first dated `Cube` of the eurofxref envelope. Rates are already
/// expressed as units of currency per euro.
fn decode_xml(text: &str) -> Result<AnchorFeed> {
    let mut date: Option<NaiveDate> = None;
    let mut quotes = Vec::new();
    // Open `Cube` elements, and the depth at which the dated one sits.
    let mut depth = 0usize;
    let mut dated_depth: Option<usize> = None;

    for token in markup::tokens(text) {
        match token {
            Token::Open {
                name: "Cube",
                attrs,
                self_closing,
            } => {
                if !self_closing {
                    depth += 1;
                }
                if let Some(time) = markup::attr(attrs, "time") {
                    if date.is_some() {
                        break;
                    }
                    let parsed = NaiveDate::parse_from_str(time, "%Y-%m-%d")
                        .with_context(|| format!("Invalid time attribute '{time}'"))?;
                    date = Some(parsed);
                    dated_depth = Some(depth);
                    continue;
                }

                let (Some(symbol), Some(rate)) =
                    (markup::attr(attrs, "currency"), markup::attr(attrs, "rate"))
                else {
                    continue;
                };
                if date.is_none() {
                    return Err(anyhow!("Rate for {} found outside a dated Cube", symbol));
                }
                quotes.push((symbol.to_string(), parse_rate(rate)?));
            }
            Token::Close("Cube") => {
                if dated_depth == Some(depth) {
                    break;
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    let date = date.ok_or_else(|| anyhow!("No dated Cube element found"))?;
    if quotes.is_empty() {
        return Err(anyhow!("No rates found for {}", date));
    }

    Ok(AnchorFeed {
        time: start_of_day(date),
        quotes,
    })
}

/// Unpacks the single CSV file of `eurofxref.zip`.
fn decode_zip(body: &[u8]) -> Result<AnchorFeed> {
    let mut archive = ZipArchive::new(Cursor::new(body)).context("Invalid zip archive")?;
    if archive.is_empty() {
        return Err(anyhow!("Zip archive is empty"));
    }
    let mut file = archive.by_index(0).context("Failed to open CSV in archive")?;
    let mut buffer = String::new();
    file.read_to_string(&mut buffer)
        .with_context(|| format!("Failed to read {}", file.name()))?;
    decode_csv(&buffer)
}

/// A header row (`Date, USD, JPY, ...`) followed by one row of rates per
/// euro. Trailing empty columns and `N/A` cells are ignored.
fn decode_csv(text: &str) -> Result<AnchorFeed> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = records
        .next()
        .ok_or_else(|| anyhow!("CSV has no header"))?
        .context("Malformed CSV header")?;
    if header.get(0) != Some("Date") {
        return Err(anyhow!("CSV header does not start with Date"));
    }
    let row = records
        .next()
        .ok_or_else(|| anyhow!("CSV has no rates row"))?
        .context("Malformed CSV rates row")?;

    let raw_date = row.get(0).unwrap_or_default();
    let date = NaiveDate::parse_from_str(raw_date, "%d %B %Y")
        .with_context(|| format!("Invalid date '{raw_date}'"))?;

    let mut quotes = Vec::new();
    for (symbol, value) in header.iter().zip(row.iter()).skip(1) {
        if symbol.is_empty() || value.is_empty() {
            continue;
        }
        if value == "N/A" {
            debug!(symbol, "Skipping unpublished rate");
            continue;
        }
        quotes.push((symbol.to_string(), parse_rate(value)?));
    }
    if quotes.is_empty() {
        return Err(anyhow!("No rates found for {}", date));
    }

    Ok(AnchorFeed {
        time: start_of_day(date),
        quotes,
    })
}
