//! Central Bank of the UAE exchange rate table.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument};

use super::http::HttpFetcher;
use super::markup::{self, Token};
use super::{AnchorFeed, RateSource, parse_rate, publisher_date, start_of_day};
use crate::core::{ExchangeRate, currency, per_anchor_from_prices, triangulate};

pub const CAE_BASE_URL: &str = "https://www.centralbank.ae";
const LATEST_PATH: &str = "/en/fx-rates";
const ANCHOR: &str = "AED";
const RATES_TABLE_ID: &str = "ratesDateTable";
/// Gulf Standard Time.
const PUBLISHER_UTC_OFFSET: i32 = 4 * 3600;

static EXCHANGEABLE: &[&str] = &[
    "AED", "USD", "ARS", "AUD", "BND", "BRL", "CAD", "CHF", "CLP", "CNY", "COP", "CZK", "DKK",
    "DZD", "EUR", "HUF", "INR", "JPY", "KWD", "MAD", "MXN", "NGN", "NOK", "OMR", "PLN", "RSD",
    "SAR", "SDG", "SEK", "SGD", "THB", "TND", "TRY", "ZMW",
];

pub struct CaeSource {
    base_url: String,
    http: HttpFetcher,
}

impl CaeSource {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self::with_fetcher(base_url, HttpFetcher::new()?))
    }

    pub fn with_fetcher(base_url: &str, http: HttpFetcher) -> Self {
        CaeSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn latest_url(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}{}?date_req={}",
            self.base_url,
            LATEST_PATH,
            publisher_date(now, PUBLISHER_UTC_OFFSET)
        )
    }
}

#[async_trait]
impl RateSource for CaeSource {
    #[instrument(name = "CaeFetch", skip(self), fields(base_url = %self.base_url))]
    async fn fetch_latest(&self) -> Result<Vec<ExchangeRate>> {
        let url = self.latest_url(Utc::now());
        let body = self.http.get(&url).await?;
        let text = String::from_utf8_lossy(&body);

        let feed = decode(&text).context("Failed to decode CBUAE rate table")?;
        debug!(quotes = feed.quotes.len(), time = %feed.time, "Decoded CBUAE feed");

        Ok(triangulate(ANCHOR, feed.time, &feed.quotes))
    }

    fn exchangeable(&self) -> &[&'static str] {
        EXCHANGEABLE
    }
}

/// Reads the publication date ("Date12-08-2021") and the two-column rates
/// table (currency name, dirhams per unit). Rows naming currencies missing
/// from the catalog are skipped.
fn decode(html: &str) -> Result<AnchorFeed> {
    let mut date: Option<NaiveDate> = None;
    let mut cells: Vec<String> = Vec::new();
    let mut in_table = false;
    let mut cell: Option<String> = None;

    for token in markup::tokens(html) {
        match token {
            Token::Text(text) if date.is_none() && !in_table => {
                if let Some(raw) = text.strip_prefix("Date") {
                    date = NaiveDate::parse_from_str(raw.trim(), "%d-%m-%Y").ok();
                }
            }
            Token::Open {
                name: "table",
                attrs,
                ..
            } if markup::attr(attrs, "id") == Some(RATES_TABLE_ID) => in_table = true,
            Token::Close("table") if in_table => break,
            Token::Open { name: "td", .. } if in_table => cell = Some(String::new()),
            Token::Text(text) if in_table => {
                if let Some(current) = cell.as_mut() {
                    current.push_str(&markup::unescape(text));
                }
            }
            Token::Close("td") if in_table => {
                if let Some(done) = cell.take() {
                    cells.push(done);
                }
            }
            _ => {}
        }
    }

    let date = date.ok_or_else(|| anyhow!("Publication date not found"))?;
    if cells.is_empty() {
        return Err(anyhow!("Rates table '{}' not found or empty", RATES_TABLE_ID));
    }
    if cells.len() % 2 != 0 {
        return Err(anyhow!("Rates table has an incomplete row"));
    }

    let mut prices = Vec::with_capacity(cells.len() / 2);
    for row in cells.chunks(2) {
        let (name, rate) = (row[0].trim(), row[1].trim());
        if name.is_empty() {
            return Err(anyhow!("Rates table row without a currency name"));
        }
        let Some(ccy) = currency::lookup_by_name(name) else {
            debug!(name, "Skipping unknown currency name");
            continue;
        };
        prices.push((ccy.symbol.to_string(), parse_rate(rate)?));
    }

    Ok(AnchorFeed {
        time: start_of_day(date),
        quotes: per_anchor_from_prices(prices),
    })
}
