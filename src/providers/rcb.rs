//! Central Bank of the Russian Federation daily rates.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument};

use super::http::HttpFetcher;
use super::markup::{self, Token};
use super::{AnchorFeed, RateSource, parse_rate, publisher_date, start_of_day};
use crate::core::{ExchangeRate, per_anchor_from_prices, triangulate};

pub const RCB_BASE_URL: &str = "https://cbr.ru";
const LATEST_PATH: &str = "/scripts/XML_daily.asp";
const ANCHOR: &str = "RUB";
/// Moscow time.
const PUBLISHER_UTC_OFFSET: i32 = 3 * 3600;

static EXCHANGEABLE: &[&str] = &[
    "RUB", "AUD", "AZN", "GBP", "AMD", "BYN", "BGN", "BRL", "HUF", "HKD", "DKK", "USD", "EUR",
    "INR", "KZT", "CAD", "KGS", "CNY", "MDL", "NOK", "PLN", "RON", "XDR", "SGD", "TJS", "TRY",
    "TMT", "UZS", "UAH", "CZK", "SEK", "CHF", "ZAR", "KRW", "JPY",
];

pub struct RcbSource {
    base_url: String,
    http: HttpFetcher,
}

impl RcbSource {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self::with_fetcher(base_url, HttpFetcher::new()?))
    }

    pub fn with_fetcher(base_url: &str, http: HttpFetcher) -> Self {
        RcbSource {
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
impl RateSource for RcbSource {
    #[instrument(name = "RcbFetch", skip(self), fields(base_url = %self.base_url))]
    async fn fetch_latest(&self) -> Result<Vec<ExchangeRate>> {
        let url = self.latest_url(Utc::now());
        let body = self.http.get(&url).await?;
        // The feed is windows-1251; every field read below is ASCII.
        let text = String::from_utf8_lossy(&body);

        let feed = decode(&text).context("Failed to decode CBR daily rates")?;
        debug!(quotes = feed.quotes.len(), time = %feed.time, "Decoded CBR feed");

        Ok(triangulate(ANCHOR, feed.time, &feed.quotes))
    }

    fn exchangeable(&self) -> &[&'static str] {
        EXCHANGEABLE
    }
}

#[derive(Default)]
struct Valute {
    code: Option<String>,
    nominal: Option<String>,
    value: Option<String>,
}

/// The CBR quotes roubles per `Nominal` units of each currency.
fn decode(text: &str) -> Result<AnchorFeed> {
    let mut date: Option<NaiveDate> = None;
    let mut prices: Vec<(String, f64)> = Vec::new();
    let mut valute: Option<Valute> = None;
    let mut field: Option<&str> = None;

    for token in markup::tokens(text) {
        match token {
            Token::Open {
                name: "ValCurs",
                attrs,
                ..
            } => {
                let raw = markup::attr(attrs, "Date")
                    .ok_or_else(|| anyhow!("ValCurs has no Date attribute"))?;
                date = Some(
                    NaiveDate::parse_from_str(raw, "%d.%m.%Y")
                        .with_context(|| format!("Invalid Date attribute '{raw}'"))?,
                );
            }
            Token::Open { name: "Valute", .. } => valute = Some(Valute::default()),
            Token::Open { name, .. } if valute.is_some() => field = Some(name),
            Token::Text(text) => {
                let (Some(current), Some(name)) = (valute.as_mut(), field) else {
                    continue;
                };
                match name {
                    "CharCode" => current.code = Some(text.to_string()),
                    "Nominal" => current.nominal = Some(text.to_string()),
                    "Value" => current.value = Some(text.to_string()),
                    _ => {}
                }
            }
            Token::Close("Valute") => {
                field = None;
                let Some(done) = valute.take() else {
                    continue;
                };
                let code = done
                    .code
                    .ok_or_else(|| anyhow!("Valute without CharCode"))?;
                let value = done
                    .value
                    .ok_or_else(|| anyhow!("Valute {} without Value", code))?;
                let nominal = match done.nominal {
                    Some(raw) => parse_rate(&raw)?,
                    None => 1.0,
                };
                prices.push((code, parse_rate(&value)? / nominal));
            }
            Token::Close(_) => field = None,
            _ => {}
        }
    }

    let date = date.ok_or_else(|| anyhow!("No ValCurs element found"))?;
    if prices.is_empty() {
        return Err(anyhow!("No rates found for {}", date));
    }

    Ok(AnchorFeed {
        time: start_of_day(date),
        quotes: per_anchor_from_prices(prices),
    })
}
