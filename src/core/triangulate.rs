//! Turns an anchor-relative feed into a full pairwise rate table.
//!
//! Every central bank publishes rates against its home currency only. Given
//! `units[X]`, the number of units of `X` one anchor unit buys, the rate
//! between any two supported currencies is `units[B] / units[A]`.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::currency::{self, Currency};
use super::rate::ExchangeRate;

/// Converts quotes of the form "anchor units per one unit of X" into
/// "units of X per one anchor unit".
pub fn per_anchor_from_prices<S>(prices: impl IntoIterator<Item = (S, f64)>) -> Vec<(S, f64)> {
    prices
        .into_iter()
        .map(|(symbol, price)| (symbol, 1.0 / price))
        .collect()
}

/// Derives `rate(A -> B)` for every ordered pair of distinct supported
/// symbols, the anchor included with an identity quote.
///
/// `quotes` holds `(symbol, units of symbol per one anchor unit)`. Symbols
/// missing from the catalog and non-positive quotes are skipped.
pub fn triangulate<S: AsRef<str>>(
    anchor: &str,
    time: DateTime<Utc>,
    quotes: &[(S, f64)],
) -> Vec<ExchangeRate> {
    let mut units: Vec<(Currency, f64)> = Vec::with_capacity(quotes.len() + 1);

    match currency::lookup(anchor) {
        Some(ccy) => units.push((ccy, 1.0)),
        None => debug!(anchor, "Anchor currency is not in the catalog"),
    }

    for (symbol, value) in quotes {
        let symbol = symbol.as_ref();
        if symbol == anchor {
            continue;
        }

        let Some(ccy) = currency::lookup(symbol) else {
            debug!(symbol, "Skipping symbol missing from the catalog");
            continue;
        };

        if !value.is_finite() || *value <= 0.0 {
            debug!(symbol, value, "Skipping invalid quote");
            continue;
        }

        if units.iter().any(|(c, _)| c.symbol == ccy.symbol) {
            debug!(symbol, "Skipping duplicate quote");
            continue;
        }

        units.push((ccy, *value));
    }

    let mut rates = Vec::with_capacity(units.len() * units.len().saturating_sub(1));
    for (from, from_units) in &units {
        for (to, to_units) in &units {
            if from.symbol == to.symbol {
                continue;
            }
            rates.push(ExchangeRate::new(time, *from, *to, to_units / from_units));
        }
    }

    rates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 8, 12, 0, 0, 0).unwrap()
    }

    fn find(rates: &[ExchangeRate], from: &str, to: &str) -> f64 {
        rates
            .iter()
            .find(|r| r.from.symbol == from && r.to.symbol == to)
            .map(|r| r.rate)
            .unwrap_or_else(|| panic!("missing {from}->{to}"))
    }

    #[test]
    fn test_aed_feed_triangulation() {
        let quotes = [("USD", 0.27229), ("AUD", 0.37092)];
        let rates = triangulate("AED", fixed_time(), &quotes);

        assert_eq!(rates.len(), 6);
        assert_eq!(find(&rates, "USD", "AUD"), 0.37092 / 0.27229);
        assert!((find(&rates, "USD", "AUD") - 1.3622).abs() < 1e-4);
        assert_eq!(find(&rates, "AED", "USD"), 0.27229 / 1.0);
        assert_eq!(find(&rates, "USD", "AED"), 1.0 / 0.27229);
        assert!(rates.iter().all(|r| r.time == fixed_time()));
        assert!(rates.iter().all(|r| r.priority == 0));
    }

    #[test]
    fn test_inverted_prices_match_reference_feed() {
        // CBUAE publishes AED per unit of foreign currency.
        let prices = per_anchor_from_prices([("USD", 3.6725), ("AUD", 2.696006)]);
        let rates = triangulate("AED", fixed_time(), &prices);

        let usd = 1.0 / 3.6725;
        let aud = 1.0 / 2.696006;
        assert_eq!(find(&rates, "AED", "USD"), usd);
        assert_eq!(find(&rates, "USD", "AED"), 1.0 / usd);
        assert_eq!(find(&rates, "USD", "AUD"), aud / usd);
        assert_eq!(find(&rates, "AUD", "USD"), usd / aud);
        assert!((find(&rates, "USD", "AUD") - 1.362200232492064).abs() < 1e-12);
    }

    #[test]
    fn test_pairs_are_reciprocal() {
        let quotes = [("USD", 1.1898), ("JPY", 131.12), ("GBP", 0.85785), ("CHF", 1.0903)];
        let rates = triangulate("EUR", fixed_time(), &quotes);

        assert_eq!(rates.len(), 5 * 4);
        for r in &rates {
            let back = find(&rates, r.to.symbol, r.from.symbol);
            assert!((r.rate * back - 1.0).abs() < 1e-12, "{r:?}");
        }
    }

    #[test]
    fn test_skips_unknown_and_invalid_symbols() {
        let quotes = [
            ("USD", 1.1898),
            ("GPK", 2.0),
            ("DKK", 0.0),
            ("GBP", f64::NAN),
            ("CZK", 25.5),
        ];
        let rates = triangulate("EUR", fixed_time(), &quotes);

        assert_eq!(rates.len(), 3 * 2);
        assert!(
            rates
                .iter()
                .all(|r| ["EUR", "USD", "CZK"].contains(&r.from.symbol))
        );
    }

    #[test]
    fn test_anchor_quote_and_duplicates_ignored() {
        let quotes = [("EUR", 5.0), ("USD", 1.2), ("USD", 9.9)];
        let rates = triangulate("EUR", fixed_time(), &quotes);

        assert_eq!(rates.len(), 2);
        assert_eq!(find(&rates, "EUR", "USD"), 1.2);
    }

    #[test]
    fn test_empty_feed_yields_no_pairs() {
        let quotes: [(&str, f64); 0] = [];
        assert!(triangulate("EUR", fixed_time(), &quotes).is_empty());
    }
}
