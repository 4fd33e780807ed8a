//! Static currency catalog

use serde::Serialize;
use std::fmt::Display;

/// A currency as listed in the catalog. Values are never built outside of it,
/// except for the [`Currency::EMPTY`] sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Currency {
    pub symbol: &'static str,
    pub name: &'static str,
    pub minor_units: u8,
}

impl Currency {
    /// Placeholder with no symbol. Merge strategies treat it as "no value".
    pub const EMPTY: Currency = Currency {
        symbol: "",
        name: "",
        minor_units: 0,
    };

    const fn new(symbol: &'static str, name: &'static str, minor_units: u8) -> Self {
        Currency {
            symbol,
            name,
            minor_units,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symbol.is_empty()
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::EMPTY
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

// Sorted by symbol, lookup relies on it.
static CATALOG: &[Currency] = &[
    Currency::new("AED", "United Arab Emirates Dirham", 2),
    Currency::new("AMD", "Armenian Dram", 2),
    Currency::new("ARS", "Argentine Peso", 2),
    Currency::new("AUD", "Australian Dollar", 2),
    Currency::new("AZN", "Azerbaijani Manat", 2),
    Currency::new("BGN", "Bulgarian Lev", 2),
    Currency::new("BND", "Brunei Dollar", 2),
    Currency::new("BRL", "Brazilian Real", 2),
    Currency::new("BYN", "Belarusian Ruble", 2),
    Currency::new("CAD", "Canadian Dollar", 2),
    Currency::new("CHF", "Swiss Franc", 2),
    Currency::new("CLP", "Chilean Peso", 0),
    Currency::new("CNY", "Chinese Yuan", 2),
    Currency::new("COP", "Colombian Peso", 2),
    Currency::new("CZK", "Czech Koruna", 2),
    Currency::new("DKK", "Danish Krone", 2),
    Currency::new("DZD", "Algerian Dinar", 2),
    Currency::new("EUR", "Euro", 2),
    Currency::new("GBP", "British Pound", 2),
    Currency::new("HKD", "Hong Kong Dollar", 2),
    Currency::new("HRK", "Croatian Kuna", 2),
    Currency::new("HUF", "Hungarian Forint", 2),
    Currency::new("IDR", "Indonesian Rupiah", 2),
    Currency::new("ILS", "Israeli New Shekel", 2),
    Currency::new("INR", "Indian Rupee", 2),
    Currency::new("ISK", "Icelandic Krona", 0),
    Currency::new("JPY", "Japanese Yen", 0),
    Currency::new("KGS", "Kyrgystani Som", 2),
    Currency::new("KRW", "South Korean Won", 0),
    Currency::new("KWD", "Kuwaiti Dinar", 3),
    Currency::new("KZT", "Kazakhstani Tenge", 2),
    Currency::new("MAD", "Moroccan Dirham", 2),
    Currency::new("MDL", "Moldovan Leu", 2),
    Currency::new("MXN", "Mexican Peso", 2),
    Currency::new("MYR", "Malaysian Ringgit", 2),
    Currency::new("NGN", "Nigerian Naira", 2),
    Currency::new("NOK", "Norwegian Krone", 2),
    Currency::new("NZD", "New Zealand Dollar", 2),
    Currency::new("OMR", "Omani Rial", 3),
    Currency::new("PHP", "Philippine Peso", 2),
    Currency::new("PLN", "Polish Zloty", 2),
    Currency::new("RON", "Romanian Leu", 2),
    Currency::new("RSD", "Serbian Dinar", 2),
    Currency::new("RUB", "Russian Ruble", 2),
    Currency::new("SAR", "Saudi Riyal", 2),
    Currency::new("SDG", "Sudanese Pound", 2),
    Currency::new("SEK", "Swedish Krona", 2),
    Currency::new("SGD", "Singapore Dollar", 2),
    Currency::new("THB", "Thai Baht", 2),
    Currency::new("TJS", "Tajikistani Somoni", 2),
    Currency::new("TMT", "Turkmenistani Manat", 2),
    Currency::new("TND", "Tunisian Dinar", 3),
    Currency::new("TRY", "Turkish Lira", 2),
    Currency::new("UAH", "Ukrainian Hryvnia", 2),
    Currency::new("USD", "US Dollar", 2),
    Currency::new("UZS", "Uzbekistani Som", 2),
    Currency::new("XDR", "Special Drawing Rights", 0),
    Currency::new("ZAR", "South African Rand", 2),
    Currency::new("ZMW", "Zambian Kwacha", 2),
];

/// Finds a currency by its three-letter symbol.
pub fn lookup(symbol: &str) -> Option<Currency> {
    CATALOG
        .binary_search_by(|c| c.symbol.cmp(symbol))
        .ok()
        .map(|idx| CATALOG[idx])
}

/// Finds a currency by its English display name, ignoring case and
/// surrounding whitespace.
pub fn lookup_by_name(name: &str) -> Option<Currency> {
    let name = name.trim();
    CATALOG
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .copied()
}

pub fn all() -> &'static [Currency] {
    CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_sorted() {
        assert!(CATALOG.windows(2).all(|w| w[0].symbol < w[1].symbol));
    }

    #[test]
    fn test_lookup() {
        let usd = lookup("USD").unwrap();
        assert_eq!(usd.name, "US Dollar");
        assert_eq!(usd.minor_units, 2);

        assert_eq!(lookup("KWD").unwrap().minor_units, 3);
        assert_eq!(lookup("JPY").unwrap().minor_units, 0);
        assert!(lookup("XYZ").is_none());
        assert!(lookup("usd").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(lookup_by_name("Australian Dollar").unwrap().symbol, "AUD");
        assert_eq!(lookup_by_name("  us dollar \n").unwrap().symbol, "USD");
        assert!(lookup_by_name("Galactic Credit").is_none());
    }

    #[test]
    fn test_empty_sentinel() {
        assert!(Currency::EMPTY.is_empty());
        assert!(Currency::default().is_empty());
        assert!(!lookup("EUR").unwrap().is_empty());
    }
}
