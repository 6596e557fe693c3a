//! Symbol translation between the engine's canonical `<BASE><QUOTE>`
//! upper-case form (e.g. `BTCUSDT`) and each venue's wire format (spec §4.1,
//! §6).

/// Translates a canonical symbol to/from one venue's wire format.
pub trait SymbolTranslator: Send + Sync {
    /// Canonical `BTCUSDT` → venue format.
    fn to_venue(&self, canonical: &str) -> String;
    /// Venue format → canonical `BTCUSDT`.
    fn to_canonical(&self, venue_symbol: &str) -> String;
}

/// bybit and bingx trade perpetuals under the bare concatenated symbol.
pub struct IdentitySymbols;

impl SymbolTranslator for IdentitySymbols {
    fn to_venue(&self, canonical: &str) -> String {
        canonical.to_string()
    }
    fn to_canonical(&self, venue_symbol: &str) -> String {
        venue_symbol.to_uppercase()
    }
}

/// bitget appends a `_UMCBL`-style suffix; generalized here as a
/// configurable suffix so a new USDT-margined-perpetual venue can reuse it.
pub struct SuffixSymbols {
    pub suffix: &'static str,
}

impl SymbolTranslator for SuffixSymbols {
    fn to_venue(&self, canonical: &str) -> String {
        format!("{canonical}{}", self.suffix)
    }
    fn to_canonical(&self, venue_symbol: &str) -> String {
        venue_symbol
            .strip_suffix(self.suffix)
            .unwrap_or(venue_symbol)
            .to_uppercase()
    }
}

/// okx and gate separate base/quote with a hyphen or underscore and append a
/// `-SWAP` / `_` contract marker.
pub struct DelimitedSymbols {
    pub delimiter: char,
    pub contract_suffix: &'static str,
}

impl DelimitedSymbols {
    fn split_base_quote(canonical: &str) -> (&str, &str) {
        // USDT is the only quote asset this engine arbitrages (spec §3 PairConfig.quote).
        canonical
            .strip_suffix("USDT")
            .map_or((canonical, ""), |base| (base, "USDT"))
    }
}

impl SymbolTranslator for DelimitedSymbols {
    fn to_venue(&self, canonical: &str) -> String {
        let (base, quote) = Self::split_base_quote(canonical);
        format!("{base}{}{quote}{}", self.delimiter, self.contract_suffix)
    }

    fn to_canonical(&self, venue_symbol: &str) -> String {
        venue_symbol
            .strip_suffix(self.contract_suffix)
            .unwrap_or(venue_symbol)
            .replace(self.delimiter, "")
            .to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_symbols_round_trip() {
        let translator = IdentitySymbols;
        assert_eq!(translator.to_venue("BTCUSDT"), "BTCUSDT");
        assert_eq!(translator.to_canonical("btcusdt"), "BTCUSDT");
    }

    #[test]
    fn test_suffix_symbols_round_trip() {
        let translator = SuffixSymbols { suffix: "_UMCBL" };
        assert_eq!(translator.to_venue("BTCUSDT"), "BTCUSDT_UMCBL");
        assert_eq!(translator.to_canonical("BTCUSDT_UMCBL"), "BTCUSDT");
    }

    #[test]
    fn test_delimited_symbols_okx_style() {
        let translator = DelimitedSymbols {
            delimiter: '-',
            contract_suffix: "-SWAP",
        };
        assert_eq!(translator.to_venue("BTCUSDT"), "BTC-USDT-SWAP");
        assert_eq!(translator.to_canonical("BTC-USDT-SWAP"), "BTCUSDT");
    }

    #[test]
    fn test_delimited_symbols_gate_style() {
        let translator = DelimitedSymbols {
            delimiter: '_',
            contract_suffix: "",
        };
        assert_eq!(translator.to_venue("ETHUSDT"), "ETH_USDT");
        assert_eq!(translator.to_canonical("ETH_USDT"), "ETHUSDT");
    }
}
