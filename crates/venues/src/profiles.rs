//! Concrete per-venue profiles (spec §4.1: "Six concrete adapters ...
//! share the interface; each owns its own signing scheme").

use crate::rest::{RestAdapter, SigningScheme, VenueProfile};
use crate::symbol::{DelimitedSymbols, IdentitySymbols, SuffixSymbols, SymbolTranslator};
use std::time::Duration;

pub struct BybitProfile;

impl VenueProfile for BybitProfile {
    fn name(&self) -> &'static str {
        "bybit"
    }
    fn base_url(&self) -> &'static str {
        "https://api.bybit.com"
    }
    fn signing_scheme(&self) -> SigningScheme {
        SigningScheme::HeaderHmacSha256
    }
    fn requires_passphrase(&self) -> bool {
        false
    }
    fn symbol_translator(&self) -> &dyn SymbolTranslator {
        &IdentitySymbols
    }
}

pub struct BitgetProfile;

impl VenueProfile for BitgetProfile {
    fn name(&self) -> &'static str {
        "bitget"
    }
    fn base_url(&self) -> &'static str {
        "https://api.bitget.com"
    }
    fn signing_scheme(&self) -> SigningScheme {
        SigningScheme::HeaderHmacSha256
    }
    fn requires_passphrase(&self) -> bool {
        true
    }
    fn symbol_translator(&self) -> &dyn SymbolTranslator {
        &SuffixSymbols { suffix: "_UMCBL" }
    }
}

pub struct OkxProfile;

impl VenueProfile for OkxProfile {
    fn name(&self) -> &'static str {
        "okx"
    }
    fn base_url(&self) -> &'static str {
        "https://www.okx.com"
    }
    fn signing_scheme(&self) -> SigningScheme {
        SigningScheme::HeaderHmacSha256
    }
    fn requires_passphrase(&self) -> bool {
        true
    }
    fn symbol_translator(&self) -> &dyn SymbolTranslator {
        &DelimitedSymbols {
            delimiter: '-',
            contract_suffix: "-SWAP",
        }
    }
}

pub struct GateProfile;

impl VenueProfile for GateProfile {
    fn name(&self) -> &'static str {
        "gate"
    }
    fn base_url(&self) -> &'static str {
        "https://api.gateio.ws"
    }
    fn signing_scheme(&self) -> SigningScheme {
        SigningScheme::HeaderHmacSha512
    }
    fn requires_passphrase(&self) -> bool {
        false
    }
    fn symbol_translator(&self) -> &dyn SymbolTranslator {
        &DelimitedSymbols {
            delimiter: '_',
            contract_suffix: "",
        }
    }
}

pub struct HtxProfile;

impl VenueProfile for HtxProfile {
    fn name(&self) -> &'static str {
        "htx"
    }
    fn base_url(&self) -> &'static str {
        "https://api.hbdm.com"
    }
    fn signing_scheme(&self) -> SigningScheme {
        SigningScheme::QueryHmacSha256
    }
    fn requires_passphrase(&self) -> bool {
        false
    }
    fn symbol_translator(&self) -> &dyn SymbolTranslator {
        &SuffixSymbols { suffix: "-USDT" }
    }
}

pub struct BingxProfile;

impl VenueProfile for BingxProfile {
    fn name(&self) -> &'static str {
        "bingx"
    }
    fn base_url(&self) -> &'static str {
        "https://open-api.bingx.com"
    }
    fn signing_scheme(&self) -> SigningScheme {
        SigningScheme::QueryHmacSha256
    }
    fn requires_passphrase(&self) -> bool {
        false
    }
    fn symbol_translator(&self) -> &dyn SymbolTranslator {
        &IdentitySymbols
    }
}

pub type BybitAdapter = RestAdapter<BybitProfile>;
pub type BitgetAdapter = RestAdapter<BitgetProfile>;
pub type OkxAdapter = RestAdapter<OkxProfile>;
pub type GateAdapter = RestAdapter<GateProfile>;
pub type HtxAdapter = RestAdapter<HtxProfile>;
pub type BingxAdapter = RestAdapter<BingxProfile>;

/// Builds the adapter for a venue named at runtime (e.g. from
/// `ExchangeAccount.name`), used by the Exchange Registry's `ConnectExchange`.
///
/// # Errors
/// Returns an error if `venue` does not match one of the six supported names.
pub fn build_adapter(
    venue: &str,
    http_timeout: Duration,
) -> crate::error::Result<std::sync::Arc<dyn arb_engine_core::ExchangeAdapter>> {
    let adapter: std::sync::Arc<dyn arb_engine_core::ExchangeAdapter> = match venue {
        "bybit" => std::sync::Arc::new(BybitAdapter::new(BybitProfile, http_timeout)),
        "bitget" => std::sync::Arc::new(BitgetAdapter::new(BitgetProfile, http_timeout)),
        "okx" => std::sync::Arc::new(OkxAdapter::new(OkxProfile, http_timeout)),
        "gate" => std::sync::Arc::new(GateAdapter::new(GateProfile, http_timeout)),
        "htx" => std::sync::Arc::new(HtxAdapter::new(HtxProfile, http_timeout)),
        "bingx" => std::sync::Arc::new(BingxAdapter::new(BingxProfile, http_timeout)),
        other => return Err(crate::error::VenueAdapterError::Configuration(format!("unknown venue: {other}"))),
    };
    Ok(adapter)
}

pub const SUPPORTED_VENUES: [&str; 6] = ["bybit", "bitget", "okx", "gate", "htx", "bingx"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_adapter_recognizes_all_six_venues() {
        for venue in SUPPORTED_VENUES {
            let adapter = build_adapter(venue, Duration::from_secs(10)).unwrap();
            assert_eq!(adapter.name(), venue);
        }
    }

    #[test]
    fn test_build_adapter_rejects_unknown_venue() {
        assert!(build_adapter("nonexistent", Duration::from_secs(10)).is_err());
    }

    #[test]
    fn test_bitget_and_okx_require_passphrase() {
        assert!(BitgetProfile.requires_passphrase());
        assert!(OkxProfile.requires_passphrase());
        assert!(!BybitProfile.requires_passphrase());
        assert!(!GateProfile.requires_passphrase());
    }

    #[test]
    fn test_signing_schemes_match_spec() {
        assert_eq!(BybitProfile.signing_scheme(), SigningScheme::HeaderHmacSha256);
        assert_eq!(GateProfile.signing_scheme(), SigningScheme::HeaderHmacSha512);
        assert_eq!(HtxProfile.signing_scheme(), SigningScheme::QueryHmacSha256);
        assert_eq!(BingxProfile.signing_scheme(), SigningScheme::QueryHmacSha256);
    }

    #[test]
    fn test_symbol_translation_per_venue() {
        assert_eq!(OkxProfile.symbol_translator().to_venue("BTCUSDT"), "BTC-USDT-SWAP");
        assert_eq!(GateProfile.symbol_translator().to_venue("BTCUSDT"), "BTC_USDT");
        assert_eq!(BitgetProfile.symbol_translator().to_venue("BTCUSDT"), "BTCUSDT_UMCBL");
        assert_eq!(HtxProfile.symbol_translator().to_venue("BTCUSDT"), "BTCUSDT-USDT");
        assert_eq!(BybitProfile.symbol_translator().to_venue("BTCUSDT"), "BTCUSDT");
    }
}
