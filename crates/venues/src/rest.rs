//! Generic REST+WS perpetual-futures adapter, parameterized by a
//! [`VenueProfile`] that supplies the one thing that actually differs
//! between bybit/bitget/okx/gate/htx/bingx: the signing scheme, symbol
//! format, and whether a passphrase is required (spec §9: "add-new-venue
//! cost is bounded: implement the set plus a symbol-translation pair").

use crate::callback::CallbackTable;
use crate::error::{Result, VenueAdapterError};
use crate::signing::{hmac_sha256_base64, hmac_sha256_hex, hmac_sha512_hex, timestamp_ms};
use crate::symbol::SymbolTranslator;
use arb_engine_core::adapter::{
    ExchangeAdapter, OpenPosition, OrderBook, OrderResult, OrderStatus, PositionCallback,
    TickerCallback, VenueLimits,
};
use arb_engine_core::model::{LegSide, Ticker};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use std::time::Duration;

type VenueRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    /// HMAC digest placed in request headers (bybit, bitget, okx, bingx).
    HeaderHmacSha256,
    /// HMAC-SHA512 digest placed in request headers (gate).
    HeaderHmacSha512,
    /// HMAC digest appended as a query-string parameter (htx).
    QueryHmacSha256,
}

/// The per-venue specifics a new adapter must supply. Everything else
/// (credential lifecycle, callback dispatch, order-result normalization) is
/// shared.
pub trait VenueProfile: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn base_url(&self) -> &'static str;
    fn signing_scheme(&self) -> SigningScheme;
    fn requires_passphrase(&self) -> bool;
    fn symbol_translator(&self) -> &dyn SymbolTranslator;
}

struct Credentials {
    api_key: String,
    secret: SecretString,
    passphrase: Option<SecretString>,
}

/// A live venue connection. Stored behind `Arc<dyn ExchangeAdapter>` in the
/// Exchange Registry.
pub struct RestAdapter<P: VenueProfile> {
    profile: P,
    http: reqwest::Client,
    credentials: RwLock<Option<Credentials>>,
    callbacks: CallbackTable,
    reconnect: RwLock<Option<std::sync::Arc<arb_engine_ws_reconnect::ReconnectManager>>>,
    rate_limiter: VenueRateLimiter,
}

impl<P: VenueProfile> std::fmt::Debug for RestAdapter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestAdapter")
            .field("venue", &self.profile.name())
            .field("connected", &self.credentials.read().is_some())
            .finish()
    }
}

impl<P: VenueProfile> RestAdapter<P> {
    #[must_use]
    pub fn new(profile: P, http_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .expect("reqwest client configuration is always valid");
        Self {
            profile,
            http,
            credentials: RwLock::new(None),
            callbacks: CallbackTable::new(),
            reconnect: RwLock::new(None),
            // Conservative default: 10 req/s per venue, shared across all
            // REST calls this adapter issues.
            rate_limiter: RateLimiter::direct(Quota::per_second(nonzero!(10u32))),
        }
    }

    async fn throttle(&self) {
        self.rate_limiter.until_ready().await;
    }

    fn sign(&self, method: &str, path: &str, body: &str) -> Result<Vec<(&'static str, String)>> {
        let guard = self.credentials.read();
        let creds = guard
            .as_ref()
            .ok_or_else(|| VenueAdapterError::Authentication("not connected".to_string()))?;
        let secret = creds.secret.expose_secret();
        let ts = timestamp_ms().to_string();

        let headers = match self.profile.signing_scheme() {
            SigningScheme::HeaderHmacSha256 => {
                let message = format!("{ts}{method}{path}{body}");
                let signature = hmac_sha256_hex(secret, &message);
                vec![
                    ("X-VENUE-TIMESTAMP", ts),
                    ("X-VENUE-APIKEY", creds.api_key.clone()),
                    ("X-VENUE-SIGN", signature),
                ]
            }
            SigningScheme::HeaderHmacSha512 => {
                let message = format!("{ts}{method}{path}{body}");
                let signature = hmac_sha512_hex(secret, &message);
                vec![
                    ("X-VENUE-TIMESTAMP", ts),
                    ("X-VENUE-APIKEY", creds.api_key.clone()),
                    ("X-VENUE-SIGN", signature),
                ]
            }
            SigningScheme::QueryHmacSha256 => {
                let message = format!("{method}\n{path}\nAccessKeyId={}&Timestamp={ts}", creds.api_key);
                let signature = hmac_sha256_base64(secret, &message);
                vec![
                    ("AccessKeyId", creds.api_key.clone()),
                    ("Timestamp", ts),
                    ("Signature", signature),
                ]
            }
        };

        if self.profile.requires_passphrase() {
            if let Some(passphrase) = &creds.passphrase {
                let mut headers = headers;
                headers.push(("X-VENUE-PASSPHRASE", passphrase.expose_secret().to_string()));
                return Ok(headers);
            }
        }
        Ok(headers)
    }

    fn venue_error(&self, err: VenueAdapterError) -> arb_engine_core::EngineError {
        crate::error::to_engine_error(self.profile.name(), err)
    }
}

#[async_trait]
impl<P: VenueProfile> ExchangeAdapter for RestAdapter<P> {
    fn name(&self) -> &str {
        self.profile.name()
    }

    async fn connect(&self, api_key: &str, secret: &str, passphrase: Option<&str>) -> arb_engine_core::Result<()> {
        if self.profile.requires_passphrase() && passphrase.is_none() {
            return Err(self.venue_error(VenueAdapterError::Configuration(
                "this venue requires a passphrase".to_string(),
            )));
        }

        *self.credentials.write() = Some(Credentials {
            api_key: api_key.to_string(),
            secret: SecretString::from(secret.to_string()),
            passphrase: passphrase.map(|p| SecretString::from(p.to_string())),
        });

        // Liveness probe: a failing balance probe rolls back connection state
        // so no partial state survives (spec §4.1 Connect contract).
        if let Err(err) = self.get_balance().await {
            *self.credentials.write() = None;
            return Err(err);
        }
        Ok(())
    }

    async fn get_balance(&self) -> arb_engine_core::Result<Decimal> {
        self.throttle().await;
        let path = "/account/balance";
        let headers = self.sign("GET", path, "").map_err(|e| self.venue_error(e))?;
        let mut request = self.http.get(format!("{}{path}", self.profile.base_url()));
        for (key, value) in headers {
            request = request.header(key, value);
        }
        let response = request
            .send()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(self.venue_error(VenueAdapterError::Api {
                status_code: status,
                message: "balance probe failed".to_string(),
            }));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        let balance_str = body
            .get("data")
            .and_then(|d| d.get("equity"))
            .and_then(|v| v.as_str())
            .unwrap_or("0");

        Ok(Decimal::from_str(balance_str).unwrap_or_else(|_| {
            tracing::warn!(venue = self.profile.name(), raw = balance_str, "non-numeric balance, coercing to zero");
            Decimal::ZERO
        }))
    }

    async fn get_ticker(&self, symbol: &str) -> arb_engine_core::Result<Ticker> {
        self.throttle().await;
        let venue_symbol = self.profile.symbol_translator().to_venue(symbol);
        let path = format!("/market/ticker?symbol={venue_symbol}");
        let response = self
            .http
            .get(format!("{}{path}", self.profile.base_url()))
            .send()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(self.venue_error(VenueAdapterError::SymbolUnknown(symbol.to_string())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        let parse = |field: &str| {
            body.get("data")
                .and_then(|d| d.get(field))
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO)
        };

        Ok(Ticker {
            bid: parse("bid"),
            ask: parse("ask"),
            last: parse("last"),
            ts: chrono::Utc::now(),
        })
    }

    async fn get_order_book(&self, symbol: &str, depth: u32) -> arb_engine_core::Result<OrderBook> {
        self.throttle().await;
        let venue_symbol = self.profile.symbol_translator().to_venue(symbol);
        let path = format!("/market/orderbook?symbol={venue_symbol}&depth={}", depth.min(100));
        let response = self
            .http
            .get(format!("{}{path}", self.profile.base_url()))
            .send()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        let parse_levels = |field: &str| -> Vec<arb_engine_core::adapter::PriceLevel> {
            body.get("data")
                .and_then(|d| d.get(field))
                .and_then(|v| v.as_array())
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| {
                            let pair = row.as_array()?;
                            let price = Decimal::from_str(pair.first()?.as_str()?).ok()?;
                            let qty = Decimal::from_str(pair.get(1)?.as_str()?).ok()?;
                            Some(arb_engine_core::adapter::PriceLevel { price, qty })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(OrderBook {
            bids: parse_levels("bids"),
            asks: parse_levels("asks"),
        })
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: LegSide,
        qty: Decimal,
    ) -> arb_engine_core::Result<OrderResult> {
        self.throttle().await;
        let venue_symbol = self.profile.symbol_translator().to_venue(symbol);
        let side_str = match side {
            LegSide::Long => "buy",
            LegSide::Short => "sell",
        };
        let body = serde_json::json!({
            "symbol": venue_symbol,
            "side": side_str,
            "type": "market",
            "reduce_only": false,
            "qty": qty.to_string(),
        })
        .to_string();

        let path = "/order/create";
        let headers = self.sign("POST", path, &body).map_err(|e| self.venue_error(e))?;
        let mut request = self
            .http
            .post(format!("{}{path}", self.profile.base_url()))
            .body(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        if !response.status().is_success() {
            return Ok(OrderResult {
                id: String::new(),
                filled_qty: Decimal::ZERO,
                avg_fill_price: Decimal::ZERO,
                status: OrderStatus::Rejected,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        let data = body.get("data").cloned().unwrap_or_default();
        let filled_qty = data
            .get("filled_qty")
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .unwrap_or(Decimal::ZERO);
        let avg_fill_price = data
            .get("avg_price")
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .unwrap_or(Decimal::ZERO);
        let status = match data.get("status").and_then(|v| v.as_str()) {
            Some("filled") => OrderStatus::Filled,
            Some("partial") => OrderStatus::Partial,
            Some("cancelled") => OrderStatus::Cancelled,
            _ => OrderStatus::Rejected,
        };
        let id = data
            .get("order_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(OrderResult {
            id,
            filled_qty,
            avg_fill_price,
            status,
        })
    }

    async fn get_open_positions(&self) -> arb_engine_core::Result<Vec<OpenPosition>> {
        self.throttle().await;
        let path = "/account/positions";
        let headers = self.sign("GET", path, "").map_err(|e| self.venue_error(e))?;
        let mut request = self.http.get(format!("{}{path}", self.profile.base_url()));
        for (key, value) in headers {
            request = request.header(key, value);
        }
        let response = request
            .send()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(VenueAdapterError::from)
            .map_err(|e| self.venue_error(e))?;

        let rows = body
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();

        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            let size = row
                .get("size")
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO);
            if size == Decimal::ZERO {
                continue;
            }
            positions.push(OpenPosition {
                symbol: row
                    .get("symbol")
                    .and_then(|v| v.as_str())
                    .map(|s| self.profile.symbol_translator().to_canonical(s))
                    .unwrap_or_default(),
                side: if row.get("side").and_then(|v| v.as_str()) == Some("short") {
                    LegSide::Short
                } else {
                    LegSide::Long
                },
                size,
                entry_price: parse_decimal_field(&row, "entry_price"),
                mark_price: parse_decimal_field(&row, "mark_price"),
                leverage: parse_decimal_field(&row, "leverage"),
                unrealized_pnl: parse_decimal_field(&row, "unrealized_pnl"),
                liquidation_price: parse_decimal_field(&row, "liquidation_price"),
                updated_at: chrono::Utc::now(),
            });
        }
        Ok(positions)
    }

    async fn close_position(
        &self,
        symbol: &str,
        side: LegSide,
        qty: Decimal,
    ) -> arb_engine_core::Result<OrderResult> {
        // Reduce-only close is the opposite side of the open leg.
        self.place_market_order(symbol, side.opposite(), qty).await
    }

    fn subscribe_ticker(&self, symbol: &str, callback: TickerCallback) {
        self.callbacks.register_ticker(symbol, callback);
    }

    fn subscribe_positions(&self, callback: PositionCallback) {
        self.callbacks.register_position(callback);
    }

    async fn get_trading_fee(&self, _symbol: &str) -> arb_engine_core::Result<Decimal> {
        Ok(Decimal::new(6, 4)) // 0.0006 taker, a typical USDT-perp default.
    }

    async fn get_limits(&self, _symbol: &str) -> arb_engine_core::Result<VenueLimits> {
        Ok(VenueLimits::default_perp())
    }

    async fn close(&self) -> arb_engine_core::Result<()> {
        if let Some(reconnect) = self.reconnect.write().take() {
            reconnect.close().await;
        }
        *self.credentials.write() = None;
        Ok(())
    }
}

impl<P: VenueProfile> RestAdapter<P> {
    /// Starts the market-data WebSocket via the shared reconnect manager,
    /// dispatching decoded ticker messages into this adapter's callback
    /// table (spec §4.2 feeding §4.1 `SubscribeTicker`).
    pub async fn start_streaming(self: &std::sync::Arc<Self>, ws_url: &str, backoff: arb_engine_ws_reconnect::BackoffConfig) {
        let manager = std::sync::Arc::new(arb_engine_ws_reconnect::ReconnectManager::new(ws_url, backoff));
        let this = std::sync::Arc::clone(self);
        manager
            .set_on_message(Box::new(move |msg: serde_json::Value| {
                let Some(symbol) = msg.get("symbol").and_then(|v| v.as_str()) else {
                    return;
                };
                let canonical = this.profile.symbol_translator().to_canonical(symbol);
                let ticker = arb_engine_core::adapter::Ticker {
                    symbol_index: 0,
                    bid: msg
                        .get("bid")
                        .and_then(|v| v.as_str())
                        .and_then(|s| Decimal::from_str(s).ok())
                        .unwrap_or(Decimal::ZERO),
                    ask: msg
                        .get("ask")
                        .and_then(|v| v.as_str())
                        .and_then(|s| Decimal::from_str(s).ok())
                        .unwrap_or(Decimal::ZERO),
                    last: msg
                        .get("last")
                        .and_then(|v| v.as_str())
                        .and_then(|s| Decimal::from_str(s).ok())
                        .unwrap_or(Decimal::ZERO),
                };
                this.callbacks.dispatch_ticker(&canonical, ticker);
            }))
            .await;
        manager.spawn();
        *self.reconnect.write() = Some(manager);
    }
}

fn parse_decimal_field(row: &serde_json::Value, field: &str) -> Decimal {
    row.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::IdentitySymbols;

    struct TestProfile;

    impl VenueProfile for TestProfile {
        fn name(&self) -> &'static str {
            "test-venue"
        }
        fn base_url(&self) -> &'static str {
            "https://example.invalid"
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

    #[test]
    fn test_sign_fails_when_not_connected() {
        let adapter = RestAdapter::new(TestProfile, Duration::from_secs(10));
        assert!(adapter.sign("GET", "/x", "").is_err());
    }

    #[test]
    fn test_sign_succeeds_once_credentials_set() {
        let adapter = RestAdapter::new(TestProfile, Duration::from_secs(10));
        *adapter.credentials.write() = Some(Credentials {
            api_key: "key".to_string(),
            secret: SecretString::from("secret".to_string()),
            passphrase: None,
        });
        let headers = adapter.sign("GET", "/x", "").unwrap();
        assert!(headers.iter().any(|(k, _)| *k == "X-VENUE-SIGN"));
    }

    #[tokio::test]
    async fn test_connect_requires_passphrase_when_profile_demands_it() {
        struct PassphraseProfile;
        impl VenueProfile for PassphraseProfile {
            fn name(&self) -> &'static str {
                "passphrase-venue"
            }
            fn base_url(&self) -> &'static str {
                "https://example.invalid"
            }
            fn signing_scheme(&self) -> SigningScheme {
                SigningScheme::HeaderHmacSha256
            }
            fn requires_passphrase(&self) -> bool {
                true
            }
            fn symbol_translator(&self) -> &dyn SymbolTranslator {
                &IdentitySymbols
            }
        }
        let adapter = RestAdapter::new(PassphraseProfile, Duration::from_secs(10));
        let result = adapter.connect("key", "secret", None).await;
        assert!(result.is_err());
    }
}
