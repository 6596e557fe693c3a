//! Cross-venue spread selection (spec §4.7): out of every connected venue
//! quoting a symbol, picks the pair that buys cheapest and sells dearest.

use arb_engine_core::model::Ticker;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadQuote {
    /// Venue to buy (long leg) — holds the globally cheapest ask.
    pub long_venue: String,
    /// Venue to sell (short leg) — holds the globally highest bid.
    pub short_venue: String,
    pub best_ask_cheap: Decimal,
    pub best_bid_expensive: Decimal,
    /// Absolute relative price difference between the two legs, as a percentage.
    pub current_spread_pct: Decimal,
}

/// Evaluates every ordered pair of distinct venues quoting the same symbol
/// and keeps the one with the largest `bid - ask` gap; ties break by stable
/// lexical order of `(long_venue, short_venue)` (spec §4.7).
#[must_use]
pub fn best_spread(tickers: &[(String, Ticker)]) -> Option<SpreadQuote> {
    let mut best: Option<(Decimal, &str, &str, Decimal, Decimal)> = None;

    for (buy_venue, buy_ticker) in tickers {
        for (sell_venue, sell_ticker) in tickers {
            if buy_venue == sell_venue {
                continue;
            }
            let gap = sell_ticker.bid - buy_ticker.ask;
            let candidate = (gap, buy_venue.as_str(), sell_venue.as_str(), buy_ticker.ask, sell_ticker.bid);
            best = Some(match best {
                None => candidate,
                Some(current) if is_better(&candidate, &current) => candidate,
                Some(current) => current,
            });
        }
    }

    best.map(|(gap, long_venue, short_venue, ask, bid)| {
        let mid = (ask + bid) / Decimal::TWO;
        let current_spread_pct = if mid.is_zero() {
            Decimal::ZERO
        } else {
            (gap.abs() / mid) * Decimal::from(100)
        };
        SpreadQuote {
            long_venue: long_venue.to_string(),
            short_venue: short_venue.to_string(),
            best_ask_cheap: ask,
            best_bid_expensive: bid,
            current_spread_pct,
        }
    })
}

fn is_better<'a>(
    candidate: &(Decimal, &'a str, &'a str, Decimal, Decimal),
    current: &(Decimal, &'a str, &'a str, Decimal, Decimal),
) -> bool {
    if candidate.0 != current.0 {
        return candidate.0 > current.0;
    }
    (candidate.1, candidate.2) < (current.1, current.2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ticker(bid: Decimal, ask: Decimal) -> Ticker {
        Ticker {
            bid,
            ask,
            last: (bid + ask) / Decimal::TWO,
            ts: Utc::now(),
        }
    }

    #[test]
    fn no_candidates_with_fewer_than_two_venues() {
        let tickers = vec![("bybit".to_string(), ticker(dec!(100), dec!(101)))];
        assert!(best_spread(&tickers).is_none());
    }

    #[test]
    fn picks_cheapest_ask_and_most_expensive_bid() {
        let tickers = vec![
            ("bybit".to_string(), ticker(dec!(100), dec!(101))),
            ("bitget".to_string(), ticker(dec!(103), dec!(104))),
        ];
        let quote = best_spread(&tickers).unwrap();
        assert_eq!(quote.long_venue, "bybit");
        assert_eq!(quote.short_venue, "bitget");
        assert_eq!(quote.best_ask_cheap, dec!(101));
        assert_eq!(quote.best_bid_expensive, dec!(103));
    }

    #[test]
    fn three_venues_picks_the_widest_gap() {
        let tickers = vec![
            ("bybit".to_string(), ticker(dec!(100), dec!(101))),
            ("bitget".to_string(), ticker(dec!(103), dec!(104))),
            ("okx".to_string(), ticker(dec!(99), dec!(100))),
        ];
        let quote = best_spread(&tickers).unwrap();
        assert_eq!(quote.long_venue, "okx");
        assert_eq!(quote.short_venue, "bitget");
    }

    #[test]
    fn ties_break_by_lexical_venue_order() {
        let tickers = vec![
            ("okx".to_string(), ticker(dec!(100), dec!(100))),
            ("bitget".to_string(), ticker(dec!(100), dec!(100))),
        ];
        let quote = best_spread(&tickers).unwrap();
        assert_eq!(quote.long_venue, "bitget");
        assert_eq!(quote.short_venue, "okx");
    }

    #[test]
    fn spread_pct_is_absolute_relative_difference() {
        let tickers = vec![
            ("bybit".to_string(), ticker(dec!(100), dec!(100))),
            ("bitget".to_string(), ticker(dec!(102), dec!(102))),
        ];
        let quote = best_spread(&tickers).unwrap();
        // gap = 2, mid = 101 -> ~1.98%
        assert!(quote.current_spread_pct > dec!(1.9) && quote.current_spread_pct < dec!(2.0));
    }
}
