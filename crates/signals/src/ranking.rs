//! Ranks 24h tickers into dynamic-bot candidate lists: top quote-volume
//! movers for the volume strategy, top volatility movers for the volatility
//! strategy. Both exclude blacklisted symbols and apply a floor threshold.

use std::collections::HashSet;

use fleet_core::traits::Ticker24h;
use rust_decimal::Decimal;

/// Top `limit` symbols by 24h quote volume, excluding `blacklist` and any
/// ticker whose quote volume is below `min_quote_volume`.
#[must_use]
pub fn top_by_quote_volume(
    tickers: &[Ticker24h],
    blacklist: &HashSet<String>,
    min_quote_volume: Decimal,
    limit: usize,
) -> Vec<String> {
    let mut candidates: Vec<&Ticker24h> = tickers
        .iter()
        .filter(|t| !blacklist.contains(&t.symbol))
        .filter(|t| t.quote_volume >= min_quote_volume)
        .collect();

    candidates.sort_by(|a, b| b.quote_volume.cmp(&a.quote_volume));
    candidates.into_iter().take(limit).map(|t| t.symbol.clone()).collect()
}

/// Top `limit` symbols by 24h high/low volatility percent, excluding
/// `blacklist` and any ticker below `min_volatility_percent`.
#[must_use]
pub fn top_by_volatility(
    tickers: &[Ticker24h],
    blacklist: &HashSet<String>,
    min_volatility_percent: Decimal,
    limit: usize,
) -> Vec<String> {
    let mut candidates: Vec<&Ticker24h> = tickers
        .iter()
        .filter(|t| !blacklist.contains(&t.symbol))
        .filter(|t| t.volatility_percent() >= min_volatility_percent)
        .collect();

    candidates.sort_by(|a, b| b.volatility_percent().cmp(&a.volatility_percent()));
    candidates.into_iter().take(limit).map(|t| t.symbol.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker(symbol: &str, quote_volume: Decimal, high: Decimal, low: Decimal) -> Ticker24h {
        Ticker24h { symbol: symbol.to_string(), quote_volume, high, low }
    }

    #[test]
    fn top_by_quote_volume_sorts_descending_and_respects_limit() {
        let tickers = vec![
            ticker("AAA", dec!(1000), dec!(1), dec!(1)),
            ticker("BBB", dec!(5000), dec!(1), dec!(1)),
            ticker("CCC", dec!(3000), dec!(1), dec!(1)),
        ];
        let result = top_by_quote_volume(&tickers, &HashSet::new(), dec!(0), 2);
        assert_eq!(result, vec!["BBB".to_string(), "CCC".to_string()]);
    }

    #[test]
    fn blacklisted_symbols_are_excluded() {
        let tickers = vec![ticker("AAA", dec!(9000), dec!(1), dec!(1))];
        let blacklist: HashSet<String> = ["AAA".to_string()].into_iter().collect();
        let result = top_by_quote_volume(&tickers, &blacklist, dec!(0), 10);
        assert!(result.is_empty());
    }

    #[test]
    fn below_floor_threshold_is_excluded() {
        let tickers = vec![ticker("AAA", dec!(100), dec!(1), dec!(1))];
        let result = top_by_quote_volume(&tickers, &HashSet::new(), dec!(1000), 10);
        assert!(result.is_empty());
    }

    #[test]
    fn top_by_volatility_ranks_by_high_low_spread() {
        let tickers = vec![
            ticker("AAA", dec!(1), dec!(110), dec!(100)),
            ticker("BBB", dec!(1), dec!(150), dec!(100)),
        ];
        let result = top_by_volatility(&tickers, &HashSet::new(), dec!(0), 1);
        assert_eq!(result, vec!["BBB".to_string()]);
    }
}
