//! Symbols shared by several exchanges.

use indexmap::IndexMap;

use crate::registry::ExchangeHandle;

/// Symbols listed on two or more of `exchanges`.
///
/// Each exchange counts once per symbol and an exchange passed twice (same
/// id) counts once. With more than one distinct exchange the result is the
/// lexicographically sorted set of symbols seen at least twice. With one or
/// zero exchanges there is nothing to compare against, so every observed
/// symbol is returned in first-seen order.
pub fn arbitrage_symbols(exchanges: &[ExchangeHandle]) -> Vec<String> {
    let mut seen_ids: Vec<&str> = Vec::with_capacity(exchanges.len());
    let mut counts: IndexMap<&str, usize> = IndexMap::new();

    for exchange in exchanges {
        if seen_ids.contains(&exchange.id()) {
            continue;
        }
        seen_ids.push(exchange.id());
        // market keys are unique per exchange
        for symbol in exchange.symbols() {
            *counts.entry(symbol).or_default() += 1;
        }
    }

    if seen_ids.len() <= 1 {
        return counts.into_keys().map(str::to_string).collect();
    }

    let mut shared: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(symbol, _)| symbol.to_string())
        .collect();
    shared.sort();
    shared
}
