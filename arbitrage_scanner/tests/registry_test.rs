mod common;

use std::sync::Arc;

use arbitrage_scanner::{ExchangeRef, ExchangeRegistry, registry::LoadError};
use common::{MockExchange, MockFactory};
use exchange_connector::Exchange;

fn factory() -> MockFactory {
    MockFactory::new([
        MockExchange::new("alpha", &["BTC/USDT", "ETH/USDT"]),
        MockExchange::new("beta", &["BTC/USDT"]),
        MockExchange::new("down", &["BTC/USDT"]).failing_markets(),
    ])
}

#[tokio::test]
async fn empty_request_loads_every_known_exchange() {
    let mut registry = ExchangeRegistry::with_factory(factory());
    let exchanges = registry.get_exchanges(&[]).await;

    assert_eq!(exchanges.keys().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    assert_eq!(exchanges["alpha"].markets().len(), 2);
    assert!(exchanges["beta"].has_symbol("BTC/USDT"));
}

#[tokio::test]
async fn failures_are_reported_and_skipped() {
    let mut registry = ExchangeRegistry::with_factory(factory());
    let report = registry
        .load(&["down".into(), "alpha".into(), "nowhere".into()])
        .await;

    assert_eq!(report.loaded, vec!["alpha"]);
    let failed: Vec<_> = report.failed.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(failed, vec!["down", "nowhere"]);
    assert!(matches!(report.failed[0].error, LoadError::Markets(_)));
    assert!(matches!(report.failed[1].error, LoadError::Init(_)));
    assert!(registry.get("down").is_none());
}

#[tokio::test]
async fn registry_only_grows_and_loads_each_exchange_once() {
    let factory = factory();
    let alpha = factory.exchange("alpha");
    let mut registry = ExchangeRegistry::with_factory(factory);

    let first = registry.get_exchanges(&["alpha".into()]).await;
    let second = registry.get_exchanges(&["beta".into()]).await;
    let third = registry.get_exchanges(&["alpha".into()]).await;

    assert_eq!(first.len(), 1);
    // earlier loads stay in the returned copy
    assert_eq!(second.keys().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    assert!(first.keys().all(|id| third.contains_key(id)));
    assert!(second.keys().all(|id| third.contains_key(id)));
    assert_eq!(alpha.market_calls(), 1);
}

#[tokio::test]
async fn failed_exchange_is_retried_on_the_next_request() {
    let factory = factory();
    let down = factory.exchange("down");
    let mut registry = ExchangeRegistry::with_factory(factory);

    registry.get_exchanges(&["down".into()]).await;
    registry.get_exchanges(&["down".into()]).await;
    assert_eq!(down.market_calls(), 2);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn accepts_ready_connectors() {
    let mut registry = ExchangeRegistry::with_factory(MockFactory::default());
    let gamma: Arc<dyn Exchange> = Arc::new(MockExchange::new("gamma", &["SOL/USDT"]));

    let exchanges = registry
        .get_exchanges(&[ExchangeRef::from(gamma)])
        .await;
    assert_eq!(exchanges.keys().collect::<Vec<_>>(), vec!["gamma"]);
    assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["gamma"]);
}
