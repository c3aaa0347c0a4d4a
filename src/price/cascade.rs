//! Authoritative price resolution through an ordered fallback of sources
//!
//! Sources are consulted in priority order (on-chain, proxy, exchange) and the
//! first success wins. When every source fails the last good reading is kept,
//! flagged stale, and the asset's connectivity drops to `Degraded`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::PriceSource;
use crate::common::types::{Asset, PriceSample, PriceSourceTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Connectivity {
    Healthy,
    Degraded,
}

/// Outcome of one cascade resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceReading {
    pub asset: Asset,
    pub price: Decimal,
    pub source: PriceSourceTag,
    pub observed_at: DateTime<Utc>,
    /// Set when every source failed and this is the retained last-known value
    pub stale: bool,
}

impl PriceReading {
    pub fn sample(&self) -> PriceSample {
        PriceSample::new(self.observed_at, self.price, self.source)
    }
}

/// Ordered fallback over price sources
pub struct PriceCascade {
    sources: Vec<Arc<dyn PriceSource>>,
    last_good: RwLock<HashMap<Asset, PriceReading>>,
    connectivity: RwLock<HashMap<Asset, Connectivity>>,
}

impl PriceCascade {
    /// Sources in priority order, highest first
    pub fn new(sources: Vec<Arc<dyn PriceSource>>) -> Self {
        Self {
            sources,
            last_good: RwLock::new(HashMap::new()),
            connectivity: RwLock::new(HashMap::new()),
        }
    }

    pub fn source_tags(&self) -> Vec<PriceSourceTag> {
        self.sources.iter().map(|s| s.tag()).collect()
    }

    /// Resolve the authoritative price for `asset`
    ///
    /// Fails only when every source failed and no earlier reading exists.
    pub async fn resolve(&self, asset: Asset) -> Result<PriceReading> {
        for source in &self.sources {
            let tag = source.tag();
            match source.latest_price(asset).await {
                Ok(price) if price > Decimal::ZERO => {
                    let reading = PriceReading {
                        asset,
                        price,
                        source: tag,
                        observed_at: Utc::now(),
                        stale: false,
                    };
                    debug!(%asset, %price, source = %tag, "Resolved authoritative price");
                    self.last_good.write().await.insert(asset, reading.clone());
                    self.set_connectivity(asset, Connectivity::Healthy).await;
                    return Ok(reading);
                }
                Ok(price) => {
                    warn!(
                        %asset,
                        %price,
                        source = %tag,
                        "Ignoring non-positive price, falling back"
                    );
                }
                Err(e) => {
                    warn!(%asset, source = %tag, "Price source failed, falling back: {}", e);
                }
            }
        }

        self.set_connectivity(asset, Connectivity::Degraded).await;
        match self.last_good.read().await.get(&asset) {
            Some(last) => Ok(PriceReading {
                stale: true,
                ..last.clone()
            }),
            None => Err(EngineError::Network(format!(
                "all price sources failed for {}",
                asset
            ))),
        }
    }

    async fn set_connectivity(&self, asset: Asset, status: Connectivity) {
        let previous = self.connectivity.write().await.insert(asset, status);
        if previous != Some(status) {
            match status {
                Connectivity::Healthy => info!(%asset, "Price connectivity healthy"),
                Connectivity::Degraded => {
                    warn!(%asset, "Price connectivity degraded, serving last known value")
                }
            }
        }
    }

    /// Last good reading, without touching the network
    pub async fn last_known(&self, asset: Asset) -> Option<PriceReading> {
        self.last_good.read().await.get(&asset).cloned()
    }

    /// `Healthy` until a resolution fails on every source
    pub async fn connectivity(&self, asset: Asset) -> Connectivity {
        self.connectivity
            .read()
            .await
            .get(&asset)
            .copied()
            .unwrap_or(Connectivity::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct StubSource {
        tag: PriceSourceTag,
        price: Option<Decimal>,
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn ok(tag: PriceSourceTag, price: Decimal) -> Arc<Self> {
            Arc::new(Self {
                tag,
                price: Some(price),
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(tag: PriceSourceTag) -> Arc<Self> {
            Arc::new(Self {
                tag,
                price: None,
                failing: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PriceSource for StubSource {
        fn tag(&self) -> PriceSourceTag {
            self.tag
        }

        async fn latest_price(&self, _asset: Asset) -> Result<Decimal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(EngineError::Network("down".into()));
            }
            self.price.ok_or_else(|| EngineError::Network("no price".into()))
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let onchain = StubSource::ok(PriceSourceTag::Onchain, dec!(3499));
        let proxy = StubSource::ok(PriceSourceTag::Proxy, dec!(3500));
        let cascade = PriceCascade::new(vec![onchain.clone(), proxy.clone()]);

        let reading = cascade.resolve(Asset::Eth).await.unwrap();
        assert_eq!(reading.price, dec!(3499));
        assert_eq!(reading.source, PriceSourceTag::Onchain);
        assert_eq!(proxy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let onchain = StubSource::failing(PriceSourceTag::Onchain);
        let proxy = StubSource::ok(PriceSourceTag::Proxy, dec!(3500));
        let exchange = StubSource::ok(PriceSourceTag::Exchange, dec!(3502));
        let cascade = PriceCascade::new(vec![onchain, proxy, exchange.clone()]);

        let reading = cascade.resolve(Asset::Eth).await.unwrap();
        assert_eq!(reading.price, dec!(3500));
        assert_eq!(reading.source, PriceSourceTag::Proxy);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cascade.connectivity(Asset::Eth).await, Connectivity::Healthy);
    }

    #[tokio::test]
    async fn test_total_failure_keeps_last_known() {
        let proxy = StubSource::ok(PriceSourceTag::Proxy, dec!(3500));
        let cascade = PriceCascade::new(vec![proxy.clone()]);
        cascade.resolve(Asset::Eth).await.unwrap();

        proxy.failing.store(true, Ordering::SeqCst);
        let reading = cascade.resolve(Asset::Eth).await.unwrap();
        assert!(reading.stale);
        assert_eq!(reading.price, dec!(3500));
        assert_eq!(cascade.connectivity(Asset::Eth).await, Connectivity::Degraded);

        proxy.failing.store(false, Ordering::SeqCst);
        assert!(!cascade.resolve(Asset::Eth).await.unwrap().stale);
        assert_eq!(cascade.connectivity(Asset::Eth).await, Connectivity::Healthy);
    }

    #[tokio::test]
    async fn test_total_failure_without_history() {
        let cascade = PriceCascade::new(vec![StubSource::failing(PriceSourceTag::Onchain)]);
        assert!(matches!(
            cascade.resolve(Asset::Btc).await,
            Err(EngineError::Network(_))
        ));
        assert_eq!(cascade.connectivity(Asset::Btc).await, Connectivity::Degraded);
        assert!(cascade.last_known(Asset::Btc).await.is_none());
    }
}
