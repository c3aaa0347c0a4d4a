//! Bounded price history and the chart feed built on exchange candles
//!
//! The chart price is the latest candle close. It is tracked apart from the
//! authoritative cascade price, and the two may disagree.

use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::common::errors::Result;
use crate::common::traits::CandleSource;
use crate::common::types::{Asset, Candle, PriceSample, PriceSourceTag};

/// Ring buffer of the most recent samples, oldest evicted first
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    samples: VecDeque<PriceSample>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: PriceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Insert keyed by timestamp
    ///
    /// A sample at the latest timestamp replaces it (the candle is still
    /// forming), older samples are ignored, newer ones are pushed.
    /// Returns whether the buffer changed.
    pub fn upsert(&mut self, sample: PriceSample) -> bool {
        match self.samples.back_mut() {
            Some(last) if last.timestamp == sample.timestamp => {
                let changed = last.price != sample.price;
                *last = sample;
                changed
            }
            Some(last) if last.timestamp > sample.timestamp => false,
            _ => {
                self.push(sample);
                true
            }
        }
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceSample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<PriceSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn candle_sample(candle: &Candle) -> PriceSample {
    PriceSample::new(candle.open_time, candle.close, PriceSourceTag::Exchange)
}

/// Per-asset candle history for charting
pub struct ChartFeed {
    source: Arc<dyn CandleSource>,
    capacity: usize,
    histories: RwLock<HashMap<Asset, PriceHistory>>,
}

impl ChartFeed {
    pub fn new(source: Arc<dyn CandleSource>, capacity: usize) -> Self {
        Self {
            source,
            capacity,
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// Pull fresh candles and merge them into the asset's history
    ///
    /// Returns the latest sample after the merge.
    pub async fn refresh(&self, asset: Asset) -> Result<Option<PriceSample>> {
        let candles = self.source.candles(asset).await?;

        let mut histories = self.histories.write().await;
        let history = histories
            .entry(asset)
            .or_insert_with(|| PriceHistory::new(self.capacity));
        let mut merged = 0;
        for candle in &candles {
            if history.upsert(candle_sample(candle)) {
                merged += 1;
            }
        }
        debug!(%asset, candles = candles.len(), merged, "Refreshed chart history");

        Ok(history.latest().cloned())
    }

    /// Latest candle close
    pub async fn chart_price(&self, asset: Asset) -> Option<Decimal> {
        self.histories
            .read()
            .await
            .get(&asset)
            .and_then(|h| h.latest())
            .map(|s| s.price)
    }

    pub async fn history(&self, asset: Asset) -> Vec<PriceSample> {
        self.histories
            .read()
            .await
            .get(&asset)
            .map(|h| h.to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap()
    }

    fn sample(minute: i64, price: Decimal) -> PriceSample {
        PriceSample::new(at(minute), price, PriceSourceTag::Exchange)
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut history = PriceHistory::new(3);
        for minute in 0..5 {
            history.push(sample(minute, Decimal::from(minute)));
        }
        assert_eq!(history.len(), 3);
        let prices: Vec<Decimal> = history.iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![dec!(2), dec!(3), dec!(4)]);
    }

    #[test]
    fn test_upsert_replaces_forming_candle() {
        let mut history = PriceHistory::new(10);
        assert!(history.upsert(sample(0, dec!(100))));
        assert!(history.upsert(sample(1, dec!(101))));
        assert!(history.upsert(sample(1, dec!(102))));
        assert!(!history.upsert(sample(1, dec!(102))));
        assert!(!history.upsert(sample(0, dec!(99))));

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().price, dec!(102));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut history = PriceHistory::new(0);
        history.push(sample(0, dec!(1)));
        history.push(sample(1, dec!(2)));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }
}
