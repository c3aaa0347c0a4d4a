//! Background pollers for the authoritative price and the chart history
//!
//! Two independent interval tasks: neither blocks the other, and readers
//! always see the last known values held by the cascade and chart feed.
//! Shutdown cancels a poll that is still waiting on its upstream.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::cascade::{PriceCascade, PriceReading};
use super::history::ChartFeed;
use crate::common::types::{Asset, PriceSample};

/// Buffer size of the monitor's event channel
pub const EVENT_BUFFER: usize = 1000;

/// Updates published by the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum PriceEvent {
    /// Fresh (or retained stale) authoritative price
    Authoritative(PriceReading),
    /// Every source failed and no last known value exists yet
    Unavailable { asset: Asset },
    /// Latest chart sample after a candle refresh
    Chart { asset: Asset, sample: PriceSample },
}

/// Channel the monitor publishes into
pub fn event_channel() -> (mpsc::Sender<PriceEvent>, mpsc::Receiver<PriceEvent>) {
    mpsc::channel(EVENT_BUFFER)
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Authoritative price polling, ~30s
    pub poll_interval: Duration,
    /// Candle history polling, ~60s
    pub history_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            history_interval: Duration::from_secs(60),
        }
    }
}

/// One cascade resolution per asset; `false` once nobody is listening
async fn poll_prices(
    cascade: &PriceCascade,
    assets: &[Asset],
    events: &mpsc::Sender<PriceEvent>,
) -> bool {
    for asset in assets {
        let event = match cascade.resolve(*asset).await {
            Ok(reading) => PriceEvent::Authoritative(reading),
            Err(e) => {
                warn!(%asset, "No authoritative price: {}", e);
                PriceEvent::Unavailable { asset: *asset }
            }
        };
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

/// One candle refresh per asset; `false` once nobody is listening
async fn poll_history(
    chart: &ChartFeed,
    assets: &[Asset],
    events: &mpsc::Sender<PriceEvent>,
) -> bool {
    for asset in assets {
        match chart.refresh(*asset).await {
            Ok(Some(sample)) => {
                let event = PriceEvent::Chart {
                    asset: *asset,
                    sample,
                };
                if events.send(event).await.is_err() {
                    return false;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(%asset, "Candle refresh failed: {}", e),
        }
    }
    true
}

/// Handle to the running pollers; dropping it stops them
pub struct PriceMonitor {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl PriceMonitor {
    pub fn spawn(
        cascade: Arc<PriceCascade>,
        chart: Arc<ChartFeed>,
        assets: Vec<Asset>,
        settings: MonitorSettings,
        events: mpsc::Sender<PriceEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(
            assets = ?assets,
            poll_interval = ?settings.poll_interval,
            history_interval = ?settings.history_interval,
            "Starting price monitor"
        );

        let price_task = {
            let assets = assets.clone();
            let events = events.clone();
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker = interval(settings.poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        listening = async {
                            ticker.tick().await;
                            poll_prices(&cascade, &assets, &events).await
                        } => {
                            if !listening {
                                debug!("Price event receiver dropped");
                                break;
                            }
                        }
                    }
                }
            })
        };

        let history_task = {
            let mut shutdown = shutdown_rx;
            tokio::spawn(async move {
                let mut ticker = interval(settings.history_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        listening = async {
                            ticker.tick().await;
                            poll_history(&chart, &assets, &events).await
                        } => {
                            if !listening {
                                debug!("Price event receiver dropped");
                                break;
                            }
                        }
                    }
                }
            })
        };

        Self {
            shutdown_tx,
            handles: vec![price_task, history_task],
        }
    }

    /// Stop both pollers and wait for them to exit
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("Price monitor stopped");
    }
}

impl Drop for PriceMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
