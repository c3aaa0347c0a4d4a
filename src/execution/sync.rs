//! Post-fill notification to the sync endpoint
//!
//! Runs as a detached task with its own error channel (the log). It only ever
//! sees a copy of the fill data, never the session.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::{FillNotice, SyncNotifier};

/// POSTs fill notices as JSON
#[derive(Debug, Clone)]
pub struct HttpSyncNotifier {
    client: Client,
    url: String,
}

impl HttpSyncNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SyncNotifier for HttpSyncNotifier {
    #[instrument(skip(self, notice), fields(tx_hash = %notice.tx_hash))]
    async fn notify_fill(&self, notice: &FillNotice) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("sync endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::InvalidResponse(format!(
                "Sync endpoint returned status {}",
                response.status()
            )));
        }
        debug!("Fill synced");
        Ok(())
    }
}

/// Fire-and-forget dispatch of a fill notice
pub fn dispatch(notifier: Arc<dyn SyncNotifier>, notice: FillNotice) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_fill(&notice).await {
            warn!(tx_hash = %notice.tx_hash, "Fill sync failed: {}", e);
        }
    })
}
