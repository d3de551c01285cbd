// src/sink.rs
//! Delivery seam: where surviving deals go.

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tracing::info;

use crate::deal::Deal;
use crate::filter::FilterResult;

#[async_trait::async_trait]
pub trait DealSink: Send + Sync {
    async fn deliver(&self, deal: &Deal, result: &FilterResult) -> Result<()>;

    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Writes each deal as a structured log line.
pub struct LogSink;

#[async_trait::async_trait]
impl DealSink for LogSink {
    async fn deliver(&self, deal: &Deal, result: &FilterResult) -> Result<()> {
        info!(
            target: "pipeline",
            deal_id = %deal.id,
            title = %deal.title,
            price = ?deal.price,
            discount = ?deal.discount_percentage,
            urgency = result.urgency_level.as_str(),
            authenticity = result.authenticity_score,
            url = %deal.url,
            "deal alert"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Forwards deals over a bounded channel to some other task.
pub struct ChannelSink {
    tx: mpsc::Sender<(Deal, FilterResult)>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(Deal, FilterResult)>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl DealSink for ChannelSink {
    async fn deliver(&self, deal: &Deal, result: &FilterResult) -> Result<()> {
        self.tx
            .send((deal.clone(), result.clone()))
            .await
            .map_err(|_| anyhow!("deal channel closed"))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Keeps every delivered deal in memory. Useful when the monitor is embedded
/// and the host collects results between ticks with [`MemorySink::drain`].
pub struct MemorySink {
    pub delivered: std::sync::Mutex<Vec<(Deal, FilterResult)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            delivered: std::sync::Mutex::new(vec![]),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .map(|v| v.iter().map(|(d, _)| d.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Take everything delivered so far, leaving the sink empty.
    pub fn drain(&self) -> Vec<(Deal, FilterResult)> {
        self.delivered
            .lock()
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DealSink for MemorySink {
    async fn deliver(&self, deal: &Deal, result: &FilterResult) -> Result<()> {
        self.delivered
            .lock()
            .map_err(|_| anyhow!("memory sink poisoned"))?
            .push((deal.clone(), result.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
