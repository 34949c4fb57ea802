//! Post-commit side effects.
//!
//! Handlers `emit` a [`Notification`] once their transaction has committed.
//! A single consumer task hands events to a [`Notifier`]; delivery failures
//! are logged and never reach the request that produced the event.

use std::sync::Arc;

use async_trait::async_trait;
use common::Notification;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Notification) -> anyhow::Result<()>;
}

/// Default sink: records each event as a structured log line.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Notification) -> anyhow::Result<()> {
        let payload = log_payload(event)?;
        info!(
            topic = event.topic(),
            recipient = event.recipient(),
            %payload,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Event body as it may appear in logs; reset links carry a live token.
fn log_payload(event: &Notification) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(event)?;
    if let Some(url) = value.get_mut("reset_url") {
        *url = serde_json::Value::from("[redacted]");
    }
    serde_json::to_string(&value)
}

#[derive(Clone)]
pub struct NotificationBus {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an event. Never fails the caller.
    pub fn emit(&self, event: Notification) {
        let topic = event.topic();
        if let Err(e) = self.tx.send(event) {
            warn!(topic, error = %e, "Notification consumer is gone, dropping event");
        }
    }
}

/// Drain the bus until every sender is dropped.
pub async fn consume_notifications(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    notifier: Arc<dyn Notifier>,
) {
    info!("Starting notification consumer");

    while let Some(event) = rx.recv().await {
        if let Err(e) = notifier.notify(&event).await {
            warn!(
                topic = event.topic(),
                recipient = event.recipient(),
                error = %e,
                "Failed to deliver notification"
            );
        }
    }

    info!("Notification consumer stopped");
}
