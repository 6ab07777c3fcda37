//! Rental confirmation notifications
//!
//! Redemption only enqueues an event; a background worker publishes it with
//! retries. A slow or unreachable broker therefore never delays or fails a
//! committed rental.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Emitted once per committed rental
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalEvent {
    pub username: String,
    pub box_code: String,
    pub rented_at: DateTime<Utc>,
}

impl RentalEvent {
    pub fn new(username: &str, box_code: &str) -> Self {
        Self {
            username: username.to_string(),
            box_code: box_code.to_string(),
            rented_at: Utc::now(),
        }
    }
}

/// Destination for rental events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &RentalEvent) -> Result<()>;
}

/// Sink used when no broker is configured
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish(&self, event: &RentalEvent) -> Result<()> {
        info!(
            "Rental event: {} rented box {} at {}",
            event.username, event.box_code, event.rented_at
        );
        Ok(())
    }
}

/// MQTT broker settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
}

/// Publishes rental events as JSON to an MQTT topic
///
/// Publishing fails fast while the broker is unreachable or the client's
/// request queue is full, leaving the retry to the delivery worker.
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
    connected: Arc<AtomicBool>,
}

impl MqttSink {
    /// Create the client and start driving its event loop
    ///
    /// Must be called inside a tokio runtime. The connection is established
    /// lazily by the event loop and re-established after failures.
    pub fn connect(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 16);
        let host = settings.host.clone();
        let connected = Arc::new(AtomicBool::new(false));
        let link = connected.clone();

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!("MQTT connected to {}: {:?}", host, ack.code);
                        link.store(true, Ordering::SeqCst);
                    }
                    Ok(event) => debug!("MQTT event: {:?}", event),
                    Err(e) => {
                        link.store(false, Ordering::SeqCst);
                        warn!("MQTT connection to {} failed: {}", host, e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!(
            "MQTT sink publishing to {}:{} topic {}",
            settings.host, settings.port, settings.topic
        );
        Self {
            client,
            topic: settings.topic.clone(),
            connected,
        }
    }
}

#[async_trait]
impl NotificationSink for MqttSink {
    async fn publish(&self, event: &RentalEvent) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            anyhow::bail!("MQTT broker not connected");
        }
        let payload = serde_json::to_vec(event)?;
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

/// How often and how patiently delivery is retried
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Handle for enqueueing rental events
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<RentalEvent>,
}

impl Notifier {
    /// Start the delivery worker
    pub fn spawn(
        sink: Arc<dyn NotificationSink>,
        queue_size: usize,
        retry: RetryPolicy,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let worker = tokio::spawn(deliver(rx, sink, retry));
        (Self { tx }, worker)
    }

    /// Enqueue an event without waiting. Returns false when it was dropped.
    pub fn notify(&self, event: RentalEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    "Notification queue full; dropping event for box {}",
                    event.box_code
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                error!(
                    "Notification worker stopped; dropping event for box {}",
                    event.box_code
                );
                false
            }
        }
    }
}

async fn deliver(
    mut rx: mpsc::Receiver<RentalEvent>,
    sink: Arc<dyn NotificationSink>,
    retry: RetryPolicy,
) {
    while let Some(event) = rx.recv().await {
        let mut backoff = retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match sink.publish(&event).await {
                Ok(()) => break,
                Err(e) if attempt < retry.max_attempts => {
                    warn!(
                        "Publishing rental event for box {} failed (attempt {}): {}",
                        event.box_code, attempt, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Giving up on rental event for box {} after {} attempts: {}",
                        event.box_code, attempt, e
                    );
                    break;
                }
            }
        }
    }

    debug!("Notification worker finished");
}
