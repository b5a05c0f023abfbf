use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Capacity of each client's outbox. A client that falls this far behind
/// the broadcast stream is disconnected rather than allowed to stall it.
pub const CLIENT_OUTBOX_CAPACITY: usize = 256;

const BROADCAST_QUEUE_CAPACITY: usize = 256;
const JOB_QUEUE_CAPACITY: usize = 100;

/// An event fanned out to all connected real-time clients.
///
/// The timestamp is assigned by the hub when the event is broadcast, never
/// by the producer, so ordering across producers is comparable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Priority of a background processing job. Informational only; jobs are
/// processed in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// A deferred message-processing job submitted to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageProcessingJob {
    pub id: String,
    pub platform: String,
    pub message: serde_json::Value,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

impl MessageProcessingJob {
    pub fn new(
        id: impl Into<String>,
        platform: impl Into<String>,
        message: serde_json::Value,
        priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            message,
            priority,
            created_at: Utc::now(),
        }
    }
}

/// A duplex transport able to deliver a serialized `Event` to one client.
#[async_trait]
pub trait ClientConnection: Send {
    async fn send_event(&mut self, event: &Event) -> anyhow::Result<()>;
}

/// One live real-time connection, registered with the hub on upgrade.
pub struct Client {
    pub id: String,
    pub conn: Box<dyn ClientConnection>,
}

impl Client {
    pub fn new(id: impl Into<String>, conn: Box<dyn ClientConnection>) -> Self {
        Self {
            id: id.into(),
            conn,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub connected_clients: usize,
}

/// Handle to the event hub. Cheap to clone; all operations are message
/// passing into the hub's single processing loop, so the client registry
/// never needs external locking.
#[derive(Clone)]
pub struct EventHub {
    register_tx: mpsc::Sender<Client>,
    unregister_tx: mpsc::Sender<String>,
    broadcast_tx: mpsc::Sender<Event>,
    job_tx: mpsc::Sender<MessageProcessingJob>,
    stats_tx: mpsc::Sender<oneshot::Sender<HubStats>>,
    shutdown: CancellationToken,
}

impl EventHub {
    /// Spawn the hub's processing loop and return a handle to it.
    pub fn spawn() -> Self {
        let (register_tx, register_rx) = mpsc::channel(16);
        let (unregister_tx, unregister_rx) = mpsc::channel(16);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAPACITY);
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (stats_tx, stats_rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();

        let hub = Self {
            register_tx,
            unregister_tx,
            broadcast_tx,
            job_tx,
            stats_tx,
            shutdown: shutdown.clone(),
        };

        tokio::spawn(run_loop(
            hub.clone(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            job_rx,
            stats_rx,
            shutdown,
        ));

        hub
    }

    /// Enqueue a client registration. The hub's own loop inserts it into
    /// the registry and spawns the client's outbound writer task.
    pub async fn register_client(&self, client: Client) {
        if self.register_tx.send(client).await.is_err() {
            tracing::error!("register_client called on a closed event hub");
        }
    }

    /// Enqueue a client removal. Removing an absent client is a no-op.
    pub async fn unregister_client(&self, client_id: &str) {
        if self
            .unregister_tx
            .send(client_id.to_string())
            .await
            .is_err()
        {
            tracing::error!("unregister_client called on a closed event hub");
        }
    }

    /// Stamp the event with the current instant and enqueue it for fan-out.
    /// Never blocks beyond the channel handoff.
    pub async fn broadcast(&self, mut event: Event) {
        event.timestamp = Utc::now();
        if self.broadcast_tx.send(event).await.is_err() {
            tracing::error!("broadcast called on a closed event hub");
        }
    }

    /// Enqueue a background processing job. Lifecycle events for the job
    /// are emitted through the broadcast path.
    pub async fn process_message(&self, job: MessageProcessingJob) {
        if self.job_tx.send(job).await.is_err() {
            tracing::error!("process_message called on a closed event hub");
        }
    }

    /// Snapshot of the registry size, answered by the processing loop.
    pub async fn stats(&self) -> HubStats {
        let (tx, rx) = oneshot::channel();
        if self.stats_tx.send(tx).await.is_err() {
            return HubStats {
                connected_clients: 0,
            };
        }
        rx.await.unwrap_or(HubStats {
            connected_clients: 0,
        })
    }

    /// Terminate the processing loop. Further operations on the hub are
    /// misuse and are logged as errors.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

struct ClientEntry {
    outbox: mpsc::Sender<Event>,
}

/// The single-writer processing loop. Owns the client registry; all input
/// queues funnel through here.
async fn run_loop(
    hub: EventHub,
    mut register_rx: mpsc::Receiver<Client>,
    mut unregister_rx: mpsc::Receiver<String>,
    mut broadcast_rx: mpsc::Receiver<Event>,
    mut job_rx: mpsc::Receiver<MessageProcessingJob>,
    mut stats_rx: mpsc::Receiver<oneshot::Sender<HubStats>>,
    shutdown: CancellationToken,
) {
    let mut clients: HashMap<String, ClientEntry> = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(client) = register_rx.recv() => {
                let (outbox_tx, outbox_rx) = mpsc::channel(CLIENT_OUTBOX_CAPACITY);
                tracing::debug!(client_id = %client.id, "client registered");
                tokio::spawn(client_writer(
                    client.id.clone(),
                    client.conn,
                    outbox_rx,
                    hub.clone(),
                ));
                clients.insert(client.id, ClientEntry { outbox: outbox_tx });
            }
            Some(client_id) = unregister_rx.recv() => {
                // Dropping the entry closes the outbox and ends the writer.
                if clients.remove(&client_id).is_some() {
                    tracing::debug!(client_id = %client_id, "client unregistered");
                }
            }
            Some(event) = broadcast_rx.recv() => {
                clients.retain(|client_id, entry| {
                    match entry.outbox.try_send(event.clone()) {
                        Ok(()) => true,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!(
                                client_id = %client_id,
                                "client outbox full, disconnecting slow consumer"
                            );
                            false
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => false,
                    }
                });
            }
            Some(job) = job_rx.recv() => {
                tokio::spawn(process_job(hub.clone(), job));
            }
            Some(reply) = stats_rx.recv() => {
                let _ = reply.send(HubStats {
                    connected_clients: clients.len(),
                });
            }
        }
    }

    tracing::info!("event hub stopped");
}

/// Dedicated outbound writer for one client. Drains the client's outbox to
/// the wire; a write failure triggers self-unregistration.
async fn client_writer(
    client_id: String,
    mut conn: Box<dyn ClientConnection>,
    mut outbox: mpsc::Receiver<Event>,
    hub: EventHub,
) {
    while let Some(event) = outbox.recv().await {
        if let Err(e) = conn.send_event(&event).await {
            tracing::warn!(client_id = %client_id, error = %e, "client write failed");
            hub.unregister_client(&client_id).await;
            break;
        }
    }
}

/// Worker path for background jobs. Completion is observable by any
/// connected client through the broadcast channel.
async fn process_job(hub: EventHub, job: MessageProcessingJob) {
    hub.broadcast(Event::new(
        "message_processing_started",
        serde_json::json!({
            "job_id": job.id,
            "platform": job.platform,
            "priority": job.priority,
        }),
    ))
    .await;

    hub.broadcast(Event::new(
        "message_processing_completed",
        serde_json::json!({
            "job_id": job.id,
            "platform": job.platform,
            "result": "processed",
        }),
    ))
    .await;
}
