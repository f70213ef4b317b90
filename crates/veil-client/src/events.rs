//! Server event stream over long polling.
//!
//! One loop per session issues `/api/poll` requests outside the request
//! queue (a poll can sit idle for tens of seconds and must not block
//! interactive traffic). Events fan out through per-type broadcast
//! channels; message events are decoded before publishing so subscribers
//! only ever see plaintext state.
//!
//! Failure classification:
//! - HTTP 408 with body `"Poll timeout"` is the server ending an idle
//!   poll; retry silently.
//! - Any other non-2xx status stops the loop with the server's rejection.
//! - An error before a response arrived stops the loop when the iteration
//!   failed fast (under the grace window) and retries when the poll had
//!   already been sitting for a while, where a dropped connection is the
//!   expected way for an idle poll to die.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use veil_proto::{EVENT_MESSAGE, MessageEvent};

use crate::client::ChatClient;
use crate::env::Environment;
use crate::error::ClientError;
use crate::message::DecodedMessage;

/// Elapsed time past which a failed poll is treated as an idle timeout.
const POLL_GRACE: Duration = Duration::from_secs(30);

/// Buffered events per subscriber before lagging sets in.
const EVENT_BUFFER: usize = 64;

/// One server event as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    /// The event's type tag.
    pub event_type: String,
    /// The raw event payload.
    pub payload: serde_json::Value,
    /// The decoded message, for `"message"` events.
    pub message: Option<DecodedMessage>,
}

#[derive(Default)]
struct EventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<ChatEvent>>>,
}

impl EventBus {
    fn sender(&self, event_type: &str) -> broadcast::Sender<ChatEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(event_type.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0)
            .clone()
    }

    fn subscribe(&self, event_type: &str) -> broadcast::Receiver<ChatEvent> {
        self.sender(event_type).subscribe()
    }

    fn publish(&self, event: ChatEvent) {
        // send fails when nobody subscribes to this type; drop the event
        let _ = self.sender(&event.event_type).send(event);
    }
}

/// Handle to the running poll loop.
///
/// There is no cancellation protocol: abort (or drop) the handle to stop
/// listening.
pub struct EventStream {
    bus: Arc<EventBus>,
    task: JoinHandle<Result<(), ClientError>>,
}

impl EventStream {
    /// Spawn the poll loop for a client.
    pub fn spawn<E: Environment>(client: Arc<ChatClient<E>>) -> Self {
        let bus = Arc::new(EventBus::default());
        let task = tokio::spawn(run(client, Arc::clone(&bus)));
        Self { bus, task }
    }

    /// Subscribe to events carrying the given type tag.
    pub fn subscribe(&self, event_type: &str) -> broadcast::Receiver<ChatEvent> {
        self.bus.subscribe(event_type)
    }

    /// Stop the poll loop.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the loop to finish and collect its outcome. A healthy
    /// loop never finishes on its own, so this reports why it stopped;
    /// an aborted loop reports success.
    pub async fn join(self) -> Result<(), ClientError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ClientError::Internal { reason: e.to_string() }),
        }
    }
}

async fn run<E: Environment>(
    client: Arc<ChatClient<E>>,
    bus: Arc<EventBus>,
) -> Result<(), ClientError> {
    let session = Arc::clone(client.session());
    loop {
        let started = session.env().now();

        match session.authenticated_request_unqueued("/api/poll", &[]).await {
            Ok(response) if response.ok() => {
                let payload: serde_json::Value = response.json()?;
                let event_type = payload
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                let message = if event_type == EVENT_MESSAGE {
                    let mut event: MessageEvent = serde_json::from_value(payload.clone())
                        .map_err(|e| ClientError::InvalidResponse { reason: e.to_string() })?;
                    // The envelope's group id selects the key; the nested
                    // message may omit its own.
                    event.message.group_id = event.group_id;
                    Some(client.decode_message(event.message).await?)
                } else {
                    None
                };

                bus.publish(ChatEvent { event_type, payload, message });
            }
            Ok(response) => {
                if response.status == 408 && response.body == "Poll timeout" {
                    continue;
                }
                return Err(ClientError::RemoteRejected {
                    status: response.status,
                    body: response.body,
                });
            }
            Err(error) => {
                if session.env().now().duration_since(started) < POLL_GRACE {
                    return Err(error);
                }
                tracing::debug!(%error, "idle poll dropped, retrying");
            }
        }
    }
}
