//! The subscriber hub: mediates between the update pipe and the single
//! downstream update stream.
//!
//! The downstream may be absent, connected, or mid-reconnect at any moment.
//! Updates offered while no stream is active are held in a pending queue and
//! replayed in FIFO order when the next stream attaches, so no update is lost
//! across reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Mutex};
use tonic::Status;

use crate::proto::AuthDataUpdate;

/// The sink for one attached stream: the sending half of the RPC handler's
/// channel. A send error means the remote stream is gone.
pub type UpdateSender = mpsc::Sender<Result<AuthDataUpdate, Status>>;

#[derive(Default)]
struct StreamSlot {
    sender: Option<UpdateSender>,
    active: bool,
    session_id: String,
}

/// Single-subscriber hub with a pending queue that survives disconnects.
///
/// Lock order is always `stream` then `pending`. The stream lock is held
/// across the pending flush in [`UpdateHub::attach`], which serializes any
/// concurrent [`UpdateHub::offer`] behind the replay and preserves delivery
/// order across a reconnect.
#[derive(Default)]
pub struct UpdateHub {
    stream: Mutex<StreamSlot>,
    pending: Mutex<Vec<AuthDataUpdate>>,
    session_counter: AtomicU64,
}

impl UpdateHub {
    /// Creates a hub with no attached stream and an empty pending queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a unique identity for one stream attachment: a monotonic
    /// counter paired with the wall-clock nanoseconds at attach time.
    fn next_session_id(&self) -> String {
        let id = self.session_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        format!("{id}-{nanos}")
    }

    /// Installs `sender` as the current stream, replacing any previous one,
    /// and replays the pending queue to it in FIFO order.
    ///
    /// Returns the session id identifying this attachment; pass it to
    /// [`UpdateHub::detach`] when the stream's context ends. If replay fails
    /// partway, the unsent remainder is put back on the pending queue in
    /// order and the hub is marked inactive again.
    pub async fn attach(&self, sender: UpdateSender) -> String {
        let session_id = self.next_session_id();

        let mut slot = self.stream.lock().await;
        slot.sender = Some(sender.clone());
        slot.active = true;
        slot.session_id = session_id.clone();

        let drained = {
            let mut pending = self.pending.lock().await;
            std::mem::take(&mut *pending)
        };

        tracing::info!(
            session_id = %session_id,
            pending_updates = drained.len(),
            "subscriber attached to update stream"
        );

        let mut replay = drained.into_iter();
        while let Some(update) = replay.next() {
            let endpoint_id = update.endpoint_id.clone();
            match sender.send(Ok(update)).await {
                Ok(()) => {
                    tracing::info!(endpoint_id = %endpoint_id, "sent pending update to subscriber");
                }
                Err(send_error) => {
                    tracing::error!(
                        endpoint_id = %endpoint_id,
                        "failed to send pending update, marking stream inactive"
                    );
                    slot.active = false;

                    let mut pending = self.pending.lock().await;
                    if let Ok(update) = send_error.0 {
                        pending.push(update);
                    }
                    pending.extend(replay);
                    break;
                }
            }
        }

        session_id
    }

    /// Marks the hub inactive, but only if `session_id` still identifies the
    /// current stream. A retiring session must not clear the active flag a
    /// newer session has set.
    pub async fn detach(&self, session_id: &str) {
        let mut slot = self.stream.lock().await;
        if slot.session_id == session_id {
            slot.active = false;
            slot.sender = None;
            tracing::info!(session_id = %session_id, "subscriber disconnected");
        } else {
            tracing::debug!(
                session_id = %session_id,
                current_session_id = %slot.session_id,
                "old stream closed, a newer one is already active"
            );
        }
    }

    /// Delivers `update` to the active stream, or queues it when no stream is
    /// active. A send failure marks the hub inactive and requeues the update
    /// so the next attachment replays it; nothing is ever dropped.
    pub async fn offer(&self, update: AuthDataUpdate) {
        let mut slot = self.stream.lock().await;

        let sender = match &slot.sender {
            Some(sender) if slot.active => sender.clone(),
            _ => {
                let mut pending = self.pending.lock().await;
                pending.push(update);
                tracing::info!(
                    pending_updates = pending.len(),
                    "no active subscriber stream, queued update"
                );
                return;
            }
        };

        let endpoint_id = update.endpoint_id.clone();
        match sender.send(Ok(update)).await {
            Ok(()) => {
                tracing::info!(endpoint_id = %endpoint_id, "sent update to subscriber");
            }
            Err(send_error) => {
                tracing::error!(
                    endpoint_id = %endpoint_id,
                    "failed to send update, marking stream inactive"
                );
                slot.active = false;
                slot.sender = None;

                if let Ok(update) = send_error.0 {
                    let mut pending = self.pending.lock().await;
                    pending.push(update);
                    tracing::info!(
                        pending_updates = pending.len(),
                        "queued update after send failure"
                    );
                }
            }
        }
    }

    /// Number of updates waiting for the next attachment.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(id: &str) -> AuthDataUpdate {
        AuthDataUpdate {
            endpoint_id: id.to_string(),
            gateway_endpoint: None,
            delete: false,
        }
    }

    fn delete(id: &str) -> AuthDataUpdate {
        AuthDataUpdate {
            endpoint_id: id.to_string(),
            gateway_endpoint: None,
            delete: true,
        }
    }

    async fn recv_id(rx: &mut mpsc::Receiver<Result<AuthDataUpdate, Status>>) -> String {
        rx.recv().await.unwrap().unwrap().endpoint_id
    }

    #[tokio::test]
    async fn test_offer_without_subscriber_queues() {
        let hub = UpdateHub::new();

        hub.offer(upsert("endpoint_1")).await;
        hub.offer(delete("endpoint_2")).await;

        assert_eq!(hub.pending_len().await, 2);
    }

    #[tokio::test]
    async fn test_attach_replays_pending_in_order() {
        let hub = UpdateHub::new();
        hub.offer(upsert("endpoint_1")).await;
        hub.offer(delete("endpoint_2")).await;

        let (tx, mut rx) = mpsc::channel(8);
        hub.attach(tx).await;

        assert_eq!(recv_id(&mut rx).await, "endpoint_1");
        assert_eq!(recv_id(&mut rx).await, "endpoint_2");
        assert_eq!(hub.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_offer_delivers_live_when_attached() {
        let hub = UpdateHub::new();
        let (tx, mut rx) = mpsc::channel(8);
        hub.attach(tx).await;

        hub.offer(upsert("endpoint_3")).await;

        assert_eq!(recv_id(&mut rx).await, "endpoint_3");
        assert_eq!(hub.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_send_failure_requeues_update() {
        let hub = UpdateHub::new();
        let (tx, rx) = mpsc::channel(8);
        hub.attach(tx).await;

        // Subscriber goes away.
        drop(rx);

        hub.offer(upsert("endpoint_4")).await;
        assert_eq!(hub.pending_len().await, 1);

        // The next subscriber sees the failed update replayed.
        let (tx, mut rx) = mpsc::channel(8);
        hub.attach(tx).await;
        assert_eq!(recv_id(&mut rx).await, "endpoint_4");
    }

    #[tokio::test]
    async fn test_detach_marks_inactive() {
        let hub = UpdateHub::new();
        let (tx, _rx) = mpsc::channel(8);
        let session_id = hub.attach(tx).await;

        hub.detach(&session_id).await;
        hub.offer(upsert("endpoint_5")).await;

        assert_eq!(hub.pending_len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_detach_does_not_clobber_newer_session() {
        let hub = UpdateHub::new();

        let (old_tx, _old_rx) = mpsc::channel(8);
        let old_session = hub.attach(old_tx).await;

        let (new_tx, mut new_rx) = mpsc::channel(8);
        let new_session = hub.attach(new_tx).await;
        assert_ne!(old_session, new_session);

        // The old stream's context ends after the replacement.
        hub.detach(&old_session).await;

        hub.offer(upsert("endpoint_6")).await;
        assert_eq!(recv_id(&mut new_rx).await, "endpoint_6");
        assert_eq!(hub.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_replay_requeues_remainder_in_order() {
        let hub = UpdateHub::new();
        hub.offer(upsert("endpoint_1")).await;
        hub.offer(upsert("endpoint_2")).await;
        hub.offer(upsert("endpoint_3")).await;

        // A closed channel fails the replay immediately.
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        hub.attach(tx).await;

        assert_eq!(hub.pending_len().await, 3);

        let (tx, mut rx) = mpsc::channel(8);
        hub.attach(tx).await;
        assert_eq!(recv_id(&mut rx).await, "endpoint_1");
        assert_eq!(recv_id(&mut rx).await, "endpoint_2");
        assert_eq!(recv_id(&mut rx).await, "endpoint_3");
    }
}
