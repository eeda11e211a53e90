//! Bounded execution queue.
//!
//! Publishers submit delivery ids; the worker pool drains them. The channel
//! bound is the backpressure mechanism: a full queue makes `submit` wait,
//! so a slow subscriber cannot pile up unbounded work.

use hookrelay_core::{models::DeliveryId, Error, Result};
use tokio::sync::mpsc;

/// Creates a queue with the given capacity.
pub fn bounded(capacity: usize) -> (QueueHandle, mpsc::Receiver<DeliveryId>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueueHandle { tx }, rx)
}

/// Cloneable submission side of the execution queue.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<DeliveryId>,
}

impl QueueHandle {
    /// Submits a delivery for execution, waiting while the queue is full.
    pub async fn submit(&self, id: DeliveryId) -> Result<()> {
        self.tx.send(id).await.map_err(|_| Error::Shutdown)
    }

    /// Submits without waiting. Returns whether the id was accepted; a
    /// full queue is not an error here because callers like the retry
    /// sweep simply pick the delivery up again next round.
    pub fn try_submit(&self, id: DeliveryId) -> bool {
        self.tx.try_send(id).is_ok()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

#[cfg(test)]
mod tests {
    use hookrelay_core::models::{EventId, SubscriptionId};

    use super::*;

    fn some_id() -> DeliveryId {
        DeliveryId::for_pair(SubscriptionId::new(), EventId::new())
    }

    #[tokio::test]
    async fn try_submit_reports_full_queue() {
        let (queue, _rx) = bounded(2);
        assert!(queue.try_submit(some_id()));
        assert!(queue.try_submit(some_id()));
        assert!(!queue.try_submit(some_id()));
    }

    #[tokio::test]
    async fn submit_fails_after_receiver_drops() {
        let (queue, rx) = bounded(1);
        drop(rx);
        assert!(matches!(queue.submit(some_id()).await, Err(Error::Shutdown)));
    }

    #[tokio::test]
    async fn submit_unblocks_when_space_frees_up() {
        let (queue, mut rx) = bounded(1);
        queue.submit(some_id()).await.unwrap();

        let queue2 = queue.clone();
        let id = some_id();
        let submitter = tokio::spawn(async move { queue2.submit(id).await });

        let _ = rx.recv().await;
        submitter.await.unwrap().unwrap();
        assert_eq!(rx.recv().await, Some(id));
    }
}
