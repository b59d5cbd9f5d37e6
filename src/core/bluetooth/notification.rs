//! Notification handling for the glasses
//! This module defines the inbound handler seam and the per-link task that
//! drains a notification channel into it.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, RwLock};

use crate::core::protocol::parser::{parse_frame, to_hex};

/// Receives every inbound packet of a Link, in arrival order.
///
/// A Link awaits `handle` before taking the next packet, so a slow handler
/// delays only that Link.
#[async_trait::async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, sender: &str, data: &[u8]);
}

/// Handler slot shared between a Link and its notification task
pub(crate) type SharedHandler = Arc<RwLock<Option<Arc<dyn NotificationHandler>>>>;

/// Default handler: decodes each packet and logs the diagnostic record
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsHandler;

#[async_trait::async_trait]
impl NotificationHandler for DiagnosticsHandler {
    async fn handle(&self, sender: &str, data: &[u8]) {
        let parsed = parse_frame(data);
        match serde_json::to_string(&parsed) {
            Ok(json) => debug!("Command received from {}: {}", sender, json),
            Err(e) => warn!("Failed to serialize diagnostics for {}: {}", sender, e),
        }
        if let Some(error) = &parsed.error {
            warn!("Malformed frame from {}: {}", sender, error);
        }

        info!(
            "Received notification from {}: {}",
            sender,
            String::from_utf8_lossy(data)
        );
        debug!("Notification data (hex): {}", to_hex(data));
    }
}

/// Drain `notifications` until the transport closes the channel.
///
/// Every packet is offered to the acknowledgment queue first, then handed to
/// whichever handler is installed when it arrives.
pub(crate) async fn process_notifications(
    name: String,
    mut notifications: mpsc::Receiver<Vec<u8>>,
    ack_queue: mpsc::Sender<Vec<u8>>,
    handler: SharedHandler,
) {
    info!("Listening for notifications from {}...", name);

    while let Some(value) = notifications.recv().await {
        debug!("Notification from {}: {}", name, to_hex(&value));

        if let Err(mpsc::error::TrySendError::Full(_)) = ack_queue.try_send(value.clone()) {
            warn!("Acknowledgment queue of {} is full, packet not queued", name);
        }

        let current = handler.read().await.clone();
        if let Some(current) = current {
            current.handle(&name, &value).await;
        }
    }

    info!("Notification stream of {} ended", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait::async_trait]
    impl NotificationHandler for Recorder {
        async fn handle(&self, sender: &str, data: &[u8]) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.seen.lock().unwrap().push((sender.to_string(), data.to_vec()));
        }
    }

    fn shared(handler: Arc<dyn NotificationHandler>) -> SharedHandler {
        Arc::new(RwLock::new(Some(handler)))
    }

    #[tokio::test]
    async fn test_packets_reach_handler_and_queue_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let (ack_tx, mut ack_rx) = mpsc::channel(8);
        let recorder = Arc::new(Recorder::default());

        let task = tokio::spawn(process_notifications(
            "G1_L_test".to_string(),
            rx,
            ack_tx,
            shared(recorder.clone()),
        ));

        tx.send(vec![0xC9]).await.unwrap();
        tx.send(vec![0x4B, 0, 1, 0]).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("G1_L_test".to_string(), vec![0xC9]),
                ("G1_L_test".to_string(), vec![0x4B, 0, 1, 0]),
            ]
        );
        assert_eq!(ack_rx.recv().await, Some(vec![0xC9]));
        assert_eq!(ack_rx.recv().await, Some(vec![0x4B, 0, 1, 0]));
    }

    #[tokio::test]
    async fn test_full_ack_queue_does_not_block_handler() {
        let (tx, rx) = mpsc::channel(8);
        let (ack_tx, _ack_rx) = mpsc::channel(1);
        let recorder = Arc::new(Recorder::default());

        let task = tokio::spawn(process_notifications(
            "right".to_string(),
            rx,
            ack_tx,
            shared(recorder.clone()),
        ));

        for i in 0..3u8 {
            tx.send(vec![i]).await.unwrap();
        }
        drop(tx);
        task.await.unwrap();

        assert_eq!(recorder.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_handler_swapped_mid_stream_gets_later_packets() {
        let (tx, rx) = mpsc::channel(8);
        let (ack_tx, _ack_rx) = mpsc::channel(8);
        let slot: SharedHandler = Arc::new(RwLock::new(None));
        let recorder = Arc::new(Recorder::default());

        let task = tokio::spawn(process_notifications("left".to_string(), rx, ack_tx, slot.clone()));

        tx.send(vec![0x01]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        *slot.write().await = Some(recorder.clone() as Arc<dyn NotificationHandler>);
        tx.send(vec![0x02]).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("left".to_string(), vec![0x02])]);
    }

    #[tokio::test]
    async fn test_diagnostics_handler_accepts_garbage() {
        DiagnosticsHandler.handle("left", &[]).await;
        DiagnosticsHandler.handle("left", &[0x4E, 0x01]).await;
        DiagnosticsHandler.handle("left", &[0xFF, 0xFE, 0x00]).await;
    }
}
