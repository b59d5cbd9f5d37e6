//! Per-link keepalive task.

use std::sync::Weak;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::link::Link;
use crate::core::protocol::frames::Frame;

/// A running heartbeat. Dropping it without [`HeartbeatKeeper::stop`] leaves
/// the task running until the Link is gone or disconnected.
pub struct HeartbeatKeeper {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl HeartbeatKeeper {
    /// Start sending a heartbeat every `interval` while the link stays connected
    pub fn start(link: Weak<Link>, interval: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let token_for_task = cancel_token.clone();

        let handle = tokio::spawn(async move {
            Self::run(link, interval, token_for_task).await;
        });

        Self { cancel_token, handle }
    }

    async fn run(link: Weak<Link>, interval: Duration, cancel_token: CancellationToken) {
        let mut seq: u8 = 0;

        loop {
            let Some(link) = link.upgrade() else {
                break;
            };
            if !link.is_connected() {
                break;
            }

            debug!("Sending heartbeat {} to {}", seq, link.name());
            if !link.send(&Frame::Heartbeat { seq }.to_bytes()).await {
                warn!("Heartbeat {} to {} was not delivered", seq, link.name());
            }
            seq = seq.wrapping_add(1);
            drop(link);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel_token.cancelled() => break,
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait until it has fully stopped
    pub async fn stop(self) {
        self.cancel_token.cancel();
        match self.handle.await {
            Ok(()) => info!("Heartbeat stopped"),
            Err(e) if e.is_cancelled() => info!("Heartbeat task was cancelled"),
            Err(e) => warn!("Heartbeat task ended with an error: {:?}", e),
        }
    }
}
