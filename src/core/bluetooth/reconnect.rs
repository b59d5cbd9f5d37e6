//! Bounded reconnection after an unsolicited disconnect.
//!
//! Links report drops to a [`ReconnectSupervisor`] owned by the glasses
//! manager. The supervisor runs one job per side; each job retries a full
//! connect a fixed number of times with a fixed delay and publishes the
//! outcome as [`SessionEvent`]s. Jobs are cancellable and never outlive the
//! supervisor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_SECS};
use crate::core::bluetooth::link::Link;
use crate::core::bluetooth::types::{SessionEvent, Side};

/// Retry budget for one disconnect. No backoff growth, no jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            delay_secs: RECONNECT_DELAY_SECS,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Retry `link.connect` up to `policy.max_attempts` times.
///
/// Returns true once connected. Returns false when attempts run out, when the
/// link was explicitly disconnected meanwhile, or when `cancel_token` fires.
pub async fn reconnect_with_retry(
    link: &Arc<Link>,
    policy: &ReconnectPolicy,
    cancel_token: &CancellationToken,
    events: &broadcast::Sender<SessionEvent>,
) -> bool {
    let side = link.side();

    for attempt in 1..=policy.max_attempts {
        if cancel_token.is_cancelled() {
            info!("Reconnection to {} cancelled", link.name());
            return false;
        }

        info!(
            "Reconnecting to {} (Attempt {}/{})",
            link.name(),
            attempt,
            policy.max_attempts
        );
        let _ = events.send(SessionEvent::Reconnecting { side, attempt });

        let result = tokio::select! {
            result = link.reconnect() => result,
            _ = cancel_token.cancelled() => {
                info!("Reconnection to {} cancelled", link.name());
                return false;
            }
        };

        match result {
            Ok(true) => {
                info!("Reconnected to {}", link.name());
                let _ = events.send(SessionEvent::Reconnected { side });
                return true;
            }
            Ok(false) => {
                info!("{} was disconnected on request, not reconnecting", link.name());
                return false;
            }
            Err(e) => error!("Reconnection attempt {} failed: {}", attempt, e),
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.delay()) => {}
                _ = cancel_token.cancelled() => {
                    info!("Reconnection to {} cancelled", link.name());
                    return false;
                }
            }
        }
    }

    error!(
        "Failed to reconnect to {} after {} attempts",
        link.name(),
        policy.max_attempts
    );
    let _ = events.send(SessionEvent::ReconnectFailed {
        side,
        attempts: policy.max_attempts,
    });
    false
}

struct ReconnectJob {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

type JobMap = Arc<Mutex<HashMap<Side, ReconnectJob>>>;

/// Receives drop reports from Links and runs reconnection jobs
pub struct ReconnectSupervisor {
    request_tx: mpsc::UnboundedSender<Arc<Link>>,
    jobs: JobMap,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectSupervisor {
    pub fn spawn(policy: ReconnectPolicy, events: broadcast::Sender<SessionEvent>) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let jobs: JobMap = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(Self::run(
            request_rx,
            jobs.clone(),
            policy,
            events,
            shutdown.clone(),
        ));

        Self {
            request_tx,
            jobs,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Channel Links use to report an unsolicited disconnect
    pub(crate) fn requester(&self) -> mpsc::UnboundedSender<Arc<Link>> {
        self.request_tx.clone()
    }

    async fn run(
        mut requests: mpsc::UnboundedReceiver<Arc<Link>>,
        jobs: JobMap,
        policy: ReconnectPolicy,
        events: broadcast::Sender<SessionEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            let link = tokio::select! {
                request = requests.recv() => match request {
                    Some(link) => link,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };

            let side = link.side();
            let mut jobs_guard = jobs.lock().await;
            if jobs_guard.get(&side).is_some_and(|job| !job.handle.is_finished()) {
                warn!("Reconnection for {} side already running", side);
                continue;
            }
            if !link.reconnect_wanted() {
                continue;
            }

            let cancel_token = shutdown.child_token();
            let token_for_job = cancel_token.clone();
            let policy = policy.clone();
            let events = events.clone();
            let handle = tokio::spawn(async move {
                reconnect_with_retry(&link, &policy, &token_for_job, &events).await;
            });
            jobs_guard.insert(side, ReconnectJob { cancel_token, handle });
        }
    }

    pub async fn is_reconnecting(&self, side: Side) -> bool {
        self.jobs
            .lock()
            .await
            .get(&side)
            .is_some_and(|job| !job.handle.is_finished())
    }

    /// Cancel the job for `side`, if any, and wait for it to stop
    pub async fn cancel(&self, side: Side) {
        let job = self.jobs.lock().await.remove(&side);
        if let Some(job) = job {
            job.cancel_token.cancel();
            if let Err(e) = job.handle.await {
                warn!("Reconnection job for {} side ended abnormally: {:?}", side, e);
            }
        }
    }

    pub async fn cancel_all(&self) {
        for side in Side::BOTH {
            self.cancel(side).await;
        }
    }

    /// Stop accepting requests and cancel every job
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.cancel_all().await;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Reconnect supervisor ended abnormally: {:?}", e);
            }
        }
    }
}

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
