use std::sync::Arc;
use std::time::Duration;

use agent_core::AckWaiterMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use crate::state::ControlChannelState;

/// Periodic health-log job started by `ControlChannel::open_once` once the
/// `OpenControlChannel` handshake completes, and stopped by `Close` (§4.3:
/// "`Initialize`: binds ... an audit-log scheduler"; "`Open`: ... then
/// starts the audit scheduler"). It does not participate in message
/// dispatch; it only gives an operator-facing heartbeat of the channel's
/// own bookkeeping (pending acks, current state) at a fixed cadence.
pub struct AuditLogScheduler {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl AuditLogScheduler {
    pub fn spawn(short_instance_id: String, interval: Duration, ack_waiters: Arc<AckWaiterMap>, state: Arc<dyn Fn() -> ControlChannelState + Send + Sync>) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = &mut stop_rx => return,
                    _ = ticker.tick() => {
                        info!(
                            target: "audit",
                            short_instance_id = %short_instance_id,
                            state = %state(),
                            pending_acks = ack_waiters.pending_count(),
                            "control channel audit heartbeat",
                        );
                    }
                }
            }
        });
        Self { stop: Some(stop_tx), handle }
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_stops_the_scheduler_task() {
        let ack_waiters = Arc::new(AckWaiterMap::new());
        let scheduler = AuditLogScheduler::spawn("mi-test".to_string(), Duration::from_millis(5), ack_waiters, Arc::new(|| ControlChannelState::Open));

        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown().await;
    }
}
