use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_core::DurabilityConfig as CoreDurabilityConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::envelope::ReplyEnvelope;
use crate::sender::ReplySender;
use crate::store;

/// Tunables for the failed-reply durability loop (§4.5): where the backup
/// files live, how often a cycle runs, and how many files one cycle will
/// reload before yielding to the next tick.
#[derive(Debug, Clone)]
pub struct DurabilityLoopConfig {
    pub failed_reply_dir: PathBuf,
    pub cycle_interval: Duration,
    pub processing_limit: usize,
}

impl DurabilityLoopConfig {
    pub fn from_core(durability: &CoreDurabilityConfig, short_instance_id: &str) -> Self {
        Self {
            failed_reply_dir: durability.failed_reply_dir(short_instance_id),
            cycle_interval: durability.cycle_interval(),
            processing_limit: durability.failed_reply_processing_limit,
        }
    }
}

/// Periodic reload of persisted replies from disk (§4.5). Runs independently
/// of the reply pipeline and feeds reconstructed envelopes back onto the
/// same queue, so a reloaded reply goes through exactly the same worker
/// logic (ack wait, retries, re-persistence) as a freshly produced one.
pub struct DurabilityLoop {
    stop: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl DurabilityLoop {
    pub fn spawn(config: DurabilityLoopConfig, sender: Arc<dyn ReplySender>, queue_tx: mpsc::Sender<ReplyEnvelope>) -> Self {
        let stop = CancellationToken::new();
        let handle = tokio::spawn(run(config, sender, queue_tx, stop.clone()));
        Self { stop, handle }
    }

    pub async fn shutdown(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}

async fn run(config: DurabilityLoopConfig, sender: Arc<dyn ReplySender>, queue_tx: mpsc::Sender<ReplyEnvelope>, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(config.cycle_interval);

    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                debug!(target: "durability", "stopping failed-reply durability loop");
                return;
            }
            _ = ticker.tick() => {
                run_cycle(&config, sender.as_ref(), &queue_tx).await;
            }
        }
    }
}

async fn run_cycle(config: &DurabilityLoopConfig, sender: &dyn ReplySender, queue_tx: &mpsc::Sender<ReplyEnvelope>) {
    if !sender.is_open() {
        debug!(target: "durability", "control channel not open, skipping this cycle");
        return;
    }

    let names = match store::list_sorted(&config.failed_reply_dir).await {
        Ok(names) => names,
        Err(e) => {
            warn!(target: "durability", "failed to list failed-reply directory: {e}");
            return;
        }
    };

    let mut processed = 0usize;
    for name in names {
        if processed >= config.processing_limit {
            debug!(target: "durability", limit = config.processing_limit, "reached per-cycle processing limit, resuming next cycle");
            break;
        }
        if !sender.is_open() {
            debug!(target: "durability", "control channel closed mid-cycle, resuming next cycle");
            break;
        }

        let persisted = match store::load(&config.failed_reply_dir, &name).await {
            Ok(Some(persisted)) => persisted,
            Ok(None) => continue,
            Err(e) => {
                warn!(target: "durability", file = %name, "dropping undecodable failed reply: {e}");
                store::delete_backup(&config.failed_reply_dir, &name).await;
                processed += 1;
                continue;
            }
        };

        // The original source's staleness rule also drops a record when its
        // target service no longer matches and it has already been retried
        // once; this core only ever delivers to one target, so an
        // undecodable record (handled above) is the only staleness signal
        // available here.
        let envelope = ReplyEnvelope::from_persisted(persisted, name.clone());
        if queue_tx.send(envelope).await.is_err() {
            debug!(target: "durability", "reply queue closed, stopping this cycle");
            return;
        }
        processed += 1;
    }
}
