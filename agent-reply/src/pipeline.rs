use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_codec::{codec, AgentMessage, MessageType};
use agent_core::{AckWaiterMap, DocumentResult, DurabilityConfig as CoreDurabilityConfig, MdsConfig};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::envelope::ReplyEnvelope;
use crate::error::ReplyError;
use crate::observer::{NoopReplyObserver, ReplyObserver};
use crate::sender::ReplySender;
use crate::store;

const SCHEMA_VERSION: u32 = 1;
const LISTENER_PANIC_PAUSE: Duration = Duration::from_secs(2);

/// The worker-pool tunables §4.4 names (`replyQueueLimit`, `backOffSeconds`)
/// plus the write-buffer limit and the failed-reply directory, collapsed
/// into one struct the dispatcher and every worker share read-only.
#[derive(Debug, Clone)]
pub struct ReplyPipelineConfig {
    pub reply_queue_limit: usize,
    pub ack_backoff: Duration,
    pub ws_write_buffer_limit_bytes: usize,
    pub failed_reply_dir: PathBuf,
}

impl ReplyPipelineConfig {
    /// `reply_queue_limit` is sized from `Mds.CommandWorkersLimit` (§6) — the
    /// spec's own name for the reply-worker concurrency ceiling — not from a
    /// second, parallel durability-loop knob.
    pub fn from_core(mds: &MdsConfig, durability: &CoreDurabilityConfig, short_instance_id: &str) -> Self {
        Self {
            reply_queue_limit: mds.command_workers_limit,
            ack_backoff: durability.ack_backoff(),
            ws_write_buffer_limit_bytes: durability.ws_write_buffer_limit_bytes,
            failed_reply_dir: durability.failed_reply_dir(short_instance_id),
        }
    }
}

/// The reply pipeline (§4.4): a listener that turns `DocumentResult`s into
/// `ReplyEnvelope`s, and a dispatcher that runs at most `reply_queue_limit`
/// workers concurrently. Constructed with a `ReplySender` capability rather
/// than the full control channel, per §9's dependency-injection resolution
/// of the control-channel/reply-pipeline cycle.
pub struct ReplyPipeline {
    queue_tx: mpsc::Sender<ReplyEnvelope>,
    closed: CancellationToken,
    tasks: TaskTracker,
}

impl ReplyPipeline {
    pub fn spawn(config: ReplyPipelineConfig, sender: Arc<dyn ReplySender>, ack_waiters: Arc<AckWaiterMap>, results: mpsc::Receiver<DocumentResult>) -> Self {
        Self::spawn_with_observer(config, sender, ack_waiters, results, Arc::new(NoopReplyObserver))
    }

    pub fn spawn_with_observer(config: ReplyPipelineConfig, sender: Arc<dyn ReplySender>, ack_waiters: Arc<AckWaiterMap>, results: mpsc::Receiver<DocumentResult>, observer: Arc<dyn ReplyObserver>) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.reply_queue_limit.max(1) * 4);
        let closed = CancellationToken::new();
        let tasks = TaskTracker::new();

        tasks.spawn(run_listener(results, queue_tx.clone()));
        tasks.spawn(run_dispatcher(queue_rx, Arc::new(config), sender, ack_waiters, observer, closed.clone()));

        Self { queue_tx, closed, tasks }
    }

    /// A cloneable handle producers other than the listener (namely the
    /// failed-reply durability loop) can use to enqueue envelopes onto the
    /// same queue the dispatcher serves.
    pub fn queue_handle(&self) -> mpsc::Sender<ReplyEnvelope> {
        self.queue_tx.clone()
    }

    /// Closes the reply queue, drains every running worker, and returns
    /// only once `allReplyClosed` has fired (§4.4 shutdown). Any other
    /// queue handles (the durability loop's) must also be dropped for the
    /// queue to fully close.
    pub async fn shutdown(self) {
        let ReplyPipeline { queue_tx, closed, tasks } = self;
        drop(queue_tx);
        closed.cancelled().await;
        tasks.close();
        tasks.wait().await;
    }
}

async fn run_listener(mut results: mpsc::Receiver<DocumentResult>, queue_tx: mpsc::Sender<ReplyEnvelope>) {
    loop {
        let result = match results.recv().await {
            Some(result) => result,
            None => {
                debug!(target: "reply_pipeline", "processor result channel closed, stopping listener");
                return;
            }
        };

        let reply_id = Uuid::new_v4();
        let built = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ReplyEnvelope::new(result, reply_id)));
        let envelope = match built {
            Ok(envelope) => envelope,
            Err(_) => {
                warn!(target: "reply_pipeline", "listener panicked building a reply envelope, resuming after a pause");
                tokio::time::sleep(LISTENER_PANIC_PAUSE).await;
                continue;
            }
        };

        if queue_tx.send(envelope).await.is_err() {
            debug!(target: "reply_pipeline", "reply queue closed, stopping listener");
            return;
        }
    }
}

async fn run_dispatcher(mut queue_rx: mpsc::Receiver<ReplyEnvelope>, config: Arc<ReplyPipelineConfig>, sender: Arc<dyn ReplySender>, ack_waiters: Arc<AckWaiterMap>, observer: Arc<dyn ReplyObserver>, closed: CancellationToken) {
    let permits = Arc::new(Semaphore::new(config.reply_queue_limit.max(1)));
    let workers = TaskTracker::new();

    while let Some(envelope) = queue_rx.recv().await {
        let permit = permits.clone().acquire_owned().await.expect("semaphore is never closed while the dispatcher runs");
        let config = config.clone();
        let sender = sender.clone();
        let ack_waiters = ack_waiters.clone();
        let observer = observer.clone();

        workers.spawn(async move {
            run_worker(envelope, config, sender, ack_waiters, observer).await;
            drop(permit);
        });
    }

    workers.close();
    workers.wait().await;
    info!(target: "reply_pipeline", "all reply workers drained");
    closed.cancel();
}

async fn run_worker(mut envelope: ReplyEnvelope, config: Arc<ReplyPipelineConfig>, sender: Arc<dyn ReplySender>, ack_waiters: Arc<AckWaiterMap>, observer: Arc<dyn ReplyObserver>) {
    let message = build_message(&envelope);
    let frame_len = codec::serialize(&message).len();
    if frame_len > config.ws_write_buffer_limit_bytes {
        let err = ReplyError::TooLarge { size: frame_len, limit: config.ws_write_buffer_limit_bytes };
        warn!(target: "reply_pipeline", reply_id = %envelope.reply_id, "dropping oversize reply, no retry: {err}");
        observer.on_oversize(envelope.reply_id, frame_len);
        if let Some(backup) = envelope.backup_file.take() {
            store::delete_backup(&config.failed_reply_dir, &backup).await;
        }
        return;
    }

    loop {
        let rx = ack_waiters.register(envelope.reply_id);
        let acked = match sender.send(message.clone()).await {
            Ok(()) => {
                let acked = matches!(tokio::time::timeout(config.ack_backoff, rx).await, Ok(Ok(())));
                ack_waiters.remove(envelope.reply_id);
                acked
            }
            Err(err) if err.is_not_initialized() => {
                ack_waiters.remove(envelope.reply_id);
                debug!(target: "reply_pipeline", reply_id = %envelope.reply_id, "socket not initialized, persisting for later redelivery");
                persist_envelope(&config, &envelope).await;
                return;
            }
            Err(err) => {
                ack_waiters.remove(envelope.reply_id);
                debug!(target: "reply_pipeline", reply_id = %envelope.reply_id, "send failed: {err}");
                false
            }
        };

        if acked {
            if let Some(backup) = envelope.backup_file.take() {
                store::delete_backup(&config.failed_reply_dir, &backup).await;
            }
            return;
        }

        if envelope.retry_count < envelope.policy.continuous_retries {
            envelope.retry_count += 1;
            observer.on_retry(envelope.reply_id, envelope.retry_count);
            continue;
        }

        if observer.should_persist(&envelope) {
            persist_envelope(&config, &envelope).await;
        }
        return;
    }
}

async fn persist_envelope(config: &ReplyPipelineConfig, envelope: &ReplyEnvelope) {
    if let Err(e) = store::persist(&config.failed_reply_dir, envelope).await {
        warn!(target: "reply_pipeline", reply_id = %envelope.reply_id, "failed to persist reply: {e}");
    }
}

fn build_message(envelope: &ReplyEnvelope) -> AgentMessage {
    let payload = serde_json::to_vec(&envelope.result).expect("DocumentResult always serializes");
    AgentMessage {
        message_type: MessageType::AgentTaskReply,
        schema_version: SCHEMA_VERSION,
        created_date_ms: now_ms(),
        sequence_number: 0,
        flags: 0,
        message_id: envelope.reply_id,
        payload,
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
