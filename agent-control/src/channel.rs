use std::sync::Arc;
use std::time::Duration;

use agent_codec::{codec, AgentMessage, MessageType, SequenceAllocator};
use agent_core::{AckWaiterMap, AgentIdentity, AgentRuntimeConfig, DocumentKind, DocumentState, PlatformType, ProcessorErrorCode};
use agent_processor::{Processor, StopType};
use agent_retry::{Classification, RetryPolicy};
use bytes::Bytes;
use rand::Rng;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use agent_ws::{AuthStrategy, FrameKind, WebSocketChannel, WebSocketChannelConfig};

use crate::audit::AuditLogScheduler;
use crate::error::ControlChannelError;
use crate::signer::RequestSigner;
use crate::state::ControlChannelState;
use crate::token_client::TokenClient;

const AGENT_VERSION: &str = "1.0.0";
const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
struct OpenControlChannelPayload {
    #[serde(rename = "MessageSchemaVersion")]
    message_schema_version: &'static str,
    #[serde(rename = "RequestId")]
    request_id: Uuid,
    #[serde(rename = "TokenValue")]
    token_value: String,
    #[serde(rename = "AgentVersion")]
    agent_version: &'static str,
    #[serde(rename = "PlatformType")]
    platform_type: PlatformType,
}

/// Binds one WebSocket channel to an MGS instance identity and drives the
/// `Uninit → TokenFetch → Opening → Open → Reconnecting → Open | Closed`
/// state machine (§4.3). Owns the ack-waiter map shared with the reply
/// pipeline and classifies every inbound frame.
pub struct ControlChannel {
    identity: AgentIdentity,
    ws: WebSocketChannel,
    state: RwLock<ControlChannelState>,
    token_client: TokenClient,
    rest_endpoint: Url,
    signer: Arc<dyn RequestSigner>,
    ack_waiters: Arc<AckWaiterMap>,
    processor: Arc<dyn Processor>,
    retry_policy: RetryPolicy,
    ws_config: WebSocketChannelConfig,
    sequence: SequenceAllocator,
    agent_runtime: AgentRuntimeConfig,
    audit: RwLock<Option<AuditLogScheduler>>,
}

impl ControlChannel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: AgentIdentity,
        rest_endpoint: Url,
        token_client: TokenClient,
        signer: Arc<dyn RequestSigner>,
        processor: Arc<dyn Processor>,
        ack_waiters: Arc<AckWaiterMap>,
        retry_policy: RetryPolicy,
        ws_config: WebSocketChannelConfig,
        agent_runtime: AgentRuntimeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            ws: WebSocketChannel::new(),
            state: RwLock::new(ControlChannelState::Uninit),
            token_client,
            rest_endpoint,
            signer,
            ack_waiters,
            processor,
            retry_policy,
            ws_config,
            sequence: SequenceAllocator::new(),
            agent_runtime,
            audit: RwLock::new(None),
        })
    }

    pub async fn state(&self) -> ControlChannelState {
        *self.state.read().await
    }

    pub fn is_open(&self) -> bool {
        self.ws.is_open()
    }

    /// Idempotent: safe to call repeatedly, only the first call has effect.
    pub async fn initialize(&self) {
        let mut state = self.state.write().await;
        if *state == ControlChannelState::Uninit {
            *state = ControlChannelState::TokenFetch;
        }
    }

    /// First connect after process start. Adds a uniform jitter before
    /// attempting, per §4.3, to avoid a fleet-wide thundering herd.
    #[instrument(parent = None, skip_all, fields(short_instance_id = %self.identity.short_instance_id()))]
    pub async fn connect(self: &Arc<Self>) -> Result<(), ControlChannelError> {
        let jitter_ms = (self.retry_policy.initial_delay_ms as f64 * self.retry_policy.jitter_ratio) as u64;
        if jitter_ms > 0 {
            let delay = rand::thread_rng().gen_range(0..jitter_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.open_with_retry().await
    }

    /// Closes the current socket (if any) and re-opens under the retry
    /// policy. Driven by the read loop's error callback.
    #[instrument(parent = None, skip_all, fields(short_instance_id = %self.identity.short_instance_id()))]
    pub async fn reconnect(self: &Arc<Self>) -> Result<(), ControlChannelError> {
        *self.state.write().await = ControlChannelState::Reconnecting;
        self.ws.close().await;
        self.open_with_retry().await
    }

    async fn open_with_retry(self: &Arc<Self>) -> Result<(), ControlChannelError> {
        let this = Arc::clone(self);
        agent_retry::retry(
            &self.retry_policy,
            |_err: &ControlChannelError| Classification::Retryable,
            move || {
                let this = Arc::clone(&this);
                async move { this.open_once().await }
            },
        )
        .await
    }

    async fn open_once(self: &Arc<Self>) -> Result<(), ControlChannelError> {
        *self.state.write().await = ControlChannelState::TokenFetch;
        let token = self.token_client.fetch_token(&self.rest_endpoint, self.identity.short_instance_id()).await?;

        let mgs_host = self.rest_endpoint.host_str().ok_or_else(|| ControlChannelError::Endpoint("rest endpoint has no host".to_string()))?;
        let ws_url = agent_core::control_channel_ws_url(mgs_host, self.identity.short_instance_id()).map_err(|e| ControlChannelError::Endpoint(e.to_string()))?;

        *self.state.write().await = ControlChannelState::Opening;

        let canonical = format!("GET\n{}\n", ws_url.path());
        let headers = self.signer.sign(&canonical);

        let this_for_message = Arc::clone(self);
        let this_for_error = Arc::clone(self);

        self.ws
            .open(
                ws_url,
                AuthStrategy::Headers(headers),
                self.ws_config.clone(),
                move |bytes| {
                    let this = Arc::clone(&this_for_message);
                    tokio::spawn(async move {
                        this.handle_inbound(bytes).await;
                    });
                },
                move |err| {
                    warn!(target: "control", "control channel socket error: {err}");
                    let this = Arc::clone(&this_for_error);
                    tokio::spawn(async move {
                        if let Err(e) = this.reconnect().await {
                            warn!(target: "control", "reconnect attempt failed: {e}");
                        }
                    });
                },
            )
            .await?;

        let payload = OpenControlChannelPayload {
            message_schema_version: SCHEMA_VERSION,
            request_id: Uuid::new_v4(),
            token_value: token.into_string(),
            agent_version: AGENT_VERSION,
            platform_type: self.identity.platform_type(),
        };
        let payload_json = serde_json::to_vec(&payload).expect("OpenControlChannelPayload always serializes");
        self.ws.send_message(Bytes::from(payload_json), FrameKind::Text).await?;

        *self.state.write().await = ControlChannelState::Open;
        self.restart_audit_scheduler().await;
        info!(target: "control", "control channel open");
        Ok(())
    }

    /// Replaces any previously running audit-log scheduler with a fresh one
    /// bound to this connection's lifetime (§4.3: "`Open`: ... then starts
    /// the audit scheduler"). Safe to call across reconnects: the old
    /// scheduler, if any, is shut down before the new one is installed.
    async fn restart_audit_scheduler(self: &Arc<Self>) {
        let previous = self.audit.write().await.take();
        if let Some(previous) = previous {
            previous.shutdown().await;
        }

        let this = Arc::clone(self);
        let state_probe: Arc<dyn Fn() -> ControlChannelState + Send + Sync> = Arc::new(move || {
            this.state.try_read().map(|guard| *guard).unwrap_or(ControlChannelState::Opening)
        });
        let scheduler = AuditLogScheduler::spawn(
            self.identity.short_instance_id().to_string(),
            self.agent_runtime.audit_log_interval(),
            self.ack_waiters.clone(),
            state_probe,
        );
        *self.audit.write().await = Some(scheduler);
    }

    /// Serializes `message`, allocating the next sequence number, and sends
    /// it through the underlying socket. Used by the reply pipeline.
    pub async fn send(&self, mut message: AgentMessage) -> Result<(), ControlChannelError> {
        if !self.is_open() {
            return Err(ControlChannelError::NotOpen);
        }
        message.sequence_number = self.sequence.next();
        let bytes = codec::serialize(&message);
        self.ws.send_message(Bytes::from(bytes), FrameKind::Binary).await?;
        Ok(())
    }

    pub fn ack_waiters(&self) -> Arc<AckWaiterMap> {
        self.ack_waiters.clone()
    }

    pub async fn close(&self) {
        *self.state.write().await = ControlChannelState::Closed;
        if let Some(scheduler) = self.audit.write().await.take() {
            scheduler.shutdown().await;
        }
        self.ws.close().await;
    }

    /// Bounded retry for session starts (§7: `ProcessorBufferFull` is the
    /// only retryable code, and only here — up to
    /// `session_submit_retry_attempts` tries, `session_submit_retry_interval`
    /// apart). Any other code, including a first-try success, ends the loop
    /// immediately; `InteractiveShell` never produces an ack frame either way.
    async fn submit_session_with_retry(&self, message_id: Uuid, payload: Vec<u8>) {
        let document = DocumentState::builder().message_id(message_id.to_string()).kind(DocumentKind::SessionStart).payload(payload).build();
        let attempts = self.agent_runtime.session_submit_retry_attempts.max(1);
        let interval = self.agent_runtime.session_submit_retry_interval();

        for attempt in 1..=attempts {
            let code = self.processor.submit(document.clone()).await;
            if !code.is_retryable() {
                return;
            }
            if attempt < attempts {
                warn!(target: "control", attempt, %code, "session submission buffer full, retrying");
                tokio::time::sleep(interval).await;
            } else {
                warn!(target: "control", attempts, "session submission still buffer full after bounded retries, giving up");
            }
        }
    }

    #[instrument(parent = None, skip_all, fields(short_instance_id = %self.identity.short_instance_id()))]
    async fn handle_inbound(&self, bytes: Bytes) {
        let message = match codec::deserialize(&bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "control", "dropping malformed inbound frame: {err}");
                return;
            }
        };

        match message.message_type {
            MessageType::InteractiveShell => {
                self.submit_session_with_retry(message.message_id, message.payload).await;
            }
            MessageType::ChannelClosed => {
                let document = DocumentState::builder().message_id(message.message_id.to_string()).kind(DocumentKind::SessionCancel).payload(message.payload).build();
                self.processor.cancel(document).await;
            }
            MessageType::AgentJob => {
                let document = DocumentState::builder().message_id(message.message_id.to_string()).kind(DocumentKind::Command).payload(message.payload).build();
                let code = self.processor.submit(document).await;
                let ack_bytes = serde_json::to_vec(&agent_job_ack_payload(code)).expect("ack payload always serializes");
                let ack = AgentMessage {
                    message_type: MessageType::AgentJobAck,
                    schema_version: message.schema_version,
                    created_date_ms: message.created_date_ms,
                    sequence_number: 0,
                    flags: 0,
                    message_id: message.message_id,
                    payload: ack_bytes,
                };
                if let Err(err) = self.send(ack).await {
                    warn!(target: "control", "failed to send job acknowledgement: {err}");
                }
            }
            MessageType::AgentJobReplyAck | MessageType::TaskAcknowledge => {
                self.ack_waiters.resolve(message.message_id);
            }
            other => {
                warn!(target: "control", "dropping unhandled inbound message type: {other}");
            }
        }
    }

    pub async fn shutdown(&self, stop_type: StopType) {
        self.processor.stop(stop_type).await;
        self.close().await;
    }
}

/// The `AgentJobAck` payload for a submission result (§7): `StatusCode` is
/// the numeric ack code, `ErrorMessage` the code's own name (`"Successful"`
/// included — the table assigns it status `"200"` too, so a successful
/// submission is acknowledged the same way as a failed one, just with a
/// different code).
fn agent_job_ack_payload(code: ProcessorErrorCode) -> serde_json::Value {
    serde_json::json!({
        "StatusCode": code.ack_status_code(),
        "ErrorMessage": code.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::signer::HmacRequestSigner;

    #[test]
    fn agent_job_ack_payload_carries_status_code_and_error_message() {
        let payload = agent_job_ack_payload(ProcessorErrorCode::ProcessorBufferFull);
        assert_eq!(payload["StatusCode"], "51402");
        assert_eq!(payload["ErrorMessage"], "ProcessorBufferFull");
    }

    #[test]
    fn successful_submission_still_gets_a_200_ack() {
        let payload = agent_job_ack_payload(ProcessorErrorCode::Successful);
        assert_eq!(payload["StatusCode"], "200");
        assert_eq!(payload["ErrorMessage"], "Successful");
    }

    /// Records every `submit`/`cancel` call and returns a scripted sequence
    /// of codes from `submit`, one per call (the last code repeats once the
    /// script is exhausted) — enough to drive §8 scenario 6 (processor
    /// backpressure) deterministically.
    struct ScriptedProcessor {
        submit_calls: AtomicU32,
        cancel_calls: AtomicU32,
        script: Mutex<Vec<ProcessorErrorCode>>,
    }

    impl ScriptedProcessor {
        fn new(script: Vec<ProcessorErrorCode>) -> Arc<Self> {
            Arc::new(Self {
                submit_calls: AtomicU32::new(0),
                cancel_calls: AtomicU32::new(0),
                script: Mutex::new(script),
            })
        }
    }

    #[async_trait]
    impl Processor for ScriptedProcessor {
        async fn submit(&self, _document: DocumentState) -> ProcessorErrorCode {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                *script.last().unwrap()
            }
        }

        async fn cancel(&self, _document: DocumentState) {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn start(&self) -> Result<mpsc::Receiver<DocumentResultAlias>, anyhow::Error> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn stop(&self, _stop_type: StopType) {}
    }

    // `Processor::start` returns `mpsc::Receiver<DocumentResult>`; aliased
    // here purely so the fake above doesn't need to import the type for a
    // method this test suite never calls.
    type DocumentResultAlias = agent_core::DocumentResult;

    fn test_channel(processor: Arc<dyn Processor>, agent_runtime: AgentRuntimeConfig) -> Arc<ControlChannel> {
        let identity = AgentIdentity::builder()
            .short_instance_id("mi-test".to_string())
            .region("us-east-1".to_string())
            .agent_version("1.0.0".to_string())
            .platform_type(PlatformType::Linux)
            .build();
        let signer: Arc<dyn RequestSigner> = Arc::new(HmacRequestSigner::new("AKID", "secret"));
        let token_client = TokenClient::builder().signer(signer.clone()).build();

        ControlChannel::new(
            identity,
            Url::parse("https://ssmmessages.us-east-1.amazonaws.com").unwrap(),
            token_client,
            signer,
            processor,
            Arc::new(AckWaiterMap::new()),
            RetryPolicy {
                initial_delay_ms: 1,
                max_delay_ms: 5,
                geometric_ratio: 2.0,
                jitter_ratio: 0.0,
                max_attempts: 1,
                non_retryable_substrings: Vec::new(),
            },
            WebSocketChannelConfig::default(),
            agent_runtime,
        )
    }

    fn sample_frame(message_type: MessageType, message_id: Uuid, payload: Vec<u8>) -> Bytes {
        Bytes::from(codec::serialize(&AgentMessage {
            message_type,
            schema_version: 1,
            created_date_ms: 1_700_000_000_000,
            sequence_number: 0,
            flags: 0,
            message_id,
            payload,
        }))
    }

    #[tokio::test]
    async fn channel_closed_frame_cancels_exactly_once() {
        let processor = ScriptedProcessor::new(vec![ProcessorErrorCode::Successful]);
        let channel = test_channel(processor.clone(), AgentRuntimeConfig::default());

        let frame = sample_frame(MessageType::ChannelClosed, Uuid::new_v4(), b"{}".to_vec());
        channel.handle_inbound(frame).await;

        assert_eq!(processor.cancel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(processor.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_message_type_is_dropped_without_touching_the_processor() {
        let processor = ScriptedProcessor::new(vec![ProcessorErrorCode::Successful]);
        let channel = test_channel(processor.clone(), AgentRuntimeConfig::default());

        let frame = sample_frame(MessageType::TaskComplete, Uuid::new_v4(), Vec::new());
        channel.handle_inbound(frame).await;

        assert_eq!(processor.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(processor.cancel_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_without_a_panic() {
        let processor = ScriptedProcessor::new(vec![ProcessorErrorCode::Successful]);
        let channel = test_channel(processor.clone(), AgentRuntimeConfig::default());

        channel.handle_inbound(Bytes::from_static(b"not a valid frame")).await;

        assert_eq!(processor.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reply_ack_resolves_the_matching_waiter_and_nothing_else() {
        let processor = ScriptedProcessor::new(vec![ProcessorErrorCode::Successful]);
        let channel = test_channel(processor.clone(), AgentRuntimeConfig::default());

        let reply_id = Uuid::new_v4();
        let rx = channel.ack_waiters().register(reply_id);

        let frame = sample_frame(MessageType::AgentJobReplyAck, reply_id, Vec::new());
        channel.handle_inbound(frame).await;

        assert!(rx.await.is_ok());
    }

    /// §8 scenario 6: a session submission returns `ProcessorBufferFull`
    /// four times, then succeeds on the fifth try — exactly one call per
    /// attempt, no ack frame (sessions never produce one either way).
    #[tokio::test]
    async fn session_backpressure_retries_until_success_then_stops() {
        let processor = ScriptedProcessor::new(vec![
            ProcessorErrorCode::ProcessorBufferFull,
            ProcessorErrorCode::ProcessorBufferFull,
            ProcessorErrorCode::ProcessorBufferFull,
            ProcessorErrorCode::ProcessorBufferFull,
            ProcessorErrorCode::Successful,
        ]);
        let mut agent_runtime = AgentRuntimeConfig::default();
        agent_runtime.session_submit_retry_attempts = 5;
        agent_runtime.session_submit_retry_interval_ms = 1;
        let channel = test_channel(processor.clone(), agent_runtime);

        let frame = sample_frame(MessageType::InteractiveShell, Uuid::new_v4(), b"{}".to_vec());
        channel.handle_inbound(frame).await;

        assert_eq!(processor.submit_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn session_backpressure_gives_up_after_bounded_attempts() {
        let processor = ScriptedProcessor::new(vec![ProcessorErrorCode::ProcessorBufferFull]);
        let mut agent_runtime = AgentRuntimeConfig::default();
        agent_runtime.session_submit_retry_attempts = 3;
        agent_runtime.session_submit_retry_interval_ms = 1;
        let channel = test_channel(processor.clone(), agent_runtime);

        let frame = sample_frame(MessageType::InteractiveShell, Uuid::new_v4(), b"{}".to_vec());
        channel.handle_inbound(frame).await;

        assert_eq!(processor.submit_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_session_code_stops_after_one_attempt() {
        let processor = ScriptedProcessor::new(vec![ProcessorErrorCode::InvalidDocument]);
        let channel = test_channel(processor.clone(), AgentRuntimeConfig::default());

        let frame = sample_frame(MessageType::InteractiveShell, Uuid::new_v4(), b"{}".to_vec());
        channel.handle_inbound(frame).await;

        assert_eq!(processor.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn agent_job_submits_once_and_attempts_to_send_an_ack() {
        // `send` fails before the socket is ever opened (`NotOpen`); this
        // test only asserts the processor dispatch side, since capturing
        // the outbound frame needs a live socket (covered in `agent-ws`).
        let processor = ScriptedProcessor::new(vec![ProcessorErrorCode::Successful]);
        let channel = test_channel(processor.clone(), AgentRuntimeConfig::default());

        let frame = sample_frame(MessageType::AgentJob, Uuid::new_v4(), b"{}".to_vec());
        channel.handle_inbound(frame).await;

        assert_eq!(processor.submit_calls.load(Ordering::SeqCst), 1);
    }
}
