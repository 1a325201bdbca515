use agent_core::{DocumentResult, DocumentState, ProcessorErrorCode};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// How `Stop` should behave: `Soft` lets in-flight documents finish, `Hard`
/// cancels them immediately. The core never decides which one to use — it
/// only carries whatever the host passes down at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopType {
    Soft,
    Hard,
}

/// The document/command processor the control channel and reply pipeline
/// dispatch into and read results from (§6). Intentionally thin: the
/// processor's internals (plugin execution, session shells, ...) are out of
/// scope for this crate.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Accepts a document for execution. An empty/`Successful` code means
    /// the document was accepted; anything else is surfaced as an ack.
    async fn submit(&self, document: DocumentState) -> ProcessorErrorCode;

    /// Cancels a previously submitted document, identified by the same
    /// message id (e.g. in response to a `ChannelClosed` frame).
    async fn cancel(&self, document: DocumentState);

    /// Starts producing results. The returned receiver yields a
    /// `DocumentResult` per completed/partial result until the processor
    /// closes it.
    async fn start(&self) -> Result<mpsc::Receiver<DocumentResult>, anyhow::Error>;

    /// Requests shutdown per `stop_type`.
    async fn stop(&self, stop_type: StopType);
}
