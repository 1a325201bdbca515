use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlChannelError {
    #[error("token fetch failed: {0}")]
    TokenFetch(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] agent_ws::WsChannelError),

    #[error("wire codec error: {0}")]
    Wire(#[from] agent_codec::WireError),

    #[error("control channel is not open")]
    NotOpen,

    #[error("endpoint resolution failed: {0}")]
    Endpoint(String),
}
