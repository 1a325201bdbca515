use thiserror::Error;

#[derive(Error, Debug)]
pub enum WsChannelError {
    #[error("handshake rejected: {0}")]
    ConnectFailed(String),

    #[error("channel is not open")]
    ChannelClosed,

    #[error("payload is empty")]
    EmptyPayload,

    #[error("websocket write error: {0}")]
    WriteError(String),

    #[error("websocket read error: {0}")]
    ReadError(String),

    #[error("invalid auth header: {0}")]
    InvalidHeader(String),
}
