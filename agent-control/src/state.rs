use strum::Display;

/// `Uninit → TokenFetch → Opening → Open → Reconnecting → Open | Closed` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ControlChannelState {
    #[default]
    Uninit,
    TokenFetch,
    Opening,
    Open,
    Reconnecting,
    Closed,
}
