mod audit;
mod channel;
mod error;
mod reply_sender;
mod signer;
mod state;
mod token_client;

pub use audit::*;
pub use channel::*;
pub use error::*;
pub use signer::*;
pub use state::*;
pub use token_client::*;
