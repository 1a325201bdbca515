mod ack_waiter;
mod config;
mod document;
mod endpoint;
mod error;
mod identity;

pub use ack_waiter::*;
pub use config::*;
pub use document::*;
pub use endpoint::*;
pub use error::*;
pub use identity::*;

pub mod prelude {
    pub use crate::ack_waiter::*;
    pub use crate::config::*;
    pub use crate::document::*;
    pub use crate::endpoint::*;
    pub use crate::error::*;
    pub use crate::identity::*;
}
