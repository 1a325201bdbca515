pub mod codec;
mod error;
mod frame;
mod message_type;

pub use codec::*;
pub use error::*;
pub use frame::*;
pub use message_type::*;
