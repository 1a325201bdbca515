mod channel;
mod error;

pub use channel::*;
pub use error::*;
