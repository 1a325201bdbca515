mod durability;
mod envelope;
mod error;
mod observer;
mod pipeline;
mod sender;
mod store;

pub use durability::*;
pub use envelope::*;
pub use error::*;
pub use observer::*;
pub use pipeline::*;
pub use sender::*;
pub use store::{delete_backup, failed_reply_dir, list_sorted, load, persist};
