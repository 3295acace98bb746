mod conversation;
mod message;

pub use conversation::*;
pub use message::*;
