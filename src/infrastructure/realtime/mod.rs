pub mod client;
pub mod types;

pub use client::{DEFAULT_RECONNECT_DELAY, EventHandler, RealtimeClient, Subscription};
pub use types::{EventKind, InboxEvent, parse_frame};
