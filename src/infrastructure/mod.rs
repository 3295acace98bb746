pub mod api;
pub mod realtime;
pub mod transport;

pub use api::{ApiError, InboxRepository, MessagePage, RestClient};
pub use realtime::{EventKind, InboxEvent, RealtimeClient, Subscription};
pub use transport::{Transport, TransportError, TransportSignal, WebSocketTransport};
