pub mod conversations;
pub mod inbox;
pub mod ordered;
pub mod thread;
pub mod unread;

#[cfg(test)]
pub(crate) mod testing;

pub use conversations::{ConversationList, ListChange};
pub use inbox::{Effects, Inbox, InboxError, InboxSnapshot, PendingSend, Selection, Ticket, View};
pub use ordered::{Keyed, OrderedMap};
pub use thread::{ActiveThread, ThreadItem};
pub use unread::{UnreadLedger, UnreadState};
