//! Coordinator tying the unread ledger to the mounted list and thread views.
//!
//! Every view activation hands out a [`Ticket`]. REST work started for a view
//! carries its ticket back, and completions whose ticket no longer matches the
//! mounted view are dropped, so a slow response for a conversation the user
//! already left never lands in the new one.

use super::conversations::{ConversationList, ListChange};
use super::thread::ActiveThread;
use super::unread::UnreadLedger;
use crate::infrastructure::{ApiError, InboxEvent, MessagePage};
use crate::model::{Conversation, Message, MessageDraft};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum InboxError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("24-hour window closed for conversation {0}; only templates can be sent")]
    WindowClosed(String),
    #[error("No conversation is open")]
    NoActiveConversation,
    #[error("Unknown message {0}")]
    UnknownMessage(String),
    #[error("The {0} view is not mounted")]
    NotMounted(View),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    List,
    Thread,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::List => write!(f, "conversation list"),
            View::Thread => write!(f, "thread"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    view: View,
    epoch: u64,
}

impl Ticket {
    pub fn view(&self) -> View {
        self.view
    }
}

/// What an applied input changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub list_changed: bool,
    pub thread_changed: bool,
    pub unread_changed: bool,
    /// The list saw a conversation it does not know and must be refetched.
    pub reseed: bool,
    /// Conversation whose new messages should be marked read on the server.
    pub mark_read: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub ticket: Ticket,
    /// Unread count cleared locally and subtracted from the ledger.
    pub cleared: u32,
    /// Whether the mounted list knew the conversation.
    pub known: bool,
}

/// A message rendered optimistically and waiting for its REST send.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub ticket: Ticket,
    pub conversation_id: String,
    pub temp_id: String,
    pub draft: MessageDraft,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboxSnapshot {
    pub conversations: Vec<Conversation>,
    pub active: Option<String>,
    pub messages: Vec<Message>,
    pub unread_total: u64,
    pub connected: bool,
}

pub struct Inbox {
    ledger: UnreadLedger,
    list: Option<ConversationList>,
    thread: Option<ActiveThread>,
    list_ticket: Option<Ticket>,
    thread_ticket: Option<Ticket>,
    epoch: u64,
}

impl Inbox {
    pub fn new(ledger: UnreadLedger) -> Self {
        Self {
            ledger,
            list: None,
            thread: None,
            list_ticket: None,
            thread_ticket: None,
            epoch: 0,
        }
    }

    pub fn ledger(&self) -> &UnreadLedger {
        &self.ledger
    }

    pub fn list(&self) -> Option<&ConversationList> {
        self.list.as_ref()
    }

    pub fn thread(&self) -> Option<&ActiveThread> {
        self.thread.as_ref()
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.thread.as_ref().map(ActiveThread::conversation_id)
    }

    pub fn list_ticket(&self) -> Option<Ticket> {
        self.list_ticket
    }

    pub fn thread_ticket(&self) -> Option<Ticket> {
        self.thread_ticket
    }

    fn issue(&mut self, view: View) -> Ticket {
        self.epoch += 1;
        Ticket {
            view,
            epoch: self.epoch,
        }
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        let current = match ticket.view {
            View::List => self.list_ticket,
            View::Thread => self.thread_ticket,
        };
        current == Some(ticket)
    }

    /// Show the list. Existing entries are kept until the seed arrives.
    pub fn mount_list(&mut self) -> Ticket {
        let ticket = self.issue(View::List);
        self.list.get_or_insert_with(ConversationList::new);
        self.list_ticket = Some(ticket);
        ticket
    }

    pub fn unmount_list(&mut self) {
        self.list = None;
        self.list_ticket = None;
    }

    /// Seed the list from a REST fetch and reconcile the ledger with it.
    ///
    /// Returns `false` when the ticket is stale.
    pub fn apply_conversations(&mut self, ticket: Ticket, conversations: Vec<Conversation>) -> bool {
        if !self.is_current(ticket) {
            debug!("Dropping stale conversation list");
            return false;
        }
        let active = self.active_conversation().map(str::to_string);
        let Some(list) = self.list.as_mut() else {
            return false;
        };
        list.seed(conversations);
        if let Some(active) = active.as_deref() {
            list.mark_read(active);
        }
        self.ledger.reconcile(list.as_slice());
        true
    }

    /// Open a conversation, clearing its unread count.
    pub fn select(&mut self, conversation_id: &str) -> Selection {
        let ticket = self.issue(View::Thread);
        self.thread = Some(ActiveThread::new(conversation_id));
        self.thread_ticket = Some(ticket);

        let prior = self.list.as_mut().and_then(|l| l.mark_read(conversation_id));
        let cleared = prior.unwrap_or(0);
        if cleared > 0 {
            self.ledger.decrement(cleared as u64);
        }
        info!("Opened conversation {} ({} unread cleared)", conversation_id, cleared);
        Selection {
            ticket,
            cleared,
            known: prior.is_some(),
        }
    }

    pub fn deselect(&mut self) {
        self.thread = None;
        self.thread_ticket = None;
    }

    /// Returns `false` when the ticket is stale.
    pub fn apply_history(&mut self, ticket: Ticket, page_number: u32, page: MessagePage) -> bool {
        if !self.is_current(ticket) {
            debug!("Dropping stale history page {}", page_number);
            return false;
        }
        let Some(thread) = self.thread.as_mut() else {
            return false;
        };
        if page_number <= 1 {
            thread.merge_latest(page);
        } else {
            thread.prepend_page(page);
        }
        true
    }

    /// Ticket and page number of the next older history page, if any.
    pub fn load_older(&self) -> Result<Option<(Ticket, u32)>, InboxError> {
        let thread = self.thread.as_ref().ok_or(InboxError::NoActiveConversation)?;
        let ticket = self.thread_ticket.ok_or(InboxError::NotMounted(View::Thread))?;
        Ok(thread.next_page().map(|page| (ticket, page)))
    }

    /// Route a server event to the ledger and every mounted view.
    pub fn apply_event(&mut self, event: &InboxEvent) -> Effects {
        let mut effects = Effects::default();
        let active = self.active_conversation().map(str::to_string);

        match event {
            InboxEvent::NewMessage(message) => {
                let in_active = active.as_deref() == Some(message.conversation_id.as_str());
                if message.is_incoming() && !in_active {
                    self.ledger.increment(1);
                    effects.unread_changed = true;
                }

                if let Some(list) = self.list.as_mut() {
                    match list.apply_new_message(message, active.as_deref()) {
                        ListChange::NeedsReseed => effects.reseed = true,
                        ListChange::Moved { .. } => effects.list_changed = true,
                    }
                }

                if in_active {
                    if let Some(thread) = self.thread.as_mut() {
                        effects.thread_changed = thread.apply_new_message(message.clone());
                    }
                    if message.is_incoming() {
                        effects.mark_read = Some(message.conversation_id.clone());
                    }
                }
            }
            InboxEvent::ConversationUpdate(conversation) => {
                if let Some(list) = self.list.as_mut() {
                    list.apply_conversation_update(conversation.clone(), active.as_deref());
                    effects.list_changed = true;
                }
            }
            InboxEvent::StatusUpdate(update) => {
                if let Some(thread) = self.thread.as_mut() {
                    effects.thread_changed = thread.apply_status_update(update);
                }
            }
            InboxEvent::ConnectionEstablished => {}
        }
        effects
    }

    /// Render `draft` optimistically in the open thread.
    pub fn begin_send(&mut self, draft: MessageDraft, now: DateTime<Utc>) -> Result<PendingSend, InboxError> {
        let ticket = self.thread_ticket.ok_or(InboxError::NoActiveConversation)?;
        let conversation_id = self
            .active_conversation()
            .ok_or(InboxError::NoActiveConversation)?
            .to_string();

        if draft.requires_open_window() {
            let open = self
                .list
                .as_ref()
                .and_then(|l| l.get(&conversation_id))
                .is_none_or(|c| c.free_messaging_open(now));
            if !open {
                return Err(InboxError::WindowClosed(conversation_id));
            }
        }

        let thread = self.thread.as_mut().ok_or(InboxError::NoActiveConversation)?;
        let temp_id = thread.begin_send(draft.clone(), now);
        Ok(PendingSend {
            ticket,
            conversation_id,
            temp_id,
            draft,
        })
    }

    /// Returns `false` when the thread was switched since the send began.
    pub fn confirm_send(&mut self, ticket: Ticket, temp_id: &str, message: Message) -> bool {
        if let Some(list) = self.list.as_mut() {
            list.apply_new_message(&message, None);
        }
        if !self.is_current(ticket) {
            return false;
        }
        self.thread
            .as_mut()
            .is_some_and(|t| t.confirm_send(temp_id, message))
    }

    pub fn fail_send(&mut self, ticket: Ticket, temp_id: &str) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.thread.as_mut().is_some_and(|t| t.fail_send(temp_id))
    }

    /// Render a failed draft again, then drop the failed entry.
    ///
    /// When the new send is refused the failed entry stays in the thread.
    pub fn retry(&mut self, temp_id: &str, now: DateTime<Utc>) -> Result<PendingSend, InboxError> {
        let thread = self.thread.as_ref().ok_or(InboxError::NoActiveConversation)?;
        let draft = thread
            .failed_draft(temp_id)
            .cloned()
            .ok_or_else(|| InboxError::UnknownMessage(temp_id.to_string()))?;
        let pending = self.begin_send(draft, now)?;
        if let Some(thread) = self.thread.as_mut() {
            thread.discard_failed(temp_id);
        }
        Ok(pending)
    }

    /// Forget a deleted conversation.
    pub fn remove_conversation(&mut self, conversation_id: &str) -> Effects {
        let mut effects = Effects::default();
        if let Some(removed) = self.list.as_mut().and_then(|l| l.remove(conversation_id)) {
            effects.list_changed = true;
            if removed.unread_count > 0 {
                self.ledger.decrement(removed.unread_count as u64);
                effects.unread_changed = true;
            }
        }
        if self.active_conversation() == Some(conversation_id) {
            self.deselect();
            effects.thread_changed = true;
        }
        effects
    }

    pub fn rename_contact(&mut self, contact_id: &str, name: &str) -> bool {
        self.list
            .as_mut()
            .is_some_and(|l| l.rename_contact(contact_id, name) > 0)
    }

    /// Drop all state and end the unread session.
    pub fn logout(&mut self) {
        self.unmount_list();
        self.deselect();
        self.ledger.clear();
    }

    pub fn snapshot(&self, connected: bool) -> InboxSnapshot {
        InboxSnapshot {
            conversations: self
                .list
                .as_ref()
                .map(|l| l.as_slice().to_vec())
                .unwrap_or_default(),
            active: self.active_conversation().map(str::to_string),
            messages: self
                .thread
                .as_ref()
                .map(|t| t.messages().to_vec())
                .unwrap_or_default(),
            unread_total: self.ledger.total(),
            connected,
        }
    }
}
