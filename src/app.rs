//! The inbox runtime: one task owning all view state.
//!
//! Realtime events, REST completions, UI commands and the periodic refresh are
//! all funnelled into a single `select!` loop. REST calls run in spawned tasks
//! and post their results back as completions.

use crate::infrastructure::{
    ApiError, EventKind, InboxEvent, InboxRepository, MessagePage, RealtimeClient, Subscription,
    Transport,
};
use crate::model::{ContactSummary, Conversation, Message, MessageDraft, MessageType};
use crate::sync::{Effects, Inbox, InboxSnapshot, PendingSend, Ticket, UnreadLedger};
use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 64;
const NOTICE_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub page_size: u32,
    pub refresh_interval: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            page_size: crate::infrastructure::api::DEFAULT_PAGE_SIZE,
            refresh_interval: Duration::from_secs(60),
        }
    }
}

/// Change notifications for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    ListChanged,
    ThreadChanged,
    UnreadChanged(u64),
    ConnectionChanged(bool),
    /// Recoverable failure; prior state was kept.
    Error(String),
    SendFailed { temp_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Inbox runtime has stopped")]
    Stopped,
}

enum Command {
    MountList,
    UnmountList,
    Select(String),
    Deselect,
    Send(MessageDraft),
    Retry(String),
    LoadOlder,
    Refresh,
    DeleteConversation(String),
    UpdateContact { contact_id: String, name: String },
    Snapshot(oneshot::Sender<InboxSnapshot>),
    Logout,
}

enum Completion {
    Conversations(Ticket, Result<Vec<Conversation>, ApiError>),
    History {
        ticket: Ticket,
        page: u32,
        result: Result<MessagePage, ApiError>,
    },
    Sent {
        ticket: Ticket,
        temp_id: String,
        result: Result<Message, ApiError>,
    },
    MarkedRead {
        conversation_id: String,
        counted: bool,
        result: Result<u64, ApiError>,
    },
    LedgerRefreshed(Result<u64, ApiError>),
    Deleted {
        conversation_id: String,
        result: Result<(), ApiError>,
    },
    ContactUpdated(Result<ContactSummary, ApiError>),
}

/// Cloneable front end of a running [`App`].
#[derive(Clone)]
pub struct AppHandle {
    commands: mpsc::Sender<Command>,
    notices: broadcast::Sender<Notice>,
    shutdown: CancellationToken,
}

impl AppHandle {
    async fn command(&self, command: Command) -> Result<(), AppError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::Stopped)
    }

    pub async fn mount_list(&self) -> Result<(), AppError> {
        self.command(Command::MountList).await
    }

    pub async fn unmount_list(&self) -> Result<(), AppError> {
        self.command(Command::UnmountList).await
    }

    pub async fn select(&self, conversation_id: impl Into<String>) -> Result<(), AppError> {
        self.command(Command::Select(conversation_id.into())).await
    }

    pub async fn deselect(&self) -> Result<(), AppError> {
        self.command(Command::Deselect).await
    }

    pub async fn send_text(&self, body: impl Into<String>) -> Result<(), AppError> {
        self.command(Command::Send(MessageDraft::Text { body: body.into() }))
            .await
    }

    pub async fn send_media(
        &self,
        media_type: MessageType,
        media_url: impl Into<String>,
        caption: Option<String>,
    ) -> Result<(), AppError> {
        self.command(Command::Send(MessageDraft::Media {
            media_type,
            media_url: media_url.into(),
            caption,
        }))
        .await
    }

    pub async fn send_template(
        &self,
        name: impl Into<String>,
        language: impl Into<String>,
        components: Vec<Value>,
    ) -> Result<(), AppError> {
        self.command(Command::Send(MessageDraft::Template {
            name: name.into(),
            language: language.into(),
            components,
        }))
        .await
    }

    pub async fn retry(&self, temp_id: impl Into<String>) -> Result<(), AppError> {
        self.command(Command::Retry(temp_id.into())).await
    }

    pub async fn load_older(&self) -> Result<(), AppError> {
        self.command(Command::LoadOlder).await
    }

    pub async fn refresh(&self) -> Result<(), AppError> {
        self.command(Command::Refresh).await
    }

    pub async fn delete_conversation(&self, conversation_id: impl Into<String>) -> Result<(), AppError> {
        self.command(Command::DeleteConversation(conversation_id.into()))
            .await
    }

    pub async fn update_contact(
        &self,
        contact_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<(), AppError> {
        self.command(Command::UpdateContact {
            contact_id: contact_id.into(),
            name: name.into(),
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<InboxSnapshot, AppError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| AppError::Stopped)
    }

    /// End the session and stop the runtime.
    pub async fn logout(&self) -> Result<(), AppError> {
        self.command(Command::Logout).await
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// State owned by the loop, kept apart from the channels it selects over.
struct Runtime<T: Transport> {
    inbox: Inbox,
    repository: Arc<dyn InboxRepository>,
    realtime: Arc<RealtimeClient<T>>,
    options: AppOptions,
    completions: mpsc::UnboundedSender<Completion>,
    notices: broadcast::Sender<Notice>,
    shutdown: CancellationToken,
}

pub struct App<T: Transport> {
    runtime: Runtime<T>,
    commands: mpsc::Receiver<Command>,
    completions: mpsc::UnboundedReceiver<Completion>,
    events: mpsc::UnboundedReceiver<InboxEvent>,
    connection: watch::Receiver<bool>,
    _subscription: Subscription,
}

impl<T: Transport + 'static> App<T> {
    pub fn new(
        repository: Arc<dyn InboxRepository>,
        realtime: RealtimeClient<T>,
        ledger: UnreadLedger,
        options: AppOptions,
    ) -> (Self, AppHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);
        let shutdown = CancellationToken::new();

        let subscription = realtime.subscribe(&EventKind::ALL, move |event: &InboxEvent| {
            let _ = event_tx.send(event.clone());
        });
        let connection = realtime.connection();

        let handle = AppHandle {
            commands: command_tx,
            notices: notices.clone(),
            shutdown: shutdown.clone(),
        };
        let app = Self {
            runtime: Runtime {
                inbox: Inbox::new(ledger),
                repository,
                realtime: Arc::new(realtime),
                options,
                completions: completion_tx,
                notices,
                shutdown,
            },
            commands,
            completions,
            events,
            connection,
            _subscription: subscription,
        };
        (app, handle)
    }

    pub async fn run(self) {
        let App {
            mut runtime,
            mut commands,
            mut completions,
            mut events,
            mut connection,
            _subscription,
        } = self;

        runtime.realtime.start().await;
        runtime.refresh_ledger();

        let period = runtime.options.refresh_interval;
        let mut refresh = tokio::time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = runtime.shutdown.clone();

        info!("Inbox runtime started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = events.recv() => runtime.on_event(event),
                Some(completion) = completions.recv() => runtime.on_completion(completion),
                command = commands.recv() => match command {
                    Some(command) => runtime.on_command(command),
                    None => break,
                },
                Ok(()) = connection.changed() => {
                    let connected = *connection.borrow_and_update();
                    runtime.notify(Notice::ConnectionChanged(connected));
                }
                _ = refresh.tick() => runtime.refresh(),
            }
        }

        drop(_subscription);
        runtime.realtime.shutdown().await;
        info!("Inbox runtime stopped");
    }
}

impl<T: Transport + 'static> Runtime<T> {
    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn notify_unread(&self) {
        self.notify(Notice::UnreadChanged(self.inbox.ledger().total()));
    }

    fn notify_effects(&self, effects: &Effects) {
        if effects.list_changed {
            self.notify(Notice::ListChanged);
        }
        if effects.thread_changed {
            self.notify(Notice::ThreadChanged);
        }
        if effects.unread_changed {
            self.notify_unread();
        }
    }

    /// Run a REST call off the loop; its result comes back as a completion.
    fn spawn<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                completion = call => {
                    let _ = completions.send(completion);
                }
            }
        });
    }

    fn fetch_conversations(&self, ticket: Ticket) {
        let repository = self.repository.clone();
        self.spawn(async move {
            Completion::Conversations(ticket, repository.list_conversations().await)
        });
    }

    fn fetch_history(&self, ticket: Ticket, conversation_id: String, page: u32) {
        let repository = self.repository.clone();
        let page_size = self.options.page_size;
        self.spawn(async move {
            let result = repository
                .list_messages(&conversation_id, page, page_size)
                .await;
            Completion::History {
                ticket,
                page,
                result,
            }
        });
    }

    fn mark_read(&self, conversation_id: String, counted: bool) {
        let repository = self.repository.clone();
        self.spawn(async move {
            let result = repository.mark_as_read(&conversation_id).await;
            Completion::MarkedRead {
                conversation_id,
                counted,
                result,
            }
        });
    }

    fn refresh_ledger(&self) {
        let repository = self.repository.clone();
        let ledger = self.inbox.ledger().clone();
        self.spawn(async move { Completion::LedgerRefreshed(ledger.refresh(repository.as_ref()).await) });
    }

    fn dispatch_send(&self, pending: PendingSend) {
        let repository = self.repository.clone();
        self.spawn(async move {
            let PendingSend {
                ticket,
                conversation_id,
                temp_id,
                draft,
            } = pending;
            let result = match &draft {
                MessageDraft::Text { body } => repository.send_text(&conversation_id, body).await,
                MessageDraft::Media {
                    media_type,
                    media_url,
                    caption,
                } => {
                    repository
                        .send_media(&conversation_id, *media_type, media_url, caption.as_deref())
                        .await
                }
                MessageDraft::Template {
                    name,
                    language,
                    components,
                } => {
                    repository
                        .send_template(&conversation_id, name, language, components)
                        .await
                }
            };
            Completion::Sent {
                ticket,
                temp_id,
                result,
            }
        });
    }

    /// Reseed whatever is mounted. The list fetch also reconciles the ledger.
    fn refresh(&self) {
        debug!("Refreshing inbox");
        match self.inbox.list_ticket() {
            Some(ticket) => self.fetch_conversations(ticket),
            None => self.refresh_ledger(),
        }
        if let (Some(ticket), Some(id)) = (self.inbox.thread_ticket(), self.inbox.active_conversation()) {
            self.fetch_history(ticket, id.to_string(), 1);
        }
    }

    fn on_event(&mut self, event: InboxEvent) {
        let effects = self.inbox.apply_event(&event);
        self.notify_effects(&effects);

        if effects.reseed {
            if let Some(ticket) = self.inbox.list_ticket() {
                self.fetch_conversations(ticket);
            }
        }
        if let Some(conversation_id) = effects.mark_read {
            self.mark_read(conversation_id, true);
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::MountList => {
                let ticket = self.inbox.mount_list();
                self.notify(Notice::ListChanged);
                self.fetch_conversations(ticket);
            }
            Command::UnmountList => {
                self.inbox.unmount_list();
                self.notify(Notice::ListChanged);
            }
            Command::Select(conversation_id) => {
                let selection = self.inbox.select(&conversation_id);
                self.notify(Notice::ThreadChanged);
                if selection.cleared > 0 {
                    self.notify(Notice::ListChanged);
                    self.notify_unread();
                }
                self.fetch_history(selection.ticket, conversation_id.clone(), 1);
                self.mark_read(conversation_id, selection.known);
            }
            Command::Deselect => {
                self.inbox.deselect();
                self.notify(Notice::ThreadChanged);
            }
            Command::Send(draft) => match self.inbox.begin_send(draft, Utc::now()) {
                Ok(pending) => {
                    self.notify(Notice::ThreadChanged);
                    self.dispatch_send(pending);
                }
                Err(e) => self.notify(Notice::Error(e.to_string())),
            },
            Command::Retry(temp_id) => match self.inbox.retry(&temp_id, Utc::now()) {
                Ok(pending) => {
                    self.notify(Notice::ThreadChanged);
                    self.dispatch_send(pending);
                }
                Err(e) => self.notify(Notice::Error(e.to_string())),
            },
            Command::LoadOlder => match self.inbox.load_older() {
                Ok(Some((ticket, page))) => {
                    if let Some(id) = self.inbox.active_conversation() {
                        self.fetch_history(ticket, id.to_string(), page);
                    }
                }
                Ok(None) => debug!("No older history to load"),
                Err(e) => self.notify(Notice::Error(e.to_string())),
            },
            Command::Refresh => self.refresh(),
            Command::DeleteConversation(conversation_id) => {
                let repository = self.repository.clone();
                self.spawn(async move {
                    let result = repository.delete_conversation(&conversation_id).await;
                    Completion::Deleted {
                        conversation_id,
                        result,
                    }
                });
            }
            Command::UpdateContact { contact_id, name } => {
                let repository = self.repository.clone();
                self.spawn(async move {
                    Completion::ContactUpdated(repository.update_contact(&contact_id, &name).await)
                });
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.inbox.snapshot(self.realtime.is_connected()));
            }
            Command::Logout => {
                info!("Logging out");
                self.inbox.logout();
                self.notify(Notice::ListChanged);
                self.notify(Notice::ThreadChanged);
                self.notify_unread();
                self.shutdown.cancel();
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Conversations(ticket, Ok(conversations)) => {
                if self.inbox.apply_conversations(ticket, conversations) {
                    self.notify(Notice::ListChanged);
                    self.notify_unread();
                }
            }
            Completion::Conversations(_, Err(e)) => {
                warn!("Failed to load conversations: {}", e);
                self.notify(Notice::Error(format!("Failed to load conversations: {}", e)));
            }
            Completion::History {
                ticket,
                page,
                result: Ok(messages),
            } => {
                if self.inbox.apply_history(ticket, page, messages) {
                    self.notify(Notice::ThreadChanged);
                }
            }
            Completion::History {
                page, result: Err(e), ..
            } => {
                warn!("Failed to load history page {}: {}", page, e);
                self.notify(Notice::Error(format!("Failed to load messages: {}", e)));
            }
            Completion::Sent {
                ticket,
                temp_id,
                result: Ok(message),
            } => {
                self.inbox.confirm_send(ticket, &temp_id, message);
                self.notify(Notice::ThreadChanged);
                self.notify(Notice::ListChanged);
            }
            Completion::Sent {
                ticket,
                temp_id,
                result: Err(e),
            } => {
                warn!("Send of {} failed: {}", temp_id, e);
                if self.inbox.fail_send(ticket, &temp_id) {
                    self.notify(Notice::ThreadChanged);
                }
                self.notify(Notice::SendFailed {
                    temp_id,
                    reason: e.to_string(),
                });
            }
            Completion::MarkedRead {
                conversation_id,
                counted,
                result,
            } => match result {
                Ok(marked) => {
                    debug!("Marked {} messages read in {}", marked, conversation_id);
                    if !counted && marked > 0 {
                        self.refresh_ledger();
                    }
                }
                Err(e) => {
                    warn!("Failed to mark {} as read: {}", conversation_id, e);
                    self.refresh_ledger();
                }
            },
            Completion::LedgerRefreshed(Ok(_)) => self.notify_unread(),
            Completion::LedgerRefreshed(Err(e)) => {
                warn!("Failed to refresh unread count: {}", e);
                self.notify(Notice::Error(format!("Failed to refresh unread count: {}", e)));
            }
            Completion::Deleted {
                conversation_id,
                result: Ok(()),
            } => {
                info!("Deleted conversation {}", conversation_id);
                let effects = self.inbox.remove_conversation(&conversation_id);
                self.notify_effects(&effects);
            }
            Completion::Deleted {
                conversation_id,
                result: Err(e),
            } => {
                self.notify(Notice::Error(format!(
                    "Failed to delete conversation {}: {}",
                    conversation_id, e
                )));
            }
            Completion::ContactUpdated(Ok(contact)) => {
                if self.inbox.rename_contact(&contact.id, &contact.name) {
                    self.notify(Notice::ListChanged);
                }
            }
            Completion::ContactUpdated(Err(e)) => {
                self.notify(Notice::Error(format!("Failed to update contact: {}", e)));
            }
        }
    }
}
