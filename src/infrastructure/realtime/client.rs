use super::types::{EventKind, InboxEvent, parse_frame};
use crate::infrastructure::transport::{Transport, TransportError, TransportSignal};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &InboxEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&InboxEvent) + Send + Sync,
{
    fn handle(&self, event: &InboxEvent) {
        self(event)
    }
}

struct Registration {
    kinds: Vec<EventKind>,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    entries: RwLock<HashMap<u64, Registration>>,
}

impl Registry {
    fn insert(&self, kinds: Vec<EventKind>, handler: Arc<dyn EventHandler>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Registration { kinds, handler });
        id
    }

    fn replace(&self, id: u64, handler: Arc<dyn EventHandler>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&id) {
            Some(registration) => {
                registration.handler = handler;
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: u64) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Handlers are looked up per event, so a swapped handler takes effect on
    /// the next dispatch.
    fn dispatch(&self, event: &InboxEvent) {
        let kind = event.kind();
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let mut matching: Vec<(&u64, &Registration)> = entries
                .iter()
                .filter(|(_, r)| r.kinds.contains(&kind))
                .collect();
            matching.sort_by_key(|(id, _)| **id);
            matching.into_iter().map(|(_, r)| r.handler.clone()).collect()
        };

        for handler in handlers {
            handler.handle(event);
        }
    }
}

/// Stable handle for one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_handler<H: EventHandler + 'static>(&self, handler: H) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.replace(self.id, Arc::new(handler)),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

struct Reconnector<T: Transport> {
    transport: Arc<T>,
    pending: Arc<AtomicBool>,
    delay: Duration,
    shutdown: CancellationToken,
}

impl<T: Transport> Clone for Reconnector<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            pending: self.pending.clone(),
            delay: self.delay,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<T: Transport + 'static> Reconnector<T> {
    /// At most one timer is armed at a time.
    fn schedule(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if self.pending.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already pending");
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = this.shutdown.cancelled() => {
                    this.pending.store(false, Ordering::SeqCst);
                    return;
                }
                _ = tokio::time::sleep(this.delay) => {}
            }

            this.pending.store(false, Ordering::SeqCst);
            info!("Reconnecting to inbox updates");
            if let Err(e) = this.transport.connect().await {
                warn!("Reconnect failed: {}", e);
                this.schedule();
            }
        });
    }
}

/// Owns the single live connection and fans classified events out to subscribers.
pub struct RealtimeClient<T: Transport> {
    transport: Arc<T>,
    registry: Arc<Registry>,
    connected: Arc<watch::Sender<bool>>,
    reconnector: Reconnector<T>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl<T: Transport + 'static> RealtimeClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_reconnect_delay(transport, DEFAULT_RECONNECT_DELAY)
    }

    pub fn with_reconnect_delay(transport: T, delay: Duration) -> Self {
        let transport = Arc::new(transport);
        let shutdown = CancellationToken::new();
        let (connected, _) = watch::channel(false);

        Self {
            reconnector: Reconnector {
                transport: transport.clone(),
                pending: Arc::new(AtomicBool::new(false)),
                delay,
                shutdown: shutdown.clone(),
            },
            transport,
            registry: Arc::new(Registry::default()),
            connected: Arc::new(connected),
            shutdown,
            started: AtomicBool::new(false),
        }
    }

    /// Begin receiving and open the connection. A failed first attempt is
    /// retried on the reconnect schedule, so this never fails.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.spawn_receiver();

        if let Err(e) = self.transport.connect().await {
            warn!("Initial connection failed: {}", e);
            self.reconnector.schedule();
        }
    }

    fn spawn_receiver(&self) {
        let mut signals = self.transport.subscribe();
        let registry = self.registry.clone();
        let connected = self.connected.clone();
        let reconnector = self.reconnector.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    signal = signals.recv() => signal,
                };

                match signal {
                    Ok(TransportSignal::Opened) => {
                        info!("Inbox updates connected");
                        connected.send_replace(true);
                    }
                    Ok(TransportSignal::Frame(text)) => {
                        if let Some(event) = parse_frame(&text) {
                            debug!("Dispatching {}", event.kind().as_str());
                            registry.dispatch(&event);
                        }
                    }
                    Ok(TransportSignal::Closed(reason)) => {
                        warn!("Inbox updates disconnected: {}", reason);
                        connected.send_replace(false);
                        reconnector.schedule();
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Transport receiver lagged by {} signals", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Transport signal channel closed");
                        break;
                    }
                }
            }
        });
    }

    pub fn subscribe<H: EventHandler + 'static>(&self, kinds: &[EventKind], handler: H) -> Subscription {
        let id = self.registry.insert(kinds.to_vec(), Arc::new(handler));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn connection(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Client-initiated signaling. Nothing is queued while disconnected.
    pub async fn send<E: Serialize + ?Sized>(&self, event: &E) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        let text =
            serde_json::to_string(event).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.transport.send(&text).await
    }

    /// Cancel the reconnect timer, stop dispatch and close the socket.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.registry.clear();
        if let Err(e) = self.transport.disconnect().await {
            debug!("Disconnect failed: {}", e);
        }
        self.connected.send_replace(false);
        info!("Realtime client shut down");
    }
}
