use super::{Transport, TransportError, TransportSignal};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    url: Url,
    sink: Arc<Mutex<Option<SplitSink<WsStream, Message>>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    sender: broadcast::Sender<TransportSignal>,
    connected: Arc<AtomicBool>,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            url,
            sink: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            sender,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_reader(
        mut stream: SplitStream<WsStream>,
        sender: broadcast::Sender<TransportSignal>,
        connected: Arc<AtomicBool>,
        sink: Arc<Mutex<Option<SplitSink<WsStream, Message>>>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received: {}", text);
                        if sender.send(TransportSignal::Frame(text.to_string())).is_err() {}
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by server ({})", f.code))
                            .unwrap_or_else(|| "closed by server".to_string());
                        info!("WebSocket {}", reason);
                        break reason;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket read error: {}", e);
                        break e.to_string();
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break "stream ended".to_string();
                    }
                }
            };

            connected.store(false, Ordering::SeqCst);
            sink.lock().await.take();
            if sender.send(TransportSignal::Closed(reason)).is_err() {}
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        info!("Connecting to {}", self.url);
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (sink, stream) = socket.split();

        {
            let mut sink_guard = self.sink.lock().await;
            *sink_guard = Some(sink);
        }

        self.connected.store(true, Ordering::SeqCst);
        if self.sender.send(TransportSignal::Opened).is_err() {}

        let handle = Self::spawn_reader(
            stream,
            self.sender.clone(),
            self.connected.clone(),
            self.sink.clone(),
        );

        {
            let mut reader_guard = self.reader.lock().await;
            if let Some(old) = reader_guard.replace(handle) {
                old.abort();
            }
        }

        info!("WebSocket connected");
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::ConnectionClosed)?;

        sink.send(Message::Text(text.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        debug!("Sent: {}", text);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportSignal> {
        self.sender.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        {
            let mut reader_guard = self.reader.lock().await;
            if let Some(reader) = reader_guard.take() {
                reader.abort();
            }
        }

        {
            let mut sink_guard = self.sink.lock().await;
            if let Some(mut sink) = sink_guard.take() {
                if let Err(e) = sink.close().await {
                    debug!("Close handshake failed: {}", e);
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected from {}", self.url);
        Ok(())
    }
}
