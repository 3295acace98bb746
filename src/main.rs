use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use inbox_sync::app::{App, AppHandle, Notice};
use inbox_sync::config::Config;
use inbox_sync::infrastructure::{RealtimeClient, RestClient, WebSocketTransport};
use inbox_sync::sync::UnreadLedger;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LIST_PREVIEW: usize = 10;
const THREAD_PREVIEW: usize = 5;

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    api_url: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" if i + 1 < args.len() => {
                parsed.config = Some(PathBuf::from(&args[i + 1]));
                i += 1;
            }
            "-u" if i + 1 < args.len() => {
                parsed.api_url = Some(args[i + 1].clone());
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    parsed
}

async fn print_notice(handle: &AppHandle, notice: Notice) -> anyhow::Result<()> {
    match notice {
        Notice::ListChanged => {
            let snapshot = handle.snapshot().await?;
            println!("--- Conversations ({}) ---\r", snapshot.conversations.len());
            for conv in snapshot.conversations.iter().take(LIST_PREVIEW) {
                let marker = if snapshot.active.as_deref() == Some(conv.id.as_str()) {
                    ">"
                } else {
                    " "
                };
                println!(
                    "{} {} [{}] {}\r",
                    marker,
                    conv.display_name(),
                    conv.unread_count,
                    conv.last_message.as_deref().unwrap_or("(no messages)")
                );
            }
        }
        Notice::ThreadChanged => {
            let snapshot = handle.snapshot().await?;
            if let Some(active) = &snapshot.active {
                println!("--- Thread {} ---\r", active);
                let skip = snapshot.messages.len().saturating_sub(THREAD_PREVIEW);
                for msg in snapshot.messages.iter().skip(skip) {
                    let who = if msg.is_incoming() { "<" } else { ">" };
                    println!(
                        "{} {} {} ({})\r",
                        msg.created_at.format("%H:%M"),
                        who,
                        msg.preview().unwrap_or_default(),
                        msg.delivery_status.as_str()
                    );
                }
            }
        }
        Notice::UnreadChanged(total) => println!("Unread: {}\r", total),
        Notice::ConnectionChanged(true) => println!("Live updates connected\r"),
        Notice::ConnectionChanged(false) => println!("Live updates disconnected, retrying\r"),
        Notice::Error(text) => println!("Error: {}\r", text),
        Notice::SendFailed { temp_id, reason } => {
            println!("Send {} failed: {}\r", temp_id, reason)
        }
    }
    Ok(())
}

async fn select_relative(handle: &AppHandle, step: isize) -> anyhow::Result<()> {
    let snapshot = handle.snapshot().await?;
    if snapshot.conversations.is_empty() {
        return Ok(());
    }
    let current = snapshot
        .active
        .as_deref()
        .and_then(|id| snapshot.conversations.iter().position(|c| c.id == id));
    let next = match current {
        Some(idx) => (idx as isize + step).rem_euclid(snapshot.conversations.len() as isize) as usize,
        None => 0,
    };
    handle.select(snapshot.conversations[next].id.clone()).await?;
    Ok(())
}

/// Returns when the user quits or the runtime stops on its own.
async fn key_loop(
    handle: &AppHandle,
    notices: &mut broadcast::Receiver<Notice>,
    runtime: &JoinHandle<()>,
) -> anyhow::Result<()> {
    while !runtime.is_finished() {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match key {
                    KeyEvent { code: KeyCode::Char('q'), .. } => break,
                    KeyEvent { code: KeyCode::Char('c'), modifiers, .. }
                        if modifiers.contains(KeyModifiers::CONTROL) => break,
                    KeyEvent { code: KeyCode::Char('r'), .. } => handle.refresh().await?,
                    KeyEvent { code: KeyCode::Char('j'), .. } => select_relative(handle, 1).await?,
                    KeyEvent { code: KeyCode::Char('k'), .. } => select_relative(handle, -1).await?,
                    KeyEvent { code: KeyCode::Char('x'), .. } => handle.deselect().await?,
                    _ => {}
                }
            }
        }

        match tokio::time::timeout(Duration::from_millis(50), notices.recv()).await {
            Ok(Ok(notice)) => print_notice(handle, notice).await?,
            Ok(Err(RecvError::Lagged(n))) => debug!("Notice receiver lagged by {}", n),
            Ok(Err(RecvError::Closed)) | Err(_) => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let mut config = Config::load(args.config.as_deref())?;
    config.apply_env();
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    config.validate()?;

    let rest = RestClient::new(config.api_base()?, config.token.clone(), config.request_timeout())?;
    let transport = WebSocketTransport::new(config.ws_endpoint()?);
    let realtime = RealtimeClient::with_reconnect_delay(transport, config.reconnect_delay());
    let (app, handle) = App::new(Arc::new(rest), realtime, UnreadLedger::new(), config.app_options());

    let mut notices = handle.notices();
    let runtime = tokio::spawn(app.run());
    handle.mount_list().await?;

    println!("Inbox at {} (q quit, r refresh, j/k select, x close thread)\n", config.api_url);

    crossterm::terminal::enable_raw_mode()?;
    let result = key_loop(&handle, &mut notices, &runtime).await;
    crossterm::terminal::disable_raw_mode()?;
    result?;

    println!("\nShutting down...");
    handle.shutdown();
    runtime.await?;

    Ok(())
}
