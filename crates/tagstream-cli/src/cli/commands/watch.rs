//! Live session watcher.
//!
//! Feeds the inbox into the controller, prints snapshots as they change and
//! forwards stdin lines through the socket channel.

use anyhow::{Context, Result};
use tagstream_core::channel::{SocketConnector, SseConnector};
use tagstream_core::config::parse_url;
use tagstream_core::{
    ChannelKind, ChannelPhase, Config, SessionController, SessionInbox, SessionMode, SessionNotice, SessionSnapshot,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cli::render;

pub struct WatchOptions<'a> {
    pub config: &'a Config,
    pub events_url: Option<&'a str>,
    pub socket_url: Option<&'a str>,
    pub mode: Option<SessionMode>,
    pub json: bool,
    pub once: bool,
}

pub async fn run(opts: WatchOptions<'_>) -> Result<()> {
    let mode = opts.mode.unwrap_or(opts.config.channels.mode);
    let (mut controller, mut inbox) = build_session(&opts, mode)?;
    let mut snapshots = controller.subscribe_snapshot();
    let mut notices = controller.subscribe_notices();

    controller.connect().context("connect session")?;
    debug!(%mode, "Session connecting");

    let deadline = opts.config.connect_timeout().map(|timeout| Instant::now() + timeout);
    let mut printer = Printer::new(opts.json);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = mode.requires(ChannelKind::Socket);
    let mut ever_connected = false;
    let mut exhausted: Vec<ChannelKind> = Vec::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            event = inbox.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                controller.handle(event);
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !line.trim().is_empty()
                        && let Err(err) = controller.send(line)
                    {
                        eprintln!("{err}");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!("Stopped reading stdin: {err}");
                    stdin_open = false;
                }
            },
            () = wait_until(deadline), if !ever_connected => {
                let secs = opts.config.channels.connect_timeout_secs;
                break Err(anyhow::anyhow!("Timed out after {secs}s waiting for the {mode} session to connect"));
            }
            _ = &mut ctrl_c => break Ok(()),
        }

        ever_connected |= controller.is_connected();

        loop {
            match notices.try_recv() {
                Ok(notice) => {
                    if let SessionNotice::ReconnectExhausted { channel, .. } = &notice
                        && !exhausted.contains(channel)
                    {
                        exhausted.push(*channel);
                    }
                    if let Some(line) = render::notice(&notice) {
                        eprintln!("{line}");
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Dropped session notices"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        if snapshots.has_changed().unwrap_or(false) {
            let snapshot = snapshots.borrow_and_update().clone();
            printer.update(&snapshot)?;
            if opts.once && snapshot.complete {
                break Ok(());
            }
        }

        exhausted.retain(|kind| phase(&controller, *kind) == Some(ChannelPhase::Error));
        if session_ended(&controller, mode, &exhausted) {
            break if exhausted.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("Session ended: reconnect attempts exhausted"))
            };
        }
    };

    controller.disconnect();
    printer.finish(&controller.snapshot());
    outcome
}

fn build_session(opts: &WatchOptions<'_>, mode: SessionMode) -> Result<(SessionController, SessionInbox)> {
    let config = opts.config;
    let mut builder = SessionController::builder(mode)
        .vocabulary(config.vocabulary())
        .decoder(config.decoder())
        .reconnect_policy(config.reconnect_policy());

    if mode.requires(ChannelKind::Events) {
        let url = match opts.events_url {
            Some(raw) => parse_url(raw, &["http", "https"]).context("parse --events")?,
            None => config.events_url()?,
        };
        let connector = SseConnector::new(url)?;
        debug!(url = %connector.url(), "Event stream");
        builder = builder.events(connector.into_connector());
    }
    if mode.requires(ChannelKind::Socket) {
        let url = match opts.socket_url {
            Some(raw) => parse_url(raw, &["ws", "wss"]).context("parse --socket")?,
            None => config.socket_url()?,
        };
        let connector = SocketConnector::new(url);
        debug!(url = %connector.url(), "Socket");
        builder = builder.socket(connector.into_connector());
    }
    builder.build()
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn phase(controller: &SessionController, kind: ChannelKind) -> Option<ChannelPhase> {
    controller.channel_status(kind).map(|status| status.phase)
}

/// Every required channel is closed, or failed with no retry left.
fn session_ended(controller: &SessionController, mode: SessionMode, exhausted: &[ChannelKind]) -> bool {
    mode.channels().iter().all(|kind| match phase(controller, *kind) {
        Some(ChannelPhase::Closed) | None => true,
        Some(ChannelPhase::Error) => exhausted.contains(kind),
        Some(ChannelPhase::Connecting | ChannelPhase::Open) => false,
    })
}

/// Writes snapshots to stdout.
///
/// JSON mode prints every change as one line. Text mode prints each turn
/// once, when it completes or when the session ends mid-turn.
struct Printer {
    json: bool,
    printed_turn: Option<String>,
}

impl Printer {
    fn new(json: bool) -> Self {
        Self {
            json,
            printed_turn: None,
        }
    }

    fn update(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        if self.json {
            let line = serde_json::to_string(snapshot).context("serialize snapshot")?;
            println!("{line}");
        } else if snapshot.complete {
            self.print_turn(snapshot);
        }
        Ok(())
    }

    fn finish(&mut self, snapshot: &SessionSnapshot) {
        if !self.json && !snapshot.raw.is_empty() {
            self.print_turn(snapshot);
        }
    }

    fn print_turn(&mut self, snapshot: &SessionSnapshot) {
        if self.printed_turn.as_deref() == Some(snapshot.turn_id.as_str()) {
            return;
        }
        self.printed_turn = Some(snapshot.turn_id.clone());
        let rendered = render::response(&snapshot.parsed);
        if !rendered.is_empty() {
            println!("{rendered}");
        }
    }
}
