//! Socket channel transport: one WebSocket connection per attempt.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::transport::{ChannelEventKind, Connector, EventSink, TransportHandle};

/// Upper bound on the close handshake when the task is cancelled.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens the bidirectional socket.
#[derive(Debug, Clone)]
pub struct SocketConnector {
    url: Url,
}

impl SocketConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn into_connector(self) -> Arc<dyn Connector> {
        Arc::new(self)
    }
}

impl Connector for SocketConnector {
    fn open(&self, sink: EventSink) -> TransportHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let url = self.url.clone();

        tokio::spawn(async move {
            run(url, sink, outbound_rx, token).await;
        });

        TransportHandle::new(cancel, Some(outbound_tx))
    }
}

async fn run(
    url: Url,
    sink: EventSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        () = cancel.cancelled() => return,
        result = connect_async(url.as_str()) => result,
    };
    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(err) => {
            sink.emit(ChannelEventKind::Failed(format!("Connect failed: {err}"))).await;
            return;
        }
    };
    if !sink.emit(ChannelEventKind::Opened).await {
        return;
    }

    let (mut writer, mut reader) = socket.split();
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(channel = %sink.channel(), generation = sink.generation(), "Socket task cancelled");
                close_quietly(&mut writer).await;
                return;
            }
            Some(payload) = outbound.recv() => {
                if let Err(err) = writer.send(Message::Text(payload.into())).await {
                    sink.emit(ChannelEventKind::Failed(format!("Send failed: {err}"))).await;
                    return;
                }
            }
            message = reader.next() => {
                let kind = match message {
                    Some(Ok(Message::Text(text))) => ChannelEventKind::Frame(text.to_string()),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => ChannelEventKind::Frame(text),
                        Err(_) => {
                            warn!(channel = %sink.channel(), "Dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        sink.emit(ChannelEventKind::Closed).await;
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        sink.emit(ChannelEventKind::Failed(format!("Socket error: {err}"))).await;
                        return;
                    }
                };
                if !sink.emit(kind).await {
                    return;
                }
            }
        }
    }
}

/// Sends a close frame, giving up after [`CLOSE_TIMEOUT`]. Returns whether
/// the frame went out.
async fn close_quietly<S>(writer: &mut S) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(CLOSE_TIMEOUT, writer.send(Message::Close(None))).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!("Close frame not sent: {err}");
            false
        }
        Err(_) => {
            debug!("Close frame timed out after {CLOSE_TIMEOUT:?}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;

    /// A peer that never drains its send buffer.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_gives_up_on_stalled_peer() {
        let started = tokio::time::Instant::now();
        assert!(!close_quietly(&mut StalledSink).await);
        assert!(started.elapsed() >= CLOSE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_close_sends_frame_to_responsive_peer() {
        let mut sink = futures_util::sink::drain::<Message>();
        assert!(close_quietly(&mut sink).await);
    }
}
