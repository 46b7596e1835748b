//! Event channel transport: a long-lived SSE GET.

use std::sync::Arc;

use anyhow::{Context, Result};
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::transport::{ChannelEventKind, Connector, EventSink, TransportHandle};

/// Opens the server-sent event stream.
#[derive(Debug, Clone)]
pub struct SseConnector {
    client: reqwest::Client,
    url: Url,
}

impl SseConnector {
    pub fn new(url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn into_connector(self) -> Arc<dyn Connector> {
        Arc::new(self)
    }
}

impl Connector for SseConnector {
    fn open(&self, sink: EventSink) -> TransportHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    debug!(channel = %sink.channel(), generation = sink.generation(), "SSE task cancelled");
                }
                () = run(request, &sink) => {}
            }
        });

        TransportHandle::new(cancel, None)
    }
}

async fn run(request: reqwest::RequestBuilder, sink: &EventSink) {
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            sink.emit(ChannelEventKind::Failed(format!("Request failed: {err}"))).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };
        sink.emit(ChannelEventKind::Failed(message)).await;
        return;
    }

    if sink.emit(ChannelEventKind::Opened).await {
        forward_events(response.bytes_stream(), sink).await;
    }
}

/// Forwards every `message` event's data from an SSE byte stream to `sink`.
///
/// `ping` keep-alives and empty data are skipped. A stream error ends with
/// `Failed`, the end of the body with `Closed`.
pub async fn forward_events<S, E>(stream: S, sink: &EventSink)
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut events = std::pin::pin!(stream.eventsource());
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(channel = %sink.channel(), "SSE stream error: {err}");
                sink.emit(ChannelEventKind::Failed(format!("SSE stream error: {err}")))
                    .await;
                return;
            }
        };

        if event.event != "message" || event.data.trim().is_empty() {
            continue;
        }
        if !sink.emit(ChannelEventKind::Frame(event.data)).await {
            return;
        }
    }
    sink.emit(ChannelEventKind::Closed).await;
}
