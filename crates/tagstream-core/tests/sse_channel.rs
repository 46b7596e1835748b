//! Event channel against a mock SSE endpoint.

use std::sync::Arc;
use std::time::Duration;

use tagstream_core::channel::{ChannelEventKind, ChannelPhase, SseConnector};
use tagstream_core::error::ChannelErrorKind;
use tagstream_core::reconnect::NeverReconnect;
use tagstream_core::{ChannelKind, SessionBuilder, SessionController, SessionInbox, SessionMode, SessionNotice};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AGENT_TURN: &str = include_str!("fixtures/agent_turn.sse");

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

fn events_session(server: &MockServer) -> (SessionController, SessionInbox) {
    let url = Url::parse(&format!("{}/api/v1/agents/sse", server.uri())).unwrap();
    SessionBuilder::new(SessionMode::Events)
        .events(SseConnector::new(url).unwrap().into_connector())
        .reconnect_policy(Arc::new(NeverReconnect))
        .build()
        .unwrap()
}

/// Feeds inbox events to the controller until one of `until` arrives.
async fn pump(controller: &mut SessionController, inbox: &mut SessionInbox, until: fn(&ChannelEventKind) -> bool) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), inbox.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("inbox closed");
        let done = until(&event.kind);
        controller.handle(event);
        if done {
            return;
        }
    }
}

#[tokio::test]
async fn test_event_channel_assembles_streamed_turn() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/agents/sse"))
        .and(header("accept", "text/event-stream"))
        .respond_with(sse_response(AGENT_TURN))
        .expect(1)
        .mount(&server)
        .await;

    let (mut controller, mut inbox) = events_session(&server);
    let mut notices = controller.subscribe_notices();
    controller.connect().unwrap();

    pump(&mut controller, &mut inbox, |kind| {
        matches!(kind, ChannelEventKind::Closed | ChannelEventKind::Failed(_))
    })
    .await;

    let snapshot = controller.snapshot();
    assert!(snapshot.complete);
    assert_eq!(snapshot.parsed.keys().collect::<Vec<_>>(), vec!["observation", "thought", "type", "result"]);
    assert_eq!(snapshot.parsed.text("thought"), Some("Reply politely"));
    assert_eq!(snapshot.parsed.text("type"), Some("final_answer"));
    assert_eq!(snapshot.parsed.text("result"), Some("Hello"));

    let Ok(SessionNotice::Control(control)) = notices.try_recv() else {
        panic!("expected the sessions envelope as a control notice");
    };
    assert_eq!(control.kind, "sessions");
    assert_eq!(notices.try_recv().ok(), Some(SessionNotice::ChannelClosed(ChannelKind::Events)));
    assert!(!controller.is_connected());
}

#[tokio::test]
async fn test_event_channel_http_error_moves_to_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/agents/sse"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let (mut controller, mut inbox) = events_session(&server);
    controller.connect().unwrap();
    pump(&mut controller, &mut inbox, |kind| matches!(kind, ChannelEventKind::Failed(_))).await;

    let status = controller.channel_status(ChannelKind::Events).unwrap();
    assert_eq!(status.phase, ChannelPhase::Error);
    let error = status.last_error.unwrap();
    assert_eq!(error.kind, ChannelErrorKind::Transport);
    assert!(error.message.contains("503"), "{}", error.message);
    assert!(error.message.contains("overloaded"), "{}", error.message);
}

#[tokio::test]
async fn test_event_channel_reconnects_after_error_without_residue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/agents/sse"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/agents/sse"))
        .respond_with(sse_response("data: {\"type\":\"generate\",\"content\":\"<thought>hi\"}\n\n"))
        .mount(&server)
        .await;

    let (mut controller, mut inbox) = events_session(&server);
    controller.connect().unwrap();
    pump(&mut controller, &mut inbox, |kind| matches!(kind, ChannelEventKind::Failed(_))).await;
    assert!(controller.channel_status(ChannelKind::Events).unwrap().last_error.is_some());

    controller.connect().unwrap();
    pump(&mut controller, &mut inbox, |kind| matches!(kind, ChannelEventKind::Opened)).await;
    let status = controller.channel_status(ChannelKind::Events).unwrap();
    assert_eq!(status.phase, ChannelPhase::Open);
    assert!(status.last_error.is_none());
    assert!(controller.is_connected());

    pump(&mut controller, &mut inbox, |kind| matches!(kind, ChannelEventKind::Closed)).await;
    assert_eq!(controller.snapshot().parsed.text("thought"), Some("hi"));
}
