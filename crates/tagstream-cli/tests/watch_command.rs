//! `tagstream watch` against a mock event stream.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AGENT_TURN: &str = include_str!("fixtures/agent_turn.sse");

/// Home with a config that never retries, so a failed stream ends the run.
fn temp_home() -> TempDir {
    let home = TempDir::new().expect("create temp tagstream home");
    fs::write(
        home.path().join("config.toml"),
        "[reconnect]\nstrategy = \"never\"\n",
    )
    .unwrap();
    home
}

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

async fn agent_server(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/agents/sse"))
        .respond_with(response)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_watch_prints_json_snapshots() {
    let home = temp_home();
    let server = agent_server(sse_response(AGENT_TURN)).await;
    let events = format!("{}/api/v1/agents/sse", server.uri());

    let output = cargo_bin_cmd!("tagstream")
        .env("TAGSTREAM_HOME", home.path())
        .args(["watch", "--mode", "events", "--events", &events, "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let snapshots: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(snapshots.len() >= 2, "{stdout}");

    let first = &snapshots[0];
    assert_eq!(first["complete"], false);
    assert_eq!(first["parsed"]["observation"], "User greets");

    let last = snapshots.last().unwrap();
    assert_eq!(last["complete"], true);
    assert_eq!(last["parsed"]["thought"], "Reply politely");
    assert_eq!(last["parsed"]["result"], "Hello");
}

#[tokio::test]
async fn test_watch_text_prints_completed_turn() {
    let home = temp_home();
    let server = agent_server(sse_response(AGENT_TURN)).await;
    let events = format!("{}/api/v1/agents/sse", server.uri());

    cargo_bin_cmd!("tagstream")
        .env("TAGSTREAM_HOME", home.path())
        .args(["watch", "--mode", "events", "--events", &events, "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("thought: Reply politely"))
        .stdout(predicate::str::contains("result: Hello"))
        .stdout(predicate::str::contains("(incomplete)").not());
}

#[tokio::test]
async fn test_watch_fails_when_stream_is_rejected() {
    let home = temp_home();
    let server = agent_server(ResponseTemplate::new(503).set_body_string("overloaded")).await;

    cargo_bin_cmd!("tagstream")
        .env("TAGSTREAM_HOME", home.path())
        .env("TAGSTREAM_EVENTS_URL", format!("{}/api/v1/agents/sse", server.uri()))
        .args(["watch", "--mode", "events"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP 503"))
        .stderr(predicate::str::contains("reconnect attempts exhausted"));
}

#[test]
fn test_watch_rejects_unknown_mode() {
    let home = temp_home();

    cargo_bin_cmd!("tagstream")
        .env("TAGSTREAM_HOME", home.path())
        .args(["watch", "--mode", "carrier-pigeon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown session mode"));
}

#[test]
fn test_watch_rejects_socket_url_with_http_scheme() {
    let home = temp_home();

    cargo_bin_cmd!("tagstream")
        .env("TAGSTREAM_HOME", home.path())
        .args(["watch", "--mode", "socket", "--socket", "http://localhost:1/ws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must use one of: ws, wss"));
}
