mod common;

use std::sync::{mpsc, Arc};
use std::time::Duration;

use common::{document, init_logging, test_config, RecordingSink};
use courier_core::{CommandError, CommandOutcome, Health, LoadingLevel};
use courier_engine::{
    AddressHistory, AddressRef, ApiCommand, ApiEvent, ChannelResultSink, EngineConfig,
    EngineEvent, EngineHandle, VersionCheck,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

fn sysinfo_body() -> serde_json::Value {
    document(
        "sysinfo",
        json!({
            "name": "bitmarket",
            "version": ["0.3.1", 301],
            "coins": { "btc": { "version": ["0.17.1", 170100], "height": 560_000, "status": 1 } },
        }),
    )
}

async fn mount_sysinfo(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/v1/sysinfo"))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Waits for the next `CommandFinished`, collecting health signals on the way.
fn next_finished(engine: &EngineHandle) -> (Vec<Health>, CommandOutcome) {
    let mut health = Vec::new();
    loop {
        match engine.recv_timeout(WAIT).expect("engine went quiet") {
            EngineEvent::Health(signal) => health.push(signal),
            EngineEvent::CommandFinished { outcome, .. } => return (health, outcome),
            EngineEvent::Stopped => panic!("engine stopped"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn submitted_command_reaches_the_server() {
    init_logging();
    let server = MockServer::start().await;
    mount_sysinfo(&server, ResponseTemplate::new(200).set_body_json(sysinfo_body())).await;

    let (result_tx, result_rx) = mpsc::channel();
    let results = Arc::new(ChannelResultSink::new(result_tx));
    let engine = EngineHandle::new(test_config(server.uri()), results.clone()).unwrap();
    engine.submit(ApiCommand::boxed(VersionCheck::new(results)));

    let (health, outcome) = next_finished(&engine);
    assert_eq!(health, vec![Health::Healthy]);
    assert_eq!(outcome, CommandOutcome::Completed);
    match result_rx.recv_timeout(WAIT).unwrap() {
        ApiEvent::ServerInfo(info) => {
            assert_eq!(info.name, "bitmarket");
            assert_eq!(info.version, 301);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unhealthy_status_is_signalled_and_withheld() {
    init_logging();
    let server = MockServer::start().await;
    mount_sysinfo(&server, ResponseTemplate::new(503)).await;

    let results = RecordingSink::new();
    let engine = EngineHandle::new(test_config(server.uri()), results.clone()).unwrap();
    engine.submit(ApiCommand::boxed(VersionCheck::new(results.clone())));

    let (health, outcome) = next_finished(&engine);
    assert!(matches!(
        health.as_slice(),
        [Health::Unhealthy { status: 503, .. }]
    ));
    assert_eq!(outcome, CommandOutcome::Unanswered { status: 503 });
    assert!(results.take().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_server_fails_the_command() {
    init_logging();
    let results = RecordingSink::new();
    let engine = EngineHandle::new(test_config("http://127.0.0.1:1/"), results.clone()).unwrap();
    engine.submit(ApiCommand::boxed(VersionCheck::new(results)));

    let (health, outcome) = next_finished(&engine);
    assert!(matches!(
        health.as_slice(),
        [Health::Unhealthy { status: 501, .. }]
    ));
    assert!(matches!(
        outcome,
        CommandOutcome::Failed(CommandError::Transport(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn history_waits_for_addresses_level() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/coins/btc/bc1qwatched/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(
            "history",
            json!({
                "address": "bc1qwatched",
                "first_offset": "f0",
                "last_offset": null,
                "tx_list": {},
            }),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let results = RecordingSink::new();
    let engine = EngineHandle::new(test_config(server.uri()), results.clone()).unwrap();
    engine.submit(ApiCommand::boxed(AddressHistory::new(
        AddressRef::new("btc", "bc1qwatched"),
        results.clone(),
    )));

    assert!(engine.recv_timeout(Duration::from_millis(300)).is_none());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());

    engine.advance_level(LoadingLevel::Addresses);
    let (_, outcome) = next_finished(&engine);
    assert_eq!(outcome, CommandOutcome::Completed);
    assert!(results
        .take()
        .iter()
        .any(|event| matches!(event, ApiEvent::HistoryComplete { tx_count: 0, .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn version_poll_fires_without_a_caller() {
    init_logging();
    let server = MockServer::start().await;
    mount_sysinfo(&server, ResponseTemplate::new(200).set_body_json(sysinfo_body())).await;

    let config = EngineConfig {
        poll_short_interval: Duration::from_millis(50),
        ..test_config(server.uri())
    };
    let results = RecordingSink::new();
    let engine = EngineHandle::new(config, results.clone()).unwrap();

    let (health, outcome) = next_finished(&engine);
    assert_eq!(health, vec![Health::Healthy]);
    assert_eq!(outcome, CommandOutcome::Completed);
    assert!(matches!(results.take().as_slice(), [ApiEvent::ServerInfo(_)]));
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_callback_runs_once() {
    init_logging();
    let server = MockServer::start().await;
    mount_sysinfo(&server, ResponseTemplate::new(200).set_body_json(sysinfo_body())).await;

    let results = RecordingSink::new();
    let engine = EngineHandle::new(test_config(server.uri()), results.clone()).unwrap();
    let (done_tx, done_rx) = mpsc::channel();
    engine.submit_with_callback(
        ApiCommand::boxed(VersionCheck::new(results)),
        false,
        Box::new(move |id: u64, outcome: &CommandOutcome| {
            let _ = done_tx.send((id, outcome.clone()));
        }),
    );

    let (id, outcome) = done_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(id, 1);
    assert_eq!(outcome, CommandOutcome::Completed);
    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_cancels_the_exchange_in_flight() {
    init_logging();
    let server = MockServer::start().await;
    mount_sysinfo(
        &server,
        ResponseTemplate::new(200)
            .set_delay(Duration::from_secs(3))
            .set_body_json(sysinfo_body()),
    )
    .await;

    let results = RecordingSink::new();
    let engine = EngineHandle::new(test_config(server.uri()), results.clone()).unwrap();
    engine.submit(ApiCommand::boxed(VersionCheck::new(results.clone())));
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.abort();

    let mut events = Vec::new();
    while let Some(event) = engine.recv_timeout(Duration::from_millis(500)) {
        events.push(event);
    }
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::CommandFinished {
            outcome: CommandOutcome::Failed(CommandError::Aborted),
            ..
        }
    )));
    assert_eq!(events.last(), Some(&EngineEvent::Stopped));
    assert!(results.take().is_empty());
}
