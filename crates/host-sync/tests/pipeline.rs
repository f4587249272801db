use std::sync::Arc;
use std::time::Duration;

use host_sync::domain::events::result_channel;
use host_sync::domain::events::EventError;
use host_sync::domain::events::EventMeta;
use host_sync::domain::events::HostCreated;
use host_sync::domain::events::HostIdentity;
use host_sync::domain::events::HostUpdated;
use host_sync::domain::events::LabelSet;
use host_sync::domain::events::SinkError;
use host_sync::domain::mock::MachineCall;
use host_sync::domain::mock::StubMachineClient;
use host_sync::domain::sink::EventSink;
use host_sync::infrastructure::inventory::HostResource;
use host_sync::infrastructure::inventory::InventoryWatcher;
use host_sync::infrastructure::inventory::WatchEvent;
use host_sync::infrastructure::inventory::WatchEventKind;
use similar_asserts::assert_eq;
use test_log::test;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);
const PROJECT: &str = "64e797f6-db23-445e-b606-4228d4f1c2bd";

fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test(tokio::test)]
async fn created_event_succeeds_without_kubernetes_calls() {
    let stub = StubMachineClient::new();
    let (sender, _sink) = EventSink::spawn(CancellationToken::new());
    let (result_tx, mut result_rx) = result_channel();

    sender
        .send(HostCreated::new(
            EventMeta::new(HostIdentity::new("h-1", "p-1")).with_result(result_tx),
        ))
        .await
        .expect("sink accepts event");

    let result = timeout(WAIT, result_rx.recv())
        .await
        .expect("result within bounded wait")
        .expect("result delivered");
    assert!(result.is_ok());
    assert!(stub.calls().is_empty());
}

#[test(tokio::test)]
async fn updated_event_writes_machine_labels() {
    let stub = StubMachineClient::new();
    stub.add_machine(PROJECT, "host-12345", "example-machine");
    let (sender, _sink) = EventSink::spawn(CancellationToken::new());
    let (result_tx, mut result_rx) = result_channel();

    sender
        .send(HostUpdated::new(
            EventMeta::new(HostIdentity::new("host-12345", PROJECT)).with_result(result_tx),
            labels(&[("key", "value")]),
            Arc::new(stub.clone()),
        ))
        .await
        .expect("sink accepts event");

    let result = timeout(WAIT, result_rx.recv())
        .await
        .expect("result within bounded wait")
        .expect("result delivered");
    assert!(result.is_ok(), "unexpected failure: {result:?}");
    assert_eq!(
        stub.calls(),
        vec![
            MachineCall::GetMachineByHostId {
                namespace: PROJECT.to_string(),
                host_id: "host-12345".to_string(),
            },
            MachineCall::SetMachineLabels {
                namespace: PROJECT.to_string(),
                machine_name: "example-machine".to_string(),
                labels: labels(&[("key", "value")]),
            },
        ]
    );
}

#[test(tokio::test)]
async fn empty_host_id_is_rejected_before_kubernetes() {
    let stub = StubMachineClient::new();
    let (sender, _sink) = EventSink::spawn(CancellationToken::new());
    let (result_tx, mut result_rx) = result_channel();

    sender
        .send(HostUpdated::new(
            EventMeta::new(HostIdentity::new("", "p")).with_result(result_tx),
            LabelSet::new(),
            Arc::new(stub.clone()),
        ))
        .await
        .expect("sink accepts event");

    let err = timeout(WAIT, result_rx.recv())
        .await
        .expect("result within bounded wait")
        .expect("result delivered")
        .expect_err("empty host id must fail");
    assert_eq!(err.current_context(), &EventError::EmptyHostId);
    assert!(stub.calls().is_empty());
}

#[test(tokio::test)]
async fn watcher_decodes_metadata_into_machine_labels() {
    let stub = StubMachineClient::new();
    stub.add_machine("tenant-1", "host-1", "machine-1");
    let (sender, sink) = EventSink::spawn(CancellationToken::new());
    let watcher = InventoryWatcher::new(Arc::new(stub.clone()), sender);

    let (tx, rx) = mpsc::channel(4);
    tx.send(WatchEvent::new(
        WatchEventKind::Updated,
        HostResource {
            resource_id: "host-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            name: "edge-1".to_string(),
            metadata: r#"[{"key":"host-label","value":"true"},{"key":"test-label","value":"true"}]"#
                .to_string(),
        },
    ))
    .await
    .expect("queue watch event");
    drop(tx);

    timeout(WAIT, watcher.run(rx, CancellationToken::new()))
        .await
        .expect("watcher stops at end of stream")
        .expect("watcher exits cleanly");
    // closes the sink input so the sink drains and stops
    drop(watcher);
    timeout(WAIT, sink)
        .await
        .expect("sink stops")
        .expect("sink task ok");

    assert_eq!(
        stub.labels("tenant-1", "machine-1"),
        Some(labels(&[("host-label", "true"), ("test-label", "true")]))
    );
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_producers_each_get_their_result() {
    let stub = StubMachineClient::new();
    for i in 0..10 {
        stub.add_machine(&format!("project-{i}"), &format!("host-{i}"), &format!("machine-{i}"));
    }
    let (sender, _sink) = EventSink::spawn(CancellationToken::new());

    let producers = (0..10)
        .map(|i| {
            let sender = sender.clone();
            let client = Arc::new(stub.clone());
            tokio::spawn(async move {
                let (result_tx, mut result_rx) = result_channel();
                sender
                    .send(HostUpdated::new(
                        EventMeta::new(HostIdentity::new(
                            format!("host-{i}"),
                            format!("project-{i}"),
                        ))
                        .with_result(result_tx),
                        LabelSet::from([(format!("key_{i}"), i.to_string())]),
                        client,
                    ))
                    .await
                    .expect("sink accepts event");
                result_rx.recv().await.expect("result delivered")
            })
        })
        .collect::<Vec<_>>();

    for producer in producers {
        let result = timeout(WAIT, producer)
            .await
            .expect("producer finishes within bounded wait")
            .expect("producer task ok");
        assert!(result.is_ok(), "unexpected failure: {result:?}");
    }

    for i in 0..10 {
        assert_eq!(
            stub.labels(&format!("project-{i}"), &format!("machine-{i}")),
            Some(LabelSet::from([(format!("key_{i}"), i.to_string())]))
        );
    }
}

#[test(tokio::test)]
async fn send_after_cancellation_fails_closed() {
    let stub = StubMachineClient::new();
    stub.add_machine("p-1", "h-1", "machine-1");
    let token = CancellationToken::new();
    let (sender, sink) = EventSink::spawn(token.clone());

    for value in ["a", "b"] {
        let (result_tx, mut result_rx) = result_channel();
        sender
            .send(HostUpdated::new(
                EventMeta::new(HostIdentity::new("h-1", "p-1")).with_result(result_tx),
                labels(&[("step", value)]),
                Arc::new(stub.clone()),
            ))
            .await
            .expect("sink accepts event");
        let result = timeout(WAIT, result_rx.recv())
            .await
            .expect("result within bounded wait")
            .expect("result delivered");
        assert!(result.is_ok());
    }

    token.cancel();
    timeout(WAIT, sink)
        .await
        .expect("sink stops after cancellation")
        .expect("sink task ok");

    let late = timeout(
        Duration::from_millis(200),
        sender.send(HostCreated::new(EventMeta::new(HostIdentity::new(
            "h-1", "p-1",
        )))),
    )
    .await;
    let err = late
        .expect("send returns once the consumer is gone")
        .expect_err("no consumer left to take the event");
    assert_eq!(err.current_context(), &SinkError::Closed);
    assert!(sender.is_closed());
}
