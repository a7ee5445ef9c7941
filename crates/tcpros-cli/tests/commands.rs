//! Publish and echo commands against loopback sessions.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tcpros_cli::commands::echo::{self, EchoOptions};
use tcpros_cli::commands::publish::{self, PublishOptions};
use tcpros_cli::{CliConfig, CliError};
use tcpros_core::{MessageLoader, TypeRegistry, Value};
use tcpros_transport::{Node, PublisherEvent, SignalHandler};
use tempfile::TempDir;

fn workspace() -> (TempDir, CliConfig) {
    let root = tempfile::tempdir().unwrap();
    let msg = root.path().join("demo_msgs").join("msg");
    fs::create_dir_all(&msg).unwrap();
    fs::write(msg.join("Chat.msg"), "uint32 seq\nstring text\n").unwrap();

    let mut config = CliConfig::default();
    config.package_path = vec![PathBuf::from(root.path())];
    config.publisher.host = Some("127.0.0.1".to_string());
    config.publisher.base_port = 0;
    (root, config)
}

fn node(config: &CliConfig) -> Node {
    let loader = MessageLoader::new(Arc::new(TypeRegistry::new()), Arc::new(config.resolver()));
    tcpros_cli::node(config, loader)
}

#[tokio::test]
async fn echo_prints_json_lines() {
    let (_root, config) = workspace();
    let talker = node(&config);
    let (publisher, mut events) = talker.advertise("chatter", "demo_msgs/Chat").await.unwrap();
    let port = publisher.endpoint().unwrap().port();

    let listener = node(&config);
    let signals = SignalHandler::new();
    let shutdown = signals.shutdown_handle();
    let options = EchoOptions {
        topic: "chatter".to_string(),
        type_id: "demo_msgs/Chat".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        count: Some(2),
    };
    let echo = tokio::spawn(async move {
        let mut out = Vec::new();
        let received = echo::run(&listener, &options, shutdown, &mut out).await.unwrap();
        (received, String::from_utf8(out).unwrap())
    });

    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        if matches!(event, PublisherEvent::Connected { .. }) {
            break;
        }
    }

    for (seq, text) in [(1u32, "one"), (2, "two")] {
        let msg = publisher
            .descriptor()
            .instance_with([("seq", Value::UInt32(seq)), ("text", Value::from(text))])
            .unwrap();
        publisher.publish(&msg).unwrap();
    }

    let (received, out) = tokio::time::timeout(Duration::from_secs(5), echo).await.unwrap().unwrap();
    assert_eq!(received, 2);
    insta::assert_snapshot!(out, @r#"
    {"seq":1,"text":"one"}
    {"seq":2,"text":"two"}
    "#);
}

#[tokio::test]
async fn echo_stops_on_shutdown() {
    let (_root, config) = workspace();
    let talker = node(&config);
    let (publisher, _events) = talker.advertise("chatter", "demo_msgs/Chat").await.unwrap();
    let port = publisher.endpoint().unwrap().port();

    let listener = node(&config);
    let signals = SignalHandler::new();
    let options = EchoOptions {
        topic: "chatter".to_string(),
        type_id: "demo_msgs/Chat".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        count: None,
    };
    let shutdown = signals.shutdown_handle();
    let echo = tokio::spawn(async move {
        let mut out = Vec::new();
        echo::run(&listener, &options, shutdown, &mut out).await.unwrap()
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    signals.trigger_shutdown();
    let received = tokio::time::timeout(Duration::from_secs(5), echo).await.unwrap().unwrap();
    assert_eq!(received, 0);
}

#[tokio::test]
async fn publish_counts_messages() {
    let (_root, config) = workspace();
    let talker = node(&config);
    let signals = SignalHandler::new();
    let options = PublishOptions {
        topic: "/chatter".to_string(),
        type_id: "demo_msgs/Chat".to_string(),
        message: r#"{"seq": 9, "text": "tick"}"#.to_string(),
        rate: 100.0,
        count: Some(3),
    };

    let published = publish::run(&talker, &options, signals.shutdown_handle()).await.unwrap();
    assert_eq!(published, 3);
    assert!(talker.sessions().is_empty());
}

#[tokio::test]
async fn publish_rejects_bad_messages() {
    let (_root, config) = workspace();
    let talker = node(&config);
    let signals = SignalHandler::new();
    let mut options = PublishOptions {
        topic: "/chatter".to_string(),
        type_id: "demo_msgs/Chat".to_string(),
        message: "{not json".to_string(),
        rate: 10.0,
        count: Some(1),
    };

    let err = publish::run(&talker, &options, signals.shutdown_handle()).await.unwrap_err();
    assert!(matches!(err, CliError::Json(_)));

    options.message = r#"{"seq": -1}"#.to_string();
    let err = publish::run(&talker, &options, signals.shutdown_handle()).await.unwrap_err();
    assert!(matches!(err, CliError::Validation(_)));

    options.message = r#"{"speed": 1}"#.to_string();
    let err = publish::run(&talker, &options, signals.shutdown_handle()).await.unwrap_err();
    assert!(matches!(err, CliError::Validation(_)));

    options.message = "{}".to_string();
    options.rate = 0.0;
    let err = publish::run(&talker, &options, signals.shutdown_handle()).await.unwrap_err();
    assert!(matches!(err, CliError::Argument(_)));
}
