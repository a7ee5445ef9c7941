//! End-to-end publisher/subscriber sessions over loopback.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tcpros_core::{MessageLoader, PathResolver, TypeRegistry, Value};
use tcpros_transport::{
    Node, PublisherConfig, PublisherEvent, SessionKind, SubscriberEvent, SubscriberState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn schema_root() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let msg = root.path().join("demo_msgs").join("msg");
    fs::create_dir_all(&msg).unwrap();
    fs::write(msg.join("Chat.msg"), "uint32 seq\nstring text\n").unwrap();
    fs::write(
        msg.join("Batch.msg"),
        "uint8 KIND_LOG=1\nuint8 kind\nChat[] entries\nfloat64[2] bounds\n",
    )
    .unwrap();
    root
}

fn node(name: &str, root: &TempDir) -> Node {
    let loader = MessageLoader::new(
        Arc::new(TypeRegistry::new()),
        Arc::new(PathResolver::new([root.path()])),
    );
    Node::new(name, loader)
        .with_publisher_config(PublisherConfig::default().with_host("127.0.0.1").with_base_port(0))
}

async fn recv<T>(events: &mut mpsc::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_for_connections(events: &mut mpsc::Receiver<PublisherEvent>, count: usize) {
    let mut connected = 0;
    while connected < count {
        if let PublisherEvent::Connected { .. } = recv(events).await {
            connected += 1;
        }
    }
}

#[tokio::test]
async fn every_subscriber_gets_each_message_once() {
    let root = schema_root();
    let talker = node("talker", &root);
    let listener = node("listener", &root);

    let (publisher, mut pub_events) = talker.advertise("chat", "demo_msgs/Chat").await.unwrap();
    let port = publisher.endpoint().unwrap().port();

    let mut subscribers = Vec::new();
    for _ in 0..3 {
        let (sub, mut events) = listener
            .subscribe("chat", "demo_msgs/Chat", "127.0.0.1", port)
            .await
            .unwrap();
        assert!(matches!(recv(&mut events).await, SubscriberEvent::Connected(_)));
        subscribers.push((sub, events));
    }
    wait_for_connections(&mut pub_events, 3).await;
    assert_eq!(publisher.link_count(), 3);
    assert_eq!(listener.sessions().len(), 3);

    let msg = publisher
        .descriptor()
        .instance_with([("seq", Value::UInt32(1)), ("text", Value::from("hello"))])
        .unwrap();
    assert_eq!(publisher.publish(&msg).unwrap(), 3);

    for (_, events) in &mut subscribers {
        match recv(events).await {
            SubscriberEvent::Message(received) => assert_eq!(received, msg),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }
}

#[tokio::test]
async fn nested_messages_cross_the_wire() {
    let root = schema_root();
    let talker = node("talker", &root);
    let (publisher, mut pub_events) = talker.advertise("/batch", "demo_msgs/Batch").await.unwrap();
    let port = publisher.endpoint().unwrap().port();

    let (_sub, mut events) = talker
        .subscribe("/batch", "demo_msgs/Batch", "127.0.0.1", port)
        .await
        .unwrap();
    recv(&mut events).await;
    wait_for_connections(&mut pub_events, 1).await;

    let descriptor = publisher.descriptor();
    let chat = talker.loader().load("demo_msgs/Chat").await.unwrap();
    let entry = chat
        .instance_with([("seq", Value::UInt32(7)), ("text", Value::from("nested"))])
        .unwrap();
    let msg = descriptor
        .instance_with([
            ("kind", Value::UInt8(1)),
            ("entries", Value::Array(vec![Value::Message(entry)])),
            ("bounds", Value::Array(vec![Value::Float64(-1.5), Value::Float64(2.5)])),
        ])
        .unwrap();
    publisher.publish(&msg).unwrap();

    match recv(&mut events).await {
        SubscriberEvent::Message(received) => {
            assert_eq!(received, msg);
            assert_eq!(received.get("KIND_LOG"), Some(&Value::UInt8(1)));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn publisher_shutdown_disconnects_subscribers() {
    let root = schema_root();
    let talker = node("talker", &root);
    let listener = node("listener", &root);

    let (publisher, mut pub_events) = talker.advertise("chat", "demo_msgs/Chat").await.unwrap();
    let port = publisher.endpoint().unwrap().port();
    assert_eq!(talker.sessions().topics(SessionKind::Publisher), ["/chat"]);

    let (subscriber, mut events) = listener
        .subscribe("chat", "demo_msgs/Chat", "127.0.0.1", port)
        .await
        .unwrap();
    recv(&mut events).await;
    wait_for_connections(&mut pub_events, 1).await;

    drop(publisher);
    assert!(talker.sessions().is_empty());

    assert_eq!(recv(&mut events).await, SubscriberEvent::Disconnected);
    assert_eq!(subscriber.state(), SubscriberState::Disconnected);
    assert!(listener.sessions().is_empty());
}

#[tokio::test]
async fn failed_subscribe_leaves_no_session() {
    let root = schema_root();
    let listener = node("listener", &root);

    let socket = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    drop(socket);

    assert!(listener
        .subscribe("chat", "demo_msgs/Chat", "127.0.0.1", port)
        .await
        .is_err());
    assert!(listener.sessions().is_empty());
}

#[tokio::test]
async fn mismatched_types_are_refused() {
    let root = schema_root();
    let talker = node("talker", &root);
    let listener = node("listener", &root);

    let (publisher, _events) = talker.advertise("chat", "demo_msgs/Chat").await.unwrap();
    let port = publisher.endpoint().unwrap().port();

    // The publisher hangs up without answering, so the subscriber sees EOF.
    assert!(listener
        .subscribe("chat", "demo_msgs/Batch", "127.0.0.1", port)
        .await
        .is_err());
    assert!(listener.sessions().is_empty());
    drop(publisher);
}

#[tokio::test]
async fn unknown_types_fail_to_advertise() {
    let root = schema_root();
    let talker = node("talker", &root);
    assert!(talker.advertise("chat", "demo_msgs/Missing").await.is_err());
    assert!(talker.advertise("chat", "other_msgs/Chat").await.is_err());
    assert!(talker.sessions().is_empty());
}
