//! End-to-end session engine flow
//!
//! Drives wire bytes through the codec, persistence helpers and router the
//! way a connection reader would, and checks the keepalive monitor's
//! liveness-lost signal maps onto the connection event surface.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use driftmq::codec;
use driftmq::protocol::{Packet, PubAck, Publish};
use driftmq::store::{inbound_key, persist_inbound};
use driftmq::{
    ConnectionEvent, ConnectionState, KeepaliveMonitor, MemoryStore, Message, PingTimeout, QoS,
    Router, SessionConfig, Store,
};

/// Honor RUST_LOG when debugging these tests; idempotent across tests.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[tokio::test]
async fn inbound_publish_reaches_subscriber_and_acks_on_the_wire() {
    init_tracing();
    let config = SessionConfig::default();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    store.open();

    let router = Arc::new(Router::new());
    let (delivered_tx, mut delivered) = mpsc::unbounded_channel();
    router.add_route(
        "sensor/+/temperature",
        Arc::new(move |m: Message| {
            delivered_tx.send((m.topic().to_owned(), m.payload().clone())).unwrap();
        }),
    );

    let (messages_tx, messages_rx) = mpsc::channel(16);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = watch::channel(false);
    let dispatch = tokio::spawn(router.clone().match_and_dispatch(
        messages_rx,
        config.order,
        outbound_tx,
        store.clone(),
        stop_rx,
    ));

    // Broker sends a QoS 1 publish: bytes in, exactly as the reader task
    // would see them.
    let publish = Publish {
        qos: QoS::AtLeastOnce,
        topic: Arc::from("sensor/kitchen/temperature"),
        packet_id: Some(7),
        payload: Bytes::from_static(b"21.5"),
        ..Default::default()
    };
    let mut wire = BytesMut::new();
    codec::encode(&Packet::Publish(publish), &mut wire).unwrap();

    let decoded = codec::read_packet(&mut &wire[..]).unwrap();
    persist_inbound(store.as_ref(), &decoded);
    assert!(store.get(&inbound_key(7)).is_some(), "in-flight until acked");

    match decoded {
        Packet::Publish(p) => messages_tx.send(p).await.unwrap(),
        other => panic!("expected PUBLISH, got {:?}", other),
    }

    let (topic, payload) = delivered.recv().await.unwrap();
    assert_eq!(topic, "sensor/kitchen/temperature");
    assert_eq!(payload, Bytes::from_static(b"21.5"));

    // The router acked the delivery and retired the stored copy.
    let ack = outbound_rx.recv().await.unwrap();
    assert_eq!(ack, Packet::PubAck(PubAck::new(7)));
    assert_eq!(store.get(&inbound_key(7)), None);

    // The ack survives its own trip through the codec.
    let mut ack_wire = Vec::new();
    codec::write_packet(&ack, &mut ack_wire).unwrap();
    assert_eq!(codec::read_packet(&mut &ack_wire[..]).unwrap(), ack);

    drop(messages_tx);
    timeout(Duration::from_secs(1), dispatch)
        .await
        .expect("dispatch loop exits when its input closes")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn silent_broker_surfaces_as_a_lost_connection_event() {
    init_tracing();
    let config = SessionConfig {
        keep_alive: Duration::from_secs(15),
        ping_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let state = Arc::new(ConnectionState::new());
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = watch::channel(false);

    let monitor = KeepaliveMonitor::new(&config, state, outbound_tx, stop_rx);
    let lost = monitor.run().await.expect_err("broker never answers");
    assert_eq!(lost, PingTimeout);

    // Exactly one probe went out before the loss was declared.
    assert!(matches!(outbound_rx.try_recv(), Ok(Packet::PingReq)));
    assert!(outbound_rx.try_recv().is_err());

    let event = ConnectionEvent::from(lost);
    assert!(matches!(event, ConnectionEvent::Lost { .. }));
}
