//! Integration tests for the request correlator on top of the bus.
//!
//! The "server" here is the test itself: it publishes messages on the bus
//! exactly as the connection's reader task would after decoding a frame.

use std::sync::Arc;
use std::time::Duration;

use archlink_dispatch::{
    CorrelationError, Correlator, DispatchBus, Outbound, SendError,
};
use archlink_protocol::{ClientMessage, MessageKind, ServerMessage};
use parking_lot::Mutex;
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(5);

fn retrieved(token: &str, value: i64) -> ServerMessage {
    ServerMessage::Retrieved {
        keys: [("k".to_string(), json!(value))].into_iter().collect(),
        correlation_token: Some(token.to_string()),
    }
}

fn token_is(token: &'static str) -> impl Fn(&ServerMessage) -> bool + Send + Sync + 'static {
    move |msg| {
        matches!(msg, ServerMessage::Retrieved { correlation_token: Some(t), .. } if t == token)
    }
}

/// Records every batch; optionally refuses to send.
#[derive(Default)]
struct RecordingOutbound {
    sent: Mutex<Vec<Vec<ClientMessage>>>,
    refuse: bool,
}

impl Outbound for RecordingOutbound {
    fn send(&self, batch: Vec<ClientMessage>) -> Result<(), SendError> {
        if self.refuse {
            return Err(SendError::NotConnected);
        }
        self.sent.lock().push(batch);
        Ok(())
    }
}

fn setup() -> (Arc<DispatchBus>, Arc<Correlator>) {
    let bus = Arc::new(DispatchBus::new());
    let correlator = Arc::new(Correlator::new(&bus));
    (bus, correlator)
}

#[tokio::test]
async fn test_send_and_wait_concurrent_same_kind_resolve_in_arrival_order() {
    let (bus, correlator) = setup();
    let outbound = Arc::new(RecordingOutbound::default());

    let spawn_request = |token: &'static str| {
        let correlator = Arc::clone(&correlator);
        let outbound = Arc::clone(&outbound);
        tokio::spawn(async move {
            correlator
                .send_and_wait(
                    &*outbound,
                    vec![ClientMessage::Get {
                        keys: vec!["k".into()],
                        correlation_token: token.into(),
                    }],
                    &[MessageKind::Retrieved],
                    TIMEOUT,
                    token_is(token),
                )
                .await
        })
    };
    let first = spawn_request("a");
    let second = spawn_request("b");

    // Let both tasks register and send.
    while correlator.pending_count() < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(outbound.sent.lock().len(), 2);

    // One frame, replies in the opposite order of the requests.
    bus.publish_all(&[retrieved("b", 2), retrieved("a", 1)]);

    assert_eq!(first.await.unwrap().unwrap(), retrieved("a", 1));
    assert_eq!(second.await.unwrap().unwrap(), retrieved("b", 2));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_register_one_message_satisfies_at_most_one_request() {
    let (bus, correlator) = setup();

    let first = correlator.register(&[MessageKind::LocationInfo], TIMEOUT, |_| true);
    let second = correlator.register(&[MessageKind::LocationInfo], TIMEOUT, |_| true);

    bus.publish(&ServerMessage::LocationInfo { locations: vec![] });

    assert!(first.wait().await.is_ok());
    assert_eq!(correlator.pending_count(), 1, "second request still waits");

    bus.publish(&ServerMessage::LocationInfo { locations: vec![] });
    assert!(second.wait().await.is_ok());
}

#[tokio::test]
async fn test_register_ignores_other_kinds() {
    let (bus, correlator) = setup();
    let reply = correlator.register(&[MessageKind::SetReply], TIMEOUT, |_| true);

    bus.publish(&retrieved("a", 1));

    assert_eq!(correlator.pending_count(), 1);
    drop(reply);
    assert_eq!(correlator.pending_count(), 0, "drop withdraws the request");
}

#[tokio::test]
async fn test_register_multiple_kinds_first_arrival_wins() {
    let (bus, correlator) = setup();
    let reply = correlator.register(
        &[MessageKind::Connected, MessageKind::ConnectionRefused],
        TIMEOUT,
        |_| true,
    );

    bus.publish(&ServerMessage::ConnectionRefused { errors: vec![] });

    let msg = reply.wait().await.unwrap();
    assert_eq!(msg.kind(), MessageKind::ConnectionRefused);
}

#[tokio::test]
async fn test_register_panicking_predicate_counts_as_no_match() {
    let (bus, correlator) = setup();
    let bad = correlator.register(&[MessageKind::Retrieved], TIMEOUT, |_| panic!("bad"));
    let good = correlator.register(&[MessageKind::Retrieved], TIMEOUT, |_| true);

    bus.publish(&retrieved("a", 1));

    assert_eq!(good.wait().await.unwrap(), retrieved("a", 1));
    assert_eq!(correlator.pending_count(), 1);
    drop(bad);
}

#[tokio::test(start_paused = true)]
async fn test_wait_no_reply_times_out_and_deregisters() {
    let (_bus, correlator) = setup();
    let reply = correlator.register(
        &[MessageKind::Retrieved],
        Duration::from_millis(250),
        |_| true,
    );

    let result = reply.wait().await;

    assert!(matches!(result, Err(CorrelationError::Timeout(d)) if d == Duration::from_millis(250)));
    assert!(result.unwrap_err().is_timeout());
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_cancel_all_rejects_every_pending_request() {
    let (_bus, correlator) = setup();
    let replies: Vec<_> = (0..3)
        .map(|_| correlator.register(&[MessageKind::SetReply], TIMEOUT, |_| true))
        .collect();

    assert_eq!(correlator.cancel_all(), 3);
    assert_eq!(correlator.pending_count(), 0);

    for reply in replies {
        assert!(matches!(reply.wait().await, Err(CorrelationError::Disconnected)));
    }
}

#[tokio::test]
async fn test_send_and_wait_send_failure_withdraws_request() {
    let (_bus, correlator) = setup();
    let outbound = RecordingOutbound {
        refuse: true,
        ..Default::default()
    };

    let result = correlator
        .send_and_wait(
            &outbound,
            vec![ClientMessage::Sync],
            &[MessageKind::ReceivedItems],
            TIMEOUT,
            |_| true,
        )
        .await;

    assert!(matches!(
        result,
        Err(CorrelationError::Send(SendError::NotConnected))
    ));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_correlator_does_not_block_other_catch_all_listeners() {
    let (bus, correlator) = setup();
    let seen = Arc::new(Mutex::new(0));
    {
        let seen = Arc::clone(&seen);
        bus.subscribe_any(move |_| *seen.lock() += 1);
    }
    let reply = correlator.register(&[MessageKind::Retrieved], TIMEOUT, |_| true);

    bus.publish(&retrieved("a", 1));

    assert!(reply.wait().await.is_ok());
    assert_eq!(*seen.lock(), 1);
}
