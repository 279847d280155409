//! I. Delivery, retry and acknowledgment.
//!
//! Covers:
//! - an event is acknowledged once, and only after an accepted send
//! - failed sends are retried with the configured wait between attempts
//! - a serialization failure skips only the affected event
//! - a failed acknowledgment does not trigger a resend
//! - the batch is handed back unchanged with a continue flag

use super::harness::{
    event, settings, FailingMarshaller, LogCapture, StubAck, StubCleanup, StubNotifier,
    StubSender, TestTransport, Timeline, TEST_BACKOFF,
};
use crate::contract::JsonMarshaller;
use crate::delivery::DeliveryEngine;
use crate::model::Channel;
use crate::transport::ExportTransport;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Acknowledgment
// =============================================================================

/// Every delivered event is acknowledged exactly once.
#[tokio::test]
async fn acknowledges_each_event_once() {
    let mut t = TestTransport::new(StubSender::new(), StubNotifier::new());
    let ack = StubAck::new();

    let batch = vec![event("e1", "d1"), event("e2", "d2"), event("e3", "d1")];
    t.transport.deliver(&ack, batch).await;

    assert_eq!(ack.count(), 3);
    assert_eq!(t.sender.calls_on(Channel::Event).len(), 3);

    t.transport.shutdown().await.unwrap();
}

/// The acknowledgment follows the accepted send, never a rejected one.
#[tokio::test]
async fn acknowledges_only_after_accepted_send() {
    let timeline = Timeline::new();
    let sender = Arc::new(StubSender::failing_times(2).with_timeline(timeline.clone()));
    let engine = DeliveryEngine::new(sender, Arc::new(JsonMarshaller), TEST_BACKOFF);
    let ack = StubAck::new().with_timeline(timeline.clone());

    assert!(engine.handle_event(&ack, &event("e1", "d1")).await);

    assert_eq!(
        timeline.entries(),
        vec![
            "send:event:false",
            "send:event:false",
            "send:event:true",
            "ack"
        ]
    );
}

// =============================================================================
// Retry
// =============================================================================

/// k rejected sends lead to k + 1 attempts with the same payload.
#[tokio::test]
async fn retries_until_sender_accepts() {
    let sender = Arc::new(StubSender::failing_times(3));
    let engine = DeliveryEngine::new(sender.clone(), Arc::new(JsonMarshaller), TEST_BACKOFF);
    let ack = StubAck::new();

    assert!(engine.handle_event(&ack, &event("e1", "d1")).await);

    let calls = sender.calls_on(Channel::Event);
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|call| call.payload == calls[0].payload));
    assert_eq!(ack.count(), 1);
}

/// Consecutive attempts are separated by at least the configured wait.
#[tokio::test]
async fn waits_between_attempts() {
    let sender = Arc::new(StubSender::failing_times(2));
    let engine = DeliveryEngine::new(sender.clone(), Arc::new(JsonMarshaller), TEST_BACKOFF);

    engine.handle_event(&StubAck::new(), &event("e1", "d1")).await;

    let calls = sender.calls();
    for pair in calls.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= TEST_BACKOFF, "gap {:?} shorter than backoff", gap);
    }
}

/// A stuck event holds back the rest of its batch.
#[tokio::test]
async fn retry_blocks_later_events() {
    let mut t = TestTransport::new(StubSender::failing_times(2), StubNotifier::new());
    let ack = StubAck::new();

    t.transport
        .deliver(&ack, vec![event("e1", "d1"), event("e2", "d1")])
        .await;

    let calls = t.sender.calls_on(Channel::Event);
    assert_eq!(calls.len(), 4);
    let ids: Vec<_> = t.sender.delivered_events().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["e1", "e2"]);
    assert!(calls[3].at.duration_since(calls[0].at) >= TEST_BACKOFF * 2);

    t.transport.shutdown().await.unwrap();
}

// =============================================================================
// Serialization failures
// =============================================================================

/// A serialization failure drops only that event: no send, no ack.
#[tokio::test]
async fn serialization_failure_skips_only_that_event() {
    let sender = Arc::new(StubSender::new());
    let engine = DeliveryEngine::new(
        sender.clone(),
        Arc::new(FailingMarshaller::failing_on(&[0])),
        TEST_BACKOFF,
    );
    let ack = StubAck::new();

    assert!(!engine.handle_event(&ack, &event("e1", "d1")).await);
    assert!(engine.handle_event(&ack, &event("e2", "d1")).await);

    let delivered = sender.delivered_events();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].id, "e2");
    assert_eq!(ack.count(), 1);
}

/// The batch keeps going past an event that cannot be serialized.
#[tokio::test]
async fn serialization_failure_does_not_stop_batch() {
    let sender = Arc::new(StubSender::new());
    let notifier = Arc::new(StubNotifier::new());
    let mut transport = ExportTransport::new(
        settings(16),
        sender.clone(),
        notifier.clone(),
        Arc::new(FailingMarshaller::failing_on(&[0])),
        Arc::new(StubCleanup::new()),
    );
    let ack = StubAck::new();

    let (proceed, _) = transport
        .deliver(&ack, vec![event("e1", "d1"), event("e2", "d2")])
        .await;

    assert!(proceed);
    let ids: Vec<_> = sender.delivered_events().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["e2"]);
    assert_eq!(ack.count(), 1);

    // Dedup still sees the event whose send was skipped.
    transport.shutdown().await.unwrap();
    assert_eq!(notifier.devices(), vec!["d1", "d2"]);
}

// =============================================================================
// Acknowledgment failures and results
// =============================================================================

/// A failed acknowledgment is logged and the event is not resent.
#[tokio::test]
async fn ack_failure_does_not_resend() {
    let mut t = TestTransport::new(StubSender::new(), StubNotifier::new());
    let ack = StubAck::failing();

    let (proceed, returned) = t.transport.deliver(&ack, vec![event("e1", "d1")]).await;

    assert!(proceed);
    assert_eq!(returned.len(), 1);
    assert_eq!(t.sender.calls_on(Channel::Event).len(), 1);
    assert_eq!(ack.count(), 1);

    t.transport.shutdown().await.unwrap();
}

/// Deliver always asks the host to continue and returns the batch as given.
#[tokio::test]
async fn deliver_returns_batch_unchanged() {
    let mut t = TestTransport::new(StubSender::new(), StubNotifier::new());
    let batch = vec![event("e1", "d1"), event("e2", "d2")];

    let (proceed, returned) = t.transport.deliver(&StubAck::new(), batch.clone()).await;

    assert!(proceed);
    assert_eq!(returned, batch);

    let (proceed, returned) = t.transport.deliver(&StubAck::new(), Vec::new()).await;
    assert!(proceed);
    assert!(returned.is_empty());

    t.transport.shutdown().await.unwrap();
}

/// Event payloads carry the event verbatim, extra fields included.
#[tokio::test]
async fn event_payload_is_json_of_event() {
    let mut t = TestTransport::new(StubSender::new(), StubNotifier::new());
    let original = event("e1", "boiler");

    t.transport
        .deliver(&StubAck::new(), vec![original.clone()])
        .await;

    assert_eq!(t.sender.delivered_events(), vec![original]);
    t.transport.shutdown().await.unwrap();
}

/// With a full queue, deliver waits for the dedup worker to make room.
#[tokio::test]
async fn full_queue_blocks_deliver() {
    let delay = Duration::from_millis(100);
    let mut t = TestTransport::with_capacity(
        StubSender::new(),
        StubNotifier::new().with_delay(delay),
        1,
    );

    let started = std::time::Instant::now();
    t.transport
        .deliver(
            &StubAck::new(),
            vec![event("e1", "d1"), event("e2", "d2"), event("e3", "d3")],
        )
        .await;

    assert!(started.elapsed() >= delay);
    t.transport.shutdown().await.unwrap();
    assert_eq!(t.notifier.devices(), vec!["d1", "d2", "d3"]);
}

// =============================================================================
// Logging
// =============================================================================

/// A serialization failure is logged as a warning naming the event.
#[tokio::test]
async fn serialization_failure_logs_warning() {
    let (logs, _guard) = LogCapture::install();
    let engine = DeliveryEngine::new(
        Arc::new(StubSender::new()),
        Arc::new(FailingMarshaller::failing_always()),
        TEST_BACKOFF,
    );

    engine.handle_event(&StubAck::new(), &event("e1", "d1")).await;

    let warnings = logs.messages_at("WARN");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("marshal failed for e1 (JSON error:"));
    assert!(logs.messages_at("ERROR").is_empty());
}

/// A failed acknowledgment is logged at error level.
#[tokio::test]
async fn ack_failure_logs_error() {
    let (logs, _guard) = LogCapture::install();
    let engine = DeliveryEngine::new(
        Arc::new(StubSender::new()),
        Arc::new(JsonMarshaller),
        TEST_BACKOFF,
    );

    engine.handle_event(&StubAck::failing(), &event("e1", "d1")).await;

    assert_eq!(logs.messages_at("ERROR"), vec!["Acknowledge failed after send"]);
}

/// A successful send is logged at debug level, once, after the retries.
#[tokio::test]
async fn successful_send_logs_debug() {
    let (logs, _guard) = LogCapture::install();
    let engine = DeliveryEngine::new(
        Arc::new(StubSender::failing_times(1)),
        Arc::new(JsonMarshaller),
        TEST_BACKOFF,
    );

    engine.handle_event(&StubAck::new(), &event("e1", "d1")).await;

    let debug = logs.messages_at("DEBUG");
    assert_eq!(debug.iter().filter(|m| *m == "sent for e1").count(), 1);
    assert_eq!(debug.last().map(String::as_str), Some("sent for e1"));
    assert!(logs.messages_at("ERROR").is_empty());
}
