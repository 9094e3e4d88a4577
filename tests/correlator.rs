mod common;

use agrisync::codec;
use agrisync::correlator::{CallOptions, Correlator, Resolution};
use agrisync::error::SyncError;
use agrisync::transport::{MemoryTransport, Transport};
use common::{standalone, Behaviour, FakeFleet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const FETCH_B: &str = "config/subscribe/dev-B";
const FETCH_B_RESPONSE: &str = "config/subscribe/dev-B/response";

fn payload_for(id: &str) -> String {
    codec::to_transport_envelope(id.as_bytes())
}

#[tokio::test(start_paused = true)]
async fn silent_device_times_out_after_full_budget() {
    let bus = Arc::new(MemoryTransport::new());
    bus.connect().await.unwrap();
    let correlator = Correlator::new(bus.clone());

    let started = Instant::now();
    let resolution = correlator
        .call(
            FETCH_B,
            FETCH_B_RESPONSE,
            &payload_for("dev-B"),
            &CallOptions::new(3, 1_000, false),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(resolution, Resolution::Timeout);
    assert!(elapsed >= Duration::from_millis(3_000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3_100), "{:?}", elapsed);

    assert_eq!(bus.published_to(FETCH_B).len(), 1);
    assert_eq!(bus.subscribe_count(FETCH_B_RESPONSE), 1);
    assert_eq!(bus.unsubscribe_count(FETCH_B_RESPONSE), 1);
    assert!(!bus.is_subscribed(FETCH_B_RESPONSE));

    // a straggler reply after resolution finds no listener
    assert!(!bus.inject(FETCH_B_RESPONSE, "late"));
}

#[tokio::test(start_paused = true)]
async fn retransmit_publishes_on_every_attempt() {
    let bus = Arc::new(MemoryTransport::new());
    bus.connect().await.unwrap();
    let correlator = Correlator::new(bus.clone());

    let resolution = correlator
        .call(
            "config/publish/dev-B",
            "config/publish/dev-B/response",
            "CAE=",
            &CallOptions::new(3, 3_000, true),
        )
        .await
        .unwrap();

    assert_eq!(resolution, Resolution::Timeout);
    assert_eq!(bus.published_to("config/publish/dev-B").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failure_marker_resolves_as_failure() {
    let fleet = FakeFleet::new().await;
    fleet
        .add(standalone("dev-B"), Behaviour::Fail, Behaviour::Answer)
        .await;
    let correlator = Correlator::new(fleet.bus().clone());

    let started = Instant::now();
    let resolution = correlator
        .call(FETCH_B, FETCH_B_RESPONSE, &payload_for("dev-B"), &CallOptions::default())
        .await
        .unwrap();

    assert_eq!(resolution, Resolution::Failure);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(fleet.bus().unsubscribe_count(FETCH_B_RESPONSE), 1);
}

#[tokio::test(start_paused = true)]
async fn immediate_reply_is_not_lost() {
    // the fake firmware answers synchronously inside publish, so this only
    // succeeds if the response subscription exists before the request goes out
    let fleet = FakeFleet::new().await;
    fleet
        .add(standalone("dev-B"), Behaviour::Answer, Behaviour::Answer)
        .await;
    let correlator = Correlator::new(fleet.bus().clone());

    let resolution = correlator
        .call(FETCH_B, FETCH_B_RESPONSE, &payload_for("dev-B"), &CallOptions::default())
        .await
        .unwrap();

    match resolution {
        Resolution::Success(reply) => {
            let config = codec::decode_envelope(&reply).unwrap();
            assert_eq!(config.id(), "dev-B");
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(fleet.bus().unsubscribe_count(FETCH_B_RESPONSE), 1);
    assert!(!fleet.bus().is_subscribed(FETCH_B_RESPONSE));
}

#[tokio::test(start_paused = true)]
async fn earlier_call_leaves_a_later_subscription_alone() {
    let bus = Arc::new(MemoryTransport::new());
    bus.connect().await.unwrap();
    let correlator = Correlator::new(bus.clone());
    let payload = payload_for("dev-B");

    // the short call gives up at 1000 ms while the long one still listens
    let short_options = CallOptions::new(1, 1_000, false);
    let long_options = CallOptions::new(3, 1_000, false);
    let short = correlator.call(FETCH_B, FETCH_B_RESPONSE, &payload, &short_options);
    let long = correlator.call(FETCH_B, FETCH_B_RESPONSE, &payload, &long_options);
    let reply = async {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        bus.inject(FETCH_B_RESPONSE, "OK")
    };

    let (short, long, delivered) = tokio::join!(short, long, reply);

    assert_eq!(short.unwrap(), Resolution::Timeout);
    assert!(delivered);
    assert_eq!(long.unwrap(), Resolution::Success("OK".to_string()));
    assert_eq!(bus.published_to(FETCH_B).len(), 2);
    assert_eq!(bus.unsubscribe_count(FETCH_B_RESPONSE), 1);
    assert!(!bus.is_subscribed(FETCH_B_RESPONSE));
}

#[tokio::test]
async fn disconnected_transport_fails_fast() {
    let bus = Arc::new(MemoryTransport::new());
    let correlator = Correlator::new(bus.clone());

    let err = correlator
        .call(FETCH_B, FETCH_B_RESPONSE, &payload_for("dev-B"), &CallOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::TransportUnavailable { ref topic } if topic == FETCH_B));
    assert!(!err.is_retryable());
    assert!(bus.published().is_empty());
    assert_eq!(bus.unsubscribe_count(FETCH_B_RESPONSE), 1);
}
