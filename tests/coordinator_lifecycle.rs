//! Capture coordinator lifecycle against fake hosts.
//!
//! Covers the permission handshake, in-flight request dropping, the capture
//! timeout, host revocation and the cancel/stop split.

mod support;

use snip_chat_lib::capture::{spawn_coordinator, CaptureEvent, ScratchStore, SessionState};
use snip_chat_lib::config::CaptureConfig;
use snip_chat_lib::error::SnipError;
use std::sync::Arc;
use std::time::Duration;
use support::*;

#[tokio::test]
async fn capture_without_grant_prompts_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new(64, 48, FrameMode::Immediate);
    let broker = FakeBroker::holding();
    let (coordinator, mut events, _task) = spawn_coordinator(
        host.clone(),
        broker.clone(),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );
    let mut state = coordinator.watch_state();

    coordinator.request_capture(None);
    coordinator.request_capture(None);
    coordinator.request_permission();
    assert_eq!(next_event(&mut events).await, CaptureEvent::PermissionRequested);
    wait_for_state(&mut state, SessionState::AwaitingPermission).await;
    settle().await;

    assert_eq!(broker.requests(), 1);
    assert_eq!(host.starts(), 0, "no mirroring before the grant");

    broker.grant_held();
    assert_eq!(next_event(&mut events).await, CaptureEvent::PermissionGranted);
    match next_outcome(&mut events).await {
        CaptureEvent::FrameCaptured(image) => {
            assert_eq!((image.width, image.height), (64, 48));
            assert!(image.path.exists());
        }
        other => panic!("expected a frame, got {:?}", other),
    }
    wait_for_state(&mut state, SessionState::Completed).await;
    assert_eq!(host.starts(), 1);
    assert_eq!(host.live(), 0, "mirroring released after the first frame");
}

#[tokio::test]
async fn captured_frame_drops_row_padding_and_swizzles() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new(33, 17, FrameMode::Immediate);
    let (coordinator, mut events, _task) = spawn_coordinator(
        host,
        FakeBroker::granting(),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );

    coordinator.request_capture(None);
    let CaptureEvent::FrameCaptured(stored) = next_outcome(&mut events).await else {
        panic!("capture failed");
    };
    let image = ScratchStore::load(&stored.path).unwrap();
    assert_eq!(image.dimensions(), (33, 17));
    for (x, y, px) in image.enumerate_pixels() {
        assert_eq!(px.0, pixel_at(x, y), "pixel ({}, {})", x, y);
    }
}

#[tokio::test]
async fn capture_requests_while_in_flight_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new(40, 40, FrameMode::Manual);
    let (coordinator, mut events, _task) = spawn_coordinator(
        host.clone(),
        FakeBroker::granting(),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );
    let mut state = coordinator.watch_state();

    coordinator.request_capture(None);
    coordinator.request_capture(None);
    wait_for_state(&mut state, SessionState::FrameRequested).await;

    for _ in 0..3 {
        coordinator.request_capture(Some(Duration::ZERO));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(host.starts(), 1, "one mirroring session per capture");
    assert_eq!(coordinator.state(), SessionState::FrameRequested);

    assert!(host.deliver_frame());
    assert!(matches!(
        next_outcome(&mut events).await,
        CaptureEvent::FrameCaptured(_)
    ));
    // Only the first frame is taken.
    host.deliver_frame();
    settle().await;
    assert_eq!(host.live(), 0);
    assert_eq!(host.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn no_frame_within_timeout_resets_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new(40, 40, FrameMode::Manual);
    let (coordinator, mut events, _task) = spawn_coordinator(
        host.clone(),
        FakeBroker::granting(),
        CaptureConfig::default(),
        ScratchStore::new(dir.path()),
    );

    coordinator.request_capture(None);
    let outcome = next_outcome(&mut events).await;
    assert_eq!(outcome, CaptureEvent::Failed(SnipError::CaptureTimeout(1500)));
    assert_eq!(outcome_signal(&outcome), None, "timeouts reset silently");

    settle().await;
    assert_eq!(coordinator.state(), SessionState::Idle);
    assert_eq!(host.live(), 0, "mirroring released on timeout");

    // A frame showing up late is ignored.
    host.deliver_frame();
    settle().await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn revocation_drops_session_and_next_capture_reprompts() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new(40, 40, FrameMode::Manual);
    let broker = FakeBroker::granting();
    let (coordinator, mut events, _task) = spawn_coordinator(
        host.clone(),
        broker.clone(),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );
    let mut state = coordinator.watch_state();

    coordinator.request_capture(None);
    wait_for_state(&mut state, SessionState::FrameRequested).await;
    host.revoke("user stopped sharing");

    assert_eq!(
        next_outcome(&mut events).await,
        CaptureEvent::Failed(SnipError::SessionLost("user stopped sharing".into()))
    );
    wait_for_state(&mut state, SessionState::Idle).await;
    assert_eq!(host.live(), 0, "no leaked mirroring handle");

    host.set_mode(FrameMode::Immediate);
    coordinator.request_capture(None);
    assert!(matches!(
        next_outcome(&mut events).await,
        CaptureEvent::FrameCaptured(_)
    ));
    assert_eq!(broker.requests(), 2, "revocation invalidates the grant");
    assert_eq!(host.starts(), 2);
    assert_eq!(host.live(), 0);
}

#[tokio::test]
async fn denial_fails_and_a_later_capture_asks_again() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new(40, 40, FrameMode::Immediate);
    let broker = FakeBroker::holding();
    let (coordinator, mut events, _task) = spawn_coordinator(
        host.clone(),
        broker.clone(),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );
    let mut state = coordinator.watch_state();

    coordinator.request_capture(None);
    wait_for_state(&mut state, SessionState::AwaitingPermission).await;
    broker.deny_held();
    assert_eq!(
        next_outcome(&mut events).await,
        CaptureEvent::Failed(SnipError::PermissionDenied)
    );
    wait_for_state(&mut state, SessionState::Failed).await;
    assert_eq!(host.starts(), 0);

    coordinator.request_capture(None);
    wait_for_state(&mut state, SessionState::AwaitingPermission).await;
    assert_eq!(broker.requests(), 2);
    broker.grant_held();
    assert!(matches!(
        next_outcome(&mut events).await,
        CaptureEvent::FrameCaptured(_)
    ));
}

#[tokio::test]
async fn unanswered_prompt_counts_as_denial() {
    struct Forgetful;
    impl snip_chat_lib::capture::PermissionBroker for Forgetful {
        fn request(&self, _reply: snip_chat_lib::capture::PermissionReply) {}
    }

    let dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events, _task) = spawn_coordinator(
        FakeHost::new(10, 10, FrameMode::Immediate),
        Arc::new(Forgetful),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );

    coordinator.request_capture(None);
    assert_eq!(
        next_outcome(&mut events).await,
        CaptureEvent::Failed(SnipError::PermissionDenied)
    );
}

#[tokio::test]
async fn cancel_keeps_grant_but_stop_forgets_it() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new(20, 20, FrameMode::Immediate);
    let broker = FakeBroker::granting();
    let (coordinator, mut events, _task) = spawn_coordinator(
        host.clone(),
        broker.clone(),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );
    let mut state = coordinator.watch_state();

    coordinator.request_capture(None);
    assert!(matches!(next_outcome(&mut events).await, CaptureEvent::FrameCaptured(_)));
    coordinator.cancel();
    coordinator.cancel();
    wait_for_state(&mut state, SessionState::Idle).await;

    coordinator.request_capture(None);
    assert!(matches!(next_outcome(&mut events).await, CaptureEvent::FrameCaptured(_)));
    assert_eq!(broker.requests(), 1, "cancel keeps the grant");

    coordinator.stop();
    wait_for_state(&mut state, SessionState::Idle).await;
    coordinator.request_capture(None);
    assert!(matches!(next_outcome(&mut events).await, CaptureEvent::FrameCaptured(_)));
    assert_eq!(broker.requests(), 2, "stop destroys the grant");
    assert_eq!(host.live(), 0);
}

#[tokio::test]
async fn frame_after_cancel_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new(20, 20, FrameMode::Manual);
    let (coordinator, mut events, _task) = spawn_coordinator(
        host.clone(),
        FakeBroker::granting(),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );
    let mut state = coordinator.watch_state();

    coordinator.request_capture(None);
    wait_for_state(&mut state, SessionState::FrameRequested).await;
    coordinator.cancel();
    wait_for_state(&mut state, SessionState::Idle).await;
    assert_eq!(host.live(), 0);

    host.deliver_frame();
    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, CaptureEvent::FrameCaptured(_)),
            "stale frame was accepted"
        );
    }
    assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
}

#[tokio::test]
async fn shutdown_ends_the_control_loop() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _events, task) = spawn_coordinator(
        FakeHost::new(10, 10, FrameMode::Manual),
        FakeBroker::granting(),
        fast_capture_config(),
        ScratchStore::new(dir.path()),
    );
    coordinator.shutdown();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

fn outcome_signal(event: &CaptureEvent) -> Option<snip_chat_lib::signals::UserSignal> {
    match event {
        CaptureEvent::Failed(e) => e.signal(),
        _ => None,
    }
}
