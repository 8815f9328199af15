// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use aoa_emulator::{spawn_echo, EmulatedHost, PermissionPolicy};
use aoa_session::{
    AccessoryHandle, CoordinatorHandle, CoordinatorState, LifecycleCoordinator, MainContext,
    ObserverCallback, SessionEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

fn accessory() -> AccessoryHandle {
    AccessoryHandle::new("TestMfg", "TestAccessory").with_serial("EMU001")
}

/// Spin up a coordinator with a driven main context; events land in the
/// returned receiver in delivery order.
fn start_coordinator(
    host: Arc<EmulatedHost>,
) -> (CoordinatorHandle, mpsc::UnboundedReceiver<SessionEvent>) {
    let (ctx, driver) = MainContext::new();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let observer: ObserverCallback = Arc::new(move |event| {
        let _ = event_tx.send(event);
    });

    let (coordinator, handle) = LifecycleCoordinator::new(host, ctx, observer);
    tokio::spawn(coordinator.process());
    tokio::spawn(driver.run());
    (handle, event_rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream ended")
}

async fn wait_for_state(handle: &CoordinatorHandle, want: CoordinatorState) {
    timeout(WAIT, async {
        while handle.state().await != want {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for state");
}

#[tokio::test]
async fn test_already_granted_accessory_opens_without_prompt() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let _peer = host.plug(&handle);
    host.grant_upfront(&handle);

    let (control, mut events) = start_coordinator(host.clone());
    control.attach(handle.clone()).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Opened {
            handle: handle.clone()
        }
    );
    assert_eq!(host.prompt_count(), 0);
    assert_eq!(control.state().await, CoordinatorState::SessionOpen);

    control.shutdown().unwrap();
    assert_eq!(next_event(&mut events).await, SessionEvent::Closed);
}

#[tokio::test]
async fn test_granted_prompt_leads_to_open_session() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let _peer = host.plug(&handle);

    let (control, mut events) = start_coordinator(host.clone());
    control.attach(handle.clone()).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Opened {
            handle: handle.clone()
        }
    );
    assert_eq!(host.prompt_count(), 1);

    control.shutdown().unwrap();
}

#[tokio::test]
async fn test_denied_permission_returns_to_idle_without_session() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::DenyAll));
    let handle = accessory();
    let _peer = host.plug(&handle);

    let (control, mut events) = start_coordinator(host);
    control.attach(handle.clone()).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::PermissionDenied {
            handle: handle.clone()
        }
    );
    wait_for_state(&control, CoordinatorState::Idle).await;

    // No session was ever opened
    assert!(timeout(QUIET, events.recv()).await.is_err());
}

#[tokio::test]
async fn test_open_failure_reaches_closed_without_read_loop() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let _peer = host.plug(&handle);
    host.set_fail_open(true);

    let (control, mut events) = start_coordinator(host);
    control.attach(handle.clone()).unwrap();

    match next_event(&mut events).await {
        SessionEvent::Fault { reason } => assert!(reason.contains("open")),
        other => panic!("expected fault, got {:?}", other),
    }
    wait_for_state(&control, CoordinatorState::Closed).await;

    // No Opened event, no messages: the read loop never started
    assert!(timeout(QUIET, events.recv()).await.is_err());
}

#[tokio::test]
async fn test_unavailable_permission_service_reports_fault() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let _peer = host.plug(&handle);
    host.set_broker_down(true);

    let (control, mut events) = start_coordinator(host);
    control.attach(handle.clone()).unwrap();

    match next_event(&mut events).await {
        SessionEvent::Fault { reason } => assert!(reason.contains("Permission request failed")),
        other => panic!("expected fault, got {:?}", other),
    }
    wait_for_state(&control, CoordinatorState::Idle).await;
}

#[tokio::test]
async fn test_echo_round_trip_delivers_exactly_one_message() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let peer = host.plug(&handle);
    host.grant_upfront(&handle);
    spawn_echo(peer);

    let (control, mut events) = start_coordinator(host);
    control.attach(handle.clone()).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Opened { .. }
    ));

    control.send_message("Hello from the app!").unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Message {
            text: "Hello from the app!".to_string()
        }
    );
    // One write, one echo, nothing else
    assert!(timeout(QUIET, events.recv()).await.is_err());

    control.shutdown().unwrap();
    assert_eq!(next_event(&mut events).await, SessionEvent::Closed);
    wait_for_state(&control, CoordinatorState::Closed).await;
}

#[tokio::test]
async fn test_orderly_stream_end_is_not_a_fault() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let peer = host.plug(&handle);
    host.grant_upfront(&handle);

    let (control, mut events) = start_coordinator(host);
    control.attach(handle.clone()).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Opened { .. }
    ));

    peer.send(&b"bye"[..]);
    peer.finish();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Message {
            text: "bye".to_string()
        }
    );
    // Stream end: no fault, no further messages, session stays until detach
    assert!(timeout(QUIET, events.recv()).await.is_err());
    assert_eq!(control.state().await, CoordinatorState::SessionOpen);

    control.shutdown().unwrap();
}

#[tokio::test]
async fn test_read_fault_closes_the_session() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let peer = host.plug(&handle);
    host.grant_upfront(&handle);

    let (control, mut events) = start_coordinator(host);
    control.attach(handle.clone()).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Opened { .. }
    ));

    peer.fail();

    match next_event(&mut events).await {
        SessionEvent::Fault { reason } => assert!(reason.contains("read")),
        other => panic!("expected fault, got {:?}", other),
    }
    wait_for_state(&control, CoordinatorState::Closed).await;
}

#[tokio::test]
async fn test_detach_closes_and_reattach_starts_fresh() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let _peer = host.plug(&handle);
    host.grant_upfront(&handle);

    let (control, mut events) = start_coordinator(host.clone());
    control.attach(handle.clone()).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Opened { .. }
    ));

    control.detach(handle.clone()).unwrap();
    assert_eq!(next_event(&mut events).await, SessionEvent::Closed);
    wait_for_state(&control, CoordinatorState::Closed).await;

    // Closed is terminal for the old instance only
    let _peer = host.plug(&handle);
    control.attach(handle.clone()).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Opened { .. }
    ));

    control.shutdown().unwrap();
}

#[tokio::test]
async fn test_observer_runs_on_the_main_context_only() {
    let host = Arc::new(EmulatedHost::new(PermissionPolicy::GrantAll));
    let handle = accessory();
    let _peer = host.plug(&handle);
    host.grant_upfront(&handle);

    let (ctx, mut driver) = MainContext::new();
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let observer: ObserverCallback = Arc::new(move |event| {
        let _ = event_tx.send(event);
    });

    let (coordinator, control) = LifecycleCoordinator::new(host, ctx, observer);
    tokio::spawn(coordinator.process());

    control.attach(handle.clone()).unwrap();
    wait_for_state(&control, CoordinatorState::SessionOpen).await;

    // The session is open but nobody drove the main context yet, so the
    // observer has not seen anything
    assert!(events.try_recv().is_err());

    timeout(WAIT, async {
        while driver.run_pending() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no job reached the main context");

    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Opened {
            handle: handle.clone()
        }
    );

    control.shutdown().unwrap();
}
