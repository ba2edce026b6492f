mod support;

use std::sync::Arc;
use std::time::Duration;

use bus::{BusAdapter, participants_key};
use hub::protocol::{AdminActionKind, ChatEntry, ProtocolEvent, Role, SignalKind};
use hub::room::{self, RoomCommand};
use support::{FakeBus, FakeSfuClient, default_settings, join_client, recv_event, send_event, waiting_room_settings};

fn chat(content: &str) -> ChatEntry {
    ChatEntry {
        id: 0,
        sender_id: String::new(),
        sender_name: String::new(),
        content: content.to_string(),
        timestamp: 0,
        is_private: false,
        target_id: None,
    }
}

/// Scenario 1: happy join into an empty room.
#[tokio::test]
async fn happy_join() {
    let bus: Arc<dyn BusAdapter> = Arc::new(FakeBus::new());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-1".to_string(), default_settings(), bus, sfu, None);

    let rx_a = join_client(&room, "u-A", "Ada").await;

    match recv_event(&rx_a).await {
        ProtocolEvent::JoinResponse { success, role, participants, .. } => {
            assert!(success);
            assert_eq!(role, Role::Host);
            assert_eq!(participants.len(), 1);
            assert_eq!(participants[0].client_id, "u-A");
        }
        other => panic!("expected JoinResponse, got {other:?}"),
    }

    match recv_event(&rx_a).await {
        ProtocolEvent::SignalEvent { kind, sdp, .. } => {
            assert!(matches!(kind, SignalKind::Offer));
            assert_eq!(sdp.as_deref(), Some("v=0..."));
        }
        other => panic!("expected SignalEvent, got {other:?}"),
    }

    match recv_event(&rx_a).await {
        ProtocolEvent::RoomState { participants } => {
            assert_eq!(participants.len(), 1);
            assert_eq!(participants[0].role, Role::Host);
        }
        other => panic!("expected RoomState, got {other:?}"),
    }
}

/// Scenario 2: a second joiner lands in the waiting room and is admitted
/// by the host.
#[tokio::test]
async fn waiting_room_approve() {
    let bus: Arc<dyn BusAdapter> = Arc::new(FakeBus::new());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-2".to_string(), waiting_room_settings(), bus, sfu, None);

    let rx_h = join_client(&room, "u-H", "Host").await;
    for _ in 0..3 {
        recv_event(&rx_h).await;
    }

    let rx_g = join_client(&room, "u-G", "Guest").await;

    match recv_event(&rx_g).await {
        ProtocolEvent::JoinResponse { success, role, .. } => {
            assert!(success);
            assert_eq!(role, Role::Waiting);
        }
        other => panic!("expected JoinResponse, got {other:?}"),
    }

    match recv_event(&rx_h).await {
        ProtocolEvent::WaitingRequest { target_id, display_name } => {
            assert_eq!(target_id, "u-G");
            assert_eq!(display_name, "Guest");
        }
        other => panic!("expected WaitingRequest, got {other:?}"),
    }

    send_event(&room, "u-H", ProtocolEvent::AcceptWaiting { target_id: "u-G".to_string() });

    match recv_event(&rx_g).await {
        ProtocolEvent::AcceptWaiting { target_id } => assert_eq!(target_id, "u-G"),
        other => panic!("expected AcceptWaiting ack, got {other:?}"),
    }
    match recv_event(&rx_g).await {
        ProtocolEvent::SignalEvent { kind, sdp, .. } => {
            assert!(matches!(kind, SignalKind::Offer));
            assert_eq!(sdp.as_deref(), Some("v=0..."));
        }
        other => panic!("expected SignalEvent, got {other:?}"),
    }

    for rx in [&rx_g, &rx_h] {
        match recv_event(rx).await {
            ProtocolEvent::RoomState { participants } => {
                assert_eq!(participants.len(), 2);
                assert!(participants.iter().any(|p| p.client_id == "u-H" && p.role == Role::Host));
                assert!(participants.iter().any(|p| p.client_id == "u-G" && p.role == Role::Participant));
            }
            other => panic!("expected RoomState, got {other:?}"),
        }
    }
}

/// Scenario 3: the host transfers ownership to a participant.
#[tokio::test]
async fn ownership_transfer() {
    let bus: Arc<dyn BusAdapter> = Arc::new(FakeBus::new());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-3".to_string(), default_settings(), bus, sfu, None);

    let rx_h = join_client(&room, "u-H", "Host").await;
    for _ in 0..3 {
        recv_event(&rx_h).await;
    }
    let rx_p = join_client(&room, "u-P", "Pat").await;
    for _ in 0..3 {
        recv_event(&rx_p).await;
    }
    recv_event(&rx_h).await; // RoomState for P joining

    send_event(
        &room,
        "u-H",
        ProtocolEvent::AdminAction { action: AdminActionKind::TransferOwnership, target_id: "u-P".to_string() },
    );

    for rx in [&rx_h, &rx_p] {
        match recv_event(rx).await {
            ProtocolEvent::AdminEvent { kind, target_id } => {
                assert_eq!(kind, "ownership_transferred");
                assert_eq!(target_id.as_deref(), Some("u-P"));
            }
            other => panic!("expected AdminEvent, got {other:?}"),
        }
        match recv_event(rx).await {
            ProtocolEvent::RoomState { participants } => {
                assert!(participants.iter().any(|p| p.client_id == "u-H" && p.role == Role::Participant));
                assert!(participants.iter().any(|p| p.client_id == "u-P" && p.role == Role::Host));
            }
            other => panic!("expected RoomState, got {other:?}"),
        }
    }
}

/// Scenario 4: chat sent on one instance reaches a second instance over
/// the shared bus, while the originating instance suppresses its own echo.
#[tokio::test]
async fn cross_instance_chat() {
    let shared_bus = FakeBus::new();
    let bus1: Arc<dyn BusAdapter> = Arc::new(shared_bus.clone());
    let bus2: Arc<dyn BusAdapter> = Arc::new(shared_bus.clone());

    let sfu1 = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let sfu2 = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });

    let (room1, _j1) = room::spawn("r-4".to_string(), default_settings(), bus1, sfu1, None);
    let (room2, _j2) = room::spawn("r-4".to_string(), default_settings(), bus2, sfu2, None);

    let rx_x = join_client(&room1, "u-X", "Xena").await;
    for _ in 0..3 {
        recv_event(&rx_x).await;
    }
    let rx_y = join_client(&room2, "u-Y", "Yuki").await;
    for _ in 0..3 {
        recv_event(&rx_y).await;
    }

    send_event(&room1, "u-X", ProtocolEvent::ChatEvent { entry: chat("hi") });

    match recv_event(&rx_x).await {
        ProtocolEvent::ChatEvent { entry } => {
            assert_eq!(entry.sender_id, "u-X");
            assert_eq!(entry.content, "hi");
        }
        other => panic!("expected local ChatEvent echo, got {other:?}"),
    }

    match recv_event(&rx_y).await {
        ProtocolEvent::ChatEvent { entry } => {
            assert_eq!(entry.sender_id, "u-X");
            assert_eq!(entry.content, "hi");
        }
        other => panic!("expected remote ChatEvent, got {other:?}"),
    }

    // Nothing further arrives at X: its own publish came back over the bus
    // too, but was dropped as an echo rather than delivered a second time.
    let extra = tokio::time::timeout(Duration::from_millis(200), rx_x.recv()).await;
    assert!(extra.is_err(), "instance 1 delivered its own chat message twice");
}

/// Scenario 5: while the bus breaker is open, local delivery still works
/// and roster reads degrade to empty rather than failing.
#[tokio::test]
async fn bus_breaker_open_degrades_gracefully() {
    let bus = FakeBus::new();
    let bus_handle: Arc<dyn BusAdapter> = Arc::new(bus.clone());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-5".to_string(), default_settings(), bus_handle, sfu, None);

    let rx_a = join_client(&room, "u-A", "Ada").await;
    for _ in 0..3 {
        recv_event(&rx_a).await;
    }

    bus.set_breaker_open(true);

    let rx_b = join_client(&room, "u-B", "Bob").await;
    for _ in 0..3 {
        recv_event(&rx_b).await;
    }

    match recv_event(&rx_a).await {
        ProtocolEvent::RoomState { participants } => assert_eq!(participants.len(), 2),
        other => panic!("expected RoomState despite open breaker, got {other:?}"),
    }

    let members = bus.set_members(&participants_key("r-5")).await.unwrap();
    assert!(members.is_empty(), "set_members should read empty while the breaker is open");

    bus.set_breaker_open(false);
    let members = bus.set_members(&participants_key("r-5")).await.unwrap();
    assert!(members.contains(&"u-A".to_string()));
}

/// Scenario 6: a client that never drains its outbound queue is
/// eventually disconnected, and the room carries on without it.
#[tokio::test]
async fn slow_client_is_disconnected() {
    let bus: Arc<dyn BusAdapter> = Arc::new(FakeBus::new());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-6".to_string(), default_settings(), bus, sfu, None);

    let rx_h = join_client(&room, "u-H", "Host").await;
    for _ in 0..3 {
        recv_event(&rx_h).await;
    }
    let _rx_b = join_client(&room, "u-B", "Bob").await; // never drained
    recv_event(&rx_h).await; // RoomState for B joining

    for _ in 0..400 {
        send_event(&room, "u-H", ProtocolEvent::RaiseHand);
    }

    let mut saw_disconnect = false;
    for _ in 0..500 {
        match recv_event(&rx_h).await {
            ProtocolEvent::RoomState { participants } if participants.len() == 1 => {
                assert_eq!(participants[0].client_id, "u-H");
                saw_disconnect = true;
                break;
            }
            _ => continue,
        }
    }
    assert!(saw_disconnect, "slow consumer was never disconnected");
}
