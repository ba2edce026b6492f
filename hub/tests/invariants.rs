mod support;

use std::sync::Arc;
use std::time::Duration;

use bus::BusAdapter;
use hub::protocol::ProtocolEvent;
use hub::room::{self, RoomCommand};
use support::{FakeBus, FakeSfuClient, default_settings, join_client, recv_event, send_event, waiting_room_settings};

/// A second `AcceptWaiting` for a client already admitted is a no-op: the
/// room has nothing left to remove from its waiting set and produces no
/// further frames.
#[tokio::test]
async fn duplicate_accept_waiting_is_noop() {
    let bus: Arc<dyn BusAdapter> = Arc::new(FakeBus::new());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-dup-accept".to_string(), waiting_room_settings(), bus, sfu, None);

    let rx_h = join_client(&room, "u-H", "Host").await;
    for _ in 0..3 {
        recv_event(&rx_h).await;
    }
    let rx_g = join_client(&room, "u-G", "Guest").await;
    recv_event(&rx_g).await; // JoinResponse{Waiting}
    recv_event(&rx_h).await; // WaitingRequest

    send_event(&room, "u-H", ProtocolEvent::AcceptWaiting { target_id: "u-G".to_string() });
    recv_event(&rx_g).await; // AcceptWaiting ack
    recv_event(&rx_g).await; // SignalEvent offer
    recv_event(&rx_g).await; // RoomState
    recv_event(&rx_h).await; // RoomState

    send_event(&room, "u-H", ProtocolEvent::AcceptWaiting { target_id: "u-G".to_string() });

    let extra = tokio::time::timeout(Duration::from_millis(200), rx_g.recv()).await;
    assert!(extra.is_err(), "a duplicate accept produced an unexpected frame");
}

/// A `Disconnect` for a client already removed from the room is a no-op:
/// exactly one `RoomState` broadcast follows a leave, never two.
#[tokio::test]
async fn duplicate_leave_broadcasts_room_state_once() {
    let bus: Arc<dyn BusAdapter> = Arc::new(FakeBus::new());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-dup-leave".to_string(), default_settings(), bus, sfu, None);

    let rx_a = join_client(&room, "u-A", "Ada").await;
    for _ in 0..3 {
        recv_event(&rx_a).await;
    }
    let _rx_b = join_client(&room, "u-B", "Bob").await;
    recv_event(&rx_a).await; // RoomState for B joining

    room.send(RoomCommand::Disconnect { client_id: "u-B".to_string() });
    match recv_event(&rx_a).await {
        ProtocolEvent::RoomState { participants } => assert_eq!(participants.len(), 1),
        other => panic!("expected RoomState, got {other:?}"),
    }

    room.send(RoomCommand::Disconnect { client_id: "u-B".to_string() });
    let extra = tokio::time::timeout(Duration::from_millis(200), rx_a.recv()).await;
    assert!(extra.is_err(), "a duplicate leave produced a second RoomState broadcast");
}

/// A denied waiting client actually receives its own `DenyWaiting` frame
/// before its connection is torn down.
#[tokio::test]
async fn denied_waiting_client_is_notified() {
    let bus: Arc<dyn BusAdapter> = Arc::new(FakeBus::new());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-deny".to_string(), waiting_room_settings(), bus, sfu, None);

    let rx_h = join_client(&room, "u-H", "Host").await;
    for _ in 0..3 {
        recv_event(&rx_h).await;
    }
    let rx_g = join_client(&room, "u-G", "Guest").await;
    recv_event(&rx_g).await; // JoinResponse{Waiting}
    recv_event(&rx_h).await; // WaitingRequest

    send_event(&room, "u-H", ProtocolEvent::DenyWaiting { target_id: "u-G".to_string() });

    match recv_event(&rx_g).await {
        ProtocolEvent::DenyWaiting { target_id } => assert_eq!(target_id, "u-G"),
        other => panic!("expected DenyWaiting, got {other:?}"),
    }
}
