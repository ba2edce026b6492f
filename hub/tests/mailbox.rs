mod support;

use std::sync::Arc;

use bus::BusAdapter;
use hub::protocol::{MediaKind, ProtocolEvent};
use hub::room;
use support::{FakeBus, FakeSfuClient, default_settings, join_client, recv_event, send_event};

/// A burst of commands sent faster than the room can process them still
/// comes out the other side in the order they were sent. Uses `ToggleMedia`
/// rather than chat so the burst isn't throttled by the chat rate limiter —
/// this test is about mailbox ordering, not chat specifically.
#[tokio::test]
async fn mailbox_preserves_fifo_under_burst() {
    let bus: Arc<dyn BusAdapter> = Arc::new(FakeBus::new());
    let sfu = Arc::new(FakeSfuClient { offer: "v=0...".to_string() });
    let (room, _join_handle) = room::spawn("r-burst".to_string(), default_settings(), bus, sfu, None);

    let rx = join_client(&room, "u-A", "Ada").await;
    for _ in 0..3 {
        recv_event(&rx).await;
    }

    const N: usize = 50;
    for i in 0..N {
        send_event(
            &room,
            "u-A",
            ProtocolEvent::ToggleMedia {
                kind: MediaKind::Audio,
                enabled: i % 2 == 0,
            },
        );
    }

    for i in 0..N {
        match recv_event(&rx).await {
            ProtocolEvent::MediaStateChanged { enabled, .. } => assert_eq!(enabled, i % 2 == 0),
            other => panic!("expected MediaStateChanged #{i}, got {other:?}"),
        }
    }
}
