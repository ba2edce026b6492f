use tokio_util::sync::CancellationToken;

use crate::error::HubError;

pub const OUTBOUND_CAPACITY: usize = 256;

/// One client's outbound frame queue. `send` never blocks the caller (the
/// room worker): a full queue means the client is a slow consumer and gets
/// disconnected, rather than backpressuring the single-writer room actor.
///
/// Carries its own [`CancellationToken`] so a reconnecting client can tear
/// down its predecessor's session task directly, without routing a command
/// back through the room mailbox.
#[derive(Clone)]
pub struct Outbound {
    tx: async_channel::Sender<Vec<u8>>,
    cancel: CancellationToken,
}

impl Outbound {
    pub fn new() -> (Self, async_channel::Receiver<Vec<u8>>) {
        let (tx, rx) = async_channel::bounded(OUTBOUND_CAPACITY);
        (
            Self {
                tx,
                cancel: CancellationToken::new(),
            },
            rx,
        )
    }

    pub fn send(&self, frame: Vec<u8>) -> Result<(), HubError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(async_channel::TrySendError::Full(_)) => Err(HubError::SlowConsumer),
            Err(async_channel::TrySendError::Closed(_)) => {
                Err(HubError::Internal("outbound queue closed".to_string()))
            }
        }
    }

    pub fn close(&self) {
        self.tx.close();
    }

    /// Signals the session task owning this queue to stop reading and close
    /// its socket, used when a newer connection for the same client replaces it.
    pub fn replace(&self) {
        self.cancel.cancel();
        self.tx.close();
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_consumer_triggers_on_the_257th_message() {
        let (outbound, _rx) = Outbound::new();
        for _ in 0..OUTBOUND_CAPACITY {
            outbound.send(vec![0]).unwrap();
        }
        assert!(matches!(outbound.send(vec![0]), Err(HubError::SlowConsumer)));
    }

    #[test]
    fn send_succeeds_while_under_capacity() {
        let (outbound, rx) = Outbound::new();
        outbound.send(vec![1, 2, 3]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3]);
    }
}
