//! Per-instance gRPC client to the external SFU process (C3).
//!
//! Every call is routed through a single [`breaker::CircuitBreaker`] shared
//! across all calls to this dependency, per the "one breaker per external
//! dependency" design note. When the breaker is open, `create_session` fails
//! fast with [`SfuClientError::Unavailable`] and signal forwarding is simply
//! dropped — the room keeps running, degraded to "no media changes".

use std::time::Duration;

use breaker::{BreakerConfig, BreakerError, CircuitBreaker};
use futures_util::Stream;
use sfu_proto::{
    CreateSessionRequest, DeleteSessionRequest, HandleSignalRequest, IceCandidate,
    ListenEventsRequest, handle_signal_request, sfu_event, sfu_service_client::SfuServiceClient,
};
use std::pin::Pin;
use tonic::transport::Channel;
use tracing::warn;

const UNARY_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum SignalKind {
    Offer(String),
    Answer(String),
    Candidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u32>,
    },
}

#[derive(Debug, Clone)]
pub enum SfuEvent {
    TrackAdded {
        stream_id: String,
        user_id: String,
        track_id: String,
        is_video: bool,
    },
    SdpOffer(String),
    SdpAnswer(String),
    IceCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u32>,
    },
    Caption {
        user_id: String,
        language: String,
        text: String,
        is_final: bool,
    },
}

impl From<sfu_proto::SfuEvent> for Option<SfuEvent> {
    fn from(value: sfu_proto::SfuEvent) -> Self {
        match value.event? {
            sfu_event::Event::TrackAdded(t) => Some(SfuEvent::TrackAdded {
                stream_id: t.stream_id,
                user_id: t.user_id,
                track_id: t.track_id,
                is_video: t.is_video,
            }),
            sfu_event::Event::SdpOffer(sdp) => Some(SfuEvent::SdpOffer(sdp)),
            sfu_event::Event::SdpAnswer(sdp) => Some(SfuEvent::SdpAnswer(sdp)),
            sfu_event::Event::Candidate(c) => Some(SfuEvent::IceCandidate {
                candidate: c.candidate,
                sdp_mid: c.sdp_mid,
                sdp_m_line_index: c.sdp_m_line_index,
            }),
            sfu_event::Event::Caption(c) => Some(SfuEvent::Caption {
                user_id: c.user_id,
                language: c.language,
                text: c.text,
                is_final: c.is_final,
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SfuClientError {
    #[error("SFU unavailable: circuit breaker open")]
    Unavailable,
    #[error("SFU call failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("SFU transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

pub type EventStream = Pin<Box<dyn Stream<Item = SfuEvent> + Send>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SfuClient: Send + Sync {
    async fn create_session(
        &self,
        client_id: &str,
        room_id: &str,
    ) -> Result<String, SfuClientError>;

    async fn handle_signal(
        &self,
        client_id: &str,
        room_id: &str,
        signal: SignalKind,
    ) -> Result<(), SfuClientError>;

    async fn delete_session(&self, client_id: &str, room_id: &str) -> Result<(), SfuClientError>;

    async fn listen_events(
        &self,
        client_id: &str,
        room_id: &str,
    ) -> Result<EventStream, SfuClientError>;

    fn breaker_open(&self) -> bool;
}

/// Real gRPC-backed SFU client, one per process, sharing a single channel.
pub struct GrpcSfuClient {
    channel: Channel,
    breaker: CircuitBreaker,
}

impl GrpcSfuClient {
    pub async fn connect(addr: impl Into<String>) -> Result<Self, SfuClientError> {
        let channel = Channel::from_shared(addr.into())
            .map_err(|e| SfuClientError::Transport(tonic::transport::Error::from(e)))?
            .connect()
            .await?;
        Ok(Self {
            channel,
            breaker: CircuitBreaker::new("sfu", BreakerConfig::default()),
        })
    }

    fn client(&self) -> SfuServiceClient<Channel> {
        SfuServiceClient::new(self.channel.clone())
    }
}

#[async_trait::async_trait]
impl SfuClient for GrpcSfuClient {
    async fn create_session(
        &self,
        client_id: &str,
        room_id: &str,
    ) -> Result<String, SfuClientError> {
        let mut client = self.client();
        let client_id = client_id.to_string();
        let room_id = room_id.to_string();

        let result = self
            .breaker
            .call(|| async move {
                let mut req = tonic::Request::new(CreateSessionRequest { client_id, room_id });
                req.set_timeout(UNARY_DEADLINE);
                client.create_session(req).await
            })
            .await;

        match result {
            Ok(resp) => Ok(resp.into_inner().sdp_offer),
            Err(BreakerError::Open) => Err(SfuClientError::Unavailable),
            Err(BreakerError::Inner(status)) => Err(SfuClientError::Rpc(status)),
        }
    }

    async fn handle_signal(
        &self,
        client_id: &str,
        room_id: &str,
        signal: SignalKind,
    ) -> Result<(), SfuClientError> {
        let mut client = self.client();
        let client_id = client_id.to_string();
        let room_id = room_id.to_string();

        let signal_oneof = match signal {
            SignalKind::Offer(sdp) => handle_signal_request::Signal::SdpOffer(sdp),
            SignalKind::Answer(sdp) => handle_signal_request::Signal::SdpAnswer(sdp),
            SignalKind::Candidate {
                candidate,
                sdp_mid,
                sdp_m_line_index,
            } => handle_signal_request::Signal::Candidate(IceCandidate {
                candidate,
                sdp_mid,
                sdp_m_line_index,
            }),
        };

        let result = self
            .breaker
            .call(|| async move {
                let mut req = tonic::Request::new(HandleSignalRequest {
                    client_id,
                    room_id,
                    signal: Some(signal_oneof),
                });
                req.set_timeout(UNARY_DEADLINE);
                client.handle_signal(req).await
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(BreakerError::Open) => {
                warn!("dropping signal forward, SFU breaker open");
                Err(SfuClientError::Unavailable)
            }
            Err(BreakerError::Inner(status)) => Err(SfuClientError::Rpc(status)),
        }
    }

    async fn delete_session(&self, client_id: &str, room_id: &str) -> Result<(), SfuClientError> {
        let mut client = self.client();
        let client_id = client_id.to_string();
        let room_id = room_id.to_string();

        let result = self
            .breaker
            .call(|| async move {
                let mut req = tonic::Request::new(DeleteSessionRequest { client_id, room_id });
                req.set_timeout(UNARY_DEADLINE);
                client.delete_session(req).await
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(BreakerError::Open) => Ok(()), // best-effort, per §4.7
            Err(BreakerError::Inner(status)) => Err(SfuClientError::Rpc(status)),
        }
    }

    async fn listen_events(
        &self,
        client_id: &str,
        room_id: &str,
    ) -> Result<EventStream, SfuClientError> {
        use futures_util::StreamExt;

        let mut client = self.client();
        let req = tonic::Request::new(ListenEventsRequest {
            client_id: client_id.to_string(),
            room_id: room_id.to_string(),
        });
        // Long-lived stream: no per-call deadline, kept alive by HTTP/2 keep-alive.
        let stream = client.listen_events(req).await?.into_inner();
        let mapped = stream.filter_map(|item| async move {
            match item {
                Ok(event) => Option::<SfuEvent>::from(event),
                Err(status) => {
                    warn!(error = %status, "SFU event stream error");
                    None
                }
            }
        });
        Ok(Box::pin(mapped))
    }

    fn breaker_open(&self) -> bool {
        self.breaker.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_session_returns_offer() {
        let mut client = MockSfuClient::new();
        client
            .expect_create_session()
            .withf(|client_id, room_id| client_id == "u-A" && room_id == "r-1")
            .returning(|_, _| Ok("v=0...".to_string()));

        let sdp = client.create_session("u-A", "r-1").await.unwrap();
        assert_eq!(sdp, "v=0...");
    }

    #[tokio::test]
    async fn handle_signal_propagates_rpc_errors() {
        let mut client = MockSfuClient::new();
        client
            .expect_handle_signal()
            .returning(|_, _, _| Err(SfuClientError::Rpc(tonic::Status::unavailable("down"))));

        let err = client
            .handle_signal("u-A", "r-1", SignalKind::Offer("v=0...".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, SfuClientError::Rpc(_)));
    }
}
