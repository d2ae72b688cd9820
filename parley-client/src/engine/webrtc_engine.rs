use crate::config::ClientConfig;
use crate::engine::{
    DataChannelHandle, EngineEvent, EngineHooks, IceConnectionState, RtcEngine, RtcPeer,
    SdpKind, SessionDescription, TrackHandle,
};
use crate::error::EngineError;
use async_trait::async_trait;
use parley_core::{CANDIDATES_COMPLETE, PeerId};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::track::track_remote::TrackRemote;

/// [`RtcEngine`] backed by webrtc-rs.
pub struct WebRtcEngine {
    api: API,
}

impl WebRtcEngine {
    pub fn new() -> Result<Self, EngineError> {
        // Codecs are registered even for data-only use so remote media offers still parse.
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

#[async_trait]
impl RtcEngine for WebRtcEngine {
    async fn create_peer(
        &self,
        peer_id: &PeerId,
        config: &ClientConfig,
        hooks: EngineHooks,
    ) -> Result<Arc<dyn RtcPeer>, EngineError> {
        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(self.api.new_peer_connection(rtc_config).await?);
        debug!("Created RTCPeerConnection for {}", peer_id);

        let peer = WebRtcPeer { peer_connection };
        peer.attach(hooks);
        Ok(Arc::new(peer))
    }
}

struct WebRtcPeer {
    peer_connection: Arc<RTCPeerConnection>,
}

impl WebRtcPeer {
    fn attach(&self, hooks: EngineHooks) {
        let pc = &self.peer_connection;

        let negotiation_hooks = hooks.clone();
        pc.on_negotiation_needed(Box::new(move || {
            let hooks = negotiation_hooks.clone();
            Box::pin(async move {
                hooks.emit(EngineEvent::NegotiationNeeded);
            })
        }));

        let ice_hooks = hooks.clone();
        pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let hooks = ice_hooks.clone();
            Box::pin(async move {
                // `None` marks the end of gathering.
                let Some(candidate) = c else {
                    hooks.emit(EngineEvent::IceCandidate(CANDIDATES_COMPLETE.to_owned()));
                    return;
                };
                let Ok(json_candidate) = candidate.to_json() else {
                    return;
                };
                let Ok(str_candidate) = serde_json::to_string(&json_candidate) else {
                    return;
                };
                hooks.emit(EngineEvent::IceCandidate(str_candidate));
            })
        }));

        let state_hooks = hooks.clone();
        pc.on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
            let hooks = state_hooks.clone();
            Box::pin(async move {
                info!("ICE state for {} changed: {:?}", hooks.peer_id(), s);
                hooks.emit(EngineEvent::IceConnectionState(map_ice_state(s)));
            })
        }));

        let track_hooks = hooks.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let hooks = track_hooks.clone();
                Box::pin(async move {
                    let handle = TrackHandle::new(
                        track.id(),
                        track.kind().to_string(),
                        vec![track.stream_id()],
                        track,
                    );
                    hooks.emit(EngineEvent::Track(handle));
                })
            },
        ));

        let dc_hooks = hooks;
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let hooks = dc_hooks.clone();
            Box::pin(async move {
                debug!("Remote DataChannel '{}' for {}", dc.label(), hooks.peer_id());
                let label = dc.label().to_owned();
                hooks.emit(EngineEvent::DataChannel(DataChannelHandle::new(label, dc)));
            })
        }));
    }
}

fn map_ice_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => IceConnectionState::New,
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    Ok(match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    })
}

#[async_trait]
impl RtcPeer for WebRtcPeer {
    async fn create_offer(&self) -> Result<String, EngineError> {
        let offer = self.peer_connection.create_offer(None).await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String, EngineError> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(answer.sdp)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc_description(desc)?;
        self.peer_connection.set_local_description(desc).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc_description(desc)?;
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    /// Candidates travel as the JSON of `RTCIceCandidateInit`; a bare
    /// `candidate:` line is accepted too.
    async fn add_ice_candidate(&self, candidate: &str) -> Result<(), EngineError> {
        let init = match serde_json::from_str::<RTCIceCandidateInit>(candidate) {
            Ok(init) => init,
            Err(_) if !candidate.trim_start().starts_with('{') => RTCIceCandidateInit {
                candidate: candidate.to_owned(),
                ..Default::default()
            },
            Err(e) => return Err(EngineError::new(format!("bad candidate JSON: {e}"))),
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<DataChannelHandle, EngineError> {
        let dc = self.peer_connection.create_data_channel(label, None).await?;
        Ok(DataChannelHandle::new(label, dc))
    }

    fn detach(&self) {
        let pc = &self.peer_connection;
        pc.on_negotiation_needed(Box::new(|| Box::pin(async {})));
        pc.on_ice_candidate(Box::new(|_: Option<RTCIceCandidate>| Box::pin(async {})));
        pc.on_ice_connection_state_change(Box::new(|_: RTCIceConnectionState| {
            Box::pin(async {})
        }));
        pc.on_track(Box::new(
            |_: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                Box::pin(async {})
            },
        ));
        pc.on_data_channel(Box::new(|_: Arc<RTCDataChannel>| Box::pin(async {})));
    }

    async fn close(&self) -> Result<(), EngineError> {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Error closing RTCPeerConnection: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
