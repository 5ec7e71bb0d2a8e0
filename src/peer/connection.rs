use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as RtcMediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::CallConfig;
use crate::error::EngineError;
use crate::peer::engine::{EngineEvent, MediaEngine, ENGINE_EVENT_CAPACITY};
use crate::peer::media::{LocalMediaStream, MediaConstraints, RemoteMediaStream};
use crate::peer::types::{IceCandidate, ServerConfig, SessionDescription};
use crate::utils::add_ice_url_scheme;

/// `MediaEngine` поверх `RTCPeerConnection` из крейта webrtc
pub struct WebRtcEngine {
    pc: Arc<RTCPeerConnection>,
    constraints: MediaConstraints,
    /// Кандидаты, полученные до установки remote description
    pending_remote: Mutex<Vec<IceCandidate>>,
    local_kinds: Mutex<Vec<RTPCodecType>>,
    receivers_added: AtomicBool,
}

impl WebRtcEngine {
    /// создаём Peer и подписываемся на его события
    pub async fn new(
        config: &CallConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>), EngineError> {
        let mut media = RtcMediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(&config.ice_servers)).await?);
        let (tx, rx) = mpsc::channel(ENGINE_EVENT_CAPACITY);

        let cand_tx = tx.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let tx = cand_tx.clone();
            Box::pin(async move {
                let event = match cand {
                    Some(c) => match c.to_json() {
                        Ok(init) => EngineEvent::LocalCandidate(Some(init.into())),
                        Err(e) => {
                            warn!("Failed to serialize local ICE candidate: {:?}", e);
                            return;
                        }
                    },
                    // cand == None означает конец сбора
                    None => EngineEvent::LocalCandidate(None),
                };
                let _ = tx.send(event).await;
            })
        }));

        let track_tx = tx;
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                Box::pin(async move {
                    let stream = RemoteMediaStream {
                        id: track.stream_id().to_string(),
                        tracks: vec![track],
                    };
                    let _ = tx.send(EngineEvent::RemoteStream(stream)).await;
                })
            },
        ));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            debug!("Peer connection state changed to: {:?}", st);
            Box::pin(async {})
        }));

        let engine = Self {
            pc,
            constraints: config.media,
            pending_remote: Mutex::new(Vec::new()),
            local_kinds: Mutex::new(Vec::new()),
            receivers_added: AtomicBool::new(false),
        };
        Ok((engine, rx))
    }

    /// OfferToReceiveAudio / OfferToReceiveVideo: для запрошенных видов без
    /// локальной дорожки добавляем recvonly-трансивер
    async fn ensure_receive_transceivers(&self) -> Result<(), EngineError> {
        if self.receivers_added.load(Ordering::SeqCst) {
            return Ok(());
        }
        let local_kinds = self.local_kinds_snapshot();
        let wanted = [
            (self.constraints.audio, RTPCodecType::Audio),
            (self.constraints.video, RTPCodecType::Video),
        ];
        for (requested, kind) in wanted {
            if requested && !local_kinds.contains(&kind) {
                debug!("Adding recvonly transceiver for {:?}", kind);
                self.pc
                    .add_transceiver_from_kind(
                        kind,
                        Some(RTCRtpTransceiverInit {
                            direction: RTCRtpTransceiverDirection::Recvonly,
                            send_encodings: vec![],
                        }),
                    )
                    .await?;
            }
        }
        self.receivers_added.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn local_kinds_snapshot(&self) -> Vec<RTPCodecType> {
        self.local_kinds
            .lock()
            .map(|kinds| kinds.clone())
            .unwrap_or_default()
    }

    /// Применяет все отложенные кандидаты после установки remote description
    async fn apply_pending_candidates(&self) {
        let candidates = match self.pending_remote.lock() {
            Ok(mut pending) => pending.drain(..).collect::<Vec<_>>(),
            Err(_) => return,
        };

        for candidate in candidates {
            debug!("Applying pending candidate: {:?}", candidate);
            if let Err(e) = self
                .pc
                .add_ice_candidate(RTCIceCandidateInit::from(candidate))
                .await
            {
                warn!("Failed to apply pending candidate: {:?}", e);
            }
        }
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        self.ensure_receive_transceivers().await?;
        let offer = self.pc.create_offer(None).await?;
        SessionDescription::try_from(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self.pc.create_answer(None).await?;
        SessionDescription::try_from(answer)
    }

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), EngineError> {
        let rtc = RTCSessionDescription::try_from(desc)?;
        self.pc.set_local_description(rtc).await?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<(), EngineError> {
        let rtc = RTCSessionDescription::try_from(desc)?;
        self.pc.set_remote_description(rtc).await?;
        self.apply_pending_candidates().await;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        // Если remote description уже установлен, применяем кандидат сразу
        if self.pc.remote_description().await.is_some() {
            self.pc
                .add_ice_candidate(RTCIceCandidateInit::from(candidate))
                .await?;
        } else {
            debug!("Remote description not set yet, queuing candidate");
            self.pending_remote
                .lock()
                .map_err(|_| EngineError::new("pending candidate list poisoned"))?
                .push(candidate);
        }
        Ok(())
    }

    async fn add_local_stream(&self, stream: &LocalMediaStream) -> Result<(), EngineError> {
        for track in stream.tracks() {
            let kind = track.kind();
            let sender = self
                .pc
                .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
            if let Ok(mut kinds) = self.local_kinds.lock() {
                kinds.push(kind);
            }

            // RTCP нужно вычитывать, иначе интерсепторы не работают
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.pending_remote
            .lock()
            .map(|mut pending| pending.clear())
            .ok();
        self.pc.close().await?;
        Ok(())
    }
}

/// Создает конфигурацию для peer connection
fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(servers),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Список ICE серверов в формате webrtc
pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_credentials_are_carried() {
        let servers = vec![ServerConfig {
            id: "relay".into(),
            r#type: "turn".into(),
            url: "relay.example.org:3478".into(),
            username: Some("alice".into()),
            credential: Some("secret".into()),
        }];
        let rtc = ice_servers(&servers);
        assert_eq!(rtc[0].urls, vec!["turn:relay.example.org:3478".to_string()]);
        assert_eq!(rtc[0].username, "alice");
        assert_eq!(rtc[0].credential, "secret");
    }

    #[tokio::test]
    async fn offer_is_produced_without_local_media() {
        let (engine, _events) = WebRtcEngine::new(&CallConfig {
            ice_servers: vec![],
            ..Default::default()
        })
        .await
        .unwrap();

        let offer = engine.create_offer().await.unwrap();
        assert_eq!(offer.sdp_type, crate::peer::types::SdpType::Offer);
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("m=video"));
        engine.close().await.unwrap();
    }

    #[tokio::test]
    async fn early_remote_candidate_waits_for_the_offer() {
        let config = CallConfig {
            ice_servers: vec![],
            ..Default::default()
        };
        let (caller, _caller_events) = WebRtcEngine::new(&config).await.unwrap();
        let (callee, _callee_events) = WebRtcEngine::new(&config).await.unwrap();

        callee
            .add_ice_candidate(IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            })
            .await
            .unwrap();
        assert_eq!(callee.pending_remote.lock().unwrap().len(), 1);

        let offer = caller.create_offer().await.unwrap();
        caller.set_local_description(&offer).await.unwrap();
        callee.set_remote_description(&offer).await.unwrap();
        assert!(callee.pending_remote.lock().unwrap().is_empty());

        let answer = callee.create_answer().await.unwrap();
        assert_eq!(answer.sdp_type, crate::peer::types::SdpType::Answer);
        callee.set_local_description(&answer).await.unwrap();
        caller.set_remote_description(&answer).await.unwrap();

        caller.close().await.unwrap();
        callee.close().await.unwrap();
    }

    #[tokio::test]
    async fn receive_transceivers_are_added_once() {
        let (engine, _events) = WebRtcEngine::new(&CallConfig {
            ice_servers: vec![],
            ..Default::default()
        })
        .await
        .unwrap();

        engine.create_offer().await.unwrap();
        engine.create_offer().await.unwrap();
        assert!(engine.receivers_added.load(Ordering::SeqCst));
        assert_eq!(engine.pc.get_transceivers().await.len(), 2);
        engine.close().await.unwrap();
    }
}
