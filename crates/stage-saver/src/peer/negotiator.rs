//! Session negotiation with the stage
//!
//! The negotiator builds the peer connection, applies the relay policy and
//! the caller's media setup, commits a local offer, waits until the transport
//! is usable and finally exchanges the offer for the stage's answer.
//!
//! Relay discovery happens before the peer connection exists because a
//! relay-only policy needs its servers at construction time. The offer itself
//! is held back until a relay candidate has been gathered, otherwise it would
//! carry no usable path.

use super::readiness::{ReadinessSignal, ReadinessTrigger};
use super::setup::MediaSetup;
use crate::config::SaverConfig;
use crate::signaling::Signaling;
use crate::{Error, Result};
use parking_lot::RwLock;
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::dtls::extension::extension_use_srtp::SrtpProtectionProfile;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Negotiation progress
///
/// Candidates are only gathered once a local description is set, so the
/// offer is committed before the readiness wait and held back until it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Building the peer connection and applying media setup
    Configuring,
    /// Local offer committed
    OfferCreated,
    /// Offer held until a relay candidate is gathered (skipped when relay is optional)
    AwaitingTransportReadiness,
    /// Offer submitted, waiting for the answer
    AwaitingAnswer,
    /// Answer applied; media may flow
    Active,
    /// A step failed; terminal
    Failed,
}

/// Drives one peer connection from configuration to an applied answer
pub struct SessionNegotiator<S> {
    signaling: S,
    config: SaverConfig,
    state: Arc<RwLock<NegotiationState>>,
}

impl<S: Signaling> SessionNegotiator<S> {
    pub fn new(signaling: S, config: SaverConfig) -> Self {
        Self {
            signaling,
            config,
            state: Arc::new(RwLock::new(NegotiationState::Configuring)),
        }
    }

    /// Current negotiation state
    pub fn state(&self) -> NegotiationState {
        *self.state.read()
    }

    fn set_state(&self, new_state: NegotiationState) {
        let mut state = self.state.write();
        if *state != new_state {
            debug!("Negotiation state transition: {:?} -> {:?}", *state, new_state);
            *state = new_state;
        }
    }

    /// Negotiate a session against `endpoint`
    ///
    /// With `relay_mandatory` the endpoint is first asked for relay servers
    /// and the offer goes to the URL that request ended up at; otherwise the
    /// offer goes to `endpoint` directly.
    #[instrument(skip_all, fields(endpoint = %endpoint, relay_mandatory = relay_mandatory))]
    pub async fn negotiate(
        &self,
        endpoint: &Url,
        relay_mandatory: bool,
        setup: &dyn MediaSetup,
    ) -> Result<Arc<RTCPeerConnection>> {
        match self.run(endpoint, relay_mandatory, setup).await {
            Ok(peer_connection) => {
                self.set_state(NegotiationState::Active);
                info!("Session is active");
                Ok(peer_connection)
            }
            Err(e) => {
                self.set_state(NegotiationState::Failed);
                warn!(error = %e, "Negotiation failed");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        endpoint: &Url,
        relay_mandatory: bool,
        setup: &dyn MediaSetup,
    ) -> Result<Arc<RTCPeerConnection>> {
        self.set_state(NegotiationState::Configuring);

        let (offer_url, ice_servers, ice_transport_policy) = if relay_mandatory {
            let discovery = self.signaling.discover_relays(endpoint).await?;
            if discovery.relay_servers.is_empty() {
                warn!("Relay transport is mandatory but no relay servers were advertised");
            }
            let ice_servers: Vec<RTCIceServer> = discovery
                .relay_servers
                .into_iter()
                .map(RTCIceServer::from)
                .collect();
            (
                discovery.canonical_url,
                ice_servers,
                RTCIceTransportPolicy::Relay,
            )
        } else {
            (endpoint.clone(), Vec::new(), RTCIceTransportPolicy::All)
        };

        let peer_connection = self.build_peer_connection(ice_servers, ice_transport_policy).await?;

        setup.configure(&peer_connection).await?;

        let readiness = if relay_mandatory {
            arm_relay_readiness(&peer_connection)
        } else {
            ReadinessSignal::ready()
        };

        let offer = peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;
        self.set_state(NegotiationState::OfferCreated);

        if relay_mandatory {
            self.set_state(NegotiationState::AwaitingTransportReadiness);
        }
        readiness.wait(self.config.relay_candidate_timeout()).await?;

        let local_sdp = peer_connection
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or_else(|| Error::SdpError("Local description is missing".to_string()))?;

        self.set_state(NegotiationState::AwaitingAnswer);
        let answer_sdp = self.signaling.exchange_offer(&offer_url, &local_sdp).await?;

        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e)))?;

        peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        Ok(peer_connection)
    }

    async fn build_peer_connection(
        &self,
        ice_servers: Vec<RTCIceServer>,
        ice_transport_policy: RTCIceTransportPolicy,
    ) -> Result<Arc<RTCPeerConnection>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::WebRtcError(format!("Failed to register interceptors: {}", e)))?;

        let mut setting_engine = SettingEngine::default();
        setting_engine
            .set_srtp_protection_profiles(vec![SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80]);
        setting_engine.set_relay_acceptance_min_wait(Some(self.config.relay_acceptance_min_wait()));

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .with_setting_engine(setting_engine)
            .build();

        debug!(
            ice_servers = ice_servers.len(),
            policy = %ice_transport_policy,
            "Creating peer connection"
        );

        let rtc_config = RTCConfiguration {
            ice_servers,
            ice_transport_policy,
            ..Default::default()
        };

        let peer_connection = api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?;

        Ok(Arc::new(peer_connection))
    }
}

/// Resolve readiness on the first gathered relay candidate
fn arm_relay_readiness(peer_connection: &Arc<RTCPeerConnection>) -> ReadinessSignal {
    let (trigger, signal) = ReadinessTrigger::new();
    let trigger = Arc::new(trigger);

    peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let trigger = Arc::clone(&trigger);
        Box::pin(async move {
            let Some(candidate) = candidate else {
                debug!("Candidate gathering complete");
                return;
            };

            if candidate.typ == RTCIceCandidateType::Relay && trigger.fire() {
                info!(address = %candidate.address, port = candidate.port, "Relay candidate gathered");
            }
        })
    }));

    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::RelayDiscovery;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct ScriptedSignaling {
        calls: Mutex<Vec<&'static str>>,
        answer_status: u16,
    }

    #[async_trait]
    impl Signaling for ScriptedSignaling {
        async fn discover_relays(&self, endpoint: &Url) -> Result<RelayDiscovery> {
            self.calls.lock().push("discover");
            Ok(RelayDiscovery {
                relay_servers: vec![],
                canonical_url: endpoint.clone(),
            })
        }

        async fn exchange_offer(&self, _endpoint: &Url, _offer_sdp: &str) -> Result<String> {
            self.calls.lock().push("offer");
            Err(Error::OfferRejected {
                status: self.answer_status,
            })
        }
    }

    struct NoMedia;

    #[async_trait]
    impl MediaSetup for NoMedia {
        async fn configure(&self, peer_connection: &Arc<RTCPeerConnection>) -> Result<()> {
            peer_connection
                .add_transceiver_from_kind(
                    webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Video,
                    None,
                )
                .await
                .map_err(|e| Error::MediaTrackError(e.to_string()))?;
            Ok(())
        }
    }

    fn endpoint() -> Url {
        Url::parse("http://127.0.0.1:9/subscribe/p").unwrap()
    }

    #[test]
    fn test_initial_state() {
        let negotiator =
            SessionNegotiator::new(ScriptedSignaling::default(), SaverConfig::default());
        assert_eq!(negotiator.state(), NegotiationState::Configuring);
    }

    #[tokio::test]
    async fn test_rejected_offer_fails_without_discovery() {
        let signaling = ScriptedSignaling {
            answer_status: 200,
            ..Default::default()
        };
        let negotiator = SessionNegotiator::new(signaling, SaverConfig::default());

        let result = negotiator.negotiate(&endpoint(), false, &NoMedia).await;

        assert!(matches!(result, Err(Error::OfferRejected { status: 200 })));
        assert_eq!(negotiator.state(), NegotiationState::Failed);
        assert_eq!(*negotiator.signaling.calls.lock(), vec!["offer"]);
    }

    #[tokio::test]
    async fn test_relay_without_candidates_times_out_before_offer() {
        let config = SaverConfig::default()
            .with_relay_candidate_timeout(std::time::Duration::from_millis(300));
        let negotiator = SessionNegotiator::new(ScriptedSignaling::default(), config);

        let result = negotiator.negotiate(&endpoint(), true, &NoMedia).await;

        assert!(matches!(result, Err(Error::TransportNotReady(_))));
        assert_eq!(negotiator.state(), NegotiationState::Failed);
        assert_eq!(*negotiator.signaling.calls.lock(), vec!["discover"]);
    }

    #[tokio::test]
    async fn test_state_reads_awaiting_readiness_during_wait() {
        let config = SaverConfig::default()
            .with_relay_candidate_timeout(std::time::Duration::from_secs(3));
        let negotiator = SessionNegotiator::new(ScriptedSignaling::default(), config);

        let endpoint = endpoint();
        let (result, during_wait) = tokio::join!(
            negotiator.negotiate(&endpoint, true, &NoMedia),
            async {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                negotiator.state()
            }
        );

        assert_eq!(during_wait, NegotiationState::AwaitingTransportReadiness);
        assert!(matches!(result, Err(Error::TransportNotReady(_))));
        assert_eq!(negotiator.state(), NegotiationState::Failed);
    }
}
