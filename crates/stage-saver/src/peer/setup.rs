//! Media directions and track handling for a stage subscription

use crate::media::{run_silence, Recorder};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Configuration step applied to a fresh peer connection before the offer is created
#[async_trait]
pub trait MediaSetup: Send + Sync {
    async fn configure(&self, peer_connection: &Arc<RTCPeerConnection>) -> Result<()>;
}

/// Stage subscriber setup
///
/// Video is always receive-only. Audio is receive-only unless the stage
/// requires subscribers to send audio, in which case a silent Opus track is
/// published instead. Inbound tracks go to the [`Recorder`].
pub struct StageMediaSetup {
    send_audio: bool,
    silence_interval: Duration,
    recorder: Recorder,
}

impl StageMediaSetup {
    pub fn new(send_audio: bool, silence_interval: Duration, recorder: Recorder) -> Self {
        Self {
            send_audio,
            silence_interval,
            recorder,
        }
    }

    async fn add_silent_audio(&self, peer_connection: &Arc<RTCPeerConnection>) -> Result<()> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                ..Default::default()
            },
            "audio".to_string(),
            env!("CARGO_PKG_NAME").to_string(),
        ));

        let sender = peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add audio track: {}", e)))?;

        // Incoming RTCP has to be drained for the interceptors to run.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        tokio::spawn(run_silence(track, self.silence_interval));

        debug!("Silent audio track added");
        Ok(())
    }
}

async fn add_recvonly(peer_connection: &Arc<RTCPeerConnection>, kind: RTPCodecType) -> Result<()> {
    peer_connection
        .add_transceiver_from_kind(
            kind,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await
        .map_err(|e| {
            Error::MediaTrackError(format!("Failed to add {} transceiver: {}", kind, e))
        })?;
    Ok(())
}

#[async_trait]
impl MediaSetup for StageMediaSetup {
    async fn configure(&self, peer_connection: &Arc<RTCPeerConnection>) -> Result<()> {
        if self.send_audio {
            self.add_silent_audio(peer_connection).await?;
        } else {
            add_recvonly(peer_connection, RTPCodecType::Audio).await?;
        }

        add_recvonly(peer_connection, RTPCodecType::Video).await?;

        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                info!(%state, "Connection state has changed");
                Box::pin(async {})
            },
        ));

        let recorder = self.recorder.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            recorder.handle_track(track);
            Box::pin(async {})
        }));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SaverConfig;
    use webrtc::api::media_engine::MediaEngine;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;

    async fn offer_sdp(send_audio: bool) -> String {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let api = APIBuilder::new().with_media_engine(media_engine).build();
        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        );

        let dir = tempfile::tempdir().unwrap();
        let (recorder, _fatal) =
            Recorder::new(SaverConfig::default().with_output_path(dir.path().join("out.mkv")));
        StageMediaSetup::new(send_audio, Duration::from_millis(20), recorder)
            .configure(&peer_connection)
            .await
            .unwrap();

        let offer = peer_connection.create_offer(None).await.unwrap();
        peer_connection.close().await.unwrap();
        offer.sdp
    }

    fn media_sections(sdp: &str) -> Vec<String> {
        sdp.split("m=").skip(1).map(|s| format!("m={}", s)).collect()
    }

    #[tokio::test]
    async fn test_recvonly_audio_and_video() {
        let sdp = offer_sdp(false).await;
        let sections = media_sections(&sdp);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].starts_with("m=audio"));
        assert!(sections[0].contains("a=recvonly"));
        assert!(sections[1].starts_with("m=video"));
        assert!(sections[1].contains("a=recvonly"));
    }

    #[tokio::test]
    async fn test_legacy_stage_sends_audio() {
        let sdp = offer_sdp(true).await;
        let sections = media_sections(&sdp);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].starts_with("m=audio"));
        assert!(sections[0].contains("a=sendrecv"));
        assert!(sections[1].starts_with("m=video"));
        assert!(sections[1].contains("a=recvonly"));
    }
}
