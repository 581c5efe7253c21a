//! Headless stage subscriber that records a participant to disk
//!
//! Joins a participant's published media on a cloud stage using the stage's
//! bearer token, then writes the received audio and video into a single
//! Matroska file.
//!
//! # Flow
//!
//! ```text
//! token ──► TokenDetails (signaling URL, relay / legacy-audio flags)
//!             │
//!             ├─ relay mandatory? ──► OPTIONS {url}/subscribe/{id} ──► relay servers
//!             ▼
//!           SessionNegotiator
//!             ├─ StageMediaSetup (recvonly video, recvonly or silent audio)
//!             ├─ offer ─► wait for relay candidate ─► POST offer ─► 201 answer
//!             ▼
//!           Recorder
//!             ├─ video loop: opens out.mkv, writes track 2, hands over audio writer
//!             └─ audio loop: waits for the writer, writes track 1
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stage_saver::{
//!     subscribe_url, HttpSignaling, Recorder, SaverConfig, SessionNegotiator, StageMediaSetup,
//!     TokenDetails,
//! };
//!
//! # async fn example(token: &str) -> stage_saver::Result<()> {
//! let config = SaverConfig::default();
//! let details = TokenDetails::from_token(token)?;
//! let endpoint = subscribe_url(&details.signaling_url, "participant-id")?;
//!
//! let (recorder, mut fatal) = Recorder::new(config.clone());
//! let setup = StageMediaSetup::new(
//!     details.audio_required_to_receive(),
//!     config.silence_interval(),
//!     recorder,
//! );
//!
//! let signaling = HttpSignaling::new(token, config.max_redirects)?;
//! let negotiator = SessionNegotiator::new(signaling, config);
//! let _peer_connection = negotiator
//!     .negotiate(&endpoint, details.relay_mandatory(), &setup)
//!     .await?;
//!
//! if let Some(e) = fatal.recv().await {
//!     return Err(e);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod mkv;
pub mod peer;
pub mod signaling;
pub mod token;

pub use config::SaverConfig;
pub use error::{Error, Result};
pub use media::{Recorder, VideoCodec};
pub use peer::{MediaSetup, NegotiationState, SessionNegotiator, StageMediaSetup};
pub use signaling::{subscribe_url, HttpSignaling, RelayDiscovery, RelayServer, Signaling};
pub use token::{TokenDetails, VersionFlags};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
