//! Signaling with the stage service
//!
//! Two exchanges happen over HTTP before media flows:
//! - relay discovery (OPTIONS), only when the token mandates relay transport
//! - the offer/answer exchange (POST of an SDP offer, 201 with the answer)

pub mod http;
pub mod link;

pub use http::HttpSignaling;
pub use link::{parse_link_header, RelayServer};

use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Url;

/// Outcome of relay discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayDiscovery {
    /// Relay servers advertised by the endpoint
    pub relay_servers: Vec<RelayServer>,
    /// URL the discovery request finally landed on after redirects
    pub canonical_url: Url,
}

/// Signaling operations the session negotiator depends on
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Ask the endpoint for relay servers and its canonical URL
    async fn discover_relays(&self, endpoint: &Url) -> Result<RelayDiscovery>;

    /// Submit the local offer and return the remote answer SDP
    async fn exchange_offer(&self, endpoint: &Url, offer_sdp: &str) -> Result<String>;
}

/// Build the subscribe endpoint `{signaling_url}/subscribe/{participant_id}`
///
/// The participant id is appended as a single, percent-encoded path segment.
pub fn subscribe_url(signaling_url: &str, participant_id: &str) -> Result<Url> {
    let mut url = Url::parse(signaling_url)
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", signaling_url, e)))?;

    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(format!("{} cannot be a base", signaling_url)))?
        .pop_if_empty()
        .push("subscribe")
        .push(participant_id);

    Ok(url)
}
