//! HTTP signaling client
//!
//! Redirects are followed by hand rather than by reqwest: the stage service
//! redirects global endpoints to regional ones on another host, and reqwest
//! strips `Authorization` on cross-host hops. Every hop here carries the
//! bearer token.

use super::{link::parse_link_header, RelayDiscovery, Signaling};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LINK, LOCATION};
use reqwest::{Client, Method, Response, StatusCode, Url};
use tracing::{debug, info};

/// Content type of SDP offers and answers
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Signaling client that talks to the stage endpoint over HTTP(S)
pub struct HttpSignaling {
    /// Bearer token attached to every request and redirect hop
    bearer_token: String,

    /// Maximum redirect hops per request
    max_redirects: usize,

    /// Reqwest HTTP client with automatic redirects disabled
    client: Client,
}

impl HttpSignaling {
    /// Create a new signaling client
    ///
    /// # Arguments
    ///
    /// * `bearer_token` - Stage token sent as `Authorization: Bearer ...`
    /// * `max_redirects` - Redirect hops followed before giving up
    pub fn new(bearer_token: impl Into<String>, max_redirects: usize) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            bearer_token: bearer_token.into(),
            max_redirects,
            client,
        })
    }

    /// Send a request, re-attaching the bearer token on every redirect hop
    ///
    /// Returns the final response and the URL it was served from.
    async fn send_following_redirects(
        &self,
        method: Method,
        url: &Url,
        sdp_body: Option<&str>,
    ) -> Result<(Response, Url)> {
        let mut method = method;
        let mut url = url.clone();
        let mut body = sdp_body.map(str::to_owned);

        for hop in 0..=self.max_redirects {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&self.bearer_token);

            if let Some(sdp) = &body {
                request = request
                    .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
                    .body(sdp.clone());
            }

            let response = request.send().await?;
            let status = response.status();

            if !status.is_redirection() {
                return Ok((response, url));
            }

            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
            else {
                // A 3xx without Location is the final answer.
                return Ok((response, url));
            };

            let next = url
                .join(location)
                .map_err(|e| Error::InvalidUrl(format!("{}: {}", location, e)))?;

            debug!(
                hop = hop + 1,
                status = status.as_u16(),
                from = %url,
                to = %next,
                "Following signaling redirect"
            );

            // 307/308 replay the request as-is; the older codes downgrade to a bodiless GET.
            if !matches!(
                status,
                StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
            ) && method != Method::GET
                && method != Method::HEAD
            {
                method = Method::GET;
                body = None;
            }

            url = next;
        }

        Err(Error::TooManyRedirects(self.max_redirects))
    }
}

#[async_trait]
impl Signaling for HttpSignaling {
    async fn discover_relays(&self, endpoint: &Url) -> Result<RelayDiscovery> {
        info!(endpoint = %endpoint, "Requesting relay credentials");

        let (response, canonical_url) = self
            .send_following_redirects(Method::OPTIONS, endpoint, None)
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Error::RelayDiscoveryFailed {
                status: response.status().as_u16(),
            });
        }

        let relay_servers = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();

        info!(
            canonical_url = %canonical_url,
            relay_servers = relay_servers.len(),
            "Relay discovery complete"
        );

        Ok(RelayDiscovery {
            relay_servers,
            canonical_url,
        })
    }

    async fn exchange_offer(&self, endpoint: &Url, offer_sdp: &str) -> Result<String> {
        info!(endpoint = %endpoint, "Posting SDP offer");

        let (response, answered_by) = self
            .send_following_redirects(Method::POST, endpoint, Some(offer_sdp))
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(Error::OfferRejected {
                status: response.status().as_u16(),
            });
        }

        let answer = response.text().await?;

        debug!(
            answered_by = %answered_by,
            answer_len = answer.len(),
            "Received SDP answer"
        );

        Ok(answer)
    }
}
