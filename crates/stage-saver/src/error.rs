//! Error types for the stage saver

use std::num::ParseIntError;

/// Result type alias using the stage saver Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while joining a stage and recording it
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Token payload could not be decoded into a claim mapping
    #[error("Could not extract claims from token: {0}")]
    ClaimsUnreadable(String),

    /// Neither `whip_url` nor `signaling_url` is present in the claims
    #[error("Signaling URL was not found in token")]
    SignalingUrlMissing,

    /// The `version` claim is absent or empty
    #[error("Version was not found in token")]
    VersionMissing,

    /// The `version` claim does not have the `major.flags` shape
    #[error("Version was found in token but is invalid: {0}")]
    VersionMalformed(String),

    /// The flags half of the `version` claim is not an integer
    #[error("Version flags are not an integer: {0}")]
    VersionFlags(#[from] ParseIntError),

    /// OPTIONS request for relay credentials returned a non-200 status
    #[error("OPTIONS failed with status {status}")]
    RelayDiscoveryFailed { status: u16 },

    /// Offer POST returned something other than 201 Created
    #[error("POST failed with status {status}")]
    OfferRejected { status: u16 },

    /// Redirect chain exceeded the configured hop limit
    #[error("Stopped after {0} redirects")]
    TooManyRedirects(usize),

    /// URL could not be parsed or extended
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Transport never became usable for the offer
    #[error("Transport not ready: {0}")]
    TransportNotReady(String),

    /// Reading an inbound track failed
    #[error("Track read failed: {0}")]
    TrackRead(String),

    /// Container writer misuse or corruption
    #[error("Container error: {0}")]
    Container(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Check if this error came from reading the bearer token
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Error::ClaimsUnreadable(_)
                | Error::SignalingUrlMissing
                | Error::VersionMissing
                | Error::VersionMalformed(_)
                | Error::VersionFlags(_)
        )
    }

    /// Check if this error happened while establishing the session
    pub fn is_negotiation_error(&self) -> bool {
        matches!(
            self,
            Error::RelayDiscoveryFailed { .. }
                | Error::OfferRejected { .. }
                | Error::TooManyRedirects(_)
                | Error::InvalidUrl(_)
                | Error::Http(_)
                | Error::WebRtcError(_)
                | Error::SdpError(_)
                | Error::MediaTrackError(_)
                | Error::TransportNotReady(_)
        )
    }

    /// Check if this error happened while recording
    pub fn is_recording_error(&self) -> bool {
        matches!(
            self,
            Error::TrackRead(_) | Error::Container(_) | Error::IoError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::OfferRejected { status: 200 };
        assert_eq!(err.to_string(), "POST failed with status 200");

        let err = Error::VersionMalformed("1".to_string());
        assert_eq!(
            err.to_string(),
            "Version was found in token but is invalid: 1"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::SignalingUrlMissing.is_credential_error());
        assert!(Error::VersionMissing.is_credential_error());
        assert!(!Error::SignalingUrlMissing.is_negotiation_error());

        assert!(Error::RelayDiscoveryFailed { status: 403 }.is_negotiation_error());
        assert!(Error::TransportNotReady("x".to_string()).is_negotiation_error());
        assert!(!Error::OfferRejected { status: 500 }.is_recording_error());

        assert!(Error::TrackRead("eof".to_string()).is_recording_error());
        assert!(Error::Container("x".to_string()).is_recording_error());
    }

    #[test]
    fn test_parse_int_conversion() {
        let parse_err = "abc".parse::<i64>().unwrap_err();
        let err = Error::from(parse_err);
        assert!(matches!(err, Error::VersionFlags(_)));
        assert!(err.is_credential_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
        assert!(err.is_recording_error());
    }
}
