//! Stage token interpretation
//!
//! The bearer token is a JWT issued by the stage service. Only its claims are
//! read here; the signature is never checked, that is the issuing service's
//! job when the token is presented back to it.
//!
//! Two claims matter:
//! - `whip_url` (or `signaling_url`): where offers are sent
//! - `version`: `"<major>.<flags>"`, where `flags` is a decimal bitfield

use crate::{Error, Result};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde_json::{Map, Value};

bitflags::bitflags! {
    /// Feature bits carried in the flags half of the `version` claim
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VersionFlags: u32 {
        /// Only relay (TURN) candidates may be used
        const MANDATORY_RELAY = 0b01;
        /// Legacy stages only deliver audio to subscribers that send audio
        const AUDIO_REQUIRED_TO_RECEIVE = 0b10;
    }
}

/// Claims this client needs from a stage token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDetails {
    /// Base URL of the signaling endpoint
    pub signaling_url: String,
    /// Major half of the `version` claim (informational)
    pub version_major: String,
    /// Decoded feature bits
    pub flags: VersionFlags,
}

impl TokenDetails {
    /// Decode the claims of `token` without verifying its signature
    pub fn from_token(token: &str) -> Result<Self> {
        let claims = decode_claims(token)?;
        Self::from_claims(&claims)
    }

    /// Extract the details from an already decoded claim mapping
    pub fn from_claims(claims: &Map<String, Value>) -> Result<Self> {
        let signaling_url = ["whip_url", "signaling_url"]
            .iter()
            .find_map(|key| {
                claims
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|url| !url.is_empty())
            })
            .ok_or(Error::SignalingUrlMissing)?;

        let version = claims
            .get("version")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .ok_or(Error::VersionMissing)?;

        let (version_major, flags) = parse_version(version)?;

        Ok(Self {
            signaling_url: signaling_url.to_string(),
            version_major,
            flags,
        })
    }

    /// Whether the transport policy must be relay-only
    pub fn relay_mandatory(&self) -> bool {
        self.flags.contains(VersionFlags::MANDATORY_RELAY)
    }

    /// Whether we must send audio to be sent audio
    pub fn audio_required_to_receive(&self) -> bool {
        self.flags.contains(VersionFlags::AUDIO_REQUIRED_TO_RECEIVE)
    }
}

/// Split `major.flags` and decode the flags
fn parse_version(version: &str) -> Result<(String, VersionFlags)> {
    let parts: Vec<&str> = version.split('.').collect();
    let [major, flags] = parts.as_slice() else {
        return Err(Error::VersionMalformed(version.to_string()));
    };

    let bits: i64 = flags.parse()?;

    // Only the low bits carry meaning; keep unknown bits rather than reject them.
    Ok((major.to_string(), VersionFlags::from_bits_retain(bits as u32)))
}

/// Decode the claims of a compact JWT without checking its signature
fn decode_claims(token: &str) -> Result<Map<String, Value>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Map<String, Value>>(token.trim(), &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| Error::ClaimsUnreadable(format!("Failed to decode token: {}", e)))
}
