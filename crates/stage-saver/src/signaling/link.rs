//! Relay server parsing from the discovery `Link` header
//!
//! The header is a comma-separated list of records. Each record is a
//! semicolon-separated list of segments:
//!
//! ```text
//! <turn:turn.example.com:443?transport=tcp>; rel="ice-server"; username="u"; credential="c"
//! ```

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// One relay server advertised by the signaling endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayServer {
    /// Relay URLs; always exactly one when produced by [`parse_link_header`]
    pub urls: Vec<String>,
    /// Username for relay authentication
    pub username: String,
    /// Credential for relay authentication
    pub credential: String,
}

impl From<RelayServer> for RTCIceServer {
    fn from(server: RelayServer) -> Self {
        #[allow(clippy::needless_update)]
        RTCIceServer {
            urls: server.urls,
            username: server.username,
            credential: server.credential,
            ..Default::default()
        }
    }
}

/// Parse every relay record out of a `Link` header value
///
/// Records without a `turn:`/`turns:` URL are dropped. Segments that are
/// neither a bracketed relay URL nor `key=value` are ignored, as are keys
/// other than `username` and `credential`.
pub fn parse_link_header(header: &str) -> Vec<RelayServer> {
    header.split(',').filter_map(parse_record).collect()
}

fn parse_record(record: &str) -> Option<RelayServer> {
    let mut url = None;
    let mut username = String::new();
    let mut credential = String::new();

    for segment in record.split(';').map(str::trim) {
        if segment.starts_with("<turn:") || segment.starts_with("<turns:") {
            url = Some(segment.trim_start_matches('<').trim_end_matches('>').to_string());
        } else if let Some((key, value)) = segment.split_once('=') {
            let value = unquote(value.trim());
            match key.trim() {
                "username" => username = value.to_string(),
                "credential" => credential = value.to_string(),
                _ => {}
            }
        }
    }

    url.map(|url| RelayServer {
        urls: vec![url],
        username,
        credential,
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_record() {
        let servers = parse_link_header(r#"<turn:turn.example.com:443>;username="u";credential="c""#);
        assert_eq!(
            servers,
            vec![RelayServer {
                urls: vec!["turn:turn.example.com:443".to_string()],
                username: "u".to_string(),
                credential: "c".to_string(),
            }]
        );
    }

    #[test]
    fn test_multiple_records_with_extra_params() {
        let header = concat!(
            r#"<turn:a.example.com:3478?transport=udp>; rel="ice-server"; username="user1"; credential="pw1"; credential-type="password", "#,
            r#"<turns:b.example.com:443?transport=tcp>; rel="ice-server"; username="user2"; credential="pw2""#
        );
        let servers = parse_link_header(header);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["turn:a.example.com:3478?transport=udp"]);
        assert_eq!(servers[0].username, "user1");
        assert_eq!(servers[0].credential, "pw1");
        assert_eq!(servers[1].urls, vec!["turns:b.example.com:443?transport=tcp"]);
        assert_eq!(servers[1].username, "user2");
    }

    #[test]
    fn test_malformed_segments_are_skipped() {
        let header = concat!(
            r#"<stun:stun.example.com>; rel="ice-server", "#,
            r#"garbage, "#,
            r#"<turn:ok.example.com:3478>; username=; credential="x"; nonsense"#
        );
        let servers = parse_link_header(header);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec!["turn:ok.example.com:3478"]);
        assert_eq!(servers[0].username, "");
        assert_eq!(servers[0].credential, "x");
    }

    #[test]
    fn test_empty_header() {
        assert!(parse_link_header("").is_empty());
    }

    #[test]
    fn test_into_ice_server() {
        let server = RelayServer {
            urls: vec!["turn:t.example.com:3478".to_string()],
            username: "u".to_string(),
            credential: "c".to_string(),
        };
        let ice: RTCIceServer = server.into();
        assert_eq!(ice.urls, vec!["turn:t.example.com:3478"]);
        assert_eq!(ice.username, "u");
        assert_eq!(ice.credential, "c");
    }
}
