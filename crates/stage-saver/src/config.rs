//! Configuration types for the stage saver

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a recording run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaverConfig {
    /// Container file the session is recorded into (default: out.mkv)
    pub output_path: PathBuf,

    /// Reassembly depth for the audio track in packets (default: 10)
    pub audio_jitter_depth: u16,

    /// Reassembly depth for the video track in packets (default: 150)
    pub video_jitter_depth: u16,

    /// Minimum time the ICE agent waits before accepting a relay pair (default: 1000ms)
    pub relay_acceptance_min_wait_ms: u64,

    /// Give up waiting for a relay candidate after this long (default: wait forever)
    pub relay_candidate_timeout_ms: Option<u64>,

    /// Maximum redirect hops followed on signaling requests (default: 10)
    pub max_redirects: usize,

    /// Cadence of the silent audio sender in milliseconds (default: 20)
    pub silence_interval_ms: u64,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("out.mkv"),
            audio_jitter_depth: 10,
            video_jitter_depth: 150,
            relay_acceptance_min_wait_ms: 1000,
            relay_candidate_timeout_ms: None,
            max_redirects: 10,
            silence_interval_ms: 20,
        }
    }
}

impl SaverConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `output_path` is empty
    /// - either jitter depth is zero
    /// - `max_redirects` is zero
    /// - `silence_interval_ms` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.output_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "output_path must not be empty".to_string(),
            ));
        }

        if self.audio_jitter_depth == 0 || self.video_jitter_depth == 0 {
            return Err(Error::InvalidConfig(format!(
                "jitter depths must be non-zero, got audio={} video={}",
                self.audio_jitter_depth, self.video_jitter_depth
            )));
        }

        if self.max_redirects == 0 {
            return Err(Error::InvalidConfig(
                "max_redirects must be at least 1".to_string(),
            ));
        }

        if self.silence_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "silence_interval_ms must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Relay acceptance wait as a Duration
    pub fn relay_acceptance_min_wait(&self) -> Duration {
        Duration::from_millis(self.relay_acceptance_min_wait_ms)
    }

    /// Relay candidate timeout as a Duration, if one is configured
    pub fn relay_candidate_timeout(&self) -> Option<Duration> {
        self.relay_candidate_timeout_ms.map(Duration::from_millis)
    }

    /// Silence cadence as a Duration
    pub fn silence_interval(&self) -> Duration {
        Duration::from_millis(self.silence_interval_ms)
    }

    /// Set the output path
    ///
    /// Useful for chaining from `Default`.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Set the relay candidate timeout
    pub fn with_relay_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.relay_candidate_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}
