//! Silent outbound audio
//!
//! Legacy stages only deliver audio to subscribers that also publish audio.
//! The generator feeds a minimal Opus frame into the outbound track on a fixed
//! cadence; nothing it sends is recorded.

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Opus TOC byte plus padding that decodes as 20 ms of silence
pub const SILENT_OPUS_FRAME: [u8; 3] = [0xFF, 0xFF, 0xFE];

/// Destination for outbound audio samples
#[async_trait]
pub trait SampleWriter: Send + Sync {
    /// Send one sample
    async fn write_sample(&self, sample: &Sample) -> Result<()>;
}

#[async_trait]
impl SampleWriter for TrackLocalStaticSample {
    async fn write_sample(&self, sample: &Sample) -> Result<()> {
        TrackLocalStaticSample::write_sample(self, sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to write silent sample: {}", e)))
    }
}

/// Write a silent frame every `interval`, forever
///
/// Write failures are ignored; the track is not bound until the session is
/// connected and a failed frame carries nothing worth retrying.
pub async fn run_silence<W>(writer: Arc<W>, interval: Duration)
where
    W: SampleWriter + ?Sized,
{
    let sample = Sample {
        data: Bytes::from_static(&SILENT_OPUS_FRAME),
        duration: interval,
        ..Default::default()
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(interval_ms = interval.as_millis() as u64, "Silence generator started");

    loop {
        ticker.tick().await;
        let _ = writer.write_sample(&sample).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingWriter {
        samples: Mutex<Vec<Sample>>,
        fail: bool,
    }

    #[async_trait]
    impl SampleWriter for CountingWriter {
        async fn write_sample(&self, sample: &Sample) -> Result<()> {
            self.samples.lock().push(Sample {
                data: sample.data.clone(),
                timestamp: sample.timestamp,
                duration: sample.duration,
                packet_timestamp: sample.packet_timestamp,
                prev_dropped_packets: sample.prev_dropped_packets,
                prev_padding_packets: sample.prev_padding_packets,
            });
            if self.fail {
                return Err(Error::MediaTrackError("not bound".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_cadence_and_payload() {
        let writer = Arc::new(CountingWriter::default());
        let task = tokio::spawn(run_silence(Arc::clone(&writer), Duration::from_millis(20)));

        // First tick is immediate, then one every 20ms.
        tokio::time::sleep(Duration::from_millis(105)).await;
        task.abort();

        let samples = writer.samples.lock();
        assert_eq!(samples.len(), 6);
        for sample in samples.iter() {
            assert_eq!(&sample.data[..], &SILENT_OPUS_FRAME);
            assert_eq!(sample.duration, Duration::from_millis(20));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_errors_are_ignored() {
        let writer = Arc::new(CountingWriter {
            fail: true,
            ..Default::default()
        });
        let task = tokio::spawn(run_silence(Arc::clone(&writer), Duration::from_millis(20)));

        tokio::time::sleep(Duration::from_millis(65)).await;
        assert!(!task.is_finished());
        task.abort();

        assert_eq!(writer.samples.lock().len(), 4);
    }
}
