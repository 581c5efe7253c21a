//! Recording of the inbound audio and video tracks into one container file
//!
//! Each track runs its own loop: read an RTP packet, push it into a
//! reassembly buffer, and write every completed sample as a block stamped with
//! that track's accumulated duration.
//!
//! The video loop owns the file. It creates the recording (both block
//! writers) and hands the audio writer over to the audio loop once its own
//! first block is on disk. The audio loop does nothing until that handoff, so
//! no audio block can precede the first video block.

use crate::config::SaverConfig;
use crate::mkv::{self, AudioSettings, BlockWriter, TrackEntry, TrackType};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use webrtc::api::media_engine::MIME_TYPE_H264;
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::media::Sample;
use webrtc::rtp::codecs::{h264::H264Packet, opus::OpusPacket, vp8::Vp8Packet};
use webrtc::rtp::packet::Packet;
use webrtc::rtp::packetizer::Depacketizer;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Track number of the audio track in the recording
pub const AUDIO_TRACK_NUMBER: u64 = 1;

/// Track number of the video track in the recording
pub const VIDEO_TRACK_NUMBER: u64 = 2;

const OPUS_CLOCK_RATE: u32 = 48_000;
const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Video codec of the recording, chosen from the negotiated track codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Vp8,
    H264,
}

impl VideoCodec {
    /// H.264 is recognized; every other MIME type is recorded as VP8
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type.eq_ignore_ascii_case(MIME_TYPE_H264) {
            VideoCodec::H264
        } else {
            VideoCodec::Vp8
        }
    }

    /// Matroska codec ID
    pub fn codec_id(self) -> &'static str {
        match self {
            VideoCodec::Vp8 => "V_VP8",
            VideoCodec::H264 => "V_MPEG4/ISO/AVC",
        }
    }

    /// Reassembly buffer using this codec's depacketizer
    pub fn reassembler(self, depth: u16) -> Box<dyn SampleReassembler> {
        match self {
            VideoCodec::Vp8 => Box::new(SampleBuilder::new(
                depth,
                Vp8Packet::default(),
                VIDEO_CLOCK_RATE,
            )),
            VideoCodec::H264 => Box::new(SampleBuilder::new(
                depth,
                H264Packet::default(),
                VIDEO_CLOCK_RATE,
            )),
        }
    }
}

/// Reassembly buffer for the audio track
pub fn audio_reassembler(depth: u16) -> Box<dyn SampleReassembler> {
    Box::new(SampleBuilder::new(
        depth,
        OpusPacket::default(),
        OPUS_CLOCK_RATE,
    ))
}

/// Inbound RTP packets for one track
#[async_trait]
pub trait PacketSource: Send {
    /// Wait for the next packet
    async fn read_packet(&mut self) -> Result<Packet>;
}

#[async_trait]
impl PacketSource for Arc<TrackRemote> {
    async fn read_packet(&mut self) -> Result<Packet> {
        let (packet, _attributes) = self
            .read_rtp()
            .await
            .map_err(|e| Error::TrackRead(format!("{} track: {}", self.kind(), e)))?;
        Ok(packet)
    }
}

/// Turns packets into complete media samples
pub trait SampleReassembler: Send {
    fn push(&mut self, packet: Packet);

    /// Next completed sample, if any
    fn pop(&mut self) -> Option<Sample>;
}

impl<T: Depacketizer + Send> SampleReassembler for SampleBuilder<T> {
    fn push(&mut self, packet: Packet) {
        SampleBuilder::push(self, packet)
    }

    fn pop(&mut self) -> Option<Sample> {
        SampleBuilder::pop(self)
    }
}

impl SampleReassembler for Box<dyn SampleReassembler> {
    fn push(&mut self, packet: Packet) {
        (**self).push(packet)
    }

    fn pop(&mut self) -> Option<Sample> {
        (**self).pop()
    }
}

/// Destination for timestamped blocks of one track
pub trait BlockSink: Send {
    fn write_block(&mut self, keyframe: bool, timestamp_ms: i64, data: &[u8]) -> Result<()>;
}

impl<W: Write + Send> BlockSink for BlockWriter<W> {
    fn write_block(&mut self, keyframe: bool, timestamp_ms: i64, data: &[u8]) -> Result<()> {
        self.write(keyframe, timestamp_ms, data).map(|_| ())
    }
}

/// Running duration of the samples written for one track
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackTimeline {
    elapsed: Duration,
}

impl TrackTimeline {
    /// Add a sample's duration and return the new total in whole milliseconds
    pub fn advance(&mut self, sample_duration: Duration) -> i64 {
        self.elapsed += sample_duration;
        self.elapsed.as_millis() as i64
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Write every sample the reassembler has ready; returns how many were written
fn drain<R, K>(reassembler: &mut R, timeline: &mut TrackTimeline, sink: &mut K) -> Result<usize>
where
    R: SampleReassembler + ?Sized,
    K: BlockSink + ?Sized,
{
    let mut written = 0;
    while let Some(sample) = reassembler.pop() {
        let timestamp = timeline.advance(sample.duration);
        // Every block is flagged as a keyframe.
        sink.write_block(true, timestamp, &sample.data)?;
        written += 1;
    }
    Ok(written)
}

/// Record the video track, releasing `audio` through `handoff` after the first video block
///
/// Audio is held back until then, so a video track that never completes a
/// frame also leaves the audio unrecorded.
///
/// Only returns on error.
pub async fn run_video_track<P, R, V, A>(
    mut source: P,
    mut reassembler: R,
    mut video: V,
    audio: A,
    handoff: oneshot::Sender<A>,
) -> Result<()>
where
    P: PacketSource,
    R: SampleReassembler,
    V: BlockSink,
    A: Send,
{
    let mut timeline = TrackTimeline::default();
    let mut pending = Some((audio, handoff));

    loop {
        let packet = source.read_packet().await?;
        reassembler.push(packet);

        if drain(&mut reassembler, &mut timeline, &mut video)? == 0 {
            continue;
        }

        if let Some((audio, handoff)) = pending.take() {
            info!(timestamp_ms = timeline.elapsed().as_millis() as u64, "First video block written");
            if handoff.send(audio).is_err() {
                debug!("Audio recording is gone, audio writer dropped");
            }
        }
    }
}

/// Record the audio track once the video loop has handed over its writer
///
/// Only returns on error.
pub async fn run_audio_track<P, R, A>(
    mut source: P,
    mut reassembler: R,
    handoff: oneshot::Receiver<A>,
) -> Result<()>
where
    P: PacketSource,
    R: SampleReassembler,
    A: BlockSink,
{
    let mut audio = handoff.await.map_err(|_| {
        Error::Container("video recording ended before handing over the audio writer".to_string())
    })?;
    debug!("Audio writer received");

    let mut timeline = TrackTimeline::default();

    loop {
        let packet = source.read_packet().await?;
        reassembler.push(packet);
        drain(&mut reassembler, &mut timeline, &mut audio)?;
    }
}

/// Block writers of an open recording
#[derive(Debug)]
pub struct RecordingSession<W> {
    pub audio: BlockWriter<W>,
    pub video: BlockWriter<W>,
}

/// Track layout of a recording: Opus audio on track 1, `video` on track 2
pub fn recording_tracks(video: VideoCodec) -> Vec<TrackEntry> {
    vec![
        TrackEntry {
            name: "Audio".to_string(),
            track_number: AUDIO_TRACK_NUMBER,
            track_uid: 12345,
            codec_id: "A_OPUS".to_string(),
            track_type: TrackType::Audio,
            default_duration: 20_000_000,
            audio: Some(AudioSettings {
                sampling_frequency: OPUS_CLOCK_RATE as f64,
                channels: 2,
            }),
        },
        TrackEntry {
            name: "Video".to_string(),
            track_number: VIDEO_TRACK_NUMBER,
            track_uid: 67890,
            codec_id: video.codec_id().to_string(),
            track_type: TrackType::Video,
            default_duration: 33_333_333,
            audio: None,
        },
    ]
}

/// Start a recording on an arbitrary byte sink
pub fn start_recording<W: Write>(sink: W, video: VideoCodec) -> Result<RecordingSession<W>> {
    let mut writers = mkv::new_block_writers(sink, &recording_tracks(video))?;
    let audio = take_writer(&mut writers, AUDIO_TRACK_NUMBER)?;
    let video = take_writer(&mut writers, VIDEO_TRACK_NUMBER)?;
    Ok(RecordingSession { audio, video })
}

fn take_writer<W: Write>(writers: &mut Vec<BlockWriter<W>>, track_number: u64) -> Result<BlockWriter<W>> {
    writers
        .iter()
        .position(|writer| writer.track_number() == track_number)
        .map(|index| writers.swap_remove(index))
        .ok_or_else(|| Error::Container(format!("no block writer for track {}", track_number)))
}

/// Create (or truncate) the file at `path` and start a recording in it
pub fn open_recording(path: &Path, video: VideoCodec) -> Result<RecordingSession<File>> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let file = options.open(path)?;
    start_recording(file, video)
}

/// Dispatches inbound tracks to the recording loops
///
/// Accepts one video and one audio track; later tracks of either kind are
/// ignored. Errors from either loop are reported on the channel returned by
/// [`Recorder::new`].
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<RecorderInner>,
}

struct RecorderInner {
    config: SaverConfig,
    video_handoff: Mutex<Option<oneshot::Sender<BlockWriter<File>>>>,
    audio_handoff: Mutex<Option<oneshot::Receiver<BlockWriter<File>>>>,
    fatal: mpsc::UnboundedSender<Error>,
}

impl Recorder {
    /// Create a recorder and the receiver for its fatal errors
    pub fn new(config: SaverConfig) -> (Self, mpsc::UnboundedReceiver<Error>) {
        let (handoff_tx, handoff_rx) = oneshot::channel();
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let recorder = Self {
            inner: Arc::new(RecorderInner {
                config,
                video_handoff: Mutex::new(Some(handoff_tx)),
                audio_handoff: Mutex::new(Some(handoff_rx)),
                fatal: fatal_tx,
            }),
        };

        (recorder, fatal_rx)
    }

    /// Start recording `track` in the background
    pub fn handle_track(&self, track: Arc<TrackRemote>) {
        let kind = track.kind();
        let config = &self.inner.config;

        match kind {
            RTPCodecType::Video => {
                let Some(handoff) = self.inner.video_handoff.lock().take() else {
                    warn!(ssrc = track.ssrc(), "Ignoring additional video track");
                    return;
                };

                let path = config.output_path.clone();
                let depth = config.video_jitter_depth;
                self.spawn_recording("video", async move {
                    let codec = VideoCodec::from_mime_type(&track.codec().capability.mime_type);
                    let session = open_recording(&path, codec)?;
                    info!(path = %path.display(), codec = codec.codec_id(), "Starting new recording file");

                    run_video_track(
                        track,
                        codec.reassembler(depth),
                        session.video,
                        session.audio,
                        handoff,
                    )
                    .await
                });
            }
            RTPCodecType::Audio => {
                let Some(handoff) = self.inner.audio_handoff.lock().take() else {
                    warn!(ssrc = track.ssrc(), "Ignoring additional audio track");
                    return;
                };

                let depth = config.audio_jitter_depth;
                self.spawn_recording("audio", async move {
                    run_audio_track(track, audio_reassembler(depth), handoff).await
                });
            }
            other => {
                warn!(kind = %other, "Ignoring track of unsupported kind");
            }
        }
    }

    fn spawn_recording<F>(&self, kind: &'static str, recording: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let fatal = self.inner.fatal.clone();
        debug!(kind, "Recording track");

        tokio::spawn(async move {
            if let Err(e) = recording.await {
                error!(kind, error = %e, "Track recording failed");
                let _ = fatal.send(e);
            }
        });
    }
}
