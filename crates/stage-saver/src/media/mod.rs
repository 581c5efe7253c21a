//! Media handling: recording inbound tracks and feeding the outbound silent track

pub mod recorder;
pub mod silence;

pub use recorder::{
    open_recording, run_audio_track, run_video_track, start_recording, BlockSink, PacketSource,
    Recorder, RecordingSession, SampleReassembler, TrackTimeline, VideoCodec,
};
pub use silence::{run_silence, SampleWriter, SILENT_OPUS_FRAME};
