//! Incremental Matroska/WebM writer
//!
//! Writes an EBML header, a Segment of unknown size with Info and Tracks, then
//! SimpleBlocks grouped into Clusters of unknown size. Nothing is ever
//! rewritten, so every block that reached the file is readable even if the
//! process dies without finalizing.

pub mod ebml;
mod writer;

pub use writer::{new_block_writers, BlockWriter};

/// Element IDs used by the writer
pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

    pub const SEGMENT: u32 = 0x1853_8067;
    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const CODEC_ID: u32 = 0x86;
    pub const NAME: u32 = 0x536E;
    pub const DEFAULT_DURATION: u32 = 0x23_E383;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;

    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
}

/// Codec IDs a WebM reader is required to understand
const WEBM_CODECS: &[&str] = &["A_OPUS", "A_VORBIS", "V_VP8", "V_VP9", "V_AV1"];

/// Matroska track type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Video,
    Audio,
}

impl TrackType {
    fn code(self) -> u64 {
        match self {
            TrackType::Video => 1,
            TrackType::Audio => 2,
        }
    }
}

/// Audio-specific track settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSettings {
    pub sampling_frequency: f64,
    pub channels: u64,
}

/// Description of one track written into the Tracks element
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub name: String,
    pub track_number: u64,
    pub track_uid: u64,
    pub codec_id: String,
    pub track_type: TrackType,
    /// Nominal duration of one block in nanoseconds
    pub default_duration: u64,
    pub audio: Option<AudioSettings>,
}

impl TrackEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut entry = Vec::new();
        ebml::write_uint(ids::TRACK_NUMBER, self.track_number, &mut entry);
        ebml::write_uint(ids::TRACK_UID, self.track_uid, &mut entry);
        ebml::write_uint(ids::TRACK_TYPE, self.track_type.code(), &mut entry);
        ebml::write_string(ids::CODEC_ID, &self.codec_id, &mut entry);
        ebml::write_string(ids::NAME, &self.name, &mut entry);
        ebml::write_uint(ids::DEFAULT_DURATION, self.default_duration, &mut entry);

        if let Some(audio) = &self.audio {
            let mut settings = Vec::new();
            ebml::write_float(ids::SAMPLING_FREQUENCY, audio.sampling_frequency, &mut settings);
            ebml::write_uint(ids::CHANNELS, audio.channels, &mut settings);
            ebml::write_master(ids::AUDIO, &settings, &mut entry);
        }

        ebml::write_master(ids::TRACK_ENTRY, &entry, out);
    }
}

/// `webm` when every track uses a WebM codec, `matroska` otherwise
pub fn doc_type(tracks: &[TrackEntry]) -> &'static str {
    if tracks
        .iter()
        .all(|t| WEBM_CODECS.contains(&t.codec_id.as_str()))
    {
        "webm"
    } else {
        "matroska"
    }
}

/// Encode everything that precedes the first cluster
pub(crate) fn encode_preamble(tracks: &[TrackEntry], app: &str) -> Vec<u8> {
    let mut out = Vec::new();

    let mut header = Vec::new();
    ebml::write_uint(ids::EBML_VERSION, 1, &mut header);
    ebml::write_uint(ids::EBML_READ_VERSION, 1, &mut header);
    ebml::write_uint(ids::EBML_MAX_ID_LENGTH, 4, &mut header);
    ebml::write_uint(ids::EBML_MAX_SIZE_LENGTH, 8, &mut header);
    ebml::write_string(ids::DOC_TYPE, doc_type(tracks), &mut header);
    ebml::write_uint(ids::DOC_TYPE_VERSION, 4, &mut header);
    ebml::write_uint(ids::DOC_TYPE_READ_VERSION, 2, &mut header);
    ebml::write_master(ids::EBML, &header, &mut out);

    ebml::open_unknown_size(ids::SEGMENT, &mut out);

    let mut info = Vec::new();
    // Block timestamps are in milliseconds.
    ebml::write_uint(ids::TIMECODE_SCALE, 1_000_000, &mut info);
    ebml::write_string(ids::MUXING_APP, app, &mut info);
    ebml::write_string(ids::WRITING_APP, app, &mut info);
    ebml::write_master(ids::INFO, &info, &mut out);

    let mut entries = Vec::new();
    for track in tracks {
        track.encode(&mut entries);
    }
    ebml::write_master(ids::TRACKS, &entries, &mut out);

    out
}
