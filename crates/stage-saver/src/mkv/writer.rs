//! Per-track block writers sharing one output stream

use super::{ebml, encode_preamble, ids, TrackEntry};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tracing::trace;

/// A keyframe this far past the cluster start opens a new cluster
const CLUSTER_KEYFRAME_SPAN_MS: i64 = 5_000;

const KEYFRAME_FLAG: u8 = 0x80;

/// Owns the output stream and the currently open cluster
struct Muxer<W> {
    sink: W,
    cluster_timecode: Option<i64>,
}

impl<W: Write> Muxer<W> {
    fn write_block(
        &mut self,
        track_number: u64,
        keyframe: bool,
        timestamp_ms: i64,
        data: &[u8],
    ) -> Result<usize> {
        if timestamp_ms < 0 {
            return Err(Error::Container(format!(
                "negative timestamp {} on track {}",
                timestamp_ms, track_number
            )));
        }

        let mut out = Vec::with_capacity(data.len() + 32);

        let relative = match self.cluster_timecode {
            Some(start) if fits_cluster(timestamp_ms - start, keyframe) => timestamp_ms - start,
            _ => {
                ebml::open_unknown_size(ids::CLUSTER, &mut out);
                ebml::write_uint(ids::TIMECODE, timestamp_ms as u64, &mut out);
                self.cluster_timecode = Some(timestamp_ms);
                trace!(timecode = timestamp_ms, "Opened cluster");
                0
            }
        };

        let mut block = Vec::with_capacity(data.len() + 4);
        ebml::encode_vint(track_number, &mut block);
        block.extend_from_slice(&(relative as i16).to_be_bytes());
        block.push(if keyframe { KEYFRAME_FLAG } else { 0 });
        block.extend_from_slice(data);
        ebml::write_binary(ids::SIMPLE_BLOCK, &block, &mut out);

        self.sink.write_all(&out)?;
        self.sink.flush()?;

        Ok(data.len())
    }
}

fn fits_cluster(relative: i64, keyframe: bool) -> bool {
    let representable = (i16::MIN as i64..=i16::MAX as i64).contains(&relative);
    representable && !(keyframe && relative >= CLUSTER_KEYFRAME_SPAN_MS)
}

/// Appends SimpleBlocks for one track
///
/// Writers created together share the underlying stream; each one can be
/// moved to a different task.
pub struct BlockWriter<W> {
    track_number: u64,
    muxer: Arc<Mutex<Muxer<W>>>,
}

impl<W: Write> BlockWriter<W> {
    /// Track number this writer tags its blocks with
    pub fn track_number(&self) -> u64 {
        self.track_number
    }

    /// Append one block at `timestamp_ms` and return the payload length written
    pub fn write(&mut self, keyframe: bool, timestamp_ms: i64, data: &[u8]) -> Result<usize> {
        self.muxer
            .lock()
            .write_block(self.track_number, keyframe, timestamp_ms, data)
    }
}

impl<W> std::fmt::Debug for BlockWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockWriter")
            .field("track_number", &self.track_number)
            .finish()
    }
}

/// Write the file preamble to `sink` and return one writer per track, in order
pub fn new_block_writers<W: Write>(mut sink: W, tracks: &[TrackEntry]) -> Result<Vec<BlockWriter<W>>> {
    if tracks.is_empty() {
        return Err(Error::Container("at least one track is required".to_string()));
    }

    let mut track_numbers: Vec<u64> = tracks.iter().map(|t| t.track_number).collect();
    track_numbers.sort_unstable();
    if track_numbers.windows(2).any(|w| w[0] == w[1]) || track_numbers[0] == 0 {
        return Err(Error::Container(format!(
            "track numbers must be unique and non-zero: {:?}",
            track_numbers
        )));
    }

    sink.write_all(&encode_preamble(tracks, env!("CARGO_PKG_NAME")))?;
    sink.flush()?;

    let muxer = Arc::new(Mutex::new(Muxer {
        sink,
        cluster_timecode: None,
    }));

    Ok(tracks
        .iter()
        .map(|t| BlockWriter {
            track_number: t.track_number,
            muxer: Arc::clone(&muxer),
        })
        .collect())
}
