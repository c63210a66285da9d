//! Type definitions shared by the reservoir and its collaborators
//!
//! The granule/channel layout mirrors Layer III side information: two
//! granules per frame, up to two channels per granule, and one
//! `part2_3_length` field per cell.

#[cfg(feature = "diagnostics")]
use serde::{Deserialize, Serialize};

pub const MAX_CHANNELS: usize = 2;
pub const MAX_GRANULES: usize = 2;

/// Largest value the 12-bit `part2_3_length` field can carry
pub const MAX_PART2_3_LENGTH: u32 = 4095;

/// Upper bound on per-granule budgets handed to the quantizer
pub const MAX_GRANULE_BITS: i32 = 4095;

/// Frame plus reservoir may never exceed this many bits
pub const MAX_FRAME_AND_RESERVOIR_BITS: i32 = 7680;

/// Reservoir limit imposed by the 9-bit MPEG-1 `main_data_begin` field
/// (511 bytes, one bit of headroom below 4096)
pub const MPEG1_RESERVOIR_LIMIT: i32 = 4088;

/// Reservoir limit imposed by the 8-bit MPEG-2/2.5 `main_data_begin` field
pub const MPEG2_RESERVOIR_LIMIT: i32 = 2040;

/// Order in which stuffing is spread over granule cells once the first
/// cell cannot take all of it. Entries are `(granule, channel)`.
pub const STUFFING_ORDER: [(usize, usize); MAX_GRANULES * MAX_CHANNELS] =
    [(0, 0), (0, 1), (1, 0), (1, 1)];

/// Per-granule, per-channel coding information read by the reservoir
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(Serialize, Deserialize))]
pub struct GrInfo {
    /// Bits spent on scale factors plus Huffman data (0..=4095)
    pub part2_3_length: u32,
}

/// Channel information within a granule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(Serialize, Deserialize))]
pub struct GranuleChannel {
    pub tt: GrInfo,
}

/// Granule structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(Serialize, Deserialize))]
pub struct Granule {
    pub ch: [GranuleChannel; MAX_CHANNELS],
}

/// Side information the reservoir reads and writes for one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(Serialize, Deserialize))]
pub struct SideInfo {
    /// Bytes the decoder rewinds into the previous reservoir
    pub main_data_begin: u32,
    /// Stuffing bits that no granule could absorb; emitted as ancillary data
    pub resv_drain: i32,
    pub gr: [Granule; MAX_GRANULES],
}

impl SideInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits recorded for one granule/channel cell
    pub fn part2_3_length(&self, gr: usize, ch: usize) -> u32 {
        self.gr[gr].ch[ch].tt.part2_3_length
    }

    /// Record the bits the quantizer spent on one cell, clamped to the field width
    pub fn set_part2_3_length(&mut self, gr: usize, ch: usize, bits: u32) {
        self.gr[gr].ch[ch].tt.part2_3_length = bits.min(MAX_PART2_3_LENGTH);
    }

    /// Sum of all cell lengths
    pub fn total_part2_3_length(&self) -> u32 {
        self.gr
            .iter()
            .flat_map(|granule| granule.ch.iter())
            .map(|channel| channel.tt.part2_3_length)
            .sum()
    }

    /// Clear per-frame fields before the next frame is quantized.
    /// `main_data_begin` is kept; the formatter sets it separately.
    pub fn reset_granules(&mut self) {
        self.gr = [Granule::default(); MAX_GRANULES];
        self.resv_drain = 0;
    }
}
