//! Frame sizing
//!
//! Computes, for each frame of a constant-bitrate stream, the frame length
//! in bits and the nominal main-data allowance per granule. Frames are a
//! whole number of 8-bit slots; the fractional remainder of the average
//! slot count is paid back with a padding slot whenever the running slot
//! lag allows it, so the long-run average matches the bitrate exactly.

use crate::config::{Channels, SessionConfig};
use crate::error::{ConfigResult, FrameError, FrameResult};
use crate::types::MAX_GRANULES;

/// Samples per granule per channel
pub const GRANULE_SIZE: usize = 576;

/// Bits per slot for Layer III
pub const BITS_PER_SLOT: i32 = 8;

/// Parameters of one frame, fixed before any granule is budgeted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Total frame length in bits, header and side information included
    pub frame_length_bits: i32,
    pub channels: Channels,
    /// Nominal main-data bits for one granule, shared by its channels
    pub mean_bits: i32,
    /// Reservoir backlog in bytes announced by the formatter for this frame
    pub main_data_begin: u32,
    /// Granules carried by the frame: 2 for MPEG-1, 1 for MPEG-2/2.5
    pub granules: usize,
    /// Whether this frame carries the extra padding slot
    pub padding: bool,
}

impl FrameContext {
    /// Build a frame context from raw collaborator values.
    ///
    /// `channels` must be 1 or 2; a zero channel count would make the
    /// per-channel split undefined.
    pub fn new(
        frame_length_bits: i32,
        channels: u32,
        mean_bits: i32,
        main_data_begin: u32,
    ) -> FrameResult<Self> {
        let channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => return Err(FrameError::InvalidChannels(other)),
        };
        if frame_length_bits < 0 {
            return Err(FrameError::InvalidFrameLength(frame_length_bits));
        }
        if mean_bits < 0 {
            return Err(FrameError::InvalidMeanBits(mean_bits));
        }

        Ok(Self {
            frame_length_bits,
            channels,
            mean_bits,
            main_data_begin,
            granules: MAX_GRANULES,
            padding: false,
        })
    }

    /// Same frame with a different granule count (1 or 2)
    pub fn with_granules(self, granules: usize) -> FrameResult<Self> {
        if granules == 0 || granules > MAX_GRANULES {
            return Err(FrameError::InvalidGranules(granules));
        }
        Ok(Self { granules, ..self })
    }

    /// Nominal share of one channel in one granule, before any cap
    pub fn mean_bits_per_channel(&self) -> i32 {
        self.mean_bits / self.channels.count()
    }
}

/// Produces a [`FrameContext`] for every frame of a stream
#[derive(Debug, Clone)]
pub struct FrameSizer {
    channels: Channels,
    granules_per_frame: i32,
    sideinfo_len: i32,
    whole_slots_per_frame: i32,
    frac_slots_per_frame: f64,
    slot_lag: f64,
    frames: u64,
}

impl FrameSizer {
    /// Create a sizer for a validated configuration
    pub fn new(config: &SessionConfig) -> ConfigResult<Self> {
        config.validate()?;

        // slots = granules * 576 * bitrate * 1000 / (8 * sample_rate), split exactly
        let numerator = config.samples_per_frame() as u64 * config.bitrate as u64 * 1000;
        let denominator = BITS_PER_SLOT as u64 * config.sample_rate as u64;
        let whole_slots_per_frame = (numerator / denominator) as i32;
        let frac_slots_per_frame = (numerator % denominator) as f64 / denominator as f64;

        log::debug!(
            "frame sizer: {} Hz, {} kbps, {} whole slots + {:.4}",
            config.sample_rate,
            config.bitrate,
            whole_slots_per_frame,
            frac_slots_per_frame
        );

        Ok(Self {
            channels: config.channels,
            granules_per_frame: config.granules_per_frame() as i32,
            sideinfo_len: config.sideinfo_len(),
            whole_slots_per_frame,
            frac_slots_per_frame,
            slot_lag: -frac_slots_per_frame,
            frames: 0,
        })
    }

    /// Size the next frame. `main_data_begin` is the backlog the formatter
    /// will announce in this frame's side information.
    pub fn next_frame(&mut self, main_data_begin: u32) -> FrameContext {
        let padding = if self.frac_slots_per_frame > 0.0 {
            let padding = self.slot_lag <= self.frac_slots_per_frame - 1.0;
            self.slot_lag += if padding { 1.0 } else { 0.0 } - self.frac_slots_per_frame;
            padding
        } else {
            false
        };

        let bits_per_frame = BITS_PER_SLOT * (self.whole_slots_per_frame + padding as i32);
        let mean_bits = (bits_per_frame - self.sideinfo_len) / self.granules_per_frame;
        self.frames += 1;

        FrameContext {
            frame_length_bits: bits_per_frame,
            channels: self.channels,
            mean_bits,
            main_data_begin,
            granules: self.granules_per_frame as usize,
            padding,
        }
    }

    pub fn whole_slots_per_frame(&self) -> i32 {
        self.whole_slots_per_frame
    }

    pub fn frac_slots_per_frame(&self) -> f64 {
        self.frac_slots_per_frame
    }

    /// Frames sized so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
