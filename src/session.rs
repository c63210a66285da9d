//! Encode session driver
//!
//! Runs the per-frame reservoir protocol against the encoder stages that
//! surround it. The psychoacoustic model and the quantizer are external;
//! they plug in through [`PerceptualEntropy`] and [`GranuleQuantizer`].

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::frame::{FrameContext, FrameSizer};
use crate::reservoir::{ReservoirController, StuffingReport};
use crate::types::{SideInfo, MAX_CHANNELS, MAX_GRANULES, MAX_PART2_3_LENGTH};

/// Source of per-granule perceptual entropy
pub trait PerceptualEntropy {
    /// Perceptual entropy of one granule/channel of the frame being encoded
    fn perceptual_entropy(&mut self, gr: usize, ch: usize) -> f64;
}

impl<F> PerceptualEntropy for F
where
    F: FnMut(usize, usize) -> f64,
{
    fn perceptual_entropy(&mut self, gr: usize, ch: usize) -> f64 {
        self(gr, ch)
    }
}

/// Quantization and Huffman stage
pub trait GranuleQuantizer {
    /// Encode one granule/channel within `max_bits` and report the bits
    /// actually spent (`part2_3_length`)
    fn quantize(&mut self, gr: usize, ch: usize, max_bits: i32) -> u32;
}

impl<F> GranuleQuantizer for F
where
    F: FnMut(usize, usize, i32) -> u32,
{
    fn quantize(&mut self, gr: usize, ch: usize, max_bits: i32) -> u32 {
        self(gr, ch, max_bits)
    }
}

/// Everything the bitstream writer needs after one frame
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub frame: FrameContext,
    /// Budget handed to the quantizer for each cell
    pub max_bits: [[i32; MAX_CHANNELS]; MAX_GRANULES],
    /// Side information with stuffing applied and `resv_drain` set
    pub side_info: SideInfo,
    pub stuffing: StuffingReport,
    /// Backlog in bytes to announce in the next frame
    pub next_main_data_begin: u32,
}

/// One encoded stream: frame sizing, reservoir and side information
#[derive(Debug)]
pub struct EncodeSession {
    config: SessionConfig,
    sizer: FrameSizer,
    controller: ReservoirController,
    side_info: SideInfo,
}

impl EncodeSession {
    /// Create a session for a stream; the configuration is validated here
    pub fn new(config: SessionConfig) -> Result<Self> {
        let sizer = FrameSizer::new(&config)?;
        let controller = ReservoirController::with_limit(config.reservoir_limit());

        log::info!(
            "encode session: {:?}, {} Hz, {} kbps, reservoir limit {} bits",
            config.channels,
            config.sample_rate,
            config.bitrate,
            controller.limit()
        );

        Ok(Self {
            config,
            sizer,
            controller,
            side_info: SideInfo::new(),
        })
    }

    /// Run one frame through the reservoir: size it, budget and account for
    /// each granule in order, then reconcile and apply stuffing.
    pub fn encode_frame<P, Q>(&mut self, psy: &mut P, quantizer: &mut Q) -> FrameOutcome
    where
        P: PerceptualEntropy + ?Sized,
        Q: GranuleQuantizer + ?Sized,
    {
        let frame = self.sizer.next_frame(self.side_info.main_data_begin);
        let channels: usize = self.config.channels.into();
        let mut max_bits = [[0; MAX_CHANNELS]; MAX_GRANULES];

        self.side_info.reset_granules();
        self.controller.frame_begin(frame);

        for gr in 0..frame.granules {
            for ch in 0..channels {
                let pe = psy.perceptual_entropy(gr, ch);
                let budget = self.controller.max_reservoir_bits(pe);
                let used = quantizer.quantize(gr, ch, budget).min(MAX_PART2_3_LENGTH);

                self.side_info.set_part2_3_length(gr, ch, used);
                self.controller.adjust(used);
                max_bits[gr][ch] = budget;
            }
        }

        let stuffing = self.controller.frame_end(&mut self.side_info);
        let next_main_data_begin = self.controller.main_data_begin();
        let outcome = FrameOutcome {
            frame,
            max_bits,
            side_info: self.side_info.clone(),
            stuffing,
            next_main_data_begin,
        };

        self.side_info.main_data_begin = next_main_data_begin;
        outcome
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn controller(&self) -> &ReservoirController {
        &self.controller
    }

    /// Side information of the last completed frame
    pub fn side_info(&self) -> &SideInfo {
        &self.side_info
    }

    pub fn frames_encoded(&self) -> u64 {
        self.controller.frames_completed()
    }
}

/// Reservoir handle for encoders that stage frames on several threads.
///
/// Each call to [`SharedReservoir::with`] holds the lock for its whole
/// closure, so a frame's operations run as one unit in submission order.
#[derive(Debug, Clone, Default)]
pub struct SharedReservoir {
    inner: Arc<Mutex<ReservoirController>>,
}

impl SharedReservoir {
    pub fn new(controller: ReservoirController) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    /// Run `f` with exclusive access to the controller
    pub fn with<R>(&self, f: impl FnOnce(&mut ReservoirController) -> R) -> R {
        // a frame cut short by a panic leaves the phase mid-frame, which the
        // controller's own call-order checks report on the next call
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
