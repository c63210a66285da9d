//! Bit reservoir controller for Layer III encoding
//!
//! This module implements the bit reservoir mechanism described in
//! C.1.5.4.2.2 of the IS. Granules that need fewer bits than their nominal
//! share bank the surplus; granules with high perceptual entropy borrow
//! from the bank. Once per frame the reservoir is forced back under its
//! ceiling and onto a byte boundary, and the bits removed are written out
//! as stuffing.
//!
//! Calls must follow the encoder's loop:
//!
//! ```text
//! frame_begin -> (max_reservoir_bits -> adjust)* -> frame_end -> frame_begin ...
//! ```
//!
//! Any other order is a bug in the calling pipeline and panics.

use crate::frame::FrameContext;
use crate::types::{
    SideInfo, MAX_CHANNELS, MAX_FRAME_AND_RESERVOIR_BITS, MAX_GRANULES, MAX_GRANULE_BITS,
    MAX_PART2_3_LENGTH, MPEG1_RESERVOIR_LIMIT, STUFFING_ORDER,
};

#[cfg(feature = "diagnostics")]
use serde::{Deserialize, Serialize};

/// Requests at or below this many extra bits are not funded by the reservoir
const MIN_FUNDED_DEMAND: i32 = 100;

/// Bits requested per unit of perceptual entropy
const PE_BITS_FACTOR: f64 = 3.1;

/// Occupancy and capacity of the reservoir, in bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(Serialize, Deserialize))]
pub struct ReservoirState {
    /// Bits currently banked. May dip below zero between granules.
    pub occupancy: i32,
    /// Bits the reservoir may hold during the current frame
    pub capacity: i32,
}

/// Position of the controller within the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservoirPhase {
    /// No frame has been started yet
    Uninitialized,
    /// `frame_begin` done, no granule budgeted yet
    FrameBegun,
    /// A granule budget was handed out and awaits its `adjust`
    GranuleBudgeted,
    /// The last budgeted granule has been accounted for
    GranuleAdjusted,
    /// `frame_end` done; the next call must be `frame_begin`
    FrameEnded,
}

/// Where the stuffing bits of a frame ended up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(Serialize, Deserialize))]
pub enum StuffingPlan {
    /// Nothing to stuff
    #[default]
    None,
    /// Everything went into granule 0, channel 0
    FirstGranule,
    /// Spread over the cells in [`STUFFING_ORDER`]
    Distributed,
}

/// Accounting of one `frame_end`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(Serialize, Deserialize))]
pub struct StuffingReport {
    /// Bit added to a stereo reservoir when `mean_bits` is odd
    pub parity: i32,
    /// Bits above capacity
    pub overflow: i32,
    /// Bits removed to land on a byte boundary
    pub alignment: i32,
    pub plan: StuffingPlan,
    /// Bits added to `part2_3_length` fields
    pub absorbed: i32,
    /// Bits left for `resv_drain`
    pub drained: i32,
}

impl StuffingReport {
    /// Total stuffing produced by the frame
    pub fn stuffing_bits(&self) -> i32 {
        self.overflow + self.alignment
    }
}

/// Per-granule bit ceiling for a given reservoir state and perceptual entropy.
///
/// Pure function of its inputs; [`ReservoirController::max_reservoir_bits`]
/// wraps it with the call-order checks.
pub fn granule_budget(state: &ReservoirState, frame: &FrameContext, pe: f64) -> i32 {
    let mean_bits = frame.mean_bits_per_channel();
    let max_bits = mean_bits.min(MAX_GRANULE_BITS);

    if state.capacity == 0 {
        return max_bits;
    }

    // float to int casts saturate; NaN maps to 0
    let more_bits = (pe * PE_BITS_FACTOR) as i32 - max_bits;
    let mut add_bits = 0;
    if more_bits > MIN_FUNDED_DEMAND {
        let frac = (state.occupancy * 6) / 10;
        add_bits = frac.min(more_bits);
    }

    let over_bits = state.occupancy - ((state.capacity * 8) / 10) - add_bits;
    if over_bits > 0 {
        add_bits += over_bits;
    }

    (max_bits + add_bits).clamp(0, MAX_GRANULE_BITS)
}

/// Cross-frame bit reservoir owned by one encode session
#[derive(Debug, Clone)]
pub struct ReservoirController {
    state: ReservoirState,
    limit: i32,
    frame: Option<FrameContext>,
    phase: ReservoirPhase,
    granules_budgeted: usize,
    frames_completed: u64,
    consistency_mismatches: u64,
}

impl ReservoirController {
    /// Create an empty reservoir with the MPEG-1 limit of 4088 bits
    pub fn new() -> Self {
        Self::with_limit(MPEG1_RESERVOIR_LIMIT)
    }

    /// Create an empty reservoir whose capacity never exceeds `limit`.
    /// The limit itself is capped at 4088 bits.
    pub fn with_limit(limit: i32) -> Self {
        Self {
            state: ReservoirState::default(),
            limit: limit.clamp(0, MPEG1_RESERVOIR_LIMIT),
            frame: None,
            phase: ReservoirPhase::Uninitialized,
            granules_budgeted: 0,
            frames_completed: 0,
            consistency_mismatches: 0,
        }
    }

    /// Start a frame: recompute the capacity from the frame length.
    ///
    /// Occupancy carries over from the previous `frame_end`. The backlog
    /// announced by the formatter is only compared against it; a mismatch
    /// is logged and counted.
    pub fn frame_begin(&mut self, frame: FrameContext) -> i32 {
        assert!(
            matches!(self.phase, ReservoirPhase::Uninitialized | ReservoirPhase::FrameEnded),
            "frame_begin called while in {:?}",
            self.phase
        );

        let capacity = if frame.frame_length_bits > MAX_FRAME_AND_RESERVOIR_BITS {
            0
        } else {
            MAX_FRAME_AND_RESERVOIR_BITS - frame.frame_length_bits
        };
        self.state.capacity = capacity.min(self.limit);

        let expected_resv_size = frame.main_data_begin as i64 * 8;
        if expected_resv_size != self.state.occupancy as i64 {
            self.consistency_mismatches += 1;
            log::warn!(
                "main_data_begin {} implies {} reservoir bits, controller holds {}",
                frame.main_data_begin,
                expected_resv_size,
                self.state.occupancy
            );
        }

        log::debug!(
            "frame {}: length {} bits, mean_bits {}, capacity {}, occupancy {}",
            self.frames_completed,
            frame.frame_length_bits,
            frame.mean_bits,
            self.state.capacity,
            self.state.occupancy
        );

        self.frame = Some(frame);
        self.phase = ReservoirPhase::FrameBegun;
        self.granules_budgeted = 0;
        self.state.capacity
    }

    /// Bit ceiling for the next granule, driven by its perceptual entropy
    pub fn max_reservoir_bits(&mut self, pe: f64) -> i32 {
        assert!(
            matches!(self.phase, ReservoirPhase::FrameBegun | ReservoirPhase::GranuleAdjusted),
            "max_reservoir_bits called while in {:?}",
            self.phase
        );
        let frame = self.current_frame();
        let cells = frame.granules * frame.channels.count() as usize;
        assert!(
            self.granules_budgeted < cells,
            "more than {} granule budgets requested in one frame",
            cells
        );

        let max_bits = granule_budget(&self.state, &frame, pe);
        log::trace!(
            "granule {}: pe {:.1}, occupancy {}, max_bits {}",
            self.granules_budgeted,
            pe,
            self.state.occupancy,
            max_bits
        );

        self.granules_budgeted += 1;
        self.phase = ReservoirPhase::GranuleBudgeted;
        max_bits
    }

    /// Account for the bits the quantizer actually spent on the granule
    /// that was last budgeted
    pub fn adjust(&mut self, part2_3_length: u32) {
        assert_eq!(
            self.phase,
            ReservoirPhase::GranuleBudgeted,
            "adjust called without a budgeted granule"
        );
        let frame = self.current_frame();

        self.state.occupancy += frame.mean_bits_per_channel() - part2_3_length as i32;
        self.phase = ReservoirPhase::GranuleAdjusted;
    }

    /// Close the frame: bring the reservoir within capacity and onto a byte
    /// boundary, and hand the removed bits to the granules as stuffing.
    ///
    /// Stuffing lands in granule 0 / channel 0 when it fits, otherwise it is
    /// spread in [`STUFFING_ORDER`] over the cells this frame actually
    /// carries. Anything no cell can take is written to `resv_drain`.
    pub fn frame_end(&mut self, side_info: &mut SideInfo) -> StuffingReport {
        assert!(
            matches!(self.phase, ReservoirPhase::FrameBegun | ReservoirPhase::GranuleAdjusted),
            "frame_end called while in {:?}",
            self.phase
        );
        let frame = self.current_frame();
        let mut report = StuffingReport::default();
        side_info.resv_drain = 0;
        #[cfg(feature = "diagnostics")]
        let occupancy_before = self.state.occupancy;

        if frame.channels.count() == 2 && (frame.mean_bits & 1) != 0 {
            self.state.occupancy += 1;
            report.parity = 1;
        }

        report.overflow = (self.state.occupancy - self.state.capacity).max(0);
        self.state.occupancy -= report.overflow;

        // we must be byte aligned
        report.alignment = self.state.occupancy.rem_euclid(8);
        self.state.occupancy -= report.alignment;

        if self.state.occupancy < 0 {
            log::warn!(
                "reservoir overdrawn by {} bits at end of frame {}",
                -self.state.occupancy,
                self.frames_completed
            );
        }

        let stuffing_bits = report.stuffing_bits();
        if stuffing_bits > 0 {
            let first = &mut side_info.gr[0].ch[0].tt;
            if (first.part2_3_length as i64 + stuffing_bits as i64) < MAX_PART2_3_LENGTH as i64 {
                first.part2_3_length += stuffing_bits as u32;
                report.plan = StuffingPlan::FirstGranule;
                report.absorbed = stuffing_bits;
            } else {
                report.plan = StuffingPlan::Distributed;
                let remaining = distribute_stuffing(side_info, &frame, stuffing_bits);
                report.absorbed = stuffing_bits - remaining;
                report.drained = remaining;
                side_info.resv_drain = remaining;
            }
        }

        log::debug!(
            "frame {} end: occupancy {}, stuffing {} ({:?}), resv_drain {}",
            self.frames_completed,
            self.state.occupancy,
            stuffing_bits,
            report.plan,
            side_info.resv_drain
        );

        #[cfg(feature = "diagnostics")]
        crate::diagnostics::record_frame_end(
            self.frames_completed,
            occupancy_before,
            &self.state,
            &report,
        );

        self.frames_completed += 1;
        self.phase = ReservoirPhase::FrameEnded;
        report
    }

    /// Backlog in bytes the formatter announces in the next frame
    pub fn main_data_begin(&self) -> u32 {
        (self.state.occupancy.max(0) / 8) as u32
    }

    pub fn occupancy(&self) -> i32 {
        self.state.occupancy
    }

    pub fn capacity(&self) -> i32 {
        self.state.capacity
    }

    pub fn state(&self) -> ReservoirState {
        self.state
    }

    pub fn phase(&self) -> ReservoirPhase {
        self.phase
    }

    /// Ceiling applied on top of the frame-length bound
    pub fn limit(&self) -> i32 {
        self.limit
    }

    /// Parameters of the frame in progress, if any
    pub fn frame(&self) -> Option<&FrameContext> {
        self.frame.as_ref()
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    /// Frames whose announced `main_data_begin` disagreed with the occupancy
    pub fn consistency_mismatches(&self) -> u64 {
        self.consistency_mismatches
    }

    fn current_frame(&self) -> FrameContext {
        match self.frame {
            Some(frame) => frame,
            None => panic!("no frame in progress"),
        }
    }
}

impl Default for ReservoirController {
    fn default() -> Self {
        Self::new()
    }
}

/// Spread `stuffing_bits` over the frame's cells in fixed order, each taking
/// what fits under the field maximum. Returns the bits nothing could take.
fn distribute_stuffing(side_info: &mut SideInfo, frame: &FrameContext, stuffing_bits: i32) -> i32 {
    let granules = frame.granules.min(MAX_GRANULES);
    let channels = (frame.channels.count() as usize).min(MAX_CHANNELS);
    let mut remaining = stuffing_bits as u32;

    for &(gr, ch) in STUFFING_ORDER.iter() {
        if remaining == 0 {
            break;
        }
        if gr >= granules || ch >= channels {
            continue;
        }
        let gi = &mut side_info.gr[gr].ch[ch].tt;
        let extra_bits = MAX_PART2_3_LENGTH.saturating_sub(gi.part2_3_length);
        let bits_this_gr = extra_bits.min(remaining);
        gi.part2_3_length += bits_this_gr;
        remaining -= bits_this_gr;
    }

    remaining as i32
}
