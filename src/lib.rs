//! # Layer III Bit Reservoir
//!
//! Bit-budget accounting for MPEG-1/2 Layer III encoders. Granules with
//! little perceptual content bank bits in the reservoir; demanding granules
//! borrow them, within the limits the bitstream can describe. At the end of
//! each frame the reservoir is pulled back under its ceiling and onto a byte
//! boundary, and the bits removed become stuffing in the granule lengths or
//! in ancillary data.
//!
//! ```
//! use l3_reservoir::{Channels, EncodeSession, SessionConfig};
//!
//! let mut session = EncodeSession::new(SessionConfig::new(Channels::Stereo, 44100, 128))?;
//! let mut psy = |_gr: usize, _ch: usize| 420.0;
//! let mut quantizer = |_gr: usize, _ch: usize, max_bits: i32| max_bits as u32 - 40;
//!
//! let outcome = session.encode_frame(&mut psy, &mut quantizer);
//! assert_eq!(session.controller().occupancy() % 8, 0);
//! assert_eq!(outcome.next_main_data_begin as i32 * 8, session.controller().occupancy());
//! # Ok::<(), l3_reservoir::ReservoirError>(())
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod reservoir;
pub mod session;
pub mod types;

#[cfg(feature = "diagnostics")]
pub mod diagnostics;

pub use config::{Channels, MpegVersion, SessionConfig};
pub use error::{ConfigError, FrameError, ReservoirError, Result};
pub use frame::{FrameContext, FrameSizer};
pub use reservoir::{
    granule_budget, ReservoirController, ReservoirPhase, ReservoirState, StuffingPlan,
    StuffingReport,
};
pub use session::{EncodeSession, FrameOutcome, GranuleQuantizer, PerceptualEntropy, SharedReservoir};
pub use types::{GrInfo, SideInfo, STUFFING_ORDER};
