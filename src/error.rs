//! Error types for the bit reservoir
//!
//! The four reservoir operations themselves have no recoverable error
//! surface: every input is numeric and every branch is total. Errors only
//! arise while building the session and per-frame parameters that feed them.

use thiserror::Error;

/// Main error type for the reservoir crate
#[derive(Debug, Error)]
pub enum ReservoirError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Frame parameters rejected before `frame_begin`
    #[error("Frame parameter error: {0}")]
    Frame(#[from] FrameError),

    /// Diagnostics trace could not be written or read
    #[cfg(feature = "diagnostics")]
    #[error("Diagnostics error: {0}")]
    Diagnostics(String),
}

/// Session configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Unsupported sample rate
    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    /// Unsupported bitrate
    #[error("Unsupported bitrate: {0} kbps")]
    UnsupportedBitrate(u32),

    /// Invalid channel configuration
    #[error("Invalid channel count: {0}")]
    InvalidChannels(u32),

    /// Incompatible sample rate and bitrate combination
    #[error("Incompatible sample rate ({sample_rate} Hz) and bitrate ({bitrate} kbps) combination")]
    IncompatibleRateCombination { sample_rate: u32, bitrate: u32 },
}

/// Per-frame parameter errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Channel count outside 1..=2
    #[error("Invalid channel count {0}: expected 1 or 2")]
    InvalidChannels(u32),

    /// Negative frame length
    #[error("Invalid frame length: {0} bits")]
    InvalidFrameLength(i32),

    /// Negative nominal bit allowance
    #[error("Invalid mean bits: {0}")]
    InvalidMeanBits(i32),

    /// Granule count outside 1..=2
    #[error("Invalid granule count: {0}")]
    InvalidGranules(usize),
}

/// Specialized result types for different modules
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type FrameResult<T> = std::result::Result<T, FrameError>;
pub type Result<T> = std::result::Result<T, ReservoirError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_into_reservoir_error() {
        let err: ReservoirError = ConfigError::UnsupportedSampleRate(11111).into();
        assert!(matches!(err, ReservoirError::Config(ConfigError::UnsupportedSampleRate(11111))));
        assert_eq!(err.to_string(), "Configuration error: Unsupported sample rate: 11111 Hz");
    }

    #[test]
    fn test_frame_error_messages() {
        assert_eq!(
            FrameError::InvalidChannels(0).to_string(),
            "Invalid channel count 0: expected 1 or 2"
        );
        let err: ReservoirError = FrameError::InvalidMeanBits(-8).into();
        assert_eq!(err.to_string(), "Frame parameter error: Invalid mean bits: -8");
    }
}
