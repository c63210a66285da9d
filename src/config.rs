//! Session configuration for the bit reservoir
//!
//! This module describes the stream an encode session produces (sample
//! rate, bitrate and channel layout) and derives the Layer III framing
//! parameters the reservoir depends on: MPEG version, granules per frame,
//! side information length and the reservoir ceiling implied by the width
//! of `main_data_begin`.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{MPEG1_RESERVOIR_LIMIT, MPEG2_RESERVOIR_LIMIT};

/// Number of audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    /// Mono audio (1 channel)
    Mono = 1,
    /// Stereo audio (2 channels)
    Stereo = 2,
}

/// MPEG version enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    /// MPEG-1
    Mpeg1,
    /// MPEG-2
    Mpeg2,
    /// MPEG-2.5
    Mpeg25,
}

const MPEG1_SAMPLE_RATES: &[u32] = &[44100, 48000, 32000];
const MPEG2_SAMPLE_RATES: &[u32] = &[22050, 24000, 16000];
const MPEG25_SAMPLE_RATES: &[u32] = &[11025, 12000, 8000];

const MPEG1_BITRATES: &[u32] = &[32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const MPEG2_BITRATES: &[u32] = &[8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];
const MPEG25_BITRATES: &[u32] = &[8, 16, 24, 32, 40, 48, 56, 64];

/// Parameters of the stream an encode session produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of audio channels
    pub channels: Channels,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Target bitrate in kbps
    pub bitrate: u32,
}

impl SessionConfig {
    /// Create a configuration; call [`SessionConfig::validate`] before use
    pub fn new(channels: Channels, sample_rate: u32, bitrate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bitrate,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let bitrates = match self.sample_rate {
            rate if MPEG1_SAMPLE_RATES.contains(&rate) => MPEG1_BITRATES,
            rate if MPEG2_SAMPLE_RATES.contains(&rate) => MPEG2_BITRATES,
            rate if MPEG25_SAMPLE_RATES.contains(&rate) => MPEG25_BITRATES,
            rate => return Err(ConfigError::UnsupportedSampleRate(rate)),
        };

        let known = MPEG1_BITRATES.contains(&self.bitrate) || MPEG2_BITRATES.contains(&self.bitrate);
        if !known {
            return Err(ConfigError::UnsupportedBitrate(self.bitrate));
        }

        if !bitrates.contains(&self.bitrate) {
            return Err(ConfigError::IncompatibleRateCombination {
                sample_rate: self.sample_rate,
                bitrate: self.bitrate,
            });
        }

        Ok(())
    }

    /// Get the MPEG version based on sample rate
    pub fn mpeg_version(&self) -> MpegVersion {
        match self.sample_rate {
            rate if MPEG2_SAMPLE_RATES.contains(&rate) => MpegVersion::Mpeg2,
            rate if MPEG25_SAMPLE_RATES.contains(&rate) => MpegVersion::Mpeg25,
            _ => MpegVersion::Mpeg1,
        }
    }

    /// Granules carried by one frame
    pub fn granules_per_frame(&self) -> usize {
        match self.mpeg_version() {
            MpegVersion::Mpeg1 => 2,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 1,
        }
    }

    /// Get the number of samples per frame
    pub fn samples_per_frame(&self) -> usize {
        self.granules_per_frame() * crate::frame::GRANULE_SIZE
    }

    /// Header plus side information length in bits
    pub fn sideinfo_len(&self) -> i32 {
        let bytes = match (self.mpeg_version(), self.channels) {
            (MpegVersion::Mpeg1, Channels::Mono) => 4 + 17,
            (MpegVersion::Mpeg1, Channels::Stereo) => 4 + 32,
            (_, Channels::Mono) => 4 + 9,
            (_, Channels::Stereo) => 4 + 17,
        };
        8 * bytes
    }

    /// Largest reservoir `main_data_begin` can describe for this stream
    pub fn reservoir_limit(&self) -> i32 {
        match self.mpeg_version() {
            MpegVersion::Mpeg1 => MPEG1_RESERVOIR_LIMIT,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => MPEG2_RESERVOIR_LIMIT,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Channels::Stereo, 44100, 128)
    }
}

impl Channels {
    /// Channel count as a signed divisor for bit arithmetic
    pub fn count(self) -> i32 {
        self as i32
    }
}

impl TryFrom<u32> for Channels {
    type Error = ConfigError;

    fn try_from(value: u32) -> ConfigResult<Self> {
        match value {
            1 => Ok(Channels::Mono),
            2 => Ok(Channels::Stereo),
            other => Err(ConfigError::InvalidChannels(other)),
        }
    }
}

impl From<Channels> for usize {
    fn from(channels: Channels) -> Self {
        channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    prop_compose! {
        fn valid_channels()(channels in prop::sample::select(&[Channels::Mono, Channels::Stereo])) -> Channels {
            channels
        }
    }

    fn compatible_config() -> impl Strategy<Value = SessionConfig> {
        (
            prop::sample::select(vec![44100u32, 48000, 32000, 22050, 24000, 16000, 11025, 12000, 8000]),
            valid_channels(),
        )
            .prop_flat_map(|(sample_rate, channels)| {
                let bitrates = match sample_rate {
                    44100 | 48000 | 32000 => MPEG1_BITRATES.to_vec(),
                    22050 | 24000 | 16000 => MPEG2_BITRATES.to_vec(),
                    _ => MPEG25_BITRATES.to_vec(),
                };
                (Just(sample_rate), Just(channels), prop::sample::select(bitrates))
            })
            .prop_map(|(sample_rate, channels, bitrate)| SessionConfig::new(channels, sample_rate, bitrate))
    }

    proptest! {
        #[test]
        fn test_compatible_configs_validate(config in compatible_config()) {
            prop_assert!(config.validate().is_ok(), "Valid configuration should pass validation");

            let limit = config.reservoir_limit();
            match config.mpeg_version() {
                MpegVersion::Mpeg1 => {
                    prop_assert_eq!(config.granules_per_frame(), 2);
                    prop_assert_eq!(limit, MPEG1_RESERVOIR_LIMIT);
                }
                MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => {
                    prop_assert_eq!(config.granules_per_frame(), 1);
                    prop_assert_eq!(limit, MPEG2_RESERVOIR_LIMIT);
                }
            }
            prop_assert_eq!(config.samples_per_frame(), config.granules_per_frame() * 576);
        }

        #[test]
        fn test_unknown_sample_rate_rejected(
            rate in prop::num::u32::ANY.prop_filter("Must be invalid", |&rate| {
                !matches!(rate, 44100 | 48000 | 32000 | 22050 | 24000 | 16000 | 11025 | 12000 | 8000)
            }),
            channels in valid_channels(),
        ) {
            let config = SessionConfig::new(channels, rate, 128);
            prop_assert_eq!(config.validate(), Err(ConfigError::UnsupportedSampleRate(rate)));
        }
    }

    #[test]
    fn test_bitrate_validation() {
        let config = SessionConfig::new(Channels::Stereo, 44100, 100);
        assert_eq!(config.validate(), Err(ConfigError::UnsupportedBitrate(100)));

        // 8 kbps exists, but not for MPEG-1
        let config = SessionConfig::new(Channels::Mono, 48000, 8);
        assert_eq!(
            config.validate(),
            Err(ConfigError::IncompatibleRateCombination { sample_rate: 48000, bitrate: 8 })
        );

        // 320 kbps is MPEG-1 only
        let config = SessionConfig::new(Channels::Stereo, 22050, 320);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompatibleRateCombination { .. })
        ));
    }

    #[test]
    fn test_sideinfo_len() {
        assert_eq!(SessionConfig::new(Channels::Stereo, 44100, 128).sideinfo_len(), 288);
        assert_eq!(SessionConfig::new(Channels::Mono, 44100, 128).sideinfo_len(), 168);
        assert_eq!(SessionConfig::new(Channels::Stereo, 22050, 64).sideinfo_len(), 168);
        assert_eq!(SessionConfig::new(Channels::Mono, 8000, 8).sideinfo_len(), 104);
    }

    #[test]
    fn test_channels_conversion() {
        assert_eq!(Channels::try_from(1), Ok(Channels::Mono));
        assert_eq!(Channels::try_from(2), Ok(Channels::Stereo));
        assert_eq!(Channels::try_from(0), Err(ConfigError::InvalidChannels(0)));
        assert_eq!(Channels::try_from(6), Err(ConfigError::InvalidChannels(6)));

        assert_eq!(usize::from(Channels::Mono), 1);
        assert_eq!(Channels::Stereo.count(), 2);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mpeg_version(), MpegVersion::Mpeg1);
    }
}
