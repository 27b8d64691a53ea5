//! Single-Channel Readout Modes

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Readout mode of a band's debug stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadoutMode {
    /// Full band readout
    #[default]
    Off,
    /// Single channel, first option register
    Opt1,
    /// Single channel, second option register
    Opt2,
}

impl ReadoutMode {
    /// Values for the (single_channel_readout, single_channel_readout_opt2) registers
    pub fn register_bits(&self) -> (bool, bool) {
        match self {
            ReadoutMode::Off => (false, false),
            ReadoutMode::Opt1 => (true, false),
            ReadoutMode::Opt2 => (false, true),
        }
    }

    /// Whether the capture holds a single channel
    pub fn is_single_channel(&self) -> bool {
        !matches!(self, ReadoutMode::Off)
    }
}

impl TryFrom<u8> for ReadoutMode {
    type Error = ConfigurationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReadoutMode::Off),
            1 => Ok(ReadoutMode::Opt1),
            2 => Ok(ReadoutMode::Opt2),
            other => Err(ConfigurationError::InvalidReadoutMode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_bits() {
        assert_eq!(ReadoutMode::Off.register_bits(), (false, false));
        assert_eq!(ReadoutMode::Opt1.register_bits(), (true, false));
        assert_eq!(ReadoutMode::Opt2.register_bits(), (false, true));
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert_eq!(ReadoutMode::try_from(2), Ok(ReadoutMode::Opt2));
        assert_eq!(
            ReadoutMode::try_from(3),
            Err(ConfigurationError::InvalidReadoutMode(3))
        );
    }
}
