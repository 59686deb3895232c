//! Negotiated link speed

use serde::{Deserialize, Serialize};

/// Speed at which a device is operating on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speed {
    /// The OS doesn't report or know the device speed
    Unknown,
    /// Low speed - 1.5 Mbps
    Low,
    /// Full speed - 12 Mbps
    Full,
    /// High speed - 480 Mbps
    High,
    /// SuperSpeed - 5 Gbps
    Super,
}

impl Speed {
    /// Map a native speed code, falling back to [`Speed::Unknown`].
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Speed::Low,
            2 => Speed::Full,
            3 => Speed::High,
            4 => Speed::Super,
            _ => Speed::Unknown,
        }
    }

    /// The native code for this speed.
    pub fn code(&self) -> i32 {
        match self {
            Speed::Unknown => 0,
            Speed::Low => 1,
            Speed::Full => 2,
            Speed::High => 3,
            Speed::Super => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_round_trip() {
        for speed in [Speed::Unknown, Speed::Low, Speed::Full, Speed::High, Speed::Super] {
            assert_eq!(Speed::from_code(speed.code()), speed);
        }
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(Speed::from_code(-1), Speed::Unknown);
        assert_eq!(Speed::from_code(9), Speed::Unknown);
    }
}
