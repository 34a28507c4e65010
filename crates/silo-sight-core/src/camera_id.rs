use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which camera of the stereo pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraId {
    /// Reference camera (front view), projection `K1 [I | 0]`.
    First,
    /// Second camera (side view), projection `K2 [R | T]`.
    Second,
}

impl CameraId {
    pub const BOTH: [CameraId; 2] = [CameraId::First, CameraId::Second];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            CameraId::First => 0,
            CameraId::Second => 1,
        }
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraId::First => f.write_str("camera 1 (front)"),
            CameraId::Second => f.write_str("camera 2 (side)"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown camera selector '{0}' (expected first|cam1|front or second|cam2|side)")]
pub struct UnknownCamera(pub String);

impl FromStr for CameraId {
    type Err = UnknownCamera;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "cam1" | "1" | "front" => Ok(CameraId::First),
            "second" | "cam2" | "2" | "side" => Ok(CameraId::Second),
            _ => Err(UnknownCamera(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_aliases() {
        assert_eq!("cam1".parse::<CameraId>(), Ok(CameraId::First));
        assert_eq!(" Side ".parse::<CameraId>(), Ok(CameraId::Second));
        assert_eq!(
            "cam3".parse::<CameraId>(),
            Err(UnknownCamera("cam3".to_string()))
        );
    }
}
