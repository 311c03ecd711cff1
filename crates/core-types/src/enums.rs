use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// The run status of a trader. Stored as a small integer so it can be
/// compared against the `status > 0` checks used by the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraderStatus {
    #[default]
    Idle,
    Running,
}

impl TraderStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            TraderStatus::Idle => 0,
            TraderStatus::Running => 1,
        }
    }

    pub fn is_running(self) -> bool {
        self == TraderStatus::Running
    }
}

impl TryFrom<i16> for TraderStatus {
    type Error = CoreError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TraderStatus::Idle),
            1 => Ok(TraderStatus::Running),
            other => Err(CoreError::InvalidInput(
                "trader status".to_string(),
                other.to_string(),
            )),
        }
    }
}

impl From<TraderStatus> for u8 {
    fn from(status: TraderStatus) -> Self {
        status.as_i16() as u8
    }
}

impl TryFrom<u8> for TraderStatus {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        TraderStatus::try_from(i16::from(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_converts_from_stored_integers() {
        assert_eq!(TraderStatus::try_from(0_i16).unwrap(), TraderStatus::Idle);
        assert_eq!(TraderStatus::try_from(1_i16).unwrap(), TraderStatus::Running);
        assert!(TraderStatus::try_from(7_i16).is_err());
        assert_eq!(u8::from(TraderStatus::Running), 1);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TraderStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
