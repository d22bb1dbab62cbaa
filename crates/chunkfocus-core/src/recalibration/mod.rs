//! Short breathing and balancing exercises offered after a full session.

mod cadence;
mod controller;

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

pub use cadence::{
    side_index_at, BreathPhase, BreathingCadence, BREATH_CUE, COMPLETION_CUE, SIDE_SWITCH_CUE,
};
pub use controller::{RecalibrationController, RecalibrationView};

/// Allowed length of a recalibration, in whole minutes.
pub const MINUTES_RANGE: RangeInclusive<u32> = 1..=4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecalibrationMode {
    Breathing,
    Balancing,
}

impl RecalibrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecalibrationMode::Breathing => "breathing",
            RecalibrationMode::Balancing => "balancing",
        }
    }
}

impl std::fmt::Display for RecalibrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecalibrationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breathing" => Ok(RecalibrationMode::Breathing),
            "balancing" => Ok(RecalibrationMode::Balancing),
            other => Err(format!("unknown recalibration mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalibrationSettings {
    pub breathing_minutes: u32,
    pub balancing_minutes: u32,
    pub cadence: BreathingCadence,
}

impl Default for RecalibrationSettings {
    fn default() -> Self {
        Self {
            breathing_minutes: 2,
            balancing_minutes: 2,
            cadence: BreathingCadence::default(),
        }
    }
}
