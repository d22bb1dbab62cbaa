use serde::{Deserialize, Serialize};

use crate::collaborators::Pulse;

/// Cue at every breathing phase boundary.
pub const BREATH_CUE: &[Pulse] = &[Pulse::Short];
/// Cue when balancing switches sides.
pub const SIDE_SWITCH_CUE: &[Pulse] = &[Pulse::Short, Pulse::Short, Pulse::Short];
/// Cue when a recalibration runs to completion.
pub const COMPLETION_CUE: &[Pulse] = &[Pulse::Long, Pulse::Long, Pulse::Short];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreathPhase {
    Inhale,
    HoldIn,
    Exhale,
    HoldOut,
}

impl BreathPhase {
    pub const ALL: [BreathPhase; 4] = [
        BreathPhase::Inhale,
        BreathPhase::HoldIn,
        BreathPhase::Exhale,
        BreathPhase::HoldOut,
    ];
}

/// Seconds spent in each step of the four-phase breathing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreathingCadence {
    pub inhale_secs: u64,
    pub hold_in_secs: u64,
    pub exhale_secs: u64,
    pub hold_out_secs: u64,
}

impl Default for BreathingCadence {
    fn default() -> Self {
        Self {
            inhale_secs: 4,
            hold_in_secs: 4,
            exhale_secs: 4,
            hold_out_secs: 4,
        }
    }
}

impl BreathingCadence {
    fn durations(&self) -> [u64; 4] {
        [
            self.inhale_secs,
            self.hold_in_secs,
            self.exhale_secs,
            self.hold_out_secs,
        ]
    }

    pub fn cycle_secs(&self) -> u64 {
        self.durations().iter().sum()
    }

    /// Index into [`BreathPhase::ALL`] after `elapsed` seconds.
    ///
    /// Zero-length steps are skipped; an all-zero cadence stays on inhale.
    pub fn phase_index_at(&self, elapsed: u64) -> usize {
        let cycle = self.cycle_secs();
        if cycle == 0 {
            return 0;
        }
        let mut pos = elapsed % cycle;
        for (i, len) in self.durations().into_iter().enumerate() {
            if pos < len {
                return i;
            }
            pos -= len;
        }
        0
    }
}

/// Balancing side after `elapsed` seconds: flips every whole minute.
pub fn side_index_at(elapsed: u64) -> u8 {
    ((elapsed / 60) % 2) as u8
}
