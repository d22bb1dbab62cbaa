use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase shared by the focus session and recalibration controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    None,
    Idle,
    Running,
    Paused,
    Finished,
}

impl Phase {
    /// True while a countdown is either ticking or frozen by the user.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Running | Phase::Paused)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::None => "none",
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Paused => "paused",
            Phase::Finished => "finished",
        };
        f.write_str(s)
    }
}
