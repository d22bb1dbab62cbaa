mod engine;
mod wall;

pub use engine::{ClockEngine, ClockSafetySnapshot, ClockState, TickHandler, MAX_COUNTDOWN_SECS};
pub use wall::{ManualClock, SystemClock, WallClock};
