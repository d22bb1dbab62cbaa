pub mod config;
pub mod history;
pub mod recalibrate;
pub mod session;

use chunkfocus_core::CoreError;

pub type CliResult = Result<(), CoreError>;

/// `mm:ss` for a countdown value.
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_pads_minutes_and_seconds() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(1200), "20:00");
    }
}
