//! Per-node virtual clock.

use lockstep_core::{parse_clock_period_ps, ConfigError};

/// Maps a node's cycles to simulated time.
///
/// Cycle `c` fires at `c * period_ps`; the first cycle is 1, so no tick
/// ever runs at time zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    period_ps: u64,
}

impl SimClock {
    pub fn new(period_ps: u64) -> Self {
        Self {
            period_ps: period_ps.max(1),
        }
    }

    /// Creates a clock from a frequency string such as "1GHz".
    pub fn from_frequency(freq: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_clock_period_ps(freq)?))
    }

    pub fn period_ps(&self) -> u64 {
        self.period_ps
    }

    /// Simulated time at which `cycle` fires.
    pub fn tick_time_ps(&self, cycle: u64) -> u64 {
        cycle.saturating_mul(self.period_ps)
    }

    /// Last cycle that has fired at or before `time_ps`.
    pub fn cycle_at(&self, time_ps: u64) -> u64 {
        time_ps / self.period_ps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_times() {
        let clock = SimClock::from_frequency("1GHz").unwrap();
        assert_eq!(clock.period_ps(), 1000);
        assert_eq!(clock.tick_time_ps(1), 1000);
        assert_eq!(clock.tick_time_ps(500), 500_000);
        assert_eq!(clock.cycle_at(500_999), 500);
    }

    #[test]
    fn test_mixed_frequencies() {
        let fast = SimClock::from_frequency("2GHz").unwrap();
        let slow = SimClock::from_frequency("500MHz").unwrap();

        // Four fast cycles per slow cycle
        assert_eq!(fast.tick_time_ps(4), slow.tick_time_ps(1));
    }

    #[test]
    fn test_bad_frequency() {
        assert!(SimClock::from_frequency("warp 9").is_err());
    }
}
