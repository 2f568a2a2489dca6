//! The simulation clock.
//!
//! CEAM time is date-based: the clock starts at a configured date and moves
//! forward in fixed steps of whole days. Cost accounting and follow-up
//! scheduling in the reference modules work in calendar terms (yearly cost
//! buckets, "come back in six months"), so the clock exposes dates rather
//! than abstract tick counts.

use chrono::{Duration, NaiveDate};

use crate::config::ConfigTree;
use crate::error::{Error, Result};

/// Date-based simulation clock advancing in fixed day-sized steps.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    start: NaiveDate,
    end: NaiveDate,
    step_size_days: i64,
    time: NaiveDate,
}

impl SimulationClock {
    /// Build a clock from `time.start`, `time.end` and `time.step_size`
    /// (days) in the configuration.
    pub fn from_config(config: &ConfigTree) -> Result<Self> {
        let start = parse_date(config.get_str("time.start")?)?;
        let end = parse_date(config.get_str("time.end")?)?;
        let step_size = config.get_u64("time.step_size")?;
        if step_size == 0 {
            return Err(Error::ComponentConfig(
                "time.step_size must be at least one day".to_string(),
            ));
        }
        let step_size_days = i64::try_from(step_size).map_err(|_| {
            Error::ComponentConfig(format!("time.step_size {step_size} days is too large"))
        })?;
        if end < start {
            return Err(Error::ComponentConfig(format!(
                "time.end {end} precedes time.start {start}"
            )));
        }
        Ok(Self {
            start,
            end,
            step_size_days,
            time: start,
        })
    }

    /// The current simulation date.
    pub fn time(&self) -> NaiveDate {
        self.time
    }

    /// The configured start date.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// The configured end date.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// The step size in whole days.
    pub fn step_size_days(&self) -> i64 {
        self.step_size_days
    }

    /// Number of steps a full run will execute.
    pub fn step_count(&self) -> u64 {
        let total_days = (self.end - self.start).num_days();
        (total_days.max(0) as u64).div_ceil(self.step_size_days as u64)
    }

    /// Whether the clock has reached or passed the end date.
    pub fn is_finished(&self) -> bool {
        self.time >= self.end
    }

    /// Advance one step.
    pub fn step_forward(&mut self) {
        self.time += Duration::days(self.step_size_days);
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::ComponentConfig(format!("invalid date '{s}': {e}")))
}
