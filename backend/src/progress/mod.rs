//! Synthetic download progress.
//!
//! The progress shown to users is not transfer telemetry: it is a fixed
//! step added on every tick of a timer, with an ETA and file size derived
//! from constants. [`SimulatorState::tick`] is the whole state machine; the
//! timer that drives it lives in [`driver`].

pub mod driver;

pub use driver::{ProgressSimulator, ProgressSink, SimulationHandle};

use crate::task::ProgressSnapshot;
use std::time::Duration;

/// Cadence and display constants for one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationProfile {
    pub tick_interval: Duration,
    /// Percent added per tick, in `1..=100`
    pub step: u8,
    pub eta_seconds_per_step: u64,
    /// `[min, max)` in megabytes
    pub size_range_mb: (u32, u32),
}

impl SimulationProfile {
    /// Ticks from 0 to 100
    pub fn ticks_to_complete(&self) -> u32 {
        100u32.div_ceil(u32::from(self.step.max(1)))
    }
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            step: 5,
            eta_seconds_per_step: 2,
            size_range_mb: (100, 600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorState {
    percent: u8,
    file_size_mb: u32,
}

impl SimulatorState {
    /// Fresh state at 0% with a size drawn from the profile's range
    pub fn start(profile: &SimulationProfile) -> Self {
        Self::with_size(synthetic_size_mb(profile.size_range_mb))
    }

    pub fn with_size(file_size_mb: u32) -> Self {
        Self {
            percent: 0,
            file_size_mb,
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100
    }

    /// Advance by one step, clamped at 100. A completed state is a fixed point.
    pub fn tick(self, profile: &SimulationProfile) -> Self {
        if self.is_complete() {
            return self;
        }
        Self {
            percent: self.percent.saturating_add(profile.step.max(1)).min(100),
            ..self
        }
    }

    /// Linear estimate: remaining steps times a constant per-step duration
    pub fn eta_seconds(&self, profile: &SimulationProfile) -> u64 {
        let remaining = u64::from(100 - self.percent.min(100));
        remaining.div_ceil(u64::from(profile.step.max(1))) * profile.eta_seconds_per_step
    }

    pub fn snapshot(&self, profile: &SimulationProfile) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent,
            estimated_time_remaining: Some(format!("{} seconds", self.eta_seconds(profile))),
            approximate_file_size: Some(format!("{}MB", self.file_size_mb)),
        }
    }
}

/// Pick a size in `[min, max)` from fresh random bits
fn synthetic_size_mb((min, max): (u32, u32)) -> u32 {
    let span = max.saturating_sub(min).max(1);
    let bits = uuid::Uuid::new_v4().as_u128();
    min + (bits % u128::from(span)) as u32
}
