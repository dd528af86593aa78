use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Displayed percent the settling phase starts from.
pub const SETTLE_START_PERCENT: u8 = 80;
/// Interval between settling increments.
pub const SETTLE_INTERVAL: Duration = Duration::from_secs(2);
pub const SETTLE_LABEL: &str = "Preparing playback...";
/// Bounded wait applied when cancelling a worker.
pub const CANCEL_WAIT: Duration = Duration::from_secs(1);
/// Number of console lines retained for display.
pub const CONSOLE_LOG_LIMIT: usize = 200;

/// Phase a classified progress percentage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Model file download, 0..=25 on the UI scale.
    Fetching,
    /// Token sampling, 25..=85 on the UI scale.
    Sampling,
    /// Any other recognized bar; shown unmapped.
    Other,
}

/// Map a raw phase percentage onto the single UI scale.
pub fn remap(phase: Phase, raw: u8) -> u8 {
    let raw = u32::from(raw.min(100));
    let ui = match phase {
        Phase::Fetching => raw / 4,
        Phase::Sampling => 25 + raw * 3 / 5,
        Phase::Other => raw,
    };
    ui as u8
}

/// How incoming progress values are arbitrated against the displayed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPolicy {
    /// Whichever event arrives last is displayed, even if it is lower.
    #[default]
    LastWriteWins,
    /// The displayed value never decreases within one request.
    Monotonic,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressState {
    pub percent: u8,
    pub label: String,
}

impl ProgressState {
    pub fn new(percent: u8, label: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            label: label.into(),
        }
    }

    pub fn apply(&mut self, policy: ProgressPolicy, percent: u8, label: impl Into<String>) {
        let percent = percent.min(100);
        match policy {
            ProgressPolicy::LastWriteWins => self.percent = percent,
            ProgressPolicy::Monotonic => self.percent = self.percent.max(percent),
        }
        self.label = label.into();
    }

    /// Enter the settling phase and return the starting percent.
    pub(crate) fn begin_settling(&mut self, policy: ProgressPolicy) -> u8 {
        self.percent = match policy {
            ProgressPolicy::LastWriteWins => SETTLE_START_PERCENT,
            ProgressPolicy::Monotonic => self.percent.max(SETTLE_START_PERCENT),
        };
        self.label = SETTLE_LABEL.to_string();
        self.percent
    }

    /// Advance one settling step; returns `true` once 100 has been reached.
    pub(crate) fn settle_step(&mut self) -> bool {
        if self.percent < 100 {
            self.percent += 1;
            self.label = SETTLE_LABEL.to_string();
        }
        self.percent >= 100
    }
}
