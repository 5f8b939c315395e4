use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Stopped,
    WillStart,
    Started,
}

/// Optional per-round countdown. The host replicates the configuration;
/// the live countdown itself runs locally on each device, and expiry ends
/// the round the same way the manual action does.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoundTimer {
    pub enabled: bool,
    pub duration_minutes: u32,
    pub state: TimerState,
}

impl Default for RoundTimer {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_minutes: 2,
            state: TimerState::Stopped,
        }
    }
}

impl RoundTimer {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_minutes) * 60)
    }

    pub fn invalidate(&mut self) {
        self.state = TimerState::Stopped;
    }
}
