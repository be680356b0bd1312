// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::time::{Duration, Instant};

pub const SECONDS_PER_MINUTE: u64 = 60;
pub const SECONDS_PER_HOUR: u64 = SECONDS_PER_MINUTE * 60;

/// A stop watch with an optional time budget.
/// Without a budget the timer never times out and only measures.
pub struct Timer {
    start_time: Option<Instant>,
    budget: Option<Duration>,
}

impl Timer {
    pub fn new(budget: Option<Duration>) -> Timer {
        Timer {
            start_time: None,
            budget,
        }
    }

    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn reset(&mut self) {
        self.start_time = None;
    }

    pub fn is_running(&self) -> bool {
        self.start_time.is_some()
    }

    /// True if the timer is running and the budget is used up.
    pub fn timed_out(&self) -> bool {
        match (self.start_time, self.budget) {
            (Some(start), Some(budget)) => start.elapsed() >= budget,
            _ => false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Formats a duration as `hh:mm:ss.mmm`.
    pub fn duration_to_str(d: Duration) -> String {
        let mut sec = d.as_secs();
        let hours = sec / SECONDS_PER_HOUR;
        sec -= hours * SECONDS_PER_HOUR;
        let minutes = sec / SECONDS_PER_MINUTE;
        sec -= minutes * SECONDS_PER_MINUTE;
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            hours,
            minutes,
            sec,
            d.subsec_millis()
        )
    }

    pub fn elapsed_str(&self) -> String {
        Self::duration_to_str(self.elapsed())
    }
}
