//! Run configuration for the draft/review pipeline.

use std::time::Duration;

/// Task prompt used when none is supplied. Carries a deliberate bug so the
/// reviewer stage has something to fix.
pub const DEFAULT_TASK: &str = "Write a Python script that asks for a name and prints 'Hello'. \
     INTENTIONAL BUG: Use 'pritn' instead of 'print'.";

pub const DEFAULT_DRAFTER_URL: &str = "http://127.0.0.1:8081/v1/chat/completions";
pub const DEFAULT_REVIEWER_URL: &str = "http://127.0.0.1:8080/completion";

/// Immutable settings handed to [`run`](crate::pipeline::run) at startup.
///
/// One instance covers a whole pipeline run; nothing here changes once the
/// first request goes out.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat-completion endpoint of the drafter model.
    pub drafter_url: String,
    /// Completion endpoint of the reviewer model.
    pub reviewer_url: String,
    /// Wall-clock budget for each whole request, not renewed per chunk.
    /// Generous because large models take a while to wake up.
    pub timeout: Duration,
    /// Task prompt handed to the drafter.
    pub task: String,
    /// Drafter token budget.
    pub drafter_max_tokens: u32,
    /// Drafter sampling temperature.
    pub drafter_temperature: f32,
    /// Reviewer token budget (`n_predict` on the wire).
    pub reviewer_n_predict: u32,
    /// Reviewer sampling temperature.
    pub reviewer_temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drafter_url: DEFAULT_DRAFTER_URL.into(),
            reviewer_url: DEFAULT_REVIEWER_URL.into(),
            timeout: Duration::from_secs(120),
            task: DEFAULT_TASK.into(),
            drafter_max_tokens: 1000,
            drafter_temperature: 0.1,
            reviewer_n_predict: 500,
            reviewer_temperature: 0.0,
        }
    }
}
