//! Run configuration.
//!
//! Settings structs deserialize from whatever config surface the host test
//! runner uses; durations are plain milliseconds on the wire.

use std::time::Duration;

use serde::Deserialize;

/// Settings for the single-route property loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Randomized trials per (route, method).
    pub max_examples: u32,
    /// Bound on a single request.
    #[serde(with = "millis")]
    pub per_trial_timeout: Duration,
    /// Run seed; trials derive child seeds from it.
    pub seed: u64,
    /// Size hint capping drawn collection lengths.
    pub size: usize,
    /// Upper bound on shrink-candidate executions per failure.
    pub max_shrink_iters: u32,
    /// Keep the full draw tree in failure reports.
    pub keep_draw_trees: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_examples: 100,
            per_trial_timeout: Duration::from_secs(2),
            seed: 0,
            size: 100,
            max_shrink_iters: 1000,
            keep_draw_trees: false,
        }
    }
}

/// Settings for stateful (state-machine) mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatefulSettings {
    /// Steps per sequence.
    pub step_count: usize,
    /// Sequences per run.
    pub max_sequences: u32,
    /// Bundle-chain depth bound.
    pub recursion_limit: usize,
    /// Bound on a single step's request.
    #[serde(with = "millis")]
    pub per_step_timeout: Duration,
    /// Wall-time bound for the whole route group.
    #[serde(with = "millis")]
    pub total_timeout: Duration,
    pub seed: u64,
    pub size: usize,
    pub max_shrink_iters: u32,
    pub keep_draw_trees: bool,
    /// Stop the sequence at the first failing step.
    pub fail_fast: bool,
}

impl Default for StatefulSettings {
    fn default() -> Self {
        Self {
            step_count: 6,
            max_sequences: 10,
            recursion_limit: 4,
            per_step_timeout: Duration::from_secs(2),
            total_timeout: Duration::from_secs(60),
            seed: 0,
            size: 100,
            max_shrink_iters: 1000,
            keep_draw_trees: false,
            fail_fast: true,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let settings: RunSettings =
            serde_json::from_str(r#"{"max_examples": 5, "per_trial_timeout": 250}"#).unwrap();
        assert_eq!(settings.max_examples, 5);
        assert_eq!(settings.per_trial_timeout, Duration::from_millis(250));
        assert_eq!(settings.size, 100);
    }

    #[test]
    fn stateful_defaults_are_sane() {
        let settings = StatefulSettings::default();
        assert!(settings.step_count > 0);
        assert!(settings.fail_fast);
    }
}
