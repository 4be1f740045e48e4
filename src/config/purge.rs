//! Physical purge configuration.
//!
//! Controls how soft-deleted documents are permanently removed once their
//! retention window has elapsed.
//!
//! # Example
//!
//! ```toml
//! [purge]
//! retention_days = 7
//! batch_size = 1000
//! max_retries = 3
//! dry_run = false
//!
//! [purge.retry]
//! initial_delay_ms = 500
//! max_delay_ms = 10000
//!
//! [purge.schedule]
//! enabled = true
//! interval_hours = 24
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Largest accepted batch. Each id in a batch becomes a bound parameter in
/// the delete statement.
pub const MAX_BATCH_SIZE: u32 = 10_000;

/// Largest accepted `max_retries`. A batch that keeps failing holds the run
/// guard for every attempt.
pub const MAX_RETRIES: u32 = 10;

/// Purge configuration.
///
/// Immutable for the duration of one run; request and CLI overrides produce
/// a fresh copy via [`PurgeConfig::with_overrides`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeConfig {
    /// Days a soft-deleted document is kept before it becomes eligible.
    /// Default: 7
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Records fetched and deleted per batch.
    /// Default: 1000
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Extra attempts for a failed batch before it is recorded as an error.
    /// 0 means every batch is attempted exactly once.
    /// Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Count and page eligible records without deleting anything.
    #[serde(default)]
    pub dry_run: bool,

    /// Backoff between batch retries.
    #[serde(default)]
    pub retry: PurgeRetryConfig,

    /// In-process scheduler.
    #[serde(default)]
    pub schedule: PurgeScheduleConfig,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            dry_run: false,
            retry: PurgeRetryConfig::default(),
            schedule: PurgeScheduleConfig::default(),
        }
    }
}

fn default_retention_days() -> u32 {
    7
}

fn default_batch_size() -> u32 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

impl PurgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("purge.batch_size must be greater than 0".into());
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "purge.batch_size must not exceed {MAX_BATCH_SIZE}"
            ));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(format!("purge.max_retries must not exceed {MAX_RETRIES}"));
        }
        self.retry.validate()?;
        self.schedule.validate()?;
        Ok(())
    }

    /// Apply per-run overrides on top of this configuration.
    pub fn with_overrides(&self, overrides: &PurgeOverrides) -> Self {
        let mut config = self.clone();
        if let Some(days) = overrides.retention_days {
            config.retention_days = days;
        }
        if let Some(size) = overrides.batch_size {
            config.batch_size = size;
        }
        if let Some(retries) = overrides.max_retries {
            config.max_retries = retries;
        }
        if let Some(dry_run) = overrides.dry_run {
            config.dry_run = dry_run;
        }
        config
    }

    /// Total attempts per batch.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Per-run overrides, accepted from the trigger endpoint and the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeOverrides {
    #[serde(default)]
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

/// Exponential backoff between attempts of the same batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeRetryConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random spread as a fraction of the delay (0.1 = ±10%).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for PurgeRetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl PurgeRetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.backoff_multiplier < 1.0 {
            return Err("purge.retry.backoff_multiplier must be at least 1.0".into());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("purge.retry.jitter must be between 0.0 and 1.0".into());
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-based), capped and jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((capped_delay + jitter).max(0.0) as u64)
    }
}

/// In-process scheduling of purge runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeScheduleConfig {
    /// Run the purge from inside the server on a fixed interval.
    /// Default: false (an external scheduler calls `POST /purge`)
    #[serde(default)]
    pub enabled: bool,

    /// Hours between scheduled runs.
    /// Default: 24
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
}

impl Default for PurgeScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

impl PurgeScheduleConfig {
    fn validate(&self) -> Result<(), String> {
        if self.enabled && self.interval_hours == 0 {
            return Err("purge.schedule.interval_hours must be greater than 0".into());
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = PurgeConfig::default();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.max_retries, 3);
        assert!(!config.dry_run);
        assert!(!config.schedule.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_section() {
        let config: PurgeConfig = toml::from_str("").unwrap();
        assert_eq!(config, PurgeConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config: PurgeConfig = toml::from_str(
            r#"
            retention_days = 30
            batch_size = 250
            max_retries = 0
            dry_run = true

            [retry]
            initial_delay_ms = 100
            max_delay_ms = 1000
            backoff_multiplier = 3.0
            jitter = 0.0

            [schedule]
            enabled = true
            interval_hours = 6
        "#,
        )
        .unwrap();

        assert_eq!(config.retention_days, 30);
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.max_attempts(), 1);
        assert!(config.dry_run);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.schedule.interval(), Duration::from_secs(6 * 3600));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<PurgeConfig, _> = toml::from_str("retention = 7");
        assert!(result.is_err());
    }

    #[rstest]
    #[case::zero_batch(PurgeConfig { batch_size: 0, ..Default::default() })]
    #[case::oversized_batch(PurgeConfig { batch_size: MAX_BATCH_SIZE + 1, ..Default::default() })]
    #[case::too_many_retries(PurgeConfig { max_retries: MAX_RETRIES + 1, ..Default::default() })]
    #[case::unbounded_retries(PurgeConfig { max_retries: u32::MAX, ..Default::default() })]
    #[case::shrinking_backoff(PurgeConfig {
        retry: PurgeRetryConfig { backoff_multiplier: 0.5, ..Default::default() },
        ..Default::default()
    })]
    #[case::jitter_out_of_range(PurgeConfig {
        retry: PurgeRetryConfig { jitter: 1.5, ..Default::default() },
        ..Default::default()
    })]
    #[case::zero_interval(PurgeConfig {
        schedule: PurgeScheduleConfig { enabled: true, interval_hours: 0 },
        ..Default::default()
    })]
    fn test_invalid_configs(#[case] config: PurgeConfig) {
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_cap_is_inclusive() {
        let config = PurgeConfig {
            max_retries: MAX_RETRIES,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_interval_saturates() {
        let schedule = PurgeScheduleConfig {
            enabled: true,
            interval_hours: u64::MAX,
        };
        assert_eq!(schedule.interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_zero_interval_allowed_when_disabled() {
        let config = PurgeConfig {
            schedule: PurgeScheduleConfig {
                enabled: false,
                interval_hours: 0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let base = PurgeConfig::default();
        let config = base.with_overrides(&PurgeOverrides {
            retention_days: Some(0),
            dry_run: Some(true),
            ..Default::default()
        });

        assert_eq!(config.retention_days, 0);
        assert!(config.dry_run);
        assert_eq!(config.batch_size, base.batch_size);
        assert_eq!(config.max_retries, base.max_retries);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let retry = PurgeRetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 500,
            backoff_multiplier: 2.0,
            jitter: 0.0,
        };

        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_jitter_stays_in_range() {
        let retry = PurgeRetryConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: 0.1,
        };

        for _ in 0..50 {
            let delay = retry.delay_for_attempt(0).as_millis();
            assert!((900..=1100).contains(&delay), "delay {delay} out of range");
        }
    }
}
