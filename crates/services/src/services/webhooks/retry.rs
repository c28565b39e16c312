//! Retry policy for webhook deliveries.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::services::config::WebhookConfig;

/// Exponential backoff: `base * 2^(attempts - 1)`, capped at `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before a delivery is given up on
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&WebhookConfig::default())
    }
}

impl From<&WebhookConfig> for RetryPolicy {
    fn from(config: &WebhookConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }
}

/// Result of a single HTTP attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx response
    Success,
    /// Non-2xx response or transport error
    Failure,
}

/// What to do with a delivery after an attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Delivered,
    Retry { at: DateTime<Utc> },
    Failed,
}

impl RetryPolicy {
    /// Delay after the `attempts`-th failed attempt (1-based).
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Decide the next state given the number of attempts made so far
    /// (the one just finished included).
    pub fn next_transition(
        &self,
        attempts: u32,
        outcome: AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Transition {
        match outcome {
            AttemptOutcome::Success => Transition::Delivered,
            AttemptOutcome::Failure if self.should_retry(attempts) => {
                let delay = chrono::Duration::from_std(self.delay_for(attempts))
                    .unwrap_or(chrono::Duration::MAX);
                Transition::Retry {
                    at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
                }
            }
            AttemptOutcome::Failure => Transition::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(600),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for(3), Duration::from_secs(240));
        assert_eq!(policy.delay_for(4), Duration::from_secs(480));
        assert_eq!(policy.delay_for(5), Duration::from_secs(600));
        assert_eq!(policy.delay_for(60), Duration::from_secs(600));
    }

    #[test]
    fn test_transitions() {
        let policy = policy();
        let now = Utc::now();

        assert_eq!(
            policy.next_transition(1, AttemptOutcome::Success, now),
            Transition::Delivered
        );
        assert_eq!(
            policy.next_transition(2, AttemptOutcome::Failure, now),
            Transition::Retry {
                at: now + chrono::Duration::seconds(120)
            }
        );
        assert_eq!(
            policy.next_transition(5, AttemptOutcome::Failure, now),
            Transition::Failed
        );
    }

    #[test]
    fn test_defaults_follow_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(60));
        assert_eq!(policy.max_delay, Duration::from_secs(3600));
    }
}
