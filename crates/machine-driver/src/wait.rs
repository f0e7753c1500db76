//! Bounded polling until the cloud reports what we are waiting for.
//!
//! The control plane is asynchronous, so every "wait for X" in the driver is
//! a fixed number of polls separated by a fixed delay. Poll errors are
//! returned immediately; only "not there yet" is retried.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{Error, Result};

/// Attempt budget and spacing for a convergence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// 200 attempts, 2 seconds apart.
    pub const DEFAULT: Self = Self {
        max_attempts: 200,
        delay: Duration::from_secs(2),
    };

    /// Approximate worst-case duration, ignoring time spent polling.
    pub fn bound(&self) -> Duration {
        self.delay * self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Pause between polls.
#[async_trait]
pub trait Sleeper: Send + Sync + 'static {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll until `accept` holds for the observed value and return that value.
///
/// There is no sleep after the last attempt. Running out of attempts yields
/// [`Error::Timeout`] naming `condition`.
pub async fn converge<T, F, Fut, A>(
    condition: &str,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut poll: F,
    accept: A,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    A: Fn(&T) -> bool,
{
    for attempt in 1..=policy.max_attempts {
        let observed = poll().await?;
        if accept(&observed) {
            debug!(condition, attempt, "condition reached");
            return Ok(observed);
        }
        if attempt < policy.max_attempts {
            sleeper.sleep(policy.delay).await;
        }
    }

    Err(Error::Timeout {
        condition: condition.to_string(),
        bound: policy.bound(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingSleeper;
    use crate::types::InstanceState;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_secs(2),
        }
    }

    /// "BUILDING" for the first three polls, "ACTIVE" afterwards.
    fn building_then_active(calls: &AtomicU32) -> impl Future<Output = Result<InstanceState>> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let raw = if n <= 3 { "BUILDING" } else { "ACTIVE" };
        async move { Ok(InstanceState::from_status(raw)) }
    }

    #[tokio::test]
    async fn succeeds_on_fourth_poll_after_three_sleeps() {
        let calls = AtomicU32::new(0);
        let sleeper = CountingSleeper::default();

        let state = converge(
            "instance to be running",
            policy(10),
            &sleeper,
            || building_then_active(&calls),
            |s| *s == InstanceState::Running,
        )
        .await
        .unwrap();

        assert_eq!(state, InstanceState::Running);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.count(), 3);
        assert_eq!(sleeper.total(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn exact_budget_is_enough() {
        let calls = AtomicU32::new(0);
        let sleeper = CountingSleeper::default();

        converge(
            "instance to be running",
            policy(4),
            &sleeper,
            || building_then_active(&calls),
            |s| *s == InstanceState::Running,
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.count(), 3);
    }

    #[tokio::test]
    async fn times_out_after_budget() {
        let calls = AtomicU32::new(0);
        let sleeper = CountingSleeper::default();

        let err = converge(
            "instance to be running",
            policy(3),
            &sleeper,
            || building_then_active(&calls),
            |s| *s == InstanceState::Running,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.is_timeout());
        match err {
            Error::Timeout { condition, bound } => {
                assert_eq!(condition, "instance to be running");
                assert_eq!(bound, Duration::from_secs(6));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn poll_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let sleeper = CountingSleeper::default();

        let err = converge(
            "instance to be running",
            policy(200),
            &sleeper,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<InstanceState, _>(Error::Ssh("connection reset".into())) }
            },
            |s| *s == InstanceState::Running,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Ssh(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sleeper.count(), 0);
    }

    #[test]
    fn default_policy_bound() {
        assert_eq!(RetryPolicy::default().bound(), Duration::from_secs(400));
    }
}
