// src/poll.rs - Fixed-interval polling with a deadline
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("Condition not met after {polls} polls ({waited:?})")]
    TimedOut { polls: usize, waited: Duration },
    #[error(transparent)]
    Source(E),
}

/// Outcome of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polled {
    /// Number of predicate evaluations, including the one that succeeded.
    pub polls: usize,
    pub waited: Duration,
}

/// Repeatedly evaluates a condition, sleeping `interval` between attempts,
/// until it holds or `timeout` has elapsed.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// The condition is always evaluated at least once, even with a zero timeout.
    pub async fn until<E>(
        &self,
        mut ready: impl AsyncFnMut() -> Result<bool, E>,
    ) -> Result<Polled, PollError<E>> {
        let started = Instant::now();
        let mut polls = 0;
        loop {
            polls += 1;
            if ready().await.map_err(PollError::Source)? {
                return Ok(Polled { polls, waited: started.elapsed() });
            }
            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(PollError::TimedOut { polls, waited });
            }
            sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_until_succeeds_on_third_poll() {
        let poller = Poller::new(Duration::from_millis(100), Duration::from_secs(5));
        let mut calls = 0;
        let polled = poller
            .until(async || {
                calls += 1;
                Ok::<_, ()>(calls == 3)
            })
            .await
            .unwrap();
        assert_eq!(polled.polls, 3);
        assert!(polled.waited >= Duration::from_millis(200));
        assert!(polled.waited < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_times_out() {
        let poller = Poller::new(Duration::from_millis(100), Duration::from_millis(450));
        let err = poller.until(async || Ok::<_, ()>(false)).await.unwrap_err();
        match err {
            PollError::TimedOut { polls, waited } => {
                assert_eq!(polls, 6);
                assert!(waited >= Duration::from_millis(450));
            }
            PollError::Source(_) => panic!("unexpected source error"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_stops_polling() {
        let poller = Poller::new(Duration::from_millis(10), Duration::from_secs(1));
        let err = poller.until(async || Err::<bool, _>("link down")).await.unwrap_err();
        assert!(matches!(err, PollError::Source("link down")));
    }
}
