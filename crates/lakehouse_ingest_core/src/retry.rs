use std::time::Duration;

/// Bounded retry with exponential backoff.
///
/// The backoff starts at `initial_backoff` and doubles after every
/// attempt. A `Retryable` outcome may carry an explicit wait (e.g. a
/// server-provided `Retry-After`) that overrides the backoff for that
/// attempt without resetting the doubling sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

/// Result of a single attempt, as classified by the caller's predicate.
#[derive(Debug)]
pub enum AttemptOutcome<T, E> {
    Success(T),
    Retryable {
        error: E,
        explicit_wait: Option<Duration>,
    },
    Fatal(E),
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }

    /// Drive `attempt_fn` until it succeeds, fails fatally, or the
    /// attempt budget is exhausted; the last error is propagated.
    /// Sleeping is delegated so callers control time.
    pub fn run<T, E>(
        &self,
        mut attempt_fn: impl FnMut(u32) -> AttemptOutcome<T, E>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, E> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match attempt_fn(attempt) {
                AttemptOutcome::Success(value) => return Ok(value),
                AttemptOutcome::Fatal(error) => return Err(error),
                AttemptOutcome::Retryable {
                    error,
                    explicit_wait,
                } => {
                    if attempt >= self.max_attempts {
                        return Err(error);
                    }
                    let wait = explicit_wait
                        .filter(|wait| !wait.is_zero())
                        .unwrap_or(backoff);
                    sleep(wait);
                    backoff *= 2;
                    attempt += 1;
                }
            }
        }
    }
}
