use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::PageError;

/// Fixed-duration suspension used between requests and after failures.
pub trait Pause: Sync {
    fn pause(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

pub struct TokioPause;

impl Pause for TokioPause {
    fn pause(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Per-page attempt states.
///
/// `Attempting(n) -> Success | Retrying(n) -> Attempting(n + 1) | Exhausted`
#[derive(Debug)]
pub enum AttemptState<T> {
    Attempting(u32),
    Retrying { attempt: u32, error: PageError },
    Success(T),
    Exhausted(PageError),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    max_attempts: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn start<T>(&self) -> AttemptState<T> {
        AttemptState::Attempting(1)
    }

    pub fn remaining_after(&self, attempt: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt)
    }

    /// Transition out of `Attempting(attempt)` given that attempt's outcome.
    pub fn after_attempt<T>(
        &self,
        attempt: u32,
        outcome: Result<T, PageError>,
    ) -> AttemptState<T> {
        match outcome {
            Ok(value) => AttemptState::Success(value),
            Err(error) if attempt < self.max_attempts => AttemptState::Retrying { attempt, error },
            Err(error) => AttemptState::Exhausted(error),
        }
    }
}
