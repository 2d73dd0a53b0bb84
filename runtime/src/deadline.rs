//! Caller-imposed deadlines.
//!
//! A [`Deadline`] bounds a whole engine operation: waiting for row locks,
//! storage round trips and the commit. When it elapses the in-flight future is
//! dropped, which drops the open transaction handle and rolls it back. Nothing
//! is committed.

use holdfast_core::{ReservationError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Point in time by which an operation must finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No deadline; the operation may wait indefinitely.
    #[must_use]
    pub const fn none() -> Self {
        Self { at: None }
    }

    /// Deadline `timeout` from now.
    ///
    /// A timeout too large to represent is treated as no deadline.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// Deadline at a fixed instant.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    /// Time left, or `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has already passed.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Drive `operation` to completion unless the deadline elapses first.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::DeadlineExceeded`] if the deadline passes
    /// before `operation` completes; otherwise whatever `operation` returns.
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.at {
            None => operation.await,
            Some(at) => tokio::time::timeout_at(at, operation)
                .await
                .map_err(|_| ReservationError::DeadlineExceeded)?,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
