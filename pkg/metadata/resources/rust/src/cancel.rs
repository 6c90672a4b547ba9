// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Result of a single timed wait on a [`CancellationToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The wait returned without the token being cancelled. This includes
    /// early wakeups, so callers measuring a deadline must check elapsed time.
    TimedOut,
    Cancelled,
}

/// One-shot cancellation signal shared between a controller and one worker thread.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases every waiter. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        let mut cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for at most `timeout`, returning early if the token is cancelled.
    ///
    /// This is a single wait on the underlying condition variable: it may
    /// return `TimedOut` before `timeout` has elapsed.
    pub fn wait_or_timeout(&self, timeout: Duration) -> WaitOutcome {
        let cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        if *cancelled {
            return WaitOutcome::Cancelled;
        }
        let (cancelled, _) = self
            .condvar
            .wait_timeout(cancelled, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        if *cancelled {
            WaitOutcome::Cancelled
        } else {
            WaitOutcome::TimedOut
        }
    }

    /// Wakes waiters without cancelling, the same way a spurious wakeup would.
    #[cfg(test)]
    pub(crate) fn wake(&self) {
        let _guard = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        self.condvar.notify_all();
    }
}
