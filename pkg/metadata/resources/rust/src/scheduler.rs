// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::cancel::{CancellationToken, WaitOutcome};
use crate::errors::{Error, Result};
use crate::query::MetadataQuery;
use crate::store::MetadataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, never started.
    Idle,
    /// Poll thread is ticking.
    Running,
    /// `stop()` was called; the poll thread exits after its current tick.
    StopRequested,
    /// Poll thread has exited.
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::StopRequested => write!(f, "stop requested"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Runs a [`MetadataQuery`] on a dedicated thread every `period` and pushes
/// the resulting records into a [`MetadataStore`].
pub struct PollingScheduler {
    period: Duration,
    store: Arc<dyn MetadataStore>,
    query: Arc<dyn MetadataQuery>,
    state: Arc<Mutex<SchedulerState>>,
    token: Option<Arc<CancellationToken>>,
    worker: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    pub fn new<Q>(period: Duration, store: Arc<dyn MetadataStore>, query: Q) -> Result<Self>
    where
        Q: MetadataQuery + 'static,
    {
        if period.is_zero() {
            return Err(Error::InvalidPeriod(period));
        }
        Ok(Self {
            period,
            store,
            query: Arc::new(query),
            state: Arc::new(Mutex::new(SchedulerState::Idle)),
            token: None,
            worker: None,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the poll thread. The first tick happens one `period` from now.
    pub fn start(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(
            *state,
            SchedulerState::Running | SchedulerState::StopRequested
        ) {
            warn!("cannot start metadata polling: scheduler is {}", *state);
            return Err(Error::AlreadyRunning);
        }

        // A previous run has already exited; reap it before starting over.
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("previous polling thread panicked");
        }

        let token = Arc::new(CancellationToken::new());
        let worker = {
            let period = self.period;
            let token = Arc::clone(&token);
            let store = Arc::clone(&self.store);
            let query = Arc::clone(&self.query);
            let state = Arc::clone(&self.state);
            thread::Builder::new()
                .name("metadata-poller".to_string())
                .spawn(move || {
                    poll_for_metadata(period, &token, store.as_ref(), query.as_ref());
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    info!("metadata polling {} -> {}", *state, SchedulerState::Stopped);
                    *state = SchedulerState::Stopped;
                })
                .map_err(Error::ThreadSpawn)?
        };

        self.token = Some(token);
        self.worker = Some(worker);
        info!(
            "metadata polling {} -> {} with period {:?}",
            *state,
            SchedulerState::Running,
            self.period
        );
        *state = SchedulerState::Running;
        Ok(())
    }

    /// Asks the poll thread to exit after its current tick. Does not block.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            SchedulerState::Running => {
                info!(
                    "metadata polling {} -> {}",
                    *state,
                    SchedulerState::StopRequested
                );
                *state = SchedulerState::StopRequested;
            }
            SchedulerState::StopRequested => {}
            SchedulerState::Idle | SchedulerState::Stopped => {
                warn!("cannot stop metadata polling: scheduler is {}", *state);
                return Err(Error::NotRunning);
            }
        }
        if let Some(token) = &self.token {
            token.cancel();
        }
        Ok(())
    }

    /// Blocks until the poll thread has exited. Returns immediately if it was
    /// never started or was already joined.
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("polling thread panicked");
        }
    }

    #[cfg(test)]
    pub(crate) fn token(&self) -> Option<Arc<CancellationToken>> {
        self.token.clone()
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        if let Some(token) = &self.token
            && !token.is_cancelled()
        {
            warn!("metadata scheduler dropped while {}, stopping it", self.state());
            token.cancel();
        }
        self.join();
    }
}

fn poll_for_metadata(
    period: Duration,
    token: &CancellationToken,
    store: &dyn MetadataStore,
    query: &dyn MetadataQuery,
) {
    debug!("polling thread started");
    let mut start = Instant::now();
    loop {
        let remaining = period.saturating_sub(start.elapsed());
        match token.wait_or_timeout(remaining) {
            WaitOutcome::Cancelled => break,
            WaitOutcome::TimedOut => {
                let elapsed = start.elapsed();
                if elapsed < period {
                    debug!("spurious wakeup after {elapsed:?}, waiting again");
                    continue;
                }
                debug!("poll timer fired after {elapsed:?}");
                start = Instant::now();
                run_tick(store, query);
            }
        }
    }
    info!("metadata polling stopped");
}

fn run_tick(store: &dyn MetadataStore, query: &dyn MetadataQuery) {
    let records = match query.query() {
        Ok(records) => records,
        Err(e) => {
            error!("metadata query failed, skipping this cycle: {e}");
            return;
        }
    };
    debug!("metadata query returned {} records", records.len());
    for record in records {
        store.update_resource(record.id, record.resource, record.payload);
    }
}
