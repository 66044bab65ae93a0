//! Bounded notification worker.
//!
//! The capture loop hands matched names to a dedicated thread through a
//! bounded queue and collects outcomes without blocking. Each submission is
//! attempted at most once: a full queue drops it, and so does shutdown if the
//! request has not started yet.

use crate::notifier::{AttendanceNotifier, AttendanceStatus};
use crate::transport::Transport;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
    #[error("failed to spawn notifier thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct NotifyRequest {
    name: String,
    date_time_in: String,
}

/// Final status of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub name: String,
    pub status: AttendanceStatus,
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The same name is already queued or in flight.
    Pending,
    /// The same name completed less than the cooldown ago.
    CoolingDown,
    /// The queue was full or the worker has gone away.
    Dropped,
}

/// Owner-side handle to the notifier thread. Not shared; the loop that
/// submits is the loop that polls.
pub struct NotifierHandle {
    tx: Option<mpsc::Sender<NotifyRequest>>,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
    pending: HashSet<String>,
    completed: HashMap<String, Instant>,
    cooldown: Duration,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Spawn the notifier on a dedicated OS thread.
pub fn spawn_notifier<T>(
    notifier: AttendanceNotifier<T>,
    capacity: usize,
    cooldown: Duration,
) -> Result<NotifierHandle, WorkerError>
where
    T: Transport + Send + 'static,
{
    if capacity == 0 {
        return Err(WorkerError::ZeroCapacity);
    }

    let (tx, mut rx) = mpsc::channel::<NotifyRequest>(capacity);
    let (outcome_tx, outcomes) = mpsc::unbounded_channel::<Outcome>();
    let stopping = Arc::new(AtomicBool::new(false));
    let worker_stopping = stopping.clone();

    let thread = std::thread::Builder::new()
        .name("rollcall-notify".into())
        .spawn(move || {
            tracing::info!("notifier thread started");
            while let Some(req) = rx.blocking_recv() {
                if worker_stopping.load(Ordering::SeqCst) {
                    rx.close();
                    let mut discarded = 1;
                    while rx.try_recv().is_ok() {
                        discarded += 1;
                    }
                    tracing::info!(discarded, "shutting down, queued attendance discarded");
                    break;
                }
                let status = notifier.notify(&req.name, &req.date_time_in);
                if outcome_tx.send(Outcome { name: req.name, status }).is_err() {
                    break;
                }
            }
            tracing::info!("notifier thread exiting");
        })?;

    Ok(NotifierHandle {
        tx: Some(tx),
        outcomes,
        pending: HashSet::new(),
        completed: HashMap::new(),
        cooldown,
        stopping,
        thread: Some(thread),
    })
}

impl NotifierHandle {
    /// Queue an attendance attempt for `name` without blocking.
    pub fn submit(&mut self, name: &str, date_time_in: String) -> Submission {
        if self.pending.contains(name) {
            return Submission::Pending;
        }
        if let Some(done) = self.completed.get(name) {
            if done.elapsed() < self.cooldown {
                return Submission::CoolingDown;
            }
        }

        let Some(tx) = self.tx.as_ref() else {
            return Submission::Dropped;
        };
        let req = NotifyRequest {
            name: name.to_string(),
            date_time_in,
        };
        match tx.try_send(req) {
            Ok(()) => {
                self.pending.insert(name.to_string());
                tracing::debug!(name, "attendance queued");
                Submission::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(name, "notification queue full, attendance dropped");
                Submission::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(name, "notifier thread gone, attendance dropped");
                Submission::Dropped
            }
        }
    }

    /// Drain finished outcomes without blocking.
    pub fn poll(&mut self) -> Vec<Outcome> {
        let mut done = Vec::new();
        while let Ok(outcome) = self.outcomes.try_recv() {
            self.complete(&outcome);
            done.push(outcome);
        }
        done
    }

    /// Block until the next outcome arrives. `None` once the worker has exited
    /// and every outcome has been drained.
    pub fn wait(&mut self) -> Option<Outcome> {
        let outcome = self.outcomes.blocking_recv()?;
        self.complete(&outcome);
        Some(outcome)
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains(name)
    }

    /// Stop accepting work, discard requests that have not started, wait for
    /// the one in flight (if any), and return the outcomes not yet polled.
    pub fn shutdown(mut self) -> Vec<Outcome> {
        self.stopping.store(true, Ordering::SeqCst);
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("notifier thread panicked");
            }
        }
        self.poll()
    }

    fn complete(&mut self, outcome: &Outcome) {
        self.pending.remove(&outcome.name);
        self.completed.insert(outcome.name.clone(), Instant::now());
    }
}
