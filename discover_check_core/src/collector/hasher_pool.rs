//! Background hashing threads fed over bounded channels
//!
//! Jobs go out on a bounded channel so the driving pass cannot run arbitrarily
//! far ahead of the hashers; results come back unordered and are reordered by
//! the caller. Every worker also watches the shutdown signal and exits as soon
//! as it closes, without picking up further jobs. A worker that panics leaves
//! a notice on the result channel so the caller fails instead of waiting on a
//! result that will never arrive.

use crate::workers::{ShutdownSignal, WorkerGroup};
use crate::{Error, Result, error::InternalError};
use crossbeam_channel::{Receiver, Sender, select};
use log::trace;
use std::sync::Arc;
use std::thread;

/// Queue depth per worker
const JOBS_PER_WORKER: usize = 2;

/// A finished job, or the index of the worker that panicked on one
type Outcome<R> = std::result::Result<R, usize>;

pub struct HasherPool<J, R> {
    jobs: Option<Sender<J>>,
    results: Receiver<Outcome<R>>,
    workers: usize,
}

/// Sends the worker's index on the result channel if its thread unwinds
struct PanicNotice<R> {
    index: usize,
    results: Sender<Outcome<R>>,
}

impl<R> Drop for PanicNotice<R> {
    fn drop(&mut self) {
        if thread::panicking() {
            let _ = self.results.send(Err(self.index));
        }
    }
}

fn panicked(index: usize) -> Error {
    Error::Internal(InternalError::hasher_pool(format!(
        "hasher worker {index} panicked"
    )))
}

impl<J, R> HasherPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Start `count` workers running `work` on every job
    pub fn spawn<F>(
        name: &str,
        count: usize,
        shutdown: &ShutdownSignal,
        group: &WorkerGroup,
        work: F,
    ) -> Result<Self>
    where
        F: Fn(J) -> R + Send + Sync + 'static,
    {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<J>(count.max(1) * JOBS_PER_WORKER);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<Outcome<R>>();
        let work = Arc::new(work);

        for index in 0..count {
            // registered before the thread exists so a waiter can never miss it
            let guard = group.enter();
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let shutdown = shutdown.clone();
            let work = Arc::clone(&work);

            thread::Builder::new()
                .name(format!("{name}-hasher-{index}"))
                .spawn(move || {
                    let _guard = guard;
                    let _notice = PanicNotice {
                        index,
                        results: results.clone(),
                    };
                    worker_loop(&jobs, &results, &shutdown, work.as_ref());
                    trace!("hasher worker {index} exiting");
                })
                .map_err(|e| {
                    Error::Internal(InternalError::hasher_pool(format!(
                        "failed to spawn worker: {e}"
                    )))
                })?;
        }

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            workers: count,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue a job, blocking while the queue is full
    pub fn submit(&self, job: J) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| Error::Internal(InternalError::hasher_pool("pool is closed")))?;
        jobs.send(job).map_err(|_| {
            Error::Internal(InternalError::hasher_pool(
                "all workers exited before accepting the job",
            ))
        })
    }

    /// Results that are already available, without blocking
    pub fn ready(&self) -> impl Iterator<Item = Result<R>> + '_ {
        self.results.try_iter().map(|outcome| outcome.map_err(panicked))
    }

    /// Block for the next result
    pub fn recv(&self) -> Result<R> {
        let outcome = self.results.recv().map_err(|_| {
            Error::Internal(InternalError::hasher_pool(
                "workers exited with results outstanding",
            ))
        })?;
        outcome.map_err(panicked)
    }

    /// Stop accepting jobs; idle workers exit once the queue drains
    pub fn close(&mut self) {
        self.jobs.take();
    }
}

fn worker_loop<J, R>(
    jobs: &Receiver<J>,
    results: &Sender<Outcome<R>>,
    shutdown: &ShutdownSignal,
    work: &(dyn Fn(J) -> R + Send + Sync),
) {
    loop {
        select! {
            recv(jobs) -> job => {
                let Ok(job) = job else { break };
                if shutdown.is_closed() {
                    break;
                }
                if results.send(Ok(work(job))).is_err() {
                    break;
                }
            }
            recv(shutdown.receiver()) -> _ => break,
        }
    }
}
