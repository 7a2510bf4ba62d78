//! Shutdown signalling and worker accounting for background hashers
//!
//! Shutdown is a channel nobody ever sends on: closing the trigger drops the
//! only sender, which every receiver observes as a disconnect. Workers register
//! with a [`WorkerGroup`] so the owner can block until all of them are gone.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use crossbeam_utils::sync::WaitGroup;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Create a connected trigger/signal pair
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (sender, receiver) = crossbeam_channel::bounded(0);
    (
        ShutdownTrigger {
            sender: Some(sender),
        },
        ShutdownSignal { receiver },
    )
}

/// Owning side of the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: Option<Sender<()>>,
}

impl ShutdownTrigger {
    /// Close the signal; idempotent
    pub fn close(&mut self) {
        self.sender.take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }
}

/// Observing side of the shutdown signal, cheap to clone
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: Receiver<()>,
}

impl ShutdownSignal {
    pub fn is_closed(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver usable inside `crossbeam_channel::select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

/// Counts live workers and lets an owner wait for all of them to exit
///
/// Every guard holds a clone of a [`WaitGroup`]; waiting takes the group's own
/// handle and blocks until the last guard drops it.
#[derive(Debug, Clone, Default)]
pub struct WorkerGroup {
    handle: Arc<Mutex<Option<WaitGroup>>>,
    active: Arc<AtomicUsize>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker; it counts as active until the guard drops
    pub fn enter(&self) -> WorkerGuard {
        let member = self.lock().get_or_insert_with(WaitGroup::new).clone();
        self.active.fetch_add(1, Ordering::SeqCst);
        WorkerGuard {
            _member: member,
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Block until every worker registered so far has exited
    pub fn wait(&self) {
        let handle = self.lock().take();
        if let Some(handle) = handle {
            handle.wait();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<WaitGroup>> {
        // a panicking worker must not wedge shutdown
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration of one live worker
#[derive(Debug)]
pub struct WorkerGuard {
    _member: WaitGroup,
    active: Arc<AtomicUsize>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        // counted down before the wait group member is released
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_close_is_observed_by_all_clones() {
        let (mut trigger, signal) = shutdown_channel();
        let other = signal.clone();
        assert!(!signal.is_closed());

        trigger.close();
        trigger.close();
        assert!(trigger.is_closed());
        assert!(signal.is_closed());
        assert!(other.is_closed());
    }

    #[test]
    fn test_wait_blocks_until_workers_exit() {
        let group = WorkerGroup::new();
        let (mut trigger, signal) = shutdown_channel();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let guard = group.enter();
                let signal = signal.clone();
                thread::spawn(move || {
                    let _guard = guard;
                    let _ = signal.receiver().recv();
                    thread::sleep(Duration::from_millis(20));
                })
            })
            .collect();

        assert_eq!(group.active(), 3);
        trigger.close();
        group.wait();
        assert_eq!(group.active(), 0);

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_wait_without_workers_returns() {
        WorkerGroup::new().wait();
    }

    #[test]
    fn test_panicking_worker_releases_wait() {
        let group = WorkerGroup::new();
        let guard = group.enter();
        let handle = thread::spawn(move || {
            let _guard = guard;
            panic!("worker failed");
        });

        group.wait();
        assert_eq!(group.active(), 0);
        assert!(handle.join().is_err());
    }

    #[test]
    fn test_group_is_reusable_after_wait() {
        let group = WorkerGroup::new();
        drop(group.enter());
        group.wait();

        let guard = group.enter();
        assert_eq!(group.active(), 1);
        thread::spawn(move || drop(guard));
        group.wait();
        assert_eq!(group.active(), 0);
    }
}
