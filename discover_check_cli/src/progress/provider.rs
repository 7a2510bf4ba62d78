//! Channel-backed progress provider
//!
//! Bridges the core's progress reporting with the CLI renderer. Sending never
//! blocks a validation worker: a full channel drops the update.

use discover_check_core::progress::{ProgressProvider, ProgressUpdate};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Updates buffered between the workers and the renderer
pub const CHANNEL_CAPACITY: usize = 256;

pub struct ChannelProvider {
    tx: Mutex<Option<mpsc::Sender<ProgressUpdate>>>,
    name: Option<String>,
}

impl ChannelProvider {
    pub fn new(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            name: None,
        }
    }

    pub fn with_name(tx: mpsc::Sender<ProgressUpdate>, name: String) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            name: Some(name),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<ProgressUpdate>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressProvider for ChannelProvider {
    fn report(&self, update: ProgressUpdate) {
        let update = match (&self.name, update) {
            (Some(name), ProgressUpdate::Status { message }) => ProgressUpdate::Status {
                message: format!("[{name}] {message}"),
            },
            (_, other) => other,
        };

        if let Some(tx) = self.sender() {
            let _ = tx.try_send(update);
        }
    }

    fn create_child(&self, name: &str) -> Box<dyn ProgressProvider> {
        let child_name = match self.name {
            Some(ref parent) => format!("{parent}/{name}"),
            None => name.to_string(),
        };
        Box::new(ChannelProvider {
            tx: Mutex::new(self.sender()),
            name: Some(child_name),
        })
    }

    fn complete(&self) {
        // dropping the sender lets the renderer leave its loop
        *self.tx.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Create a provider and the receiver its renderer drains
pub fn create_progress_infrastructure()
-> (Arc<dyn ProgressProvider>, mpsc::Receiver<ProgressUpdate>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let provider = Arc::new(ChannelProvider::new(tx)) as Arc<dyn ProgressProvider>;
    (provider, rx)
}
