//! Progress reporting abstractions
//!
//! The core reports progress through [`ProgressProvider`] without knowing how
//! (or whether) it is rendered. The CLI plugs in a channel-backed provider.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// Core trait for progress reporting
pub trait ProgressProvider: Send + Sync {
    /// Report a progress update
    fn report(&self, update: ProgressUpdate);

    /// Create a child provider for nested operations
    fn create_child(&self, name: &str) -> Box<dyn ProgressProvider>;

    /// Signal that the operation is complete
    fn complete(&self);
}

/// Which check a file-level update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Commitment,
    Structure,
}

impl CheckKind {
    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::Commitment => "commP",
            CheckKind::Structure => "structure",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// Bytes of one file consumed by a check
    FileProgress {
        path: PathBuf,
        check: CheckKind,
        bytes_processed: u64,
        total_bytes: u64,
    },

    /// One check of one file finished
    CheckFinished {
        path: PathBuf,
        check: CheckKind,
        passed: bool,
    },

    /// Files fully handled so far
    BatchProgress {
        current: usize,
        total: usize,
        current_file: Option<String>,
    },

    /// Generic status message
    Status { message: String },
}

/// Null implementation for when no progress is needed
pub struct NullProvider;

impl ProgressProvider for NullProvider {
    fn report(&self, _update: ProgressUpdate) {}

    fn create_child(&self, _name: &str) -> Box<dyn ProgressProvider> {
        Box::new(NullProvider)
    }

    fn complete(&self) {}
}

impl dyn ProgressProvider {
    pub fn null() -> Arc<dyn ProgressProvider> {
        Arc::new(NullProvider)
    }
}

/// Reader adapter that reports consumed bytes every `step` bytes
pub struct ProgressReader<R> {
    inner: R,
    provider: Arc<dyn ProgressProvider>,
    path: PathBuf,
    check: CheckKind,
    total: u64,
    read: u64,
    step: u64,
    next_report: u64,
}

impl<R: Read> ProgressReader<R> {
    pub const DEFAULT_STEP: u64 = 64 << 20;

    pub fn new(
        inner: R,
        provider: Arc<dyn ProgressProvider>,
        path: PathBuf,
        check: CheckKind,
        total: u64,
    ) -> Self {
        Self {
            inner,
            provider,
            path,
            check,
            total,
            read: 0,
            step: Self::DEFAULT_STEP,
            next_report: Self::DEFAULT_STEP,
        }
    }

    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step.max(1);
        self.next_report = self.step;
        self
    }

    fn publish(&self) {
        self.provider.report(ProgressUpdate::FileProgress {
            path: self.path.clone(),
            check: self.check,
            bytes_processed: self.read,
            total_bytes: self.total,
        });
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.read >= self.next_report || (n == 0 && self.read > 0 && !buf.is_empty()) {
            self.publish();
            while self.next_report <= self.read {
                self.next_report += self.step;
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct TestProvider {
        updates: Arc<Mutex<Vec<ProgressUpdate>>>,
    }

    impl ProgressProvider for TestProvider {
        fn report(&self, update: ProgressUpdate) {
            self.updates.lock().unwrap().push(update);
        }

        fn create_child(&self, _name: &str) -> Box<dyn ProgressProvider> {
            Box::new(TestProvider {
                updates: Arc::clone(&self.updates),
            })
        }

        fn complete(&self) {}
    }

    #[test]
    fn test_null_provider() {
        let provider = NullProvider;
        provider.report(ProgressUpdate::Status {
            message: "Test".to_string(),
        });
        provider.create_child("child").complete();
    }

    #[test]
    fn test_reader_reports_steps_and_end() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let provider: Arc<dyn ProgressProvider> = Arc::new(TestProvider {
            updates: Arc::clone(&updates),
        });
        let data = vec![7u8; 1000];
        let mut reader = ProgressReader::new(
            data.as_slice(),
            provider,
            PathBuf::from("x.car"),
            CheckKind::Commitment,
            1000,
        )
        .with_step(300);

        let mut sink = Vec::new();
        let mut buf = [0u8; 100];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            sink.extend_from_slice(&buf[..n]);
        }
        assert_eq!(sink, data);

        let seen: Vec<u64> = updates
            .lock()
            .unwrap()
            .iter()
            .map(|u| match u {
                ProgressUpdate::FileProgress {
                    bytes_processed, ..
                } => *bytes_processed,
                other => panic!("unexpected update {other:?}"),
            })
            .collect();
        assert_eq!(seen, vec![300, 600, 900, 1000]);
    }
}
