//! # Error Sink
//!
//! Destination for extracted error records. The kernel's machine-check log
//! implements [`ErrorSink`]; [`LogSink`] prints records through `log`.

use crate::record::ErrorRecord;

/// Consumer of error records
///
/// Called in interrupt context with the per-CPU state locked. Implementations
/// must not block.
pub trait ErrorSink: Send + Sync {
    /// Hand one record over
    fn forward(&self, record: &ErrorRecord);
}

/// Sink that writes every record to the kernel log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn forward(&self, record: &ErrorRecord) {
        log::info!(
            "MCE: cpu {} bank {} status {:#018x} misc {:#018x} addr {:?}{}",
            record.cpu,
            record.bank,
            record.status,
            record.misc,
            record.address,
            if record.is_deferred() { " (deferred)" } else { "" }
        );
    }
}

#[cfg(any(test, feature = "testing"))]
pub use recording::RecordingSink;

#[cfg(any(test, feature = "testing"))]
mod recording {
    use alloc::vec::Vec;

    use spin::Mutex;

    use super::ErrorSink;
    use crate::record::ErrorRecord;

    /// Sink that keeps every record for inspection
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        records: Mutex<Vec<ErrorRecord>>,
    }

    impl RecordingSink {
        /// Empty sink
        pub fn new() -> Self {
            Self::default()
        }

        /// Records received so far
        pub fn records(&self) -> Vec<ErrorRecord> {
            self.records.lock().clone()
        }

        /// Number of records received
        pub fn len(&self) -> usize {
            self.records.lock().len()
        }

        /// No record received
        pub fn is_empty(&self) -> bool {
            self.records.lock().is_empty()
        }
    }

    impl ErrorSink for RecordingSink {
        fn forward(&self, record: &ErrorRecord) {
            self.records.lock().push(*record);
        }
    }
}
