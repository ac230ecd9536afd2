//! Outstanding-usage accounting shared by the instrumentation wrappers

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::io::Write;

use parking_lot::Mutex;
#[cfg(feature = "logging")]
use tracing::warn;

/// Point-in-time copy of [`UsageCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Outstanding requested bytes
    pub bytes: usize,
    /// Outstanding allocations
    pub allocations: usize,
    /// Constructed objects not yet destroyed
    pub objects: usize,
}

impl Usage {
    /// Whether nothing is outstanding
    pub fn is_clean(&self) -> bool {
        self.bytes == 0 && self.allocations == 0 && self.objects == 0
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} allocations ({} bytes), {} objects",
            self.allocations, self.bytes, self.objects
        )
    }
}

/// Live counters of outstanding bytes, allocations and objects
#[derive(Debug, Default)]
pub struct UsageCounters {
    bytes: AtomicUsize,
    allocations: AtomicUsize,
    objects: AtomicUsize,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allocation(&self, size: usize) {
        self.bytes.fetch_add(size, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deallocation(&self, size: usize) {
        self.bytes.fetch_sub(size, Ordering::Relaxed);
        self.allocations.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_construct(&self) {
        self.objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroy(&self) {
        self.objects.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn objects(&self) -> usize {
        self.objects.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Usage {
        Usage {
            bytes: self.bytes(),
            allocations: self.allocations(),
            objects: self.objects(),
        }
    }
}

/// Writes one line to a diagnostic sink
///
/// Write failures are logged and otherwise ignored.
pub(crate) fn emit<W: Write>(sink: &Mutex<W>, message: fmt::Arguments<'_>) {
    let mut sink = sink.lock();
    if let Err(_error) = writeln!(sink, "{message}") {
        #[cfg(feature = "logging")]
        warn!(error = %_error, "diagnostic sink rejected a report");
    }
}

/// Reports outstanding usage at teardown; silent when nothing leaked
pub(crate) fn report_leaks<W: Write>(sink: &Mutex<W>, component: &str, usage: Usage) {
    if usage.is_clean() {
        return;
    }

    #[cfg(feature = "logging")]
    warn!(
        component,
        allocations = usage.allocations,
        bytes = usage.bytes,
        objects = usage.objects,
        "allocator dropped with outstanding usage"
    );

    emit(sink, format_args!("{component}: leaked {usage}"));
}
