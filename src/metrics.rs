use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Lending and authentication counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub books_borrowed: Arc<AtomicUsize>,
    pub books_returned: Arc<AtomicUsize>,
    pub borrow_rejections: Arc<AtomicUsize>,
    pub fines_assessed: Arc<AtomicI64>,
    pub logins_succeeded: Arc<AtomicUsize>,
    pub logins_failed: Arc<AtomicUsize>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            books_borrowed: Arc::new(AtomicUsize::new(0)),
            books_returned: Arc::new(AtomicUsize::new(0)),
            borrow_rejections: Arc::new(AtomicUsize::new(0)),
            fines_assessed: Arc::new(AtomicI64::new(0)),
            logins_succeeded: Arc::new(AtomicUsize::new(0)),
            logins_failed: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_borrowed(&self) {
        self.books_borrowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_returned(&self) {
        self.books_returned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_borrow_rejections(&self) {
        self.borrow_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_fine(&self, amount: i64) {
        self.fines_assessed.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn inc_logins_succeeded(&self) {
        self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_logins_failed(&self) {
        self.logins_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            books_borrowed: self.books_borrowed.load(Ordering::Relaxed),
            books_returned: self.books_returned.load(Ordering::Relaxed),
            borrow_rejections: self.borrow_rejections.load(Ordering::Relaxed),
            fines_assessed: self.fines_assessed.load(Ordering::Relaxed),
            logins_succeeded: self.logins_succeeded.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub books_borrowed: usize,
    pub books_returned: usize,
    pub borrow_rejections: usize,
    pub fines_assessed: i64,
    pub logins_succeeded: usize,
    pub logins_failed: usize,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let mut push = |name: &str, kind: &str, help: &str, value: String| {
            out.push_str(&format!("# HELP {} {}\n# TYPE {} {}\n{} {}\n", name, help, name, kind, name, value));
        };
        push("libris_books_borrowed_total", "counter", "Books checked out", self.books_borrowed.to_string());
        push("libris_books_returned_total", "counter", "Books returned", self.books_returned.to_string());
        push(
            "libris_borrow_rejections_total",
            "counter",
            "Borrow attempts rejected by a lending rule",
            self.borrow_rejections.to_string(),
        );
        push("libris_fines_assessed_total", "counter", "Sum of fines assessed at return", self.fines_assessed.to_string());
        push("libris_logins_succeeded_total", "counter", "Successful logins", self.logins_succeeded.to_string());
        push("libris_logins_failed_total", "counter", "Failed logins", self.logins_failed.to_string());
        push("libris_uptime_seconds", "gauge", "Seconds since process start", self.uptime_seconds.to_string());
        out
    }
}
