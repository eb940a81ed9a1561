use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Record counters shared by the scan workers, with optional progress
/// output on stderr.
pub struct ScanProgress {
    label: &'static str,
    interval: u64,
    enabled: bool,
    records: AtomicU64,
    malformed: AtomicU64,
}

impl ScanProgress {
    pub fn new(label: &'static str, interval: u64, enabled: bool) -> Self {
        let progress = Self {
            label,
            interval: interval.max(1),
            enabled,
            records: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        };
        progress.print(0);
        progress
    }

    pub fn add(&self, records: u64, malformed: u64) {
        if malformed > 0 {
            self.malformed.fetch_add(malformed, Ordering::Relaxed);
        }
        let prev = self.records.fetch_add(records, Ordering::SeqCst);
        let current = prev + records;
        // Print if we crossed an interval boundary
        if prev / self.interval < current / self.interval {
            self.print(current);
        }
    }

    pub fn records(&self) -> u64 {
        self.records.load(Ordering::SeqCst)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::SeqCst)
    }

    pub fn finish(&self) {
        self.print(self.records());
        if self.enabled {
            eprintln!();
        }
    }

    fn print(&self, current: u64) {
        if !self.enabled {
            return;
        }
        eprint!("\r{}: {} records", self.label, current);
        let _ = std::io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_across_threads() {
        let progress = ScanProgress::new("test", 10, false);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        progress.add(1, 0);
                    }
                    progress.add(0, 1);
                });
            }
        });
        assert_eq!(progress.records(), 100);
        assert_eq!(progress.malformed(), 4);
    }
}
