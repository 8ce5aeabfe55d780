//! Read-log ledger (spec.md §4.4), the direct descendant of the original
//! `tx-msdos` `ReadLog` linked list (`add_read_log`/`update_read_log`/
//! `iterate_read_logs`).
//!
//! Kept as a plain `Vec`-backed list with a dedup-on-append invariant rather
//! than the original's intrusive linked list; nothing here needs the
//! original's manual allocation discipline.

/// One entry recording a sector that needed more than a direct read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadLogEntry {
    /// Linear sector index.
    pub sector: u64,
    /// Device- or recovery-stage status code.
    pub status_code: u8,
    /// Human-readable status message.
    pub status_message: String,
    /// Retry attempt this entry reflects, updated in place as retries
    /// continue against the same sector/status pair.
    pub retry_count: u32,
}

/// Append-mostly ledger of sectors that required retry or reconstruction.
#[derive(Debug, Default)]
pub struct ReadLog {
    entries: Vec<ReadLogEntry>,
}

impl ReadLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a new entry, unless the most recent entry shares the same
    /// `(sector, status_code)`, in which case its `retry_count` is updated
    /// in place instead (spec.md §4.4).
    pub fn add(&mut self, sector: u64, status_code: u8, status_message: &str, retry_count: u32) {
        if let Some(last) = self.entries.last_mut() {
            if last.sector == sector && last.status_code == status_code {
                last.retry_count = retry_count;
                return;
            }
        }
        self.entries.push(ReadLogEntry {
            sector,
            status_code,
            status_message: status_message.to_string(),
            retry_count,
        });
    }

    /// Visit every entry once, in insertion order.
    pub fn iterate(&self) -> impl Iterator<Item = &ReadLogEntry> {
        self.entries.iter()
    }

    /// Find the most recent entry for `sector`, if any.
    #[must_use]
    pub fn find(&self, sector: u64) -> Option<&ReadLogEntry> {
        self.entries.iter().rev().find(|e| e.sector == sector)
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries currently in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_same_sector_and_code_updates_in_place() {
        let mut log = ReadLog::new();
        log.add(10, 0xEE, "retrying", 1);
        log.add(10, 0xEE, "retrying", 2);
        log.add(10, 0xEE, "retrying", 3);

        assert_eq!(log.len(), 1);
        assert_eq!(log.find(10).unwrap().retry_count, 3);
    }

    #[test]
    fn differing_status_code_appends_new_entry() {
        let mut log = ReadLog::new();
        log.add(10, 0xEE, "retrying", 1);
        log.add(10, 0x00, "recovered", 1);

        assert_eq!(log.len(), 2);
        let all: Vec<_> = log.iterate().collect();
        assert_eq!(all[0].status_code, 0xEE);
        assert_eq!(all[1].status_code, 0x00);
    }

    #[test]
    fn differing_sector_appends_even_with_same_code() {
        let mut log = ReadLog::new();
        log.add(10, 0xEE, "retrying", 1);
        log.add(11, 0xEE, "retrying", 1);

        assert_eq!(log.len(), 2);
    }

    #[test]
    fn find_returns_most_recent_matching_entry() {
        let mut log = ReadLog::new();
        log.add(10, 0xEE, "retrying", 1);
        log.add(20, 0x00, "other sector", 0);
        log.add(10, 0x00, "recovered", 5);

        let entry = log.find(10).expect("entry for sector 10");
        assert_eq!(entry.status_code, 0x00);
        assert_eq!(entry.retry_count, 5);
    }

    #[test]
    fn iterate_visits_entries_in_insertion_order() {
        let mut log = ReadLog::new();
        log.add(1, 0xEE, "a", 1);
        log.add(2, 0xEE, "b", 1);
        log.add(3, 0xEE, "c", 1);

        let sectors: Vec<u64> = log.iterate().map(|e| e.sector).collect();
        assert_eq!(sectors, vec![1, 2, 3]);
    }
}
