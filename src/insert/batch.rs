//! Batch jobs and their lazy creation.

use crate::schema::TableId;

/// The unit of work handed to a worker. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchJob {
    pub table: TableId,
    pub index: u64,
    /// Row offset of the first row within the table's target
    pub start: u64,
    pub rows: usize,
}

/// Cuts a table's target row count into batches one at a time, so every
/// batch can take the size current when it is created.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    table: TableId,
    target: u64,
    next_start: u64,
    next_index: u64,
}

impl BatchPlanner {
    pub fn new(table: TableId, target: u64) -> Self {
        Self {
            table,
            target,
            next_start: 0,
            next_index: 0,
        }
    }

    pub fn next_job(&mut self, size: usize) -> Option<BatchJob> {
        let remaining = self.remaining();
        if remaining == 0 {
            return None;
        }
        let rows = (size.max(1) as u64).min(remaining) as usize;
        let job = BatchJob {
            table: self.table,
            index: self.next_index,
            start: self.next_start,
            rows,
        };
        self.next_start += rows as u64;
        self.next_index += 1;
        Some(job)
    }

    /// Rows not yet handed out
    pub fn remaining(&self) -> u64 {
        self.target - self.next_start
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn batches_created(&self) -> u64 {
        self.next_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_cover_target_exactly() {
        let mut planner = BatchPlanner::new(TableId(0), 250);
        let a = planner.next_job(100).unwrap();
        let b = planner.next_job(100).unwrap();
        let c = planner.next_job(100).unwrap();
        assert_eq!((a.start, a.rows, a.index), (0, 100, 0));
        assert_eq!((b.start, b.rows, b.index), (100, 100, 1));
        assert_eq!((c.start, c.rows, c.index), (200, 50, 2));
        assert!(planner.next_job(100).is_none());
        assert!(planner.is_exhausted());
    }

    #[test]
    fn test_size_can_change_between_jobs() {
        let mut planner = BatchPlanner::new(TableId(3), 10);
        assert_eq!(planner.next_job(4).unwrap().rows, 4);
        assert_eq!(planner.next_job(2).unwrap().rows, 2);
        assert_eq!(planner.remaining(), 4);
        assert_eq!(planner.next_job(0).unwrap().rows, 1);
        assert_eq!(planner.batches_created(), 3);
    }

    #[test]
    fn test_empty_target() {
        let mut planner = BatchPlanner::new(TableId(0), 0);
        assert!(planner.next_job(10).is_none());
    }
}
