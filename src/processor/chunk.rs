use crate::models::Record;

/// Ordered in-memory batch of marked records awaiting one atomic write
///
/// Never grows past its capacity: `push` reports when the buffer is full and
/// the caller must `take` it before pushing again.
#[derive(Debug)]
pub struct ChunkBuffer {
    records: Vec<Record>,
    capacity: usize,
}

impl ChunkBuffer {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "chunk capacity must be positive");
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record; returns `true` when the buffer has reached capacity
    pub fn push(&mut self, record: Record) -> bool {
        debug_assert!(!self.is_full(), "push into a full chunk");
        self.records.push(record);
        self.is_full()
    }

    /// Hand the buffered records over and leave the buffer empty
    pub fn take(&mut self) -> Vec<Record> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
