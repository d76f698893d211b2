//! Bounded FIFO of pending work.
//!
//! Items run in submission order. Cancelling one never reorders the rest,
//! and a full queue rejects new items instead of growing.

use std::collections::VecDeque;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WorkQueueFull {
    pub capacity: usize,
}

impl std::fmt::Display for WorkQueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "work queue full ({} pending)", self.capacity)
    }
}

impl std::error::Error for WorkQueueFull {}

#[derive(Debug)]
pub struct WorkQueue<T> {
    issued: u64,
    items: VecDeque<(WorkId, T)>,
    capacity: Option<usize>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            issued: 0,
            items: VecDeque::new(),
            capacity: None,
        }
    }
}

impl<T> WorkQueue<T> {
    /// Unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn submit(&mut self, item: T) -> Result<WorkId, WorkQueueFull> {
        if let Some(capacity) = self.capacity
            && self.items.len() >= capacity
        {
            return Err(WorkQueueFull { capacity });
        }
        self.issued += 1;
        let id = WorkId(self.issued);
        self.items.push_back((id, item));
        Ok(id)
    }

    /// Takes a still-pending item out of the queue.
    pub fn cancel(&mut self, id: WorkId) -> Option<T> {
        let pos = self.items.iter().position(|(queued, _)| *queued == id)?;
        self.items.remove(pos).map(|(_, item)| item)
    }

    pub fn pop(&mut self) -> Option<(WorkId, T)> {
        self.items.pop_front()
    }

    /// Everything pending, oldest first; the queue is left empty.
    pub fn take_all(&mut self) -> Vec<(WorkId, T)> {
        self.items.drain(..).collect()
    }
}
