use crate::reading::Sample;
use std::collections::VecDeque;

/// Fixed-capacity FIFO of the most recent samples for one channel.
#[derive(Debug)]
pub struct SampleWindow {
    capacity: usize,
    buffer: VecDeque<Sample>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends `sample`, evicting the oldest entry first when full. Returns
    /// the evicted sample, if any.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(sample);
        evicted
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    pub fn first(&self) -> Option<&Sample> {
        self.buffer.front()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.buffer.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.buffer.iter()
    }

    /// Temperatures of the non-gap entries, oldest first.
    pub fn valid_temperatures(&self) -> Vec<f64> {
        self.buffer
            .iter()
            .filter_map(|sample| sample.temperature)
            .collect()
    }

    /// Minutes between the oldest and newest entry, gaps included.
    pub fn span_minutes(&self) -> Option<f64> {
        let (first, last) = (self.first()?, self.last()?);
        let span = last.timestamp - first.timestamp;
        Some(span.num_milliseconds() as f64 / 60_000.0)
    }
}
