use crate::core::types::Request;
use std::collections::VecDeque;

/// Requests attempted while the channel was not open, kept in arrival order
#[derive(Debug, Default)]
pub struct OutgoingBuffer {
    queue: VecDeque<Request>,
}

impl OutgoingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: Request) {
        self.queue.push_back(request);
    }

    /// Take every buffered request, oldest first
    pub fn drain(&mut self) -> Vec<Request> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
