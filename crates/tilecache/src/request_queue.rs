//! Bounded FIFO of pending obstacle changes

use std::collections::VecDeque;

use tilecache_common::{Result, Status};

use crate::refs::ObstacleRef;

/// Capacity of the obstacle request queue
pub const MAX_REQUESTS: usize = 64;

/// Requested obstacle change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleRequestAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObstacleRequest {
    pub action: ObstacleRequestAction,
    pub obstacle: ObstacleRef,
}

/// FIFO of obstacle requests applied by the next update
#[derive(Debug)]
pub struct ObstacleRequestQueue {
    requests: VecDeque<ObstacleRequest>,
    capacity: usize,
}

impl Default for ObstacleRequestQueue {
    fn default() -> Self {
        Self::new(MAX_REQUESTS)
    }
}

impl ObstacleRequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            requests: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a request, failing with [`Status::BufferTooSmall`] when full
    pub fn push(&mut self, action: ObstacleRequestAction, obstacle: ObstacleRef) -> Result<()> {
        if self.is_full() {
            return Err(Status::BufferTooSmall.into());
        }
        self.requests.push_back(ObstacleRequest { action, obstacle });
        Ok(())
    }

    pub fn front(&self) -> Option<&ObstacleRequest> {
        self.requests.front()
    }

    pub fn pop_front(&mut self) -> Option<ObstacleRequest> {
        self.requests.pop_front()
    }

    pub fn is_full(&self) -> bool {
        self.requests.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObstacleRequest> + '_ {
        self.requests.iter()
    }
}
