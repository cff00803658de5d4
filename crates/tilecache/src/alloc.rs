//! Scratch memory for tile rebuilds
//!
//! Every rebuild resets the allocator, draws the decompressed layer and any
//! builder scratch from it, and hands the buffers back before returning.

/// Allocator used for transient rebuild buffers
pub trait TileCacheAlloc {
    /// Called at the start of every tile rebuild
    fn reset(&mut self) {}

    /// Returns a zeroed buffer of `size` bytes, or `None` when exhausted
    fn alloc(&mut self, size: usize) -> Option<Vec<u8>>;

    /// Returns a buffer obtained from [`TileCacheAlloc::alloc`]
    fn free(&mut self, buffer: Vec<u8>);

    /// Largest number of bytes in use at once, for allocators that track it
    fn peak_usage(&self) -> Option<usize> {
        None
    }
}

/// Unbounded allocator backed by the global heap
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAlloc;

impl TileCacheAlloc for HeapAlloc {
    fn alloc(&mut self, size: usize) -> Option<Vec<u8>> {
        Some(vec![0; size])
    }

    fn free(&mut self, buffer: Vec<u8>) {
        drop(buffer);
    }
}

/// Bump allocator with a fixed budget per rebuild
///
/// Memory is only reclaimed on [`TileCacheAlloc::reset`]. The high-water mark
/// survives resets and reports the largest rebuild seen so far.
#[derive(Debug, Clone)]
pub struct LinearAlloc {
    capacity: usize,
    top: usize,
    high: usize,
}

impl LinearAlloc {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            top: 0,
            high: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out since the last reset
    pub fn used(&self) -> usize {
        self.top
    }

    /// Largest number of bytes in use at once
    pub fn high_water_mark(&self) -> usize {
        self.high
    }
}

impl TileCacheAlloc for LinearAlloc {
    fn reset(&mut self) {
        self.high = self.high.max(self.top);
        self.top = 0;
    }

    fn alloc(&mut self, size: usize) -> Option<Vec<u8>> {
        let top = self.top.checked_add(size)?;
        if top > self.capacity {
            log::debug!(
                "Linear allocator exhausted: requested {} bytes, {} of {} in use",
                size,
                self.top,
                self.capacity
            );
            return None;
        }
        self.top = top;
        self.high = self.high.max(top);
        Some(vec![0; size])
    }

    fn free(&mut self, buffer: Vec<u8>) {
        // Space is reclaimed on reset
        drop(buffer);
    }

    fn peak_usage(&self) -> Option<usize> {
        Some(self.high)
    }
}
