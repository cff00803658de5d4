//! Deduplicated queue of tiles waiting for a rebuild

use crate::refs::CompressedTileRef;

/// Capacity of the dirty-tile worklist
pub const MAX_UPDATE: usize = 64;

/// Ordered set of dirty tiles with a fixed capacity
#[derive(Debug)]
pub struct DirtyTileList {
    tiles: Vec<CompressedTileRef>,
    capacity: usize,
}

impl Default for DirtyTileList {
    fn default() -> Self {
        Self::new(MAX_UPDATE)
    }
}

impl DirtyTileList {
    pub fn new(capacity: usize) -> Self {
        Self {
            tiles: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, tile_ref: CompressedTileRef) -> bool {
        self.tiles.contains(&tile_ref)
    }

    /// Whether every tile in `tiles` fits, counting only those not yet queued
    pub fn can_accept(&self, tiles: &[CompressedTileRef]) -> bool {
        let mut added: Vec<CompressedTileRef> = Vec::new();
        for &t in tiles {
            if !self.contains(t) && !added.contains(&t) {
                added.push(t);
            }
        }
        self.tiles.len() + added.len() <= self.capacity
    }

    /// Queues all of `tiles` or none of them
    pub fn try_extend(&mut self, tiles: &[CompressedTileRef]) -> bool {
        if !self.can_accept(tiles) {
            return false;
        }
        for &t in tiles {
            if !self.contains(t) {
                self.tiles.push(t);
            }
        }
        true
    }

    /// Removes a tile, keeping the order of the rest
    pub fn remove(&mut self, tile_ref: CompressedTileRef) -> bool {
        match self.tiles.iter().position(|&t| t == tile_ref) {
            Some(pos) => {
                self.tiles.remove(pos);
                true
            }
            None => false,
        }
    }

    /// The first `max` queued tiles
    pub fn head(&self, max: usize) -> Vec<CompressedTileRef> {
        self.tiles.iter().take(max).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
