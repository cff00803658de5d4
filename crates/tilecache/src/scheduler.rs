//! Incremental update of obstacle requests and dirty tiles
//!
//! Each call to [`TileCache::update`] first turns queued obstacle requests
//! into dirty tiles, then rebuilds a bounded number of dirty tiles. Obstacles
//! change state only once every tile they touch has been rebuilt.

use crate::obstacle::{ObstacleState, MAX_TOUCHED_TILES};
use crate::refs::CompressedTileRef;
use crate::request_queue::{ObstacleRequest, ObstacleRequestAction, MAX_REQUESTS};
use crate::tile_cache::TileCache;
use crate::tile_cache_integration::TileNavMesh;

/// What a single update step did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// No queued requests and no dirty tiles remain
    pub up_to_date: bool,
    /// Requests taken off the queue
    pub requests_processed: usize,
    /// Request draining stopped because the worklist was full
    pub requests_deferred: bool,
    /// Tiles rebuilt and published
    pub tiles_rebuilt: usize,
    /// Tiles left dirty after a transient failure
    pub tiles_retried: usize,
    /// Tiles removed from the worklist after an unrecoverable failure
    pub tiles_dropped: usize,
}

impl TileCache {
    /// Advances pending obstacle changes by one bounded step.
    ///
    /// `_dt` is accepted for frame-loop symmetry; work is bounded by request
    /// and rebuild counts, not time.
    pub fn update(&mut self, _dt: f32, nav_mesh: &mut dyn TileNavMesh) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        for _ in 0..MAX_REQUESTS {
            let Some(&request) = self.requests.front() else {
                break;
            };
            if !self.process_request(request) {
                log::debug!(
                    "Worklist full, deferring {} queued obstacle requests",
                    self.requests.len()
                );
                outcome.requests_deferred = true;
                break;
            }
            self.requests.pop_front();
            outcome.requests_processed += 1;
        }

        for tile_ref in self.dirty.head(self.params.max_rebuilds_per_update) {
            match self.build_nav_mesh_tile(tile_ref, nav_mesh) {
                Ok(()) => {
                    self.dirty.remove(tile_ref);
                    self.complete_tile(tile_ref);
                    outcome.tiles_rebuilt += 1;
                }
                Err(e) if e.is_transient() => {
                    log::debug!("Rebuild of {} postponed: {}", tile_ref, e);
                    outcome.tiles_retried += 1;
                }
                Err(e) => {
                    log::warn!("Dropping tile {} from the worklist: {}", tile_ref, e);
                    self.dirty.remove(tile_ref);
                    self.complete_tile(tile_ref);
                    outcome.tiles_dropped += 1;
                }
            }
        }

        outcome.up_to_date = self.is_up_to_date();
        outcome
    }

    /// True when no requests are queued and no tiles are dirty
    pub fn is_up_to_date(&self) -> bool {
        self.requests.is_empty() && self.dirty.is_empty()
    }

    pub fn pending_request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn dirty_tile_count(&self) -> usize {
        self.dirty.len()
    }

    /// Applies one request; returns false if it must wait for worklist space
    fn process_request(&mut self, request: ObstacleRequest) -> bool {
        let Ok(index) = self.obstacles.index_of(request.obstacle) else {
            log::debug!("Skipping request for stale obstacle {}", request.obstacle);
            return true;
        };

        match request.action {
            ObstacleRequestAction::Add => {
                let ob = self.obstacles.obstacle_mut(index);
                // Removed before it was ever carved
                if ob.state() != ObstacleState::Processing {
                    return true;
                }

                let (bmin, bmax) = ob.geometry().bounds();
                let mut touched = self.tiles.query_tiles(&bmin, &bmax, MAX_TOUCHED_TILES + 1);
                if touched.len() > MAX_TOUCHED_TILES {
                    log::warn!(
                        "Obstacle {} overlaps more than {} tiles, ignoring the rest",
                        request.obstacle,
                        MAX_TOUCHED_TILES
                    );
                    touched.truncate(MAX_TOUCHED_TILES);
                }

                if !self.dirty.try_extend(&touched) {
                    return false;
                }

                let ob = self.obstacles.obstacle_mut(index);
                ob.pending = touched.clone();
                ob.touched = touched;
                if ob.pending.is_empty() {
                    ob.set_state(ObstacleState::Processed);
                }
            }
            ObstacleRequestAction::Remove => {
                let ob = self.obstacles.obstacle_mut(index);
                if ob.state() != ObstacleState::Removing {
                    return true;
                }

                if !self.dirty.try_extend(&ob.touched) {
                    return false;
                }

                ob.pending = ob.touched.clone();
                if ob.pending.is_empty() {
                    self.obstacles.release(index);
                    log::debug!("Obstacle {} removed", request.obstacle);
                }
            }
        }

        true
    }

    /// Clears a finished tile from every obstacle waiting on it
    fn complete_tile(&mut self, tile_ref: CompressedTileRef) {
        let mut freed = Vec::new();

        for (index, ob) in self.obstacles.iter_mut() {
            let state = ob.state();
            if !matches!(state, ObstacleState::Processing | ObstacleState::Removing) {
                continue;
            }
            let Some(pos) = ob.pending.iter().position(|&t| t == tile_ref) else {
                continue;
            };

            ob.pending.swap_remove(pos);
            if state == ObstacleState::Removing {
                ob.touched.retain(|&t| t != tile_ref);
            }

            if ob.pending.is_empty() {
                if state == ObstacleState::Processing {
                    ob.set_state(ObstacleState::Processed);
                } else {
                    freed.push(index);
                }
            }
        }

        for index in freed {
            self.obstacles.release(index);
            log::debug!("Obstacle slot {} released", index);
        }
    }
}
