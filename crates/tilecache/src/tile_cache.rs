//! Tile cache implementation
//!
//! This module contains the [`TileCache`] structure, which stores compressed
//! tile layers and temporary obstacles. Obstacle changes are queued here and
//! applied by [`TileCache::update`], which rebuilds affected tiles a bounded
//! number at a time.

use tilecache_common::{is_finite3, Error, Result, Status};

use crate::alloc::{HeapAlloc, TileCacheAlloc};
use crate::compressor::TileCacheCompressor;
use crate::layer::TileCacheLayerHeader;
use crate::mesh::{
    TileCacheMeshProcess, TileMeshBuilder, TileMeshConfig, TilePolyMesh, MAX_VERTS_PER_POLY,
};
use crate::obstacle::{Obstacle, ObstacleGeometry, ObstacleState, ObstacleStore};
use crate::refs::{CompressedTileRef, ObstacleRef, TileRefCodec, MAX_OBSTACLE_SLOTS};
use crate::request_queue::{ObstacleRequestAction, ObstacleRequestQueue, MAX_REQUESTS};
use crate::tile_cache_integration::NavMeshCreateParams;
use crate::tile_store::{calc_tight_tile_bounds, CompressedTile, CompressedTileFlags, TileStore};
use crate::worklist::{DirtyTileList, MAX_UPDATE};

/// Maximum number of layers per tile column
pub const MAX_LAYERS: usize = 32;

/// Tile cache parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileCacheParams {
    /// Origin of the tile grid
    pub origin: [f32; 3],
    /// Cell size (horizontal resolution)
    pub cs: f32,
    /// Cell height (vertical resolution)
    pub ch: f32,
    /// Width of a tile (in cells)
    pub width: i32,
    /// Depth of a tile (in cells)
    pub height: i32,
    /// Agent height in world units
    pub walkable_height: f32,
    /// Agent radius in world units
    pub walkable_radius: f32,
    /// Agent max climb in world units
    pub walkable_climb: f32,
    /// Maximum contour simplification error
    pub max_simplification_error: f32,
    /// Maximum number of stored tile layers
    pub max_tiles: i32,
    /// Maximum number of obstacles
    pub max_obstacles: i32,
    /// Tiles rebuilt per call to [`TileCache::update`]
    pub max_rebuilds_per_update: usize,
}

impl Default for TileCacheParams {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            cs: 0.3,
            ch: 0.2,
            width: 48,
            height: 48,
            walkable_height: 2.0,
            walkable_radius: 0.6,
            walkable_climb: 0.9,
            max_simplification_error: 1.3,
            max_tiles: 256,
            max_obstacles: 128,
            max_rebuilds_per_update: MAX_UPDATE,
        }
    }
}

impl TileCacheParams {
    pub fn with_origin(mut self, origin: [f32; 3]) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_cell_size(mut self, cs: f32, ch: f32) -> Self {
        self.cs = cs;
        self.ch = ch;
        self
    }

    pub fn with_tile_size(mut self, width: i32, height: i32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_agent(mut self, height: f32, radius: f32, climb: f32) -> Self {
        self.walkable_height = height;
        self.walkable_radius = radius;
        self.walkable_climb = climb;
        self
    }

    pub fn with_capacity(mut self, max_tiles: i32, max_obstacles: i32) -> Self {
        self.max_tiles = max_tiles;
        self.max_obstacles = max_obstacles;
        self
    }

    pub fn with_max_rebuilds_per_update(mut self, max_rebuilds: usize) -> Self {
        self.max_rebuilds_per_update = max_rebuilds;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if !is_finite3(&self.origin) {
            return Err(Error::InvalidConfig("origin must be finite".into()));
        }
        if !(self.cs > 0.0 && self.ch > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "cell size must be positive, got cs={} ch={}",
                self.cs, self.ch
            )));
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::InvalidConfig(format!(
                "tile size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.max_tiles <= 0 {
            return Err(Error::InvalidConfig("max_tiles must be positive".into()));
        }
        if self.max_obstacles <= 0 || self.max_obstacles as usize > MAX_OBSTACLE_SLOTS {
            return Err(Error::InvalidConfig(format!(
                "max_obstacles must be in 1..={}",
                MAX_OBSTACLE_SLOTS
            )));
        }
        if !(1..=MAX_UPDATE).contains(&self.max_rebuilds_per_update) {
            return Err(Error::InvalidConfig(format!(
                "max_rebuilds_per_update must be in 1..={}",
                MAX_UPDATE
            )));
        }
        // Leaves enough salt bits for stale-reference detection
        TileRefCodec::for_max_tiles(self.max_tiles as u32)?;
        Ok(())
    }

    /// Mesh builder settings derived from the agent parameters
    pub fn mesh_config(&self) -> TileMeshConfig {
        TileMeshConfig {
            cs: self.cs,
            ch: self.ch,
            walkable_height: self.walkable_height,
            walkable_radius: self.walkable_radius,
            walkable_climb: self.walkable_climb,
            walkable_climb_vx: (self.walkable_climb / self.ch) as i32,
            max_simplification_error: self.max_simplification_error,
            max_verts_per_poly: MAX_VERTS_PER_POLY,
        }
    }

    /// Navigation mesh tile parameters for a rebuilt layer
    pub fn nav_mesh_create_params(
        &self,
        header: &TileCacheLayerHeader,
        mesh: TilePolyMesh,
    ) -> NavMeshCreateParams {
        NavMeshCreateParams {
            cs: self.cs,
            ch: self.ch,
            walkable_height: self.walkable_height,
            walkable_radius: self.walkable_radius,
            walkable_climb: self.walkable_climb,
            ..NavMeshCreateParams::for_layer(header, mesh)
        }
    }
}

/// Tile cache structure
pub struct TileCache {
    pub(crate) params: TileCacheParams,
    pub(crate) tiles: TileStore,
    pub(crate) obstacles: ObstacleStore,
    pub(crate) requests: ObstacleRequestQueue,
    pub(crate) dirty: DirtyTileList,
    pub(crate) alloc: Box<dyn TileCacheAlloc>,
    pub(crate) compressor: Box<dyn TileCacheCompressor>,
    pub(crate) mesh_builder: Box<dyn TileMeshBuilder>,
    pub(crate) mesh_process: Option<Box<dyn TileCacheMeshProcess>>,
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("params", &self.params)
            .field("tiles", &self.tiles.len())
            .field("obstacles", &self.obstacles.len())
            .field("requests", &self.requests.len())
            .field("dirty", &self.dirty.len())
            .finish_non_exhaustive()
    }
}

impl TileCache {
    /// Creates a new tile cache
    ///
    /// Rebuild scratch memory comes from the heap until another allocator is
    /// installed with [`TileCache::with_alloc`].
    pub fn new(
        params: TileCacheParams,
        compressor: Box<dyn TileCacheCompressor>,
        mesh_builder: Box<dyn TileMeshBuilder>,
    ) -> Result<Self> {
        params.validate()?;

        let tiles = TileStore::new(params.max_tiles as usize, params.cs)?;
        let obstacles = ObstacleStore::new(params.max_obstacles as usize)?;

        log::debug!(
            "Created tile cache: {} tile slots ({} index bits), {} obstacle slots",
            tiles.capacity(),
            tiles.codec().tile_bits(),
            obstacles.capacity()
        );

        Ok(Self {
            params,
            tiles,
            obstacles,
            requests: ObstacleRequestQueue::new(MAX_REQUESTS),
            dirty: DirtyTileList::new(MAX_UPDATE),
            alloc: Box::new(HeapAlloc),
            compressor,
            mesh_builder,
            mesh_process: None,
        })
    }

    /// Replaces the rebuild scratch allocator
    pub fn with_alloc(mut self, alloc: Box<dyn TileCacheAlloc>) -> Self {
        self.alloc = alloc;
        self
    }

    /// Installs a hook that assigns polygon areas and flags
    pub fn with_mesh_process(mut self, process: Box<dyn TileCacheMeshProcess>) -> Self {
        self.mesh_process = Some(process);
        self
    }

    pub fn params(&self) -> &TileCacheParams {
        &self.params
    }

    pub fn alloc(&self) -> &dyn TileCacheAlloc {
        self.alloc.as_ref()
    }

    pub fn compressor(&self) -> &dyn TileCacheCompressor {
        self.compressor.as_ref()
    }

    pub fn tile_codec(&self) -> &TileRefCodec {
        self.tiles.codec()
    }

    /// Number of tile slots
    pub fn tile_capacity(&self) -> usize {
        self.tiles.capacity()
    }

    /// Number of stored tiles
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tile slot by index, occupied or not
    pub fn get_tile(&self, index: usize) -> Option<&CompressedTile> {
        self.tiles.tile(index)
    }

    pub fn get_tile_ref(&self, index: usize) -> Option<CompressedTileRef> {
        self.tiles.tile_ref(index)
    }

    pub fn get_tile_by_ref(&self, tile_ref: CompressedTileRef) -> Option<&CompressedTile> {
        self.tiles.get_tile_by_ref(tile_ref)
    }

    pub fn get_tile_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<&CompressedTile> {
        self.tiles.get_tile_at(tx, ty, tlayer)
    }

    pub fn get_tile_ref_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<CompressedTileRef> {
        self.tiles.get_tile_ref_at(tx, ty, tlayer)
    }

    /// Layers of a tile column in insertion order
    pub fn get_tiles_at(&self, tx: i32, ty: i32, max_tiles: usize) -> Vec<CompressedTileRef> {
        self.tiles.get_tiles_at(tx, ty, max_tiles)
    }

    /// Tiles overlapping a box, truncated to `max_results`
    pub fn query_tiles(
        &self,
        bmin: &[f32; 3],
        bmax: &[f32; 3],
        max_results: usize,
    ) -> Vec<CompressedTileRef> {
        self.tiles.query_tiles(bmin, bmax, max_results)
    }

    pub fn calc_tight_tile_bounds(&self, header: &TileCacheLayerHeader) -> ([f32; 3], [f32; 3]) {
        calc_tight_tile_bounds(header, self.params.cs)
    }

    /// Adds a stored layer.
    ///
    /// With [`CompressedTileFlags::FREE_DATA`] the cache owns `data`;
    /// otherwise [`TileCache::remove_tile`] hands it back.
    pub fn add_tile(
        &mut self,
        data: Vec<u8>,
        flags: CompressedTileFlags,
    ) -> Result<CompressedTileRef> {
        let tile_ref = self.tiles.add_tile(data, flags)?;
        log::debug!("Added tile {}", tile_ref);
        Ok(tile_ref)
    }

    /// Removes a stored layer, returning its data unless the cache owned it
    pub fn remove_tile(&mut self, tile_ref: CompressedTileRef) -> Result<Option<Vec<u8>>> {
        let data = self.tiles.remove_tile(tile_ref)?;
        log::debug!("Removed tile {}", tile_ref);
        Ok(data)
    }

    /// Adds a cylinder obstacle standing on `pos`
    pub fn add_obstacle(&mut self, pos: [f32; 3], radius: f32, height: f32) -> Result<ObstacleRef> {
        self.add_obstacle_geometry(ObstacleGeometry::cylinder(pos, radius, height))
    }

    /// Adds an axis-aligned box obstacle
    pub fn add_box_obstacle(&mut self, bmin: [f32; 3], bmax: [f32; 3]) -> Result<ObstacleRef> {
        self.add_obstacle_geometry(ObstacleGeometry::aabb(bmin, bmax))
    }

    /// Adds a box obstacle rotated by `y_radians` around the Y axis
    pub fn add_oriented_box_obstacle(
        &mut self,
        center: [f32; 3],
        half_extents: [f32; 3],
        y_radians: f32,
    ) -> Result<ObstacleRef> {
        self.add_obstacle_geometry(ObstacleGeometry::oriented_box(
            center,
            half_extents,
            y_radians,
        ))
    }

    fn add_obstacle_geometry(&mut self, geometry: ObstacleGeometry) -> Result<ObstacleRef> {
        geometry.validate()?;

        if self.requests.is_full() {
            return Err(Status::BufferTooSmall.into());
        }

        let obstacle_ref = self.obstacles.allocate(geometry)?;
        self.requests.push(ObstacleRequestAction::Add, obstacle_ref)?;

        log::debug!(
            "Queued {:?} obstacle {}",
            geometry.obstacle_type(),
            obstacle_ref
        );
        Ok(obstacle_ref)
    }

    /// Schedules an obstacle for removal.
    ///
    /// Removing an obstacle that is already being removed is a no-op.
    pub fn remove_obstacle(&mut self, obstacle_ref: ObstacleRef) -> Result<()> {
        let index = self.obstacles.index_of(obstacle_ref)?;

        let state = self
            .obstacles
            .obstacle(index)
            .map(Obstacle::state)
            .ok_or(Status::InvalidParam)?;
        match state {
            ObstacleState::Empty | ObstacleState::Removing => return Ok(()),
            ObstacleState::Processing | ObstacleState::Processed => {}
        }

        if self.requests.is_full() {
            return Err(Status::BufferTooSmall.into());
        }

        let ob = self.obstacles.obstacle_mut(index);
        ob.set_state(ObstacleState::Removing);
        ob.pending.clear();
        self.requests.push(ObstacleRequestAction::Remove, obstacle_ref)?;

        log::debug!("Queued removal of obstacle {}", obstacle_ref);
        Ok(())
    }

    /// Number of obstacle slots
    pub fn obstacle_capacity(&self) -> usize {
        self.obstacles.capacity()
    }

    /// Number of obstacles not in the `Empty` state
    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    /// Obstacle slot by index, live or not
    pub fn get_obstacle(&self, index: usize) -> Option<&Obstacle> {
        self.obstacles.obstacle(index)
    }

    pub fn get_obstacle_ref(&self, index: usize) -> Option<ObstacleRef> {
        self.obstacles.obstacle_ref(index)
    }

    pub fn get_obstacle_by_ref(&self, obstacle_ref: ObstacleRef) -> Option<&Obstacle> {
        self.obstacles.get(obstacle_ref)
    }

    pub fn get_obstacle_bounds(&self, obstacle: &Obstacle) -> ([f32; 3], [f32; 3]) {
        obstacle.geometry().bounds()
    }
}
