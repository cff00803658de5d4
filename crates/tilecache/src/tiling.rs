//! World partitioning into tiles and reference bit budgeting

use glam::Vec3;
use tilecache_common::{calc_grid_size, ilog2, next_pow2, Error, Result};

use crate::refs::MAX_TILE_SLOTS;

/// Layers expected per tile column when sizing the cache
pub const EXPECTED_LAYERS_PER_TILE: u32 = 4;

/// Most tile columns a grid may have so every expected layer gets a slot
pub const MAX_TILE_COLUMNS: u32 = MAX_TILE_SLOTS / EXPECTED_LAYERS_PER_TILE;

/// Upper bound on tile index bits in navigation mesh references
pub const MAX_TILE_BITS: u32 = 14;

/// Bits shared between tile and polygon indices in navigation mesh references
pub const TILE_POLY_BITS: u32 = 22;

/// Tile grid covering an axis-aligned world region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGridLayout {
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    /// Tile edge length in cells
    pub tile_size: i32,
    /// Voxel grid size of the whole region
    pub grid_width: i32,
    pub grid_height: i32,
    /// Tile counts along X and Z
    pub tiles_x: i32,
    pub tiles_z: i32,
}

impl TileGridLayout {
    pub fn new(bmin: Vec3, bmax: Vec3, cs: f32, tile_size: i32) -> Result<Self> {
        if cs <= 0.0 || tile_size <= 0 {
            return Err(Error::InvalidConfig(format!(
                "cell size {} and tile size {} must be positive",
                cs, tile_size
            )));
        }
        if !bmin.is_finite() || !bmax.is_finite() || bmax.x < bmin.x || bmax.z < bmin.z {
            return Err(Error::InvalidConfig(format!(
                "invalid bounds {:?} - {:?}",
                bmin, bmax
            )));
        }

        let (grid_width, grid_height) = calc_grid_size(&bmin, &bmax, cs);
        let tiles_x = tiles_along(grid_width, tile_size);
        let tiles_z = tiles_along(grid_height, tile_size);

        // Both factors are below 2^31, so the product fits
        let tile_count = tiles_x * tiles_z;
        if tile_count > i64::from(MAX_TILE_COLUMNS) {
            return Err(Error::InvalidConfig(format!(
                "{}x{} tiles exceed the budget of {} tile columns",
                tiles_x, tiles_z, MAX_TILE_COLUMNS
            )));
        }
        let (tiles_x, tiles_z) = match (i32::try_from(tiles_x), i32::try_from(tiles_z)) {
            (Ok(x), Ok(z)) => (x, z),
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "{}x{} tiles do not fit the grid",
                    tiles_x, tiles_z
                )))
            }
        };

        Ok(Self {
            bmin,
            bmax,
            cs,
            tile_size,
            grid_width,
            grid_height,
            tiles_x,
            tiles_z,
        })
    }

    /// Number of tile columns
    pub fn tile_count(&self) -> u32 {
        (self.tiles_x.max(0) as u32).saturating_mul(self.tiles_z.max(0) as u32)
    }

    /// Width of one tile in world units
    pub fn tile_world_size(&self) -> f32 {
        self.tile_size as f32 * self.cs
    }

    /// World bounds of a tile column, full height of the region
    pub fn tile_bounds(&self, tx: i32, ty: i32) -> (Vec3, Vec3) {
        let tcs = self.tile_world_size();
        let bmin = Vec3::new(
            self.bmin.x + tx as f32 * tcs,
            self.bmin.y,
            self.bmin.z + ty as f32 * tcs,
        );
        let bmax = Vec3::new(
            self.bmin.x + (tx + 1) as f32 * tcs,
            self.bmax.y,
            self.bmin.z + (ty + 1) as f32 * tcs,
        );
        (bmin, bmax)
    }

    /// Tile column containing a world position
    pub fn tile_at(&self, pos: Vec3) -> (i32, i32) {
        let tcs = self.tile_world_size();
        (
            ((pos.x - self.bmin.x) / tcs).floor() as i32,
            ((pos.z - self.bmin.z) / tcs).floor() as i32,
        )
    }

    /// All tile columns in row-major order
    pub fn tile_coords(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (0..self.tiles_z).flat_map(move |ty| (0..self.tiles_x).map(move |tx| (tx, ty)))
    }
}

/// Tiles needed to cover `cells` cells, by ceiling division
fn tiles_along(cells: i32, tile_size: i32) -> i64 {
    let tile_size = i64::from(tile_size);
    (i64::from(cells.max(0)) + tile_size - 1) / tile_size
}

/// Split of navigation mesh reference bits between tiles and polygons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileIdBits {
    pub tile_bits: u32,
    pub poly_bits: u32,
    pub max_tiles: u32,
    pub max_polys_per_tile: u32,
}

impl TileIdBits {
    /// Bit split for `tile_layers` tile slots
    pub fn for_tile_layers(tile_layers: u32) -> Self {
        let tile_bits = ilog2(next_pow2(tile_layers)).min(MAX_TILE_BITS);
        let poly_bits = TILE_POLY_BITS - tile_bits;
        Self {
            tile_bits,
            poly_bits,
            max_tiles: 1 << tile_bits,
            max_polys_per_tile: 1 << poly_bits,
        }
    }
}
