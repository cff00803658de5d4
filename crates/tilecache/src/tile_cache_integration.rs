//! Publishing rebuilt tiles into a navigation mesh
//!
//! The cache never owns the navigation mesh. Hosts implement
//! [`TileNavMesh`] over their container; the cache swaps tiles through it
//! after each successful rebuild.

use tilecache_common::Result;

use crate::layer::TileCacheLayerHeader;
use crate::mesh::TilePolyMesh;

/// Everything a navigation mesh needs to create a tile
#[derive(Debug, Clone, PartialEq)]
pub struct NavMeshCreateParams {
    pub tx: i32,
    pub ty: i32,
    pub tlayer: i32,
    /// Bounds of the source layer
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub cs: f32,
    pub ch: f32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub build_bv_tree: bool,
    pub mesh: TilePolyMesh,
}

impl NavMeshCreateParams {
    /// Parameters for publishing `mesh` at the layer described by `header`
    pub fn for_layer(header: &TileCacheLayerHeader, mesh: TilePolyMesh) -> Self {
        Self {
            tx: header.tx,
            ty: header.ty,
            tlayer: header.tlayer,
            bmin: header.bmin,
            bmax: header.bmax,
            cs: 0.0,
            ch: 0.0,
            walkable_height: 0.0,
            walkable_radius: 0.0,
            walkable_climb: 0.0,
            build_bv_tree: false,
            mesh,
        }
    }
}

/// Layout of the navigation mesh that receives cached tiles
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshParams {
    /// World-space origin of the tile grid
    pub origin: [f32; 3],
    /// Tile width in world units
    pub tile_width: f32,
    /// Tile depth in world units
    pub tile_height: f32,
    pub max_tiles: u32,
    pub max_polys: u32,
}

/// Navigation mesh container fed by the cache
pub trait TileNavMesh {
    /// Removes the tile at a location; returns false when there was none
    fn remove_tile_at(&mut self, tx: i32, ty: i32, tlayer: i32) -> Result<bool>;

    /// Adds a freshly built tile
    fn add_tile(&mut self, params: NavMeshCreateParams) -> Result<()>;
}

/// Replaces whatever tile sits at the new tile's location.
///
/// `tile` is fully built before the old one is removed, so readers of the
/// navigation mesh never observe a half-built tile.
pub fn replace_nav_mesh_tile(nav_mesh: &mut dyn TileNavMesh, tile: NavMeshCreateParams) -> Result<()> {
    nav_mesh.remove_tile_at(tile.tx, tile.ty, tile.tlayer)?;
    nav_mesh.add_tile(tile)
}
