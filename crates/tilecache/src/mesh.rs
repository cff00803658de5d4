//! Polygon mesh output of a tile rebuild and the builder seams that produce it

use tilecache_common::Result;

use crate::alloc::TileCacheAlloc;
use crate::layer::{TileCacheLayer, TileCacheLayerHeader};

/// Vertices per polygon produced by tile rebuilds
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Marks an unused vertex slot in a polygon
pub const MESH_NULL_IDX: u16 = 0xffff;

/// Polygon mesh built from one layer
///
/// Vertices are in cell units relative to the layer's `bmin`. Each polygon
/// occupies `2 * nvp` entries in `polys`: vertex indices padded with
/// [`MESH_NULL_IDX`], followed by neighbour information.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TilePolyMesh {
    pub nvp: usize,
    pub verts: Vec<[u16; 3]>,
    pub polys: Vec<u16>,
    pub areas: Vec<u8>,
    pub flags: Vec<u16>,
}

impl TilePolyMesh {
    pub fn new(nvp: usize) -> Self {
        Self {
            nvp,
            ..Default::default()
        }
    }

    pub fn poly_count(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Appends a polygon; extra vertices beyond `nvp` are ignored
    pub fn push_poly(&mut self, verts: &[u16], area: u8) {
        let nvp = self.nvp;
        let start = self.polys.len();
        self.polys.resize(start + nvp * 2, MESH_NULL_IDX);
        for (slot, &v) in self.polys[start..start + nvp].iter_mut().zip(verts) {
            *slot = v;
        }
        self.areas.push(area);
        self.flags.push(0);
    }
}

/// Settings handed to the mesh builder for every rebuild
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileMeshConfig {
    pub cs: f32,
    pub ch: f32,
    /// Agent clearance in world units
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    /// `walkable_climb` in cells
    pub walkable_climb_vx: i32,
    pub max_simplification_error: f32,
    pub max_verts_per_poly: usize,
}

/// Turns a decompressed, carved layer into polygons
///
/// Region partitioning, contour tracing and polygonization happen behind this
/// seam. Scratch memory should come from `alloc`; the cache resets it before
/// every rebuild.
pub trait TileMeshBuilder {
    fn build_poly_mesh(
        &mut self,
        layer: &TileCacheLayer,
        config: &TileMeshConfig,
        alloc: &mut dyn TileCacheAlloc,
    ) -> Result<TilePolyMesh>;
}

/// Hook that assigns polygon areas and flags before a tile is published
pub trait TileCacheMeshProcess {
    fn process(&mut self, header: &TileCacheLayerHeader, poly_areas: &mut [u8], poly_flags: &mut [u16]);
}
