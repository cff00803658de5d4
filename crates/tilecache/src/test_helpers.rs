//! Shared test doubles for the tile cache tests

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tilecache_common::{Error, Result, Status};

use crate::alloc::TileCacheAlloc;
use crate::compressor::TileCacheCompressor;
use crate::layer::{
    build_tile_cache_layer, HeightfieldLayer, TileCacheLayer, TileCacheLayerHeader,
    TILECACHE_NULL_AREA, TILECACHE_NULL_HEIGHT, TILECACHE_WALKABLE_AREA,
};
use crate::mesh::{TileCacheMeshProcess, TileMeshBuilder, TileMeshConfig, TilePolyMesh};
use crate::tile_cache_builder::{TileLayerRasterizer, TileRasterConfig};
use crate::tile_cache_integration::{NavMeshCreateParams, TileNavMesh};

/// Height of every cell in the flat test floor
pub const FLOOR_HEIGHT: u8 = 2;

/// Encoded flat walkable layer covering tile `(tx, ty)` of a grid at the origin
pub fn flat_layer_data(
    comp: &dyn TileCacheCompressor,
    tx: i32,
    ty: i32,
    tlayer: i32,
    tile_size: i32,
    cs: f32,
) -> Vec<u8> {
    let tcs = tile_size as f32 * cs;
    let header = TileCacheLayerHeader {
        tx,
        ty,
        tlayer,
        bmin: [tx as f32 * tcs, 0.0, ty as f32 * tcs],
        bmax: [(tx + 1) as f32 * tcs, 2.0, (ty + 1) as f32 * tcs],
        hmin: FLOOR_HEIGHT as u16,
        hmax: FLOOR_HEIGHT as u16,
        width: tile_size as u8,
        height: tile_size as u8,
        minx: 0,
        maxx: (tile_size - 1) as u8,
        miny: 0,
        maxy: (tile_size - 1) as u8,
        ..TileCacheLayerHeader::new()
    };
    let n = (tile_size * tile_size) as usize;
    build_tile_cache_layer(
        comp,
        &header,
        &vec![FLOOR_HEIGHT; n],
        &vec![TILECACHE_WALKABLE_AREA; n],
        &vec![0; n],
    )
    .unwrap()
}

/// Emits one quad per walkable cell
#[derive(Debug, Default)]
pub struct CellMeshBuilder {
    calls: Option<Rc<Cell<usize>>>,
}

impl CellMeshBuilder {
    /// Builder that bumps `calls` on every invocation
    pub fn counting(calls: Rc<Cell<usize>>) -> Self {
        Self { calls: Some(calls) }
    }
}

impl TileMeshBuilder for CellMeshBuilder {
    fn build_poly_mesh(
        &mut self,
        layer: &TileCacheLayer,
        config: &TileMeshConfig,
        alloc: &mut dyn TileCacheAlloc,
    ) -> Result<TilePolyMesh> {
        if let Some(calls) = &self.calls {
            calls.set(calls.get() + 1);
        }

        let (w, h) = (layer.width(), layer.height());
        // Region scratch, the way a real builder would use the allocator
        let scratch = alloc.alloc(w * h).ok_or(Status::OutOfMemory)?;

        let mut mesh = TilePolyMesh::new(config.max_verts_per_poly);
        for z in 0..h {
            for x in 0..w {
                let idx = x + z * w;
                let height = layer.heights()[idx];
                if layer.areas()[idx] == TILECACHE_NULL_AREA || height == TILECACHE_NULL_HEIGHT {
                    continue;
                }
                let base = mesh.verts.len() as u16;
                let (x, y, z) = (x as u16, height as u16, z as u16);
                mesh.verts.extend_from_slice(&[
                    [x, y, z],
                    [x, y, z + 1],
                    [x + 1, y, z + 1],
                    [x + 1, y, z],
                ]);
                mesh.push_poly(&[base, base + 1, base + 2, base + 3], layer.areas()[idx]);
            }
        }

        alloc.free(scratch);
        Ok(mesh)
    }
}

/// Navigation mesh keeping tiles in a map
#[derive(Debug, Default)]
pub struct MemoryNavMesh {
    tiles: HashMap<(i32, i32, i32), NavMeshCreateParams>,
    /// Successful additions
    pub added: usize,
    /// Tile location of every successful addition, in order
    pub added_at: Vec<(i32, i32, i32)>,
    /// Removals that found a tile
    pub removed: usize,
    /// Status returned by every `add_tile` while set
    pub fail_adds: Option<Status>,
}

impl MemoryNavMesh {
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn params_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<&NavMeshCreateParams> {
        self.tiles.get(&(tx, ty, tlayer))
    }

    pub fn poly_count_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<usize> {
        self.params_at(tx, ty, tlayer).map(|p| p.mesh.poly_count())
    }

    pub fn total_poly_count(&self) -> usize {
        self.tiles.values().map(|p| p.mesh.poly_count()).sum()
    }

    /// Polygon count of every tile, keyed by location
    pub fn poly_counts(&self) -> BTreeMap<(i32, i32, i32), usize> {
        self.tiles
            .iter()
            .map(|(&key, p)| (key, p.mesh.poly_count()))
            .collect()
    }
}

impl TileNavMesh for MemoryNavMesh {
    fn remove_tile_at(&mut self, tx: i32, ty: i32, tlayer: i32) -> Result<bool> {
        let found = self.tiles.remove(&(tx, ty, tlayer)).is_some();
        if found {
            self.removed += 1;
        }
        Ok(found)
    }

    fn add_tile(&mut self, params: NavMeshCreateParams) -> Result<()> {
        if let Some(status) = self.fail_adds {
            return Err(status.into());
        }
        let key = (params.tx, params.ty, params.tlayer);
        self.tiles.insert(key, params);
        self.added += 1;
        self.added_at.push(key);
        Ok(())
    }
}

/// Heap allocator that refuses its first `failures` requests
#[derive(Debug)]
pub struct FlakyAlloc {
    failures: usize,
}

impl FlakyAlloc {
    pub fn failing(failures: usize) -> Self {
        Self { failures }
    }
}

impl TileCacheAlloc for FlakyAlloc {
    fn alloc(&mut self, size: usize) -> Option<Vec<u8>> {
        if self.failures > 0 {
            self.failures -= 1;
            return None;
        }
        Some(vec![0; size])
    }

    fn free(&mut self, buffer: Vec<u8>) {
        drop(buffer);
    }
}

/// Marks every polygon walkable and counts invocations
#[derive(Debug, Default)]
pub struct CountingMeshProcess {
    pub calls: Rc<Cell<usize>>,
}

impl CountingMeshProcess {
    pub const WALK_FLAG: u16 = 0x01;
}

impl TileCacheMeshProcess for CountingMeshProcess {
    fn process(&mut self, _header: &TileCacheLayerHeader, poly_areas: &mut [u8], poly_flags: &mut [u16]) {
        self.calls.set(self.calls.get() + 1);
        for (area, flags) in poly_areas.iter().zip(poly_flags.iter_mut()) {
            if *area == TILECACHE_WALKABLE_AREA {
                *flags = Self::WALK_FLAG;
            }
        }
    }
}

/// Produces flat walkable layers covering each tile
#[derive(Debug, Clone)]
pub struct FlatRasterizer {
    layers: usize,
    fail_at: Option<(i32, i32)>,
}

impl FlatRasterizer {
    pub fn new(layers: usize) -> Self {
        Self {
            layers,
            fail_at: None,
        }
    }

    pub fn failing_at(mut self, tx: i32, ty: i32) -> Self {
        self.fail_at = Some((tx, ty));
        self
    }
}

impl TileLayerRasterizer for FlatRasterizer {
    fn rasterize_tile_layers(
        &self,
        tx: i32,
        ty: i32,
        config: &TileRasterConfig,
    ) -> Result<Vec<HeightfieldLayer>> {
        if self.fail_at == Some((tx, ty)) {
            return Err(Error::Build(format!("no geometry at tile {},{}", tx, ty)));
        }

        let (bmin, bmax) = config.inner_bounds();
        let size = config.tile_size;
        let n = (size * size) as usize;
        let layer = HeightfieldLayer {
            bmin,
            bmax,
            width: size,
            height: size,
            minx: 0,
            maxx: size - 1,
            miny: 0,
            maxy: size - 1,
            hmin: FLOOR_HEIGHT as i32,
            hmax: FLOOR_HEIGHT as i32,
            heights: vec![FLOOR_HEIGHT; n],
            areas: vec![TILECACHE_WALKABLE_AREA; n],
            cons: vec![0; n],
        };
        Ok(vec![layer; self.layers])
    }
}
