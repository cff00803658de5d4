//! Tile rebuild: decompress, carve obstacles, build polygons, publish

use tilecache_common::{Result, Status};

use crate::carve::carve_obstacle;
use crate::layer::{decompress_tile_cache_layer, TILECACHE_NULL_AREA};
use crate::refs::CompressedTileRef;
use crate::tile_cache::{TileCache, MAX_LAYERS};
use crate::tile_cache_integration::{replace_nav_mesh_tile, TileNavMesh};

impl TileCache {
    /// Rebuilds the navigation mesh tile for a stored layer.
    ///
    /// Every obstacle whose touched set includes `tile_ref` is carved into
    /// a decompressed copy of the layer. An empty result removes the tile
    /// from the navigation mesh; anything else replaces it.
    pub fn build_nav_mesh_tile(
        &mut self,
        tile_ref: CompressedTileRef,
        nav_mesh: &mut dyn TileNavMesh,
    ) -> Result<()> {
        let index = self.tiles.index_of(tile_ref)?;

        self.alloc.reset();

        let mut layer = {
            let tile = self.tiles.tile(index).ok_or(Status::InvalidParam)?;
            decompress_tile_cache_layer(self.alloc.as_mut(), self.compressor.as_ref(), tile.data())?
        };
        let header = layer.header;

        let (cs, ch) = (self.params.cs, self.params.ch);
        for ob in self.obstacles.iter().filter(|ob| ob.carves(tile_ref)) {
            carve_obstacle(&mut layer, ob.geometry(), cs, ch, TILECACHE_NULL_AREA);
        }

        let config = self.params.mesh_config();
        let built = self
            .mesh_builder
            .build_poly_mesh(&layer, &config, self.alloc.as_mut());
        self.alloc.free(layer.into_grids());
        let mut mesh = built?;

        if mesh.is_empty() {
            log::debug!(
                "Tile ({}, {}, {}) has no polygons after carving",
                header.tx,
                header.ty,
                header.tlayer
            );
            nav_mesh.remove_tile_at(header.tx, header.ty, header.tlayer)?;
            return Ok(());
        }

        if let Some(process) = self.mesh_process.as_mut() {
            process.process(&header, &mut mesh.areas, &mut mesh.flags);
        }

        log::trace!(
            "Rebuilt tile ({}, {}, {}) with {} polygons",
            header.tx,
            header.ty,
            header.tlayer,
            mesh.poly_count()
        );
        replace_nav_mesh_tile(nav_mesh, self.params.nav_mesh_create_params(&header, mesh))
    }

    /// Rebuilds every layer of a tile column
    pub fn build_nav_mesh_tiles_at(
        &mut self,
        tx: i32,
        ty: i32,
        nav_mesh: &mut dyn TileNavMesh,
    ) -> Result<()> {
        for tile_ref in self.get_tiles_at(tx, ty, MAX_LAYERS) {
            self.build_nav_mesh_tile(tile_ref, nav_mesh)?;
        }
        Ok(())
    }
}
