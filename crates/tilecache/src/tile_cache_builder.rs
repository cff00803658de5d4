//! Bulk build of a tile cache from rasterized tile columns
//!
//! [`TileCacheBuilder`] derives the tile grid, the rasterizer settings, the
//! cache parameters and the navigation mesh layout from one set of
//! [`TileCacheBuildSettings`]. It then rasterizes every tile column, stores
//! the resulting layers compressed, and builds the initial navigation mesh
//! tiles.

use glam::Vec3;
use tilecache_common::{is_finite3, overlap_bounds, sqr, Error, Result};

use crate::compressor::TileCacheCompressor;
use crate::context::{BuildContext, TimerCategory};
use crate::layer::{build_tile_cache_layer, calc_layer_buffer_size, HeightfieldLayer};
use crate::mesh::{TileMeshBuilder, MAX_VERTS_PER_POLY};
use crate::refs::MAX_OBSTACLE_SLOTS;
use crate::tile_cache::{TileCache, TileCacheParams, MAX_LAYERS};
use crate::tile_cache_integration::{NavMeshParams, TileNavMesh};
use crate::tile_store::CompressedTileFlags;
use crate::tiling::{TileGridLayout, TileIdBits, EXPECTED_LAYERS_PER_TILE};
use crate::worklist::MAX_UPDATE;

/// Largest tile edge a layer header can describe
pub const MAX_TILE_SIZE: i32 = u8::MAX as i32;

/// Most vertices a convex volume outline may have
pub const MAX_CONVEX_VOLUME_PTS: usize = 12;

/// Prism that marks an area type on the walkable surface inside it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ConvexVolume {
    /// Outline in the XZ plane, world units; y is ignored
    pub verts: Vec<[f32; 3]>,
    pub hmin: f32,
    pub hmax: f32,
    /// Area id applied to the covered cells
    pub area: u8,
}

impl ConvexVolume {
    pub fn new(verts: Vec<[f32; 3]>, hmin: f32, hmax: f32, area: u8) -> Result<Self> {
        let volume = Self {
            verts,
            hmin,
            hmax,
            area,
        };
        volume.validate()?;
        Ok(volume)
    }

    pub fn validate(&self) -> Result<()> {
        if !(3..=MAX_CONVEX_VOLUME_PTS).contains(&self.verts.len()) {
            return Err(Error::InvalidConfig(format!(
                "convex volume needs 3..={} vertices, got {}",
                MAX_CONVEX_VOLUME_PTS,
                self.verts.len()
            )));
        }
        if !self.verts.iter().all(is_finite3) || !(self.hmin.is_finite() && self.hmax.is_finite())
        {
            return Err(Error::InvalidConfig("convex volume must be finite".into()));
        }
        if self.hmin > self.hmax {
            return Err(Error::InvalidConfig(format!(
                "convex volume height range {} - {} is inverted",
                self.hmin, self.hmax
            )));
        }
        Ok(())
    }

    /// Axis-aligned bounds of the prism
    pub fn bounds(&self) -> ([f32; 3], [f32; 3]) {
        let mut bmin = [f32::MAX, self.hmin, f32::MAX];
        let mut bmax = [f32::MIN, self.hmax, f32::MIN];
        for v in &self.verts {
            bmin[0] = bmin[0].min(v[0]);
            bmin[2] = bmin[2].min(v[2]);
            bmax[0] = bmax[0].max(v[0]);
            bmax[2] = bmax[2].max(v[2]);
        }
        (bmin, bmax)
    }
}

/// User-facing settings for a bulk build, in world units
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct TileCacheBuildSettings {
    /// Bounds of the input geometry
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub cell_size: f32,
    pub cell_height: f32,
    /// Tile edge length in cells
    pub tile_size: i32,
    pub agent_height: f32,
    pub agent_radius: f32,
    pub agent_max_climb: f32,
    /// Maximum walkable slope in degrees
    pub agent_max_slope: f32,
    pub edge_max_len: f32,
    pub edge_max_error: f32,
    /// Region sizes in cells; squared into areas
    pub region_min_size: f32,
    pub region_merge_size: f32,
    pub verts_per_poly: i32,
    pub detail_sample_dist: f32,
    pub detail_sample_max_error: f32,
    pub max_obstacles: i32,
    /// Let agents step up onto low obstacles
    pub filter_low_hanging_obstacles: bool,
    /// Drop spans at ledges the agent would fall off
    pub filter_ledge_spans: bool,
    /// Drop spans with less clearance than the agent height
    pub filter_walkable_low_height_spans: bool,
    pub convex_volumes: Vec<ConvexVolume>,
}

impl Default for TileCacheBuildSettings {
    fn default() -> Self {
        Self {
            bmin: [0.0; 3],
            bmax: [0.0; 3],
            cell_size: 0.3,
            cell_height: 0.2,
            tile_size: 48,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            region_min_size: 8.0,
            region_merge_size: 20.0,
            verts_per_poly: MAX_VERTS_PER_POLY as i32,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            max_obstacles: 128,
            filter_low_hanging_obstacles: true,
            filter_ledge_spans: true,
            filter_walkable_low_height_spans: true,
            convex_volumes: Vec::new(),
        }
    }
}

impl TileCacheBuildSettings {
    pub fn with_bounds(mut self, bmin: [f32; 3], bmax: [f32; 3]) -> Self {
        self.bmin = bmin;
        self.bmax = bmax;
        self
    }

    pub fn with_cell_size(mut self, cell_size: f32, cell_height: f32) -> Self {
        self.cell_size = cell_size;
        self.cell_height = cell_height;
        self
    }

    pub fn with_tile_size(mut self, tile_size: i32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_agent(mut self, height: f32, radius: f32, max_climb: f32) -> Self {
        self.agent_height = height;
        self.agent_radius = radius;
        self.agent_max_climb = max_climb;
        self
    }

    pub fn with_max_slope(mut self, degrees: f32) -> Self {
        self.agent_max_slope = degrees;
        self
    }

    pub fn with_edges(mut self, max_len: f32, max_error: f32) -> Self {
        self.edge_max_len = max_len;
        self.edge_max_error = max_error;
        self
    }

    pub fn with_regions(mut self, min_size: f32, merge_size: f32) -> Self {
        self.region_min_size = min_size;
        self.region_merge_size = merge_size;
        self
    }

    pub fn with_max_obstacles(mut self, max_obstacles: i32) -> Self {
        self.max_obstacles = max_obstacles;
        self
    }

    pub fn with_filters(mut self, low_hanging: bool, ledges: bool, low_height: bool) -> Self {
        self.filter_low_hanging_obstacles = low_hanging;
        self.filter_ledge_spans = ledges;
        self.filter_walkable_low_height_spans = low_height;
        self
    }

    pub fn with_convex_volume(mut self, volume: ConvexVolume) -> Self {
        self.convex_volumes.push(volume);
        self
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        if !is_finite3(&self.bmin) || !is_finite3(&self.bmax) {
            return Err(Error::InvalidConfig("bounds must be finite".into()));
        }
        if self.bmax[0] <= self.bmin[0] || self.bmax[2] <= self.bmin[2] || self.bmax[1] < self.bmin[1]
        {
            return Err(Error::InvalidConfig(format!(
                "empty bounds {:?} - {:?}",
                self.bmin, self.bmax
            )));
        }
        if !(self.cell_size > 0.0 && self.cell_height > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "cell size must be positive, got cs={} ch={}",
                self.cell_size, self.cell_height
            )));
        }
        if !(1..=MAX_TILE_SIZE).contains(&self.tile_size) {
            return Err(Error::InvalidConfig(format!(
                "tile size must be in 1..={}, got {}",
                MAX_TILE_SIZE, self.tile_size
            )));
        }
        let agent = [self.agent_height, self.agent_radius, self.agent_max_climb];
        if agent.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::InvalidConfig(format!(
                "agent dimensions must be non-negative, got {:?}",
                agent
            )));
        }
        if !(3..=MAX_VERTS_PER_POLY as i32).contains(&self.verts_per_poly) {
            return Err(Error::InvalidConfig(format!(
                "verts_per_poly must be in 3..={}",
                MAX_VERTS_PER_POLY
            )));
        }
        if self.max_obstacles <= 0 || self.max_obstacles as usize > MAX_OBSTACLE_SLOTS {
            return Err(Error::InvalidConfig(format!(
                "max_obstacles must be in 1..={}",
                MAX_OBSTACLE_SLOTS
            )));
        }
        for volume in &self.convex_volumes {
            volume.validate()?;
        }
        Ok(())
    }

    #[cfg(feature = "serialization")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    #[cfg(feature = "serialization")]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Saves the settings to a JSON file
    #[cfg(feature = "serialization")]
    pub fn save_to_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Loads settings from a JSON file
    #[cfg(feature = "serialization")]
    pub fn load_from_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::from_json(&json)
    }

    /// Compact binary encoding
    #[cfg(feature = "serialization")]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    #[cfg(feature = "serialization")]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        postcard::from_bytes(data).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Rasterizer settings in voxel units
#[derive(Debug, Clone, PartialEq)]
pub struct TileRasterConfig {
    pub cs: f32,
    pub ch: f32,
    pub walkable_slope_angle: f32,
    /// Agent height in cells, rounded up
    pub walkable_height: i32,
    /// Agent climb in cells, rounded down
    pub walkable_climb: i32,
    /// Agent radius in cells, rounded up
    pub walkable_radius: i32,
    pub max_edge_len: i32,
    pub max_simplification_error: f32,
    pub min_region_area: i32,
    pub merge_region_area: i32,
    pub max_verts_per_poly: i32,
    pub tile_size: i32,
    /// Padding around each tile so neighbouring tiles line up
    pub border_size: i32,
    /// Rasterized grid size, border included
    pub width: i32,
    pub height: i32,
    pub detail_sample_dist: f32,
    pub detail_sample_max_error: f32,
    /// Bounds of the rasterized area, border included
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub filter_low_hanging_obstacles: bool,
    pub filter_ledge_spans: bool,
    pub filter_walkable_low_height_spans: bool,
    /// Area volumes; per-tile configs keep only those reaching the tile
    pub convex_volumes: Vec<ConvexVolume>,
}

impl TileRasterConfig {
    pub fn from_settings(settings: &TileCacheBuildSettings) -> Self {
        let cs = settings.cell_size;
        let ch = settings.cell_height;
        let walkable_radius = (settings.agent_radius / cs).ceil() as i32;
        let border_size = walkable_radius + 3;

        Self {
            cs,
            ch,
            walkable_slope_angle: settings.agent_max_slope,
            walkable_height: (settings.agent_height / ch).ceil() as i32,
            walkable_climb: (settings.agent_max_climb / ch).floor() as i32,
            walkable_radius,
            max_edge_len: (settings.edge_max_len / cs) as i32,
            max_simplification_error: settings.edge_max_error,
            min_region_area: sqr(settings.region_min_size) as i32,
            merge_region_area: sqr(settings.region_merge_size) as i32,
            max_verts_per_poly: settings.verts_per_poly,
            tile_size: settings.tile_size,
            border_size,
            width: settings.tile_size + border_size * 2,
            height: settings.tile_size + border_size * 2,
            detail_sample_dist: if settings.detail_sample_dist < 0.9 {
                0.0
            } else {
                cs * settings.detail_sample_dist
            },
            detail_sample_max_error: ch * settings.detail_sample_max_error,
            bmin: settings.bmin,
            bmax: settings.bmax,
            filter_low_hanging_obstacles: settings.filter_low_hanging_obstacles,
            filter_ledge_spans: settings.filter_ledge_spans,
            filter_walkable_low_height_spans: settings.filter_walkable_low_height_spans,
            convex_volumes: settings.convex_volumes.clone(),
        }
    }

    /// Copy of this config bounded to one tile column plus its border
    pub fn for_tile(&self, tx: i32, ty: i32) -> Self {
        let tcs = self.tile_size as f32 * self.cs;
        let pad = self.border_size as f32 * self.cs;

        let bmin = [
            self.bmin[0] + tx as f32 * tcs - pad,
            self.bmin[1],
            self.bmin[2] + ty as f32 * tcs - pad,
        ];
        let bmax = [
            self.bmin[0] + (tx + 1) as f32 * tcs + pad,
            self.bmax[1],
            self.bmin[2] + (ty + 1) as f32 * tcs + pad,
        ];
        let convex_volumes = self
            .convex_volumes
            .iter()
            .filter(|v| {
                let (vmin, vmax) = v.bounds();
                overlap_bounds(&vmin, &vmax, &bmin, &bmax)
            })
            .cloned()
            .collect();

        Self {
            bmin,
            bmax,
            convex_volumes,
            ..self.clone()
        }
    }

    /// Bounds with the border trimmed off; stored layers cover this area
    pub fn inner_bounds(&self) -> ([f32; 3], [f32; 3]) {
        let pad = self.border_size as f32 * self.cs;
        (
            [self.bmin[0] + pad, self.bmin[1], self.bmin[2] + pad],
            [self.bmax[0] - pad, self.bmax[1], self.bmax[2] - pad],
        )
    }
}

/// Voxelizes the input geometry of one tile column into layers.
///
/// Columns are independent, so implementations are shared across threads
/// when the `parallel` feature is enabled.
pub trait TileLayerRasterizer: Sync {
    fn rasterize_tile_layers(
        &self,
        tx: i32,
        ty: i32,
        config: &TileRasterConfig,
    ) -> Result<Vec<HeightfieldLayer>>;
}

/// Summary of a bulk build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileCacheBuildStats {
    pub tiles_x: i32,
    pub tiles_z: i32,
    /// Layers stored in the cache
    pub layer_count: usize,
    pub compressed_size: usize,
    /// Size the stored layers would take uncompressed
    pub raw_size: usize,
    /// Layers that could not be encoded or stored
    pub rejected_layers: usize,
    /// Columns the rasterizer failed on
    pub failed_columns: usize,
    /// Columns whose navigation mesh tiles failed to build
    pub failed_mesh_columns: usize,
    /// Peak rebuild scratch usage, when the allocator tracks it
    pub alloc_high_water: Option<usize>,
}

impl TileCacheBuildStats {
    /// Compressed size as a fraction of the raw size
    pub fn compression_ratio(&self) -> f32 {
        if self.raw_size == 0 {
            return 0.0;
        }
        self.compressed_size as f32 / self.raw_size as f32
    }
}

/// Drives a bulk build
#[derive(Debug, Clone)]
pub struct TileCacheBuilder {
    settings: TileCacheBuildSettings,
    layout: TileGridLayout,
    raster_config: TileRasterConfig,
}

impl TileCacheBuilder {
    pub fn new(settings: TileCacheBuildSettings) -> Result<Self> {
        settings.validate()?;

        let layout = TileGridLayout::new(
            Vec3::from_array(settings.bmin),
            Vec3::from_array(settings.bmax),
            settings.cell_size,
            settings.tile_size,
        )?;
        let raster_config = TileRasterConfig::from_settings(&settings);

        Ok(Self {
            settings,
            layout,
            raster_config,
        })
    }

    pub fn settings(&self) -> &TileCacheBuildSettings {
        &self.settings
    }

    pub fn layout(&self) -> &TileGridLayout {
        &self.layout
    }

    pub fn raster_config(&self) -> &TileRasterConfig {
        &self.raster_config
    }

    /// Layer slots to reserve for the whole grid
    pub fn max_tile_layers(&self) -> u32 {
        self.layout.tile_count().saturating_mul(EXPECTED_LAYERS_PER_TILE)
    }

    pub fn tile_cache_params(&self) -> TileCacheParams {
        let s = &self.settings;
        TileCacheParams {
            origin: s.bmin,
            cs: s.cell_size,
            ch: s.cell_height,
            width: s.tile_size,
            height: s.tile_size,
            walkable_height: s.agent_height,
            walkable_radius: s.agent_radius,
            walkable_climb: s.agent_max_climb,
            max_simplification_error: s.edge_max_error,
            max_tiles: i32::try_from(self.max_tile_layers()).unwrap_or(i32::MAX),
            max_obstacles: s.max_obstacles,
            max_rebuilds_per_update: MAX_UPDATE,
        }
    }

    /// Layout of the navigation mesh the built tiles go into
    pub fn nav_mesh_params(&self) -> NavMeshParams {
        let bits = TileIdBits::for_tile_layers(self.max_tile_layers());
        let tile_world_size = self.layout.tile_world_size();
        NavMeshParams {
            origin: self.settings.bmin,
            tile_width: tile_world_size,
            tile_height: tile_world_size,
            max_tiles: bits.max_tiles,
            max_polys: bits.max_polys_per_tile,
        }
    }

    /// Creates an empty cache sized for this build
    pub fn create_tile_cache(
        &self,
        compressor: Box<dyn TileCacheCompressor>,
        mesh_builder: Box<dyn TileMeshBuilder>,
    ) -> Result<TileCache> {
        TileCache::new(self.tile_cache_params(), compressor, mesh_builder)
    }

    /// Creates a cache and fills it with every tile column
    pub fn build(
        &self,
        rasterizer: &dyn TileLayerRasterizer,
        compressor: Box<dyn TileCacheCompressor>,
        mesh_builder: Box<dyn TileMeshBuilder>,
        nav_mesh: &mut dyn TileNavMesh,
        ctx: &mut BuildContext,
    ) -> Result<(TileCache, TileCacheBuildStats)> {
        let mut cache = self.create_tile_cache(compressor, mesh_builder)?;
        let stats = self.populate(rasterizer, &mut cache, nav_mesh, ctx)?;
        Ok((cache, stats))
    }

    /// Rasterizes, stores and builds every tile column into `cache`.
    ///
    /// Columns are encoded as soon as they are rasterized, so only one
    /// column's raw layers are alive at a time (one per worker with the
    /// `parallel` feature). Failing columns and layers are counted and
    /// skipped. The cache must use this builder's origin, cell sizes and
    /// tile size.
    pub fn populate(
        &self,
        rasterizer: &dyn TileLayerRasterizer,
        cache: &mut TileCache,
        nav_mesh: &mut dyn TileNavMesh,
        ctx: &mut BuildContext,
    ) -> Result<TileCacheBuildStats> {
        let params = cache.params();
        let s = &self.settings;
        if params.origin != s.bmin
            || params.cs != s.cell_size
            || params.ch != s.cell_height
            || params.width != s.tile_size
            || params.height != s.tile_size
        {
            return Err(Error::InvalidConfig(
                "tile cache does not match the build settings".into(),
            ));
        }
        let raw_layer_size = calc_layer_buffer_size(params.width as usize, params.height as usize);

        let mut stats = TileCacheBuildStats {
            tiles_x: self.layout.tiles_x,
            tiles_z: self.layout.tiles_z,
            ..Default::default()
        };

        ctx.start_timer(TimerCategory::Total);
        self.store_columns(rasterizer, cache, raw_layer_size, &mut stats, ctx);

        ctx.start_timer(TimerCategory::BuildNavMeshTiles);
        for (tx, ty) in self.layout.tile_coords() {
            if let Err(e) = cache.build_nav_mesh_tiles_at(tx, ty, nav_mesh) {
                ctx.log_error_with_category(
                    format!("Navigation mesh build failed: {}", e),
                    format!("tile {},{}", tx, ty),
                );
                stats.failed_mesh_columns += 1;
            }
        }
        ctx.stop_timer(TimerCategory::BuildNavMeshTiles);

        ctx.stop_timer(TimerCategory::Total);

        stats.alloc_high_water = cache.alloc().peak_usage();

        log::info!(
            "Built tile cache: {}x{} tiles, {} layers, {:.1} kB compressed ({:.1}% of raw)",
            stats.tiles_x,
            stats.tiles_z,
            stats.layer_count,
            stats.compressed_size as f32 / 1024.0,
            stats.compression_ratio() * 100.0
        );
        Ok(stats)
    }

    #[cfg(not(feature = "parallel"))]
    fn store_columns(
        &self,
        rasterizer: &dyn TileLayerRasterizer,
        cache: &mut TileCache,
        raw_layer_size: usize,
        stats: &mut TileCacheBuildStats,
        ctx: &mut BuildContext,
    ) {
        for (tx, ty) in self.layout.tile_coords() {
            ctx.start_timer(TimerCategory::RasterizeLayers);
            let config = self.raster_config.for_tile(tx, ty);
            let layers = rasterizer.rasterize_tile_layers(tx, ty, &config);
            ctx.stop_timer(TimerCategory::RasterizeLayers);

            ctx.start_timer(TimerCategory::CompressLayers);
            let column = encode_column(tx, ty, layers, cache.compressor());
            store_column(cache, column, raw_layer_size, stats, ctx);
            ctx.stop_timer(TimerCategory::CompressLayers);
        }
    }

    /// Rasterizes and encodes on the rayon pool; encoding is timed with
    /// rasterization and only compressed layers are collected.
    #[cfg(feature = "parallel")]
    fn store_columns(
        &self,
        rasterizer: &dyn TileLayerRasterizer,
        cache: &mut TileCache,
        raw_layer_size: usize,
        stats: &mut TileCacheBuildStats,
        ctx: &mut BuildContext,
    ) {
        use rayon::prelude::*;

        ctx.start_timer(TimerCategory::RasterizeLayers);
        let compressor = cache.compressor();
        let coords: Vec<_> = self.layout.tile_coords().collect();
        let columns: Vec<EncodedColumn> = coords
            .into_par_iter()
            .map(|(tx, ty)| {
                let config = self.raster_config.for_tile(tx, ty);
                let layers = rasterizer.rasterize_tile_layers(tx, ty, &config);
                encode_column(tx, ty, layers, compressor)
            })
            .collect();
        ctx.stop_timer(TimerCategory::RasterizeLayers);

        ctx.start_timer(TimerCategory::CompressLayers);
        for column in columns {
            store_column(cache, column, raw_layer_size, stats, ctx);
        }
        ctx.stop_timer(TimerCategory::CompressLayers);
    }
}

/// Encoded layers of one tile column
struct EncodedColumn {
    tx: i32,
    ty: i32,
    layers: Result<Vec<Result<Vec<u8>>>>,
    /// Layers past `MAX_LAYERS` that were dropped
    overflow: usize,
}

fn encode_column(
    tx: i32,
    ty: i32,
    layers: Result<Vec<HeightfieldLayer>>,
    compressor: &dyn TileCacheCompressor,
) -> EncodedColumn {
    let mut overflow = 0;
    let layers = layers.map(|mut layers| {
        overflow = layers.len().saturating_sub(MAX_LAYERS);
        layers.truncate(MAX_LAYERS);
        layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let header = layer.to_header(tx, ty, i as i32)?;
                build_tile_cache_layer(
                    compressor,
                    &header,
                    &layer.heights,
                    &layer.areas,
                    &layer.cons,
                )
            })
            .collect()
    });

    EncodedColumn {
        tx,
        ty,
        layers,
        overflow,
    }
}

fn store_column(
    cache: &mut TileCache,
    column: EncodedColumn,
    raw_layer_size: usize,
    stats: &mut TileCacheBuildStats,
    ctx: &mut BuildContext,
) {
    let category = format!("tile {},{}", column.tx, column.ty);
    let layers = match column.layers {
        Ok(layers) => layers,
        Err(e) => {
            ctx.log_error_with_category(format!("Rasterization failed: {}", e), category);
            stats.failed_columns += 1;
            return;
        }
    };

    if column.overflow > 0 {
        ctx.log_warning_with_category(
            format!(
                "{} layers, keeping the first {}",
                MAX_LAYERS + column.overflow,
                MAX_LAYERS
            ),
            category.as_str(),
        );
        stats.rejected_layers += column.overflow;
    }

    for (i, data) in layers.into_iter().enumerate() {
        let stored = data.and_then(|data| {
            let size = data.len();
            cache
                .add_tile(data, CompressedTileFlags::FREE_DATA)
                .map(|_| size)
        });

        match stored {
            Ok(size) => {
                stats.layer_count += 1;
                stats.compressed_size += size;
                stats.raw_size += raw_layer_size;
            }
            Err(e) => {
                ctx.log_warning_with_category(
                    format!("Layer {} rejected: {}", i, e),
                    category.as_str(),
                );
                stats.rejected_layers += 1;
            }
        }
    }
}
