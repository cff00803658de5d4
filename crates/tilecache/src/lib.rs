//! Compressed tile layer cache with dynamic obstacles and incremental rebuilds
//!
//! This crate stores a navigation world as compressed per-tile layers and
//! lets temporary obstacles be added and removed at runtime. Affected tiles
//! are decompressed, carved and rebuilt a bounded number at a time, then
//! swapped into a host navigation mesh.
//!
//! # Features
//!
//! - **Tile Storage**: Salted references and a spatial hash over tile layers
//! - **Dynamic Obstacles**: Cylinder, box, and oriented box obstacles
//! - **Incremental Updates**: Bounded work per [`TileCache::update`] call
//! - **Compression**: LZ4 block compression through a pluggable codec
//! - **Bulk Build**: Rasterize, compress and build a whole world at once
//!
//! # Example
//!
//! ```rust,ignore
//! use tilecache::{Lz4Compressor, TileCache, TileCacheParams};
//!
//! let params = TileCacheParams::default()
//!     .with_cell_size(0.3, 0.2)
//!     .with_tile_size(48, 48);
//! let mut cache = TileCache::new(params, Box::new(Lz4Compressor), Box::new(my_mesh_builder))?;
//!
//! for data in stored_layers {
//!     cache.add_tile(data, CompressedTileFlags::FREE_DATA)?;
//! }
//!
//! let obstacle = cache.add_obstacle([10.0, 0.0, 10.0], 1.0, 2.0)?;
//! while !cache.update(dt, &mut nav_mesh).up_to_date {}
//!
//! cache.remove_obstacle(obstacle)?;
//! cache.update(dt, &mut nav_mesh);
//! ```
//!
//! # Architecture
//!
//! - [`TileCache`]: tile and obstacle stores, request queue and worklist
//! - [`TileCacheBuilder`]: bulk build from a [`TileLayerRasterizer`]
//! - [`TileNavMesh`], [`TileMeshBuilder`], [`TileCacheCompressor`],
//!   [`TileCacheAlloc`]: seams to the host's collaborators

pub mod alloc;
pub mod carve;
pub mod compressor;
pub mod context;
pub mod layer;
pub mod mesh;
pub mod obstacle;
mod pipeline;
pub mod refs;
pub mod request_queue;
mod scheduler;
pub mod tile_cache;
pub mod tile_cache_builder;
pub mod tile_cache_integration;
pub mod tile_store;
pub mod tiling;
pub mod worklist;

#[cfg(test)]
mod test_helpers;
#[cfg(test)]
mod tile_cache_scenario_tests;

pub use alloc::*;
pub use carve::*;
pub use compressor::*;
pub use context::*;
pub use layer::*;
pub use mesh::*;
pub use obstacle::*;
pub use refs::*;
pub use request_queue::*;
pub use scheduler::UpdateOutcome;
pub use tile_cache::*;
pub use tile_cache_builder::*;
pub use tile_cache_integration::*;
pub use tile_store::*;
pub use tiling::*;
pub use worklist::*;

pub use tilecache_common::{Error, Result, Status};
