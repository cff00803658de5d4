//! Slot storage and spatial lookup for compressed tile layers
//!
//! Tiles live in a fixed array of slots. Free slots form an intrusive
//! freelist, occupied slots are chained into a small hash table keyed by
//! tile column so every layer at (tx, ty) can be found without a scan.

use bitflags::bitflags;
use tilecache_common::{overlap_bounds, Result, Status};

use crate::layer::TileCacheLayerHeader;
use crate::refs::{CompressedTileRef, TileRefCodec};

bitflags! {
    /// Ownership flags for stored tile data
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompressedTileFlags: u8 {
        /// The cache owns the data and drops it when the tile is removed
        const FREE_DATA = 0x01;
    }
}

/// A stored tile layer
#[derive(Debug, Clone)]
pub struct CompressedTile {
    salt: u32,
    header: Option<TileCacheLayerHeader>,
    data: Vec<u8>,
    flags: CompressedTileFlags,
    /// Next slot in the hash chain or the freelist
    next: Option<usize>,
}

impl CompressedTile {
    fn empty(next: Option<usize>) -> Self {
        Self {
            salt: 1,
            header: None,
            data: Vec::new(),
            flags: CompressedTileFlags::empty(),
            next,
        }
    }

    pub fn salt(&self) -> u32 {
        self.salt
    }

    /// Header of the stored layer, `None` for a free slot
    pub fn header(&self) -> Option<&TileCacheLayerHeader> {
        self.header.as_ref()
    }

    /// Full stored layer: padded header followed by the compressed grids
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn flags(&self) -> CompressedTileFlags {
        self.flags
    }

    pub fn is_occupied(&self) -> bool {
        self.header.is_some()
    }
}

fn compute_tile_hash(x: i32, y: i32, mask: usize) -> usize {
    const H1: u32 = 0x8da6_b343;
    const H2: u32 = 0xd816_3841;
    let n = H1.wrapping_mul(x as u32).wrapping_add(H2.wrapping_mul(y as u32));
    n as usize & mask
}

/// Computes the bounds of the occupied part of a layer.
///
/// The horizontal extent shrinks to the `minx..=maxx` / `miny..=maxy` cell
/// rectangle, the vertical extent is taken from the header as is.
pub fn calc_tight_tile_bounds(header: &TileCacheLayerHeader, cs: f32) -> ([f32; 3], [f32; 3]) {
    let bmin = [
        header.bmin[0] + header.minx as f32 * cs,
        header.bmin[1],
        header.bmin[2] + header.miny as f32 * cs,
    ];
    let bmax = [
        header.bmin[0] + (header.maxx as f32 + 1.0) * cs,
        header.bmax[1],
        header.bmin[2] + (header.maxy as f32 + 1.0) * cs,
    ];
    (bmin, bmax)
}

/// Fixed-capacity tile storage with salted references
#[derive(Debug)]
pub struct TileStore {
    tiles: Vec<CompressedTile>,
    pos_lookup: Vec<Option<usize>>,
    lut_mask: usize,
    next_free: Option<usize>,
    codec: TileRefCodec,
    cs: f32,
    count: usize,
}

impl TileStore {
    /// Creates a store with `max_tiles` slots for layers of cell size `cs`
    pub fn new(max_tiles: usize, cs: f32) -> Result<Self> {
        let capacity = u32::try_from(max_tiles).map_err(|_| Status::InvalidParam)?;
        let codec = TileRefCodec::for_max_tiles(capacity)?;

        let lut_size = tilecache_common::next_pow2(capacity / 4) as usize;

        // Slot 0 heads the freelist
        let tiles = (0..max_tiles)
            .map(|i| CompressedTile::empty(if i + 1 < max_tiles { Some(i + 1) } else { None }))
            .collect();

        Ok(Self {
            tiles,
            pos_lookup: vec![None; lut_size],
            lut_mask: lut_size - 1,
            next_free: Some(0),
            codec,
            cs,
            count: 0,
        })
    }

    pub fn codec(&self) -> &TileRefCodec {
        &self.codec
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.tiles.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slot at `index`, occupied or not
    pub fn tile(&self, index: usize) -> Option<&CompressedTile> {
        self.tiles.get(index)
    }

    /// Reference to the occupied slot at `index`
    pub fn tile_ref(&self, index: usize) -> Option<CompressedTileRef> {
        let tile = self.tiles.get(index)?;
        tile.is_occupied()
            .then(|| self.codec.encode(tile.salt, index))
    }

    /// Validates a reference and returns its slot index
    pub fn index_of(&self, tile_ref: CompressedTileRef) -> Result<usize> {
        let index = self.codec.decode_index(tile_ref);
        let salt = self.codec.decode_salt(tile_ref);
        match self.tiles.get(index) {
            Some(tile) if tile.is_occupied() && tile.salt == salt => Ok(index),
            _ => Err(Status::InvalidParam.into()),
        }
    }

    pub fn get_tile_by_ref(&self, tile_ref: CompressedTileRef) -> Option<&CompressedTile> {
        self.index_of(tile_ref).ok().map(|i| &self.tiles[i])
    }

    /// Adds a stored layer and returns its reference.
    ///
    /// On failure the store is left unchanged and `data` is dropped.
    pub fn add_tile(
        &mut self,
        data: Vec<u8>,
        flags: CompressedTileFlags,
    ) -> Result<CompressedTileRef> {
        let header = TileCacheLayerHeader::from_bytes(&data)?;

        if self.find_tile(header.tx, header.ty, header.tlayer).is_some() {
            return Err(Status::AlreadyExists.into());
        }

        let index = self.next_free.ok_or(Status::OutOfMemory)?;
        let bucket = compute_tile_hash(header.tx, header.ty, self.lut_mask);

        let tile = &mut self.tiles[index];
        self.next_free = tile.next;
        tile.header = Some(header);
        tile.data = data;
        tile.flags = flags;
        tile.next = None;
        let salt = tile.salt;

        // Append to the chain tail so layers come back in insertion order
        match self.pos_lookup[bucket] {
            None => self.pos_lookup[bucket] = Some(index),
            Some(mut cur) => {
                while let Some(next) = self.tiles[cur].next {
                    cur = next;
                }
                self.tiles[cur].next = Some(index);
            }
        }

        self.count += 1;
        Ok(self.codec.encode(salt, index))
    }

    /// Removes a tile, handing back data the cache does not own.
    pub fn remove_tile(&mut self, tile_ref: CompressedTileRef) -> Result<Option<Vec<u8>>> {
        let index = self.index_of(tile_ref)?;
        let header = self.tiles[index].header.ok_or(Status::InvalidParam)?;

        // Unlink from the hash chain
        let bucket = compute_tile_hash(header.tx, header.ty, self.lut_mask);
        let mut prev: Option<usize> = None;
        let mut cur = self.pos_lookup[bucket];
        while let Some(i) = cur {
            if i == index {
                let next = self.tiles[i].next;
                match prev {
                    Some(p) => self.tiles[p].next = next,
                    None => self.pos_lookup[bucket] = next,
                }
                break;
            }
            prev = cur;
            cur = self.tiles[i].next;
        }

        let next_salt = self.codec.next_salt(self.tiles[index].salt);
        let tile = &mut self.tiles[index];
        let data = std::mem::take(&mut tile.data);
        let flags = tile.flags;
        tile.header = None;
        tile.flags = CompressedTileFlags::empty();
        tile.salt = next_salt;
        tile.next = self.next_free;
        self.next_free = Some(index);
        self.count -= 1;

        if flags.contains(CompressedTileFlags::FREE_DATA) {
            Ok(None)
        } else {
            Ok(Some(data))
        }
    }

    fn find_tile(&self, tx: i32, ty: i32, tlayer: i32) -> Option<usize> {
        let mut cur = self.pos_lookup[compute_tile_hash(tx, ty, self.lut_mask)];
        while let Some(i) = cur {
            let tile = &self.tiles[i];
            if let Some(h) = &tile.header {
                if h.tx == tx && h.ty == ty && h.tlayer == tlayer {
                    return Some(i);
                }
            }
            cur = tile.next;
        }
        None
    }

    /// Finds the layer at an exact tile location
    pub fn get_tile_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<&CompressedTile> {
        self.find_tile(tx, ty, tlayer).map(|i| &self.tiles[i])
    }

    pub fn get_tile_ref_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<CompressedTileRef> {
        self.find_tile(tx, ty, tlayer)
            .map(|i| self.codec.encode(self.tiles[i].salt, i))
    }

    /// All layers of a tile column in insertion order, at most `max_tiles`
    pub fn get_tiles_at(&self, tx: i32, ty: i32, max_tiles: usize) -> Vec<CompressedTileRef> {
        let mut result = Vec::new();
        let mut cur = self.pos_lookup[compute_tile_hash(tx, ty, self.lut_mask)];
        while let Some(i) = cur {
            if result.len() >= max_tiles {
                break;
            }
            let tile = &self.tiles[i];
            if let Some(h) = &tile.header {
                if h.tx == tx && h.ty == ty {
                    result.push(self.codec.encode(tile.salt, i));
                }
            }
            cur = tile.next;
        }
        result
    }

    /// Tiles whose tight bounds overlap the query box, in storage order.
    ///
    /// Stops silently after `max_results` hits.
    pub fn query_tiles(
        &self,
        bmin: &[f32; 3],
        bmax: &[f32; 3],
        max_results: usize,
    ) -> Vec<CompressedTileRef> {
        let mut result = Vec::new();
        for (i, tile) in self.tiles.iter().enumerate() {
            if result.len() >= max_results {
                break;
            }
            let Some(header) = &tile.header else {
                continue;
            };
            let (tbmin, tbmax) = calc_tight_tile_bounds(header, self.cs);
            if overlap_bounds(bmin, bmax, &tbmin, &tbmax) {
                result.push(self.codec.encode(tile.salt, i));
            }
        }
        result
    }

    /// Iterates over occupied slots with their references
    pub fn iter(&self) -> impl Iterator<Item = (CompressedTileRef, &CompressedTile)> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_occupied())
            .map(|(i, t)| (self.codec.encode(t.salt, i), t))
    }
}
