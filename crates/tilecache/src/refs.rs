//! Salted references to tile and obstacle slots
//!
//! References pack a slot index and the slot's generation counter ("salt")
//! into 32 bits. A reference stays valid until its slot is released, after
//! which the bumped salt makes every outstanding copy fail validation.

use tilecache_common::{ilog2, next_pow2, Result, Status};

/// Minimum number of salt bits a tile reference must carry
pub const MIN_TILE_SALT_BITS: u32 = 10;

/// Most tile slots a store can address while keeping the minimum salt
pub const MAX_TILE_SLOTS: u32 = 1 << (32 - MIN_TILE_SALT_BITS);

/// Number of salt bits in an obstacle reference
pub const OBSTACLE_SALT_BITS: u32 = 16;

/// Number of index bits in an obstacle reference
pub const OBSTACLE_INDEX_BITS: u32 = 16;

/// Maximum number of obstacle slots addressable by a reference
pub const MAX_OBSTACLE_SLOTS: usize = (1 << OBSTACLE_INDEX_BITS) - 1;

/// Reference to a compressed tile layer stored in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct CompressedTileRef(u32);

impl CompressedTileRef {
    /// The null reference
    pub const NULL: CompressedTileRef = CompressedTileRef(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for CompressedTileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile#{:08x}", self.0)
    }
}

/// Reference to an obstacle stored in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ObstacleRef(u32);

impl ObstacleRef {
    /// The null reference
    pub const NULL: ObstacleRef = ObstacleRef(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ObstacleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obstacle#{:08x}", self.0)
    }
}

/// Bit layout of tile references for a given slot capacity
///
/// The low `tile_bits` bits hold the slot index, the next `salt_bits` bits
/// hold the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRefCodec {
    tile_bits: u32,
    salt_bits: u32,
}

impl TileRefCodec {
    /// Derives the layout for a store holding at most `max_tiles` slots.
    ///
    /// Fails with [`Status::InvalidParam`] when there are no slots or when the
    /// index would leave fewer than [`MIN_TILE_SALT_BITS`] bits for the salt.
    pub fn for_max_tiles(max_tiles: u32) -> Result<Self> {
        if max_tiles == 0 {
            return Err(Status::InvalidParam.into());
        }

        let tile_bits = ilog2(next_pow2(max_tiles));
        let salt_bits = (32 - tile_bits).min(31);
        if salt_bits < MIN_TILE_SALT_BITS {
            return Err(Status::InvalidParam.into());
        }

        Ok(Self {
            tile_bits,
            salt_bits,
        })
    }

    pub fn tile_bits(&self) -> u32 {
        self.tile_bits
    }

    pub fn salt_bits(&self) -> u32 {
        self.salt_bits
    }

    fn tile_mask(&self) -> u32 {
        (1u32 << self.tile_bits) - 1
    }

    fn salt_mask(&self) -> u32 {
        (1u32 << self.salt_bits) - 1
    }

    /// Packs a salt and slot index into a reference
    pub fn encode(&self, salt: u32, index: usize) -> CompressedTileRef {
        let salt = salt & self.salt_mask();
        let index = index as u32 & self.tile_mask();
        CompressedTileRef((salt << self.tile_bits) | index)
    }

    pub fn decode_salt(&self, tile_ref: CompressedTileRef) -> u32 {
        (tile_ref.0 >> self.tile_bits) & self.salt_mask()
    }

    pub fn decode_index(&self, tile_ref: CompressedTileRef) -> usize {
        (tile_ref.0 & self.tile_mask()) as usize
    }

    /// Next generation for a released slot, wrapping within the salt width
    /// and skipping zero.
    pub fn next_salt(&self, salt: u32) -> u32 {
        let next = salt.wrapping_add(1) & self.salt_mask();
        if next == 0 {
            1
        } else {
            next
        }
    }
}

/// Packs an obstacle salt and slot index into a reference
pub fn encode_obstacle_ref(salt: u16, index: usize) -> ObstacleRef {
    ObstacleRef(((salt as u32) << OBSTACLE_INDEX_BITS) | (index as u32 & 0xffff))
}

pub fn decode_obstacle_salt(obstacle_ref: ObstacleRef) -> u16 {
    (obstacle_ref.0 >> OBSTACLE_INDEX_BITS) as u16
}

pub fn decode_obstacle_index(obstacle_ref: ObstacleRef) -> usize {
    (obstacle_ref.0 & 0xffff) as usize
}

/// Next obstacle generation, skipping zero
pub fn next_obstacle_salt(salt: u16) -> u16 {
    match salt.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}
