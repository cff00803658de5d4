//! Compressed tile layer format
//!
//! A stored layer is a little-endian header padded to a 4-byte boundary,
//! followed by the compressed concatenation of the height, area and
//! connection grids. The header stays uncompressed so the store can index a
//! tile without decompressing it.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tilecache_common::{align4, Error, Result, Status};

use crate::alloc::TileCacheAlloc;
use crate::compressor::TileCacheCompressor;

/// Magic number for tile cache layer data ('DTLR')
pub const TILECACHE_MAGIC: u32 =
    (b'D' as u32) << 24 | (b'T' as u32) << 16 | (b'L' as u32) << 8 | b'R' as u32;

/// Version number for tile cache layer data
pub const TILECACHE_VERSION: u32 = 1;

/// Size of the serialized layer header in bytes
pub const LAYER_HEADER_SIZE: usize = 54;

/// Offset of the compressed payload within a stored layer
pub const LAYER_HEADER_STRIDE: usize = (LAYER_HEADER_SIZE + 3) & !3;

/// Area id written into carved cells
pub const TILECACHE_NULL_AREA: u8 = 0;

/// Area id of plain walkable cells
pub const TILECACHE_WALKABLE_AREA: u8 = 63;

/// Height value marking a cell without any span
pub const TILECACHE_NULL_HEIGHT: u8 = 0xff;

/// Tile cache layer header
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileCacheLayerHeader {
    /// Magic number for validation
    pub magic: u32,
    /// Version of the layer format
    pub version: u32,
    /// Tile position X
    pub tx: i32,
    /// Tile position Y
    pub ty: i32,
    /// Layer index within the tile column
    pub tlayer: i32,
    /// Bounding box minimum
    pub bmin: [f32; 3],
    /// Bounding box maximum
    pub bmax: [f32; 3],
    /// Lowest height in the layer (in cells)
    pub hmin: u16,
    /// Highest height in the layer (in cells)
    pub hmax: u16,
    /// Width of the layer grid (in cells)
    pub width: u8,
    /// Height of the layer grid (in cells)
    pub height: u8,
    /// Occupied sub-rectangle, inclusive
    pub minx: u8,
    pub maxx: u8,
    pub miny: u8,
    pub maxy: u8,
}

impl Default for TileCacheLayerHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl TileCacheLayerHeader {
    /// Creates a new header with the current magic and version
    pub fn new() -> Self {
        Self {
            magic: TILECACHE_MAGIC,
            version: TILECACHE_VERSION,
            tx: 0,
            ty: 0,
            tlayer: 0,
            bmin: [0.0; 3],
            bmax: [0.0; 3],
            hmin: 0,
            hmax: 0,
            width: 0,
            height: 0,
            minx: 0,
            maxx: 0,
            miny: 0,
            maxy: 0,
        }
    }

    /// Validates magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != TILECACHE_MAGIC {
            return Err(Status::WrongMagic.into());
        }
        if self.version != TILECACHE_VERSION {
            return Err(Status::WrongVersion.into());
        }
        Ok(())
    }

    /// Number of cells in each grid of the layer
    pub fn grid_size(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Writes the header to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.tx)?;
        writer.write_i32::<LittleEndian>(self.ty)?;
        writer.write_i32::<LittleEndian>(self.tlayer)?;
        for v in self.bmin.iter().chain(self.bmax.iter()) {
            writer.write_f32::<LittleEndian>(*v)?;
        }
        writer.write_u16::<LittleEndian>(self.hmin)?;
        writer.write_u16::<LittleEndian>(self.hmax)?;
        writer.write_all(&[
            self.width,
            self.height,
            self.minx,
            self.maxx,
            self.miny,
            self.maxy,
        ])?;
        Ok(())
    }

    /// Reads a header from a reader without validating it
    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        let version = reader.read_u32::<LittleEndian>()?;
        let tx = reader.read_i32::<LittleEndian>()?;
        let ty = reader.read_i32::<LittleEndian>()?;
        let tlayer = reader.read_i32::<LittleEndian>()?;

        let mut bmin = [0.0f32; 3];
        for v in &mut bmin {
            *v = reader.read_f32::<LittleEndian>()?;
        }
        let mut bmax = [0.0f32; 3];
        for v in &mut bmax {
            *v = reader.read_f32::<LittleEndian>()?;
        }

        let hmin = reader.read_u16::<LittleEndian>()?;
        let hmax = reader.read_u16::<LittleEndian>()?;
        let mut dims = [0u8; 6];
        reader.read_exact(&mut dims)?;

        Ok(Self {
            magic,
            version,
            tx,
            ty,
            tlayer,
            bmin,
            bmax,
            hmin,
            hmax,
            width: dims[0],
            height: dims[1],
            minx: dims[2],
            maxx: dims[3],
            miny: dims[4],
            maxy: dims[5],
        })
    }

    /// Serializes the header, padded to [`LAYER_HEADER_STRIDE`] bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(LAYER_HEADER_STRIDE);
        self.write_to(&mut bytes).map_err(Status::from)?;
        bytes.resize(LAYER_HEADER_STRIDE, 0);
        Ok(bytes)
    }

    /// Parses and validates the header at the start of a stored layer
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LAYER_HEADER_SIZE {
            return Err(Status::DataCorrupted.into());
        }
        let header = Self::read_from(&mut Cursor::new(data)).map_err(Status::from)?;
        header.validate()?;
        Ok(header)
    }
}

/// Size of an uncompressed layer buffer for a `width` x `height` grid
pub fn calc_layer_buffer_size(width: usize, height: usize) -> usize {
    align4(LAYER_HEADER_SIZE) + width * height * 4
}

/// Decompressed tile layer
///
/// The three grids share one allocation drawn from the rebuild allocator;
/// give it back with [`TileCacheLayer::into_grids`].
#[derive(Debug, Clone)]
pub struct TileCacheLayer {
    /// Header information
    pub header: TileCacheLayerHeader,
    grids: Vec<u8>,
}

impl TileCacheLayer {
    /// Wraps a grid buffer holding heights, areas and cons back to back.
    pub fn from_grids(header: TileCacheLayerHeader, grids: Vec<u8>) -> Result<Self> {
        if grids.len() < header.grid_size() * 3 {
            return Err(Status::InvalidParam.into());
        }
        Ok(Self { header, grids })
    }

    pub fn width(&self) -> usize {
        self.header.width as usize
    }

    pub fn height(&self) -> usize {
        self.header.height as usize
    }

    pub fn heights(&self) -> &[u8] {
        let n = self.header.grid_size();
        &self.grids[..n]
    }

    pub fn areas(&self) -> &[u8] {
        let n = self.header.grid_size();
        &self.grids[n..n * 2]
    }

    pub fn cons(&self) -> &[u8] {
        let n = self.header.grid_size();
        &self.grids[n * 2..n * 3]
    }

    pub fn areas_mut(&mut self) -> &mut [u8] {
        let n = self.header.grid_size();
        &mut self.grids[n..n * 2]
    }

    /// Heights for reading alongside areas for carving
    pub fn heights_and_areas_mut(&mut self) -> (&[u8], &mut [u8]) {
        let n = self.header.grid_size();
        let (heights, rest) = self.grids.split_at_mut(n);
        (heights, &mut rest[..n])
    }

    /// Releases the layer, returning its grid buffer
    pub fn into_grids(self) -> Vec<u8> {
        self.grids
    }
}

/// Raw layer produced by the rasterizer for one vertical band of a tile
#[derive(Debug, Clone, Default)]
pub struct HeightfieldLayer {
    /// Bounds in world space
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Grid dimensions in cells
    pub width: i32,
    pub height: i32,
    /// Occupied sub-rectangle, inclusive
    pub minx: i32,
    pub maxx: i32,
    pub miny: i32,
    pub maxy: i32,
    /// Height range in cells
    pub hmin: i32,
    pub hmax: i32,
    pub heights: Vec<u8>,
    pub areas: Vec<u8>,
    pub cons: Vec<u8>,
}

impl HeightfieldLayer {
    /// Builds the stored header for this layer at the given tile location.
    ///
    /// Dimensions must fit the header's byte-sized fields.
    pub fn to_header(&self, tx: i32, ty: i32, tlayer: i32) -> Result<TileCacheLayerHeader> {
        let byte = |v: i32| u8::try_from(v).map_err(|_| Error::from(Status::InvalidParam));
        let word = |v: i32| u16::try_from(v).map_err(|_| Error::from(Status::InvalidParam));

        Ok(TileCacheLayerHeader {
            tx,
            ty,
            tlayer,
            bmin: self.bmin,
            bmax: self.bmax,
            hmin: word(self.hmin)?,
            hmax: word(self.hmax)?,
            width: byte(self.width)?,
            height: byte(self.height)?,
            minx: byte(self.minx)?,
            maxx: byte(self.maxx)?,
            miny: byte(self.miny)?,
            maxy: byte(self.maxy)?,
            ..TileCacheLayerHeader::new()
        })
    }
}

/// Encodes a layer into its stored form.
///
/// Each grid must hold exactly `width * height` cells.
pub fn build_tile_cache_layer(
    comp: &dyn TileCacheCompressor,
    header: &TileCacheLayerHeader,
    heights: &[u8],
    areas: &[u8],
    cons: &[u8],
) -> Result<Vec<u8>> {
    let grid_size = header.grid_size();
    if heights.len() != grid_size || areas.len() != grid_size || cons.len() != grid_size {
        return Err(Status::InvalidParam.into());
    }

    let mut buffer = Vec::with_capacity(grid_size * 3);
    buffer.extend_from_slice(heights);
    buffer.extend_from_slice(areas);
    buffer.extend_from_slice(cons);

    let max_compressed = comp.max_compressed_size(buffer.len());
    let mut data = header.to_bytes()?;
    data.resize(LAYER_HEADER_STRIDE + max_compressed, 0);

    let compressed_size = comp.compress(&buffer, &mut data[LAYER_HEADER_STRIDE..])?;
    data.truncate(LAYER_HEADER_STRIDE + compressed_size);

    Ok(data)
}

/// Decodes a stored layer into grids drawn from `alloc`.
pub fn decompress_tile_cache_layer(
    alloc: &mut dyn TileCacheAlloc,
    comp: &dyn TileCacheCompressor,
    data: &[u8],
) -> Result<TileCacheLayer> {
    let header = TileCacheLayerHeader::from_bytes(data)?;
    let payload = data
        .get(LAYER_HEADER_STRIDE..)
        .ok_or(Status::DataCorrupted)?;

    let expected = header.grid_size() * 3;
    let mut grids = alloc.alloc(expected).ok_or(Status::OutOfMemory)?;

    match comp.decompress(payload, &mut grids) {
        Ok(n) if n == expected => TileCacheLayer::from_grids(header, grids),
        Ok(n) => {
            log::error!(
                "Layer ({}, {}, {}) decompressed to {} bytes, expected {}",
                header.tx,
                header.ty,
                header.tlayer,
                n,
                expected
            );
            alloc.free(grids);
            Err(Status::DataCorrupted.into())
        }
        Err(e) => {
            alloc.free(grids);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{HeapAlloc, LinearAlloc};
    use crate::compressor::{Lz4Compressor, PassthroughCompressor};

    fn header_4x3() -> TileCacheLayerHeader {
        TileCacheLayerHeader {
            tx: 2,
            ty: -1,
            tlayer: 1,
            bmin: [1.0, 2.0, 3.0],
            bmax: [5.0, 4.0, 6.0],
            hmin: 0,
            hmax: 10,
            width: 4,
            height: 3,
            minx: 0,
            maxx: 3,
            miny: 1,
            maxy: 2,
            ..TileCacheLayerHeader::new()
        }
    }

    #[test]
    fn test_magic_spells_dtlr() {
        assert_eq!(TILECACHE_MAGIC, 0x4454_4C52);
        assert_eq!(LAYER_HEADER_STRIDE, 56);
        assert_eq!(calc_layer_buffer_size(4, 3), 56 + 48);
    }

    #[test]
    fn test_header_layout() {
        let header = header_4x3();
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), LAYER_HEADER_STRIDE);
        assert_eq!(&bytes[LAYER_HEADER_SIZE..], &[0, 0]);
        assert_eq!(&bytes[0..4], &TILECACHE_MAGIC.to_le_bytes());
        assert_eq!(&bytes[12..16], &(-1i32).to_le_bytes());
        // width/height follow hmin/hmax
        assert_eq!(bytes[48], 4);
        assert_eq!(bytes[49], 3);
        assert_eq!(bytes[53], 2);

        let parsed = TileCacheLayerHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_write_into_short_buffer_fails() {
        let mut short = [0u8; LAYER_HEADER_SIZE - 1];
        let err = header_4x3()
            .write_to(&mut Cursor::new(&mut short[..]))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WriteZero);
        assert_eq!(Status::from(err), Status::Failure);
    }

    #[test]
    fn test_header_rejects_bad_magic_and_version() {
        let mut header = header_4x3();
        header.magic = 0x1234_5678;
        let err = TileCacheLayerHeader::from_bytes(&header.to_bytes().unwrap()).unwrap_err();
        assert_eq!(err.status(), Status::WrongMagic);

        let mut header = header_4x3();
        header.version = 7;
        let err = TileCacheLayerHeader::from_bytes(&header.to_bytes().unwrap()).unwrap_err();
        assert_eq!(err.status(), Status::WrongVersion);

        let err = TileCacheLayerHeader::from_bytes(&[0u8; 20]).unwrap_err();
        assert_eq!(err.status(), Status::DataCorrupted);
    }

    #[test]
    fn test_build_and_decompress_layer() {
        let header = header_4x3();
        let heights: Vec<u8> = (0..12).collect();
        let areas = vec![TILECACHE_WALKABLE_AREA; 12];
        let cons = vec![0x0f; 12];

        for comp in [&Lz4Compressor as &dyn TileCacheCompressor, &PassthroughCompressor] {
            let data = build_tile_cache_layer(comp, &header, &heights, &areas, &cons).unwrap();
            let mut alloc = HeapAlloc;
            let layer = decompress_tile_cache_layer(&mut alloc, comp, &data).unwrap();

            assert_eq!(layer.header, header);
            assert_eq!(layer.heights(), &heights[..]);
            assert_eq!(layer.areas(), &areas[..]);
            assert_eq!(layer.cons(), &cons[..]);
        }
    }

    #[test]
    fn test_build_rejects_mismatched_grids() {
        let header = header_4x3();
        let err = build_tile_cache_layer(&Lz4Compressor, &header, &[0; 11], &[0; 12], &[0; 12])
            .unwrap_err();
        assert_eq!(err.status(), Status::InvalidParam);
    }

    #[test]
    fn test_decompress_reports_allocator_exhaustion() {
        let header = header_4x3();
        let data =
            build_tile_cache_layer(&Lz4Compressor, &header, &[1; 12], &[2; 12], &[3; 12]).unwrap();

        let mut alloc = LinearAlloc::new(16);
        let err = decompress_tile_cache_layer(&mut alloc, &Lz4Compressor, &data).unwrap_err();
        assert_eq!(err.status(), Status::OutOfMemory);
    }

    #[test]
    fn test_decompress_truncated_payload() {
        let header = header_4x3();
        let data = build_tile_cache_layer(&PassthroughCompressor, &header, &[1; 12], &[2; 12], &[3; 12])
            .unwrap();

        let err = decompress_tile_cache_layer(&mut HeapAlloc, &PassthroughCompressor, &data[..60])
            .unwrap_err();
        assert!(err.status().is_corrupt_data());
    }

    #[test]
    fn test_carving_view_splits_grids() {
        let header = header_4x3();
        let mut grids = vec![0u8; 36];
        grids[..12].fill(5);
        let mut layer = TileCacheLayer::from_grids(header, grids).unwrap();
        {
            let (heights, areas) = layer.heights_and_areas_mut();
            assert_eq!(heights.len(), 12);
            areas[0] = 9;
        }
        assert_eq!(layer.areas()[0], 9);
        assert_eq!(layer.heights()[0], 5);
        assert_eq!(layer.into_grids().len(), 36);
    }

    #[test]
    fn test_heightfield_layer_header_range() {
        let raw = HeightfieldLayer {
            width: 300,
            height: 4,
            ..Default::default()
        };
        assert_eq!(
            raw.to_header(0, 0, 0).unwrap_err().status(),
            Status::InvalidParam
        );

        let raw = HeightfieldLayer {
            width: 48,
            height: 48,
            maxx: 47,
            maxy: 47,
            hmax: 20,
            ..Default::default()
        };
        let header = raw.to_header(3, 4, 1).unwrap();
        assert_eq!((header.tx, header.ty, header.tlayer), (3, 4, 1));
        assert_eq!(header.grid_size(), 48 * 48);
        assert!(header.validate().is_ok());
    }
}
