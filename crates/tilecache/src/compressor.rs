//! Pluggable compression of tile layer grids

use tilecache_common::{Result, Status};

/// Compresses and decompresses the grid payload of a tile layer
///
/// Implementations write into caller-provided buffers so the engine can draw
/// scratch memory from its allocator. Bulk builds may encode tile columns on
/// several threads at once.
pub trait TileCacheCompressor: Send + Sync {
    /// Upper bound on the compressed size of `buffer_size` input bytes
    fn max_compressed_size(&self, buffer_size: usize) -> usize;

    /// Compresses `buffer` into `compressed`, returning the bytes written
    fn compress(&self, buffer: &[u8], compressed: &mut [u8]) -> Result<usize>;

    /// Decompresses `compressed` into `buffer`, returning the bytes written
    fn decompress(&self, compressed: &[u8], buffer: &mut [u8]) -> Result<usize>;
}

/// LZ4 block compressor implementation using lz4_flex
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

impl TileCacheCompressor for Lz4Compressor {
    fn max_compressed_size(&self, buffer_size: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(buffer_size)
    }

    fn compress(&self, buffer: &[u8], compressed: &mut [u8]) -> Result<usize> {
        lz4_flex::block::compress_into(buffer, compressed).map_err(|e| {
            log::error!("LZ4 compression failed: {:?}", e);
            Status::BufferTooSmall.into()
        })
    }

    fn decompress(&self, compressed: &[u8], buffer: &mut [u8]) -> Result<usize> {
        lz4_flex::block::decompress_into(compressed, buffer).map_err(|e| {
            log::error!("LZ4 decompression failed: {:?}", e);
            Status::DataCorrupted.into()
        })
    }
}

/// Stores grids uncompressed
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCompressor;

impl TileCacheCompressor for PassthroughCompressor {
    fn max_compressed_size(&self, buffer_size: usize) -> usize {
        buffer_size
    }

    fn compress(&self, buffer: &[u8], compressed: &mut [u8]) -> Result<usize> {
        let dst = compressed
            .get_mut(..buffer.len())
            .ok_or(Status::BufferTooSmall)?;
        dst.copy_from_slice(buffer);
        Ok(buffer.len())
    }

    fn decompress(&self, compressed: &[u8], buffer: &mut [u8]) -> Result<usize> {
        let dst = buffer
            .get_mut(..compressed.len())
            .ok_or(Status::DataCorrupted)?;
        dst.copy_from_slice(compressed);
        Ok(compressed.len())
    }
}
