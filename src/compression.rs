//! Block compression for buffer export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Zstd compression level used for exports
pub const ZSTD_LEVEL: i32 = 3;

/// One-shot block codec
///
/// Compression writes into a caller-provided buffer of at least
/// [`max_compressed_len`](BlockCodec::max_compressed_len) bytes.
pub trait BlockCodec {
    /// Worst-case output size for `len` input bytes
    fn max_compressed_len(&self, len: usize) -> usize;

    /// Compress `src` into `dst`, returning the number of bytes written
    fn compress_into(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;

    /// Restore the original bytes
    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>>;
}

/// Compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    None,
    #[default]
    Zstd,
}

impl BlockCodec for CompressionAlgorithm {
    fn max_compressed_len(&self, len: usize) -> usize {
        match self {
            CompressionAlgorithm::None => len,
            CompressionAlgorithm::Zstd => zstd::zstd_safe::compress_bound(len),
        }
    }

    fn compress_into(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        match self {
            CompressionAlgorithm::None => {
                if dst.len() < src.len() {
                    return Err(Error::Compression(format!(
                        "Output buffer of {} bytes cannot hold {} bytes",
                        dst.len(),
                        src.len()
                    )));
                }
                dst[..src.len()].copy_from_slice(src);
                Ok(src.len())
            }
            CompressionAlgorithm::Zstd => zstd::bulk::compress_to_buffer(src, dst, ZSTD_LEVEL)
                .map_err(|e| Error::Compression(format!("Failed to compress: {}", e))),
        }
    }

    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionAlgorithm::None => Ok(src.to_vec()),
            CompressionAlgorithm::Zstd => zstd::decode_all(src)
                .map_err(|e| Error::Compression(format!("Failed to decompress: {}", e))),
        }
    }
}

/// Compress data with the given codec
///
/// Sizes the output for the worst case, compresses, then truncates to the
/// actual length.
pub fn compress<C: BlockCodec + ?Sized>(data: &[u8], codec: &C) -> Result<Vec<u8>> {
    let bound = codec.max_compressed_len(data.len());
    let mut output = vec![0u8; bound];
    let written = codec.compress_into(data, &mut output)?;
    output.truncate(written);
    Ok(output)
}

/// Decompress data with the given codec
pub fn decompress<C: BlockCodec + ?Sized>(data: &[u8], codec: &C) -> Result<Vec<u8>> {
    codec.decompress(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_codec_fills_exact_bound() -> Result<()> {
        let src = [0x93u8, 0x01, 0xA3, b'a', b'b', b'c'];
        let mut dst = [0u8; 6];
        assert_eq!(CompressionAlgorithm::None.max_compressed_len(src.len()), 6);
        assert_eq!(CompressionAlgorithm::None.compress_into(&src, &mut dst)?, 6);
        assert_eq!(dst, src);
        assert_eq!(decompress(&dst, &CompressionAlgorithm::None)?, src);
        Ok(())
    }

    #[test]
    fn test_compression_zstd() -> Result<()> {
        let data = b"Hello, World! This is a test of zstd compression. ".repeat(10);
        let compressed = compress(&data, &CompressionAlgorithm::Zstd)?;

        // Compression should reduce size for repetitive data
        assert!(compressed.len() < data.len());
        assert!(compressed.len() <= CompressionAlgorithm::Zstd.max_compressed_len(data.len()));

        let decompressed = decompress(&compressed, &CompressionAlgorithm::Zstd)?;
        assert_eq!(decompressed, data);
        Ok(())
    }

    #[test]
    fn test_compression_empty_input() -> Result<()> {
        let compressed = compress(b"", &CompressionAlgorithm::Zstd)?;
        assert!(decompress(&compressed, &CompressionAlgorithm::Zstd)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_undersized_output_is_an_error() {
        let mut dst = [0u8; 2];
        let result = CompressionAlgorithm::None.compress_into(b"too long", &mut dst);
        assert!(matches!(result, Err(Error::Compression(_))));
    }

    #[test]
    fn test_corrupt_input_fails_to_decompress() {
        let result = decompress(b"definitely not zstd", &CompressionAlgorithm::Zstd);
        assert!(matches!(result, Err(Error::Compression(_))));
    }
}
