//! Export of buffered bytes as independent blocks

use super::Buffer;
use crate::compression::{compress, BlockCodec};
use crate::error::Result;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

/// Size accounting for one exported block
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExportStats {
    /// Non-empty chunks the block was gathered from
    pub chunks: usize,
    pub mapped_chunks: usize,
    pub original_size: usize,
    pub exported_size: usize,
}

impl ExportStats {
    /// Exported size over original size, `1.0` for an empty buffer
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 1.0;
        }
        self.exported_size as f64 / self.original_size as f64
    }
}

impl Buffer {
    /// Every unread byte as one contiguous block
    ///
    /// A single shared chunk is returned without copying. The buffer is not
    /// consumed.
    pub fn to_bytes(&self) -> Bytes {
        if self.chunks.is_single() {
            return self.chunks.head().to_bytes(self.read_pos);
        }

        let mut out = Vec::with_capacity(self.all_readable_size());
        let mut chunks = self.chunks.iter();
        if let Some(head) = chunks.next() {
            out.extend_from_slice(head.slice(self.read_pos, head.last));
        }
        for chunk in chunks {
            out.extend_from_slice(chunk.readable());
        }
        Bytes::from(out)
    }

    /// Unread bytes compressed with the configured algorithm
    pub fn export_all(&self) -> Result<Bytes> {
        let codec = self.config.compression;
        self.export_all_with(&codec)
    }

    /// Unread bytes compressed with `codec`
    pub fn export_all_with<C: BlockCodec + ?Sized>(&self, codec: &C) -> Result<Bytes> {
        self.export_all_with_stats(codec).map(|(block, _)| block)
    }

    /// Unread bytes compressed with `codec`, plus where they came from
    pub fn export_all_with_stats<C: BlockCodec + ?Sized>(
        &self,
        codec: &C,
    ) -> Result<(Bytes, ExportStats)> {
        let flat = self.to_bytes();
        let compressed = compress(&flat, codec)?;
        let stats = self.export_stats(compressed.len());
        debug!(
            original = stats.original_size,
            compressed = stats.exported_size,
            chunks = stats.chunks,
            mapped = stats.mapped_chunks,
            "Exported buffer"
        );
        Ok((Bytes::from(compressed), stats))
    }

    /// Unread bytes as one block per non-empty chunk, uncompressed
    ///
    /// Blocks of shared chunks alias the original bytes.
    pub fn export_all_as_chunks(&self) -> Vec<Bytes> {
        let mut blocks = Vec::with_capacity(self.chunks.len());
        let mut chunks = self.chunks.iter();
        if let Some(head) = chunks.next() {
            if self.read_pos < head.last {
                blocks.push(head.to_bytes(self.read_pos));
            }
        }
        blocks.extend(
            chunks
                .filter(|c| c.len() > 0)
                .map(|c| c.to_bytes(c.first)),
        );
        blocks
    }

    fn export_stats(&self, exported_size: usize) -> ExportStats {
        let mut stats = ExportStats {
            chunks: 0,
            mapped_chunks: 0,
            original_size: 0,
            exported_size,
        };
        for (i, chunk) in self.chunks.iter().enumerate() {
            let len = if i == 0 {
                self.top_readable_size()
            } else {
                chunk.len()
            };
            if len > 0 {
                stats.chunks += 1;
                stats.mapped_chunks += usize::from(chunk.is_mapped());
                stats.original_size += len;
            }
        }
        stats
    }
}
