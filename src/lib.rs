// snapbuf - Rust Implementation
// A chunked streaming byte buffer for serialization pipelines

#![warn(rust_2018_idioms)]

pub mod buffer;
pub mod channel;
pub mod compression;
pub mod config;
pub mod slab;

// Re-exports for convenience
pub use buffer::{Buffer, BufferStats, ExportStats, LiveReference, ShareableBytes};
pub use channel::{Channel, IoChannel, ReadChannel, WriteChannel};
pub use compression::{BlockCodec, CompressionAlgorithm};
pub use config::BufferConfig;
pub use slab::{PageLease, PagePool, SlabAllocator, PAGE_SIZE};

/// snapbuf error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("End of stream")]
        EndOfStream,

        #[error("No channel bound to buffer")]
        NoChannel,

        #[error("Compression error: {0}")]
        Compression(String),

        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    impl Error {
        /// True when the caller can recover by supplying more input.
        pub fn is_end_of_stream(&self) -> bool {
            matches!(self, Error::EndOfStream)
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
