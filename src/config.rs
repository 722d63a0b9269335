//! Buffer configuration
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! config file, and `SNAPBUF_*` environment variables.
//!
//! ```toml
//! io_buffer_size = 32768
//! read_reference_threshold = 256
//! write_reference_threshold = 524288
//! compression = "zstd"
//! ```

use crate::compression::CompressionAlgorithm;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Default size of one channel read (32 KB)
pub const IO_BUFFER_SIZE_DEFAULT: usize = 32 * 1024;
pub const IO_BUFFER_SIZE_MINIMUM: usize = 1024;

/// Default minimum length of a read served as a zero-copy slice
pub const READ_REFERENCE_DEFAULT: usize = 256;
pub const READ_REFERENCE_MINIMUM: usize = 256;

/// Default minimum length of a write kept as a zero-copy reference (512 KB)
pub const WRITE_REFERENCE_DEFAULT: usize = 512 * 1024;
pub const WRITE_REFERENCE_MINIMUM: usize = 256;

/// Environment variable prefix (`SNAPBUF_IO_BUFFER_SIZE`, ...)
pub const ENV_PREFIX: &str = "SNAPBUF";

/// Construction-time settings of a [`Buffer`](crate::Buffer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Bytes requested from the channel per fill
    pub io_buffer_size: usize,
    /// Reads at least this long may share the head chunk's reference
    pub read_reference_threshold: usize,
    /// Appends at least this long may be kept by reference
    pub write_reference_threshold: usize,
    /// Codec applied by `export_all`
    pub compression: CompressionAlgorithm,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            io_buffer_size: IO_BUFFER_SIZE_DEFAULT,
            read_reference_threshold: READ_REFERENCE_DEFAULT,
            write_reference_threshold: WRITE_REFERENCE_DEFAULT,
            compression: CompressionAlgorithm::Zstd,
        }
    }
}

impl BufferConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            debug!(path = ?path, "Loading buffer config file");
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        let loaded: BufferConfig = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;

        Ok(loaded.normalized())
    }

    /// Clamp every value to its minimum
    pub fn normalized(mut self) -> Self {
        self.io_buffer_size = clamp("io_buffer_size", self.io_buffer_size, IO_BUFFER_SIZE_MINIMUM);
        self.read_reference_threshold = clamp(
            "read_reference_threshold",
            self.read_reference_threshold,
            READ_REFERENCE_MINIMUM,
        );
        self.write_reference_threshold = clamp(
            "write_reference_threshold",
            self.write_reference_threshold,
            WRITE_REFERENCE_MINIMUM,
        );
        self
    }

    pub fn with_io_buffer_size(mut self, size: usize) -> Self {
        self.io_buffer_size = size;
        self.normalized()
    }

    pub fn with_read_reference_threshold(mut self, threshold: usize) -> Self {
        self.read_reference_threshold = threshold;
        self.normalized()
    }

    pub fn with_write_reference_threshold(mut self, threshold: usize) -> Self {
        self.write_reference_threshold = threshold;
        self.normalized()
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to render config: {}", e)))
    }
}

fn clamp(name: &str, value: usize, minimum: usize) -> usize {
    if value < minimum {
        warn!(setting = name, value, minimum, "Config value below minimum, clamping");
        minimum
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BufferConfig::default();
        assert_eq!(config.io_buffer_size, 32 * 1024);
        assert_eq!(config.read_reference_threshold, 256);
        assert_eq!(config.write_reference_threshold, 512 * 1024);
        assert_eq!(config.compression, CompressionAlgorithm::Zstd);
    }

    #[test]
    fn test_values_are_clamped() {
        let config = BufferConfig::default()
            .with_io_buffer_size(10)
            .with_read_reference_threshold(1)
            .with_write_reference_threshold(0);

        assert_eq!(config.io_buffer_size, IO_BUFFER_SIZE_MINIMUM);
        assert_eq!(config.read_reference_threshold, READ_REFERENCE_MINIMUM);
        assert_eq!(config.write_reference_threshold, WRITE_REFERENCE_MINIMUM);
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("snapbuf_config_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "io_buffer_size = 4096\nwrite_reference_threshold = 1000\ncompression = \"none\"\n",
        )?;

        let config = BufferConfig::load(Some(&path))?;
        assert_eq!(config.io_buffer_size, 4096);
        assert_eq!(config.write_reference_threshold, 1000);
        assert_eq!(config.read_reference_threshold, READ_REFERENCE_DEFAULT);
        assert_eq!(config.compression, CompressionAlgorithm::None);

        // Cleanup
        std::fs::remove_file(path).ok();
        Ok(())
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let path = std::env::temp_dir().join("snapbuf_config_does_not_exist.toml");
        let result = BufferConfig::load(Some(&path));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_rendering() -> Result<()> {
        let rendered = BufferConfig::default().to_toml()?;
        assert!(rendered.contains("io_buffer_size = 32768"));
        assert!(rendered.contains("compression = \"zstd\""));
        Ok(())
    }
}
