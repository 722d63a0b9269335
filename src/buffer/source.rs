//! Copy-vs-share capability of appended data

use bytes::{Bytes, BytesMut};

/// Byte source that may be kept by reference instead of copied
///
/// `share` returns a handle only when duplicating the source is a reference
/// count bump and the bytes cannot change underneath the buffer.
pub trait ShareableBytes {
    fn as_slice(&self) -> &[u8];

    fn share(&self) -> Option<Bytes>;
}

impl ShareableBytes for Bytes {
    fn as_slice(&self) -> &[u8] {
        self
    }

    fn share(&self) -> Option<Bytes> {
        Some(self.clone())
    }
}

impl ShareableBytes for BytesMut {
    fn as_slice(&self) -> &[u8] {
        self
    }

    // still mutable through the caller's handle
    fn share(&self) -> Option<Bytes> {
        None
    }
}

impl ShareableBytes for [u8] {
    fn as_slice(&self) -> &[u8] {
        self
    }

    fn share(&self) -> Option<Bytes> {
        None
    }
}

impl ShareableBytes for Vec<u8> {
    fn as_slice(&self) -> &[u8] {
        self
    }

    fn share(&self) -> Option<Bytes> {
        None
    }
}

impl ShareableBytes for str {
    fn as_slice(&self) -> &[u8] {
        self.as_bytes()
    }

    fn share(&self) -> Option<Bytes> {
        None
    }
}

impl ShareableBytes for String {
    fn as_slice(&self) -> &[u8] {
        self.as_bytes()
    }

    fn share(&self) -> Option<Bytes> {
        None
    }
}
