//! End-to-end buffer scenarios: mixed chunk kinds, export, channel binding

use bytes::Bytes;
use snapbuf::compression::{decompress, CompressionAlgorithm};
use snapbuf::error::Error;
use snapbuf::{Buffer, BufferConfig, Channel, IoChannel, ReadChannel};
use std::cell::RefCell;
use std::io::{self, Cursor};
use std::rc::Rc;

/// Channel that records each write as a separate block
#[derive(Clone, Default)]
struct Recorder {
    writes: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Channel for Recorder {
    fn partial_read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writes.borrow_mut().push(data.to_vec());
        Ok(())
    }
}

fn mixed_buffer() -> (Buffer, Bytes) {
    let config = BufferConfig::default().with_write_reference_threshold(1000);
    let mut buffer = Buffer::with_config(config);
    let shared = Bytes::from((0..5000u32).map(|i| (i % 199) as u8).collect::<Vec<_>>());

    buffer.append(&[b'<'; 10]).expect("Failed to append prefix");
    buffer
        .append_bytes(shared.clone())
        .expect("Failed to append shared block");
    buffer.append(&[b'>'; 10]).expect("Failed to append suffix");
    (buffer, shared)
}

#[test]
fn test_mixed_chunks_export_and_alias() {
    let (buffer, shared) = mixed_buffer();
    assert_eq!(buffer.all_readable_size(), 5020);

    let exported = buffer.export_all().expect("Failed to export");
    let restored =
        decompress(&exported, &CompressionAlgorithm::Zstd).expect("Failed to decompress");

    let mut expected = vec![b'<'; 10];
    expected.extend_from_slice(&shared);
    expected.extend_from_slice(&[b'>'; 10]);
    assert_eq!(restored, expected);

    // The middle chunk still points at the caller's bytes
    let blocks = buffer.export_all_as_chunks();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[1].as_ptr(), shared.as_ptr());
    assert_eq!(blocks[1].len(), 5000);
}

#[test]
fn test_mixed_chunks_read_back_in_pieces() {
    let (mut buffer, shared) = mixed_buffer();

    let mut prefix = [0u8; 10];
    buffer.read_all(&mut prefix).expect("Failed to read prefix");
    assert_eq!(prefix, [b'<'; 10]);

    let middle = buffer.read_bytes(5000).expect("Failed to read middle");
    assert_eq!(middle.as_ptr(), shared.as_ptr());

    let mut suffix = Vec::new();
    assert_eq!(buffer.read_to_vec_nonblock(&mut suffix, 64), 10);
    assert!(buffer.is_empty());
}

#[test]
fn test_flush_writes_one_block_per_chunk() {
    let (mut buffer, _) = mixed_buffer();
    let recorder = Recorder::default();
    buffer.bind_channel(recorder.clone());

    // Non-consuming flush leaves the buffer intact
    assert_eq!(buffer.flush(false).expect("Failed to flush"), 5020);
    assert_eq!(buffer.all_readable_size(), 5020);
    assert_eq!(recorder.writes.borrow().len(), 3);

    assert_eq!(buffer.flush(true).expect("Failed to flush"), 5020);
    assert_eq!(buffer.all_readable_size(), 0);

    let writes = recorder.writes.borrow();
    let total: usize = writes.iter().map(Vec::len).sum();
    assert_eq!(writes.len(), 6);
    assert_eq!(total, 2 * 5020);
}

#[test]
fn test_fill_from_cursor_until_end_of_stream() {
    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 241) as u8).collect();
    let config = BufferConfig::default().with_io_buffer_size(4096);
    let mut buffer = Buffer::with_channel(config, ReadChannel::new(Cursor::new(data.clone())));

    let mut filled = 0;
    loop {
        match buffer.fill_from_channel() {
            Ok(n) => filled += n,
            Err(e) if e.is_end_of_stream() => break,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }
    assert_eq!(filled, data.len());
    assert_eq!(buffer.to_bytes(), data);
}

#[test]
fn test_read_past_end_is_end_of_stream() {
    let config = BufferConfig::default();
    let mut buffer = Buffer::with_channel(config, ReadChannel::new(&b"0123456789"[..]));

    let mut out = [0u8; 11];
    assert!(matches!(buffer.read_all(&mut out), Err(Error::EndOfStream)));
    // What was read before the end stays buffered
    assert_eq!(buffer.all_readable_size(), 10);
}

#[test]
fn test_unbound_buffer_cannot_fill() {
    let channel = IoChannel::new(Cursor::new(Vec::new()));
    let mut writer = Buffer::with_channel(BufferConfig::default(), channel);
    writer.append(b"framed payload").expect("Failed to append");
    assert_eq!(writer.flush(true).expect("Failed to flush"), 14);

    assert!(writer.unbind_channel().is_some());
    assert!(!writer.is_bound());
    assert!(matches!(writer.fill_from_channel(), Err(Error::NoChannel)));
}

#[test]
fn test_threshold_boundaries() {
    let config = BufferConfig::default()
        .with_read_reference_threshold(300)
        .with_write_reference_threshold(300);

    let mut below = Buffer::with_config(config.clone());
    below
        .append_bytes(Bytes::from(vec![1u8; 299]))
        .expect("Failed to append");
    assert_eq!(below.stats().mapped_chunks, 0);

    let mut exact = Buffer::with_config(config);
    let shared = Bytes::from(vec![2u8; 300]);
    exact.append_bytes(shared.clone()).expect("Failed to append");
    assert_eq!(exact.stats().mapped_chunks, 1);

    let read = exact.read_bytes(300).expect("Failed to read");
    assert_eq!(read.as_ptr(), shared.as_ptr());
}

#[test]
fn test_fresh_buffer() {
    let buffer = Buffer::new();
    let stats = buffer.stats();
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.readable_bytes, 0);
    assert_eq!(stats.writable_bytes, 0);
    assert!(buffer.export_all_as_chunks().is_empty());
}
