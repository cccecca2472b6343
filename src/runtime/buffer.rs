//! Growable receive buffer for assembling one frame.
//!
//! The buffer keeps a logical capacity that starts at a fixed size and
//! doubles every time a read fills it without producing a delimiter. It never
//! shrinks; `clear` resets the length but keeps the allocation so the next
//! session starts with the capacity the previous one grew to.
//!
//! Only the bytes that arrived in the most recent read are scanned for the
//! delimiter, so total scan work is linear in the bytes received.

use bytes::BytesMut;
use std::io::{self, Read};
use thiserror::Error;
use tracing::{debug, trace};

/// Frame delimiter.
pub const DELIMITER: u8 = b'\n';

/// Errors from filling the receive buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("receive error: {0}")]
    Receive(#[source] io::Error),
    #[error("cannot grow receive buffer beyond {capacity} bytes")]
    Growth { capacity: usize },
}

/// How a frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    /// A delimiter was found; the frame spans `len` bytes including it.
    Delimited { len: usize },
    /// The peer closed before any delimiter; the frame is every byte received.
    Closed,
}

/// Result of a single read into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` new bytes were appended. `delimiter` is the absolute offset of the
    /// first delimiter if one appeared in this span.
    Data { n: usize, delimiter: Option<usize> },
    /// Zero-length read: the peer closed its side.
    Closed,
}

/// Owned, growable byte buffer for one connection.
pub struct ReceiveBuffer {
    data: BytesMut,
    /// Logical capacity; reads never fill past this.
    capacity: usize,
    /// Offset of the first delimiter, once found.
    delimiter: Option<usize>,
}

impl ReceiveBuffer {
    /// Create a buffer with the given initial capacity.
    pub fn new(initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(1);
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
            delimiter: None,
        }
    }

    /// Bytes received so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current logical capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All bytes received so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..]
    }

    /// Offset of the first delimiter, if one has been received.
    pub fn find_delimiter(&self) -> Option<usize> {
        self.delimiter
    }

    /// The frame assembled so far: bytes through the first delimiter, or
    /// everything received if no delimiter has arrived.
    pub fn frame(&self) -> &[u8] {
        match self.delimiter {
            Some(pos) => &self.data[..=pos],
            None => &self.data[..],
        }
    }

    /// Reset for the next session. Capacity is kept.
    pub fn clear(&mut self) {
        self.data.clear();
        self.delimiter = None;
    }

    /// Append bytes, growing as needed. Returns the offset of the first
    /// delimiter within the appended span, if any.
    pub fn append(&mut self, bytes: &[u8]) -> Result<Option<usize>, BufferError> {
        let start = self.data.len();
        while self.capacity - start < bytes.len() {
            self.grow()?;
        }
        self.data.extend_from_slice(bytes);
        Ok(self.scan_from(start))
    }

    /// Perform one read from `src` into the free space of the buffer.
    ///
    /// If the read fills the buffer without a delimiter, capacity doubles
    /// before returning so the next read has room.
    pub fn read_from<R: Read>(&mut self, src: &mut R) -> Result<ReadOutcome, BufferError> {
        // a zero-length read would be indistinguishable from peer close
        if self.data.len() == self.capacity {
            self.grow()?;
        }

        let start = self.data.len();
        self.data.resize(self.capacity, 0);

        let n = loop {
            match src.read(&mut self.data[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.data.truncate(start);
                    return Err(BufferError::Receive(e));
                }
            }
        };
        self.data.truncate(start + n);

        if n == 0 {
            return Ok(ReadOutcome::Closed);
        }

        trace!(bytes = n, total = self.data.len(), "received");

        let delimiter = self.scan_from(start);
        if delimiter.is_none() && self.data.len() == self.capacity {
            self.grow()?;
        }

        Ok(ReadOutcome::Data { n, delimiter })
    }

    /// Read from `src` until a delimiter arrives or the peer closes.
    pub fn fill_frame<R: Read>(&mut self, src: &mut R) -> Result<FrameEnd, BufferError> {
        if let Some(pos) = self.delimiter {
            return Ok(FrameEnd::Delimited { len: pos + 1 });
        }

        loop {
            match self.read_from(src)? {
                ReadOutcome::Data {
                    delimiter: Some(pos),
                    ..
                } => return Ok(FrameEnd::Delimited { len: pos + 1 }),
                ReadOutcome::Data { .. } => {}
                ReadOutcome::Closed => return Ok(FrameEnd::Closed),
            }
        }
    }

    fn scan_from(&mut self, start: usize) -> Option<usize> {
        if self.delimiter.is_some() {
            return self.delimiter;
        }
        let found = self.data[start..]
            .iter()
            .position(|&b| b == DELIMITER)
            .map(|i| start + i);
        self.delimiter = found;
        found
    }

    fn grow(&mut self) -> Result<(), BufferError> {
        let new_capacity = self
            .capacity
            .checked_mul(2)
            .ok_or(BufferError::Growth {
                capacity: self.capacity,
            })?;
        self.data.reserve(new_capacity - self.data.len());
        debug!(
            from = self.capacity,
            to = new_capacity,
            "growing receive buffer"
        );
        self.capacity = new_capacity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Trickle {
        fn new(data: &[u8], chunk: usize) -> Self {
            Self {
                data: Cursor::new(data.to_vec()),
                chunk,
            }
        }
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let limit = buf.len().min(self.chunk);
            self.data.read(&mut buf[..limit])
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_single_read_frame() {
        let mut buf = ReceiveBuffer::new(512);
        let mut src = Cursor::new(b"hello\n".to_vec());

        let end = buf.fill_frame(&mut src).unwrap();
        assert_eq!(end, FrameEnd::Delimited { len: 6 });
        assert_eq!(buf.frame(), b"hello\n");
        assert_eq!(buf.capacity(), 512);
    }

    #[test]
    fn test_delimiter_first_byte() {
        let mut buf = ReceiveBuffer::new(8);
        let mut src = Cursor::new(b"\nrest".to_vec());

        let end = buf.fill_frame(&mut src).unwrap();
        assert_eq!(end, FrameEnd::Delimited { len: 1 });
        assert_eq!(buf.frame(), b"\n");
    }

    #[test]
    fn test_bytes_after_delimiter_excluded_from_frame() {
        let mut buf = ReceiveBuffer::new(64);
        let mut src = Cursor::new(b"one\ntwo\n".to_vec());

        buf.fill_frame(&mut src).unwrap();
        assert_eq!(buf.frame(), b"one\n");
        assert_eq!(buf.as_slice(), b"one\ntwo\n");
    }

    #[test]
    fn test_closed_without_delimiter() {
        let mut buf = ReceiveBuffer::new(4);
        let mut src = Trickle::new(b"partial", 3);

        let end = buf.fill_frame(&mut src).unwrap();
        assert_eq!(end, FrameEnd::Closed);
        assert_eq!(buf.frame(), b"partial");
    }

    #[test]
    fn test_closed_immediately() {
        let mut buf = ReceiveBuffer::new(4);
        let mut src = Cursor::new(Vec::new());

        assert_eq!(buf.fill_frame(&mut src).unwrap(), FrameEnd::Closed);
        assert!(buf.frame().is_empty());
    }

    #[test]
    fn test_growth_doubles_and_preserves_contents() {
        let mut buf = ReceiveBuffer::new(4);
        let payload: Vec<u8> = (0..37u8).map(|i| b'a' + (i % 26)).chain([b'\n']).collect();
        let mut src = Trickle::new(&payload, 5);

        let mut seen = Vec::new();
        loop {
            let before = buf.as_slice().to_vec();
            let outcome = buf.read_from(&mut src).unwrap();

            assert!(buf.capacity() >= buf.len());
            assert_eq!(&buf.as_slice()[..before.len()], &before[..]);
            assert!(buf.capacity().is_power_of_two());
            seen.push(buf.capacity());

            if let ReadOutcome::Data {
                delimiter: Some(pos),
                ..
            } = outcome
            {
                assert_eq!(pos, payload.len() - 1);
                break;
            }
        }

        assert_eq!(buf.frame(), &payload[..]);
        assert!(seen.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] * 2));
        assert_eq!(*seen.last().unwrap(), 64);
    }

    #[test]
    fn test_growth_only_when_full() {
        let mut buf = ReceiveBuffer::new(8);
        let mut src = Trickle::new(b"abc", 3);

        buf.read_from(&mut src).unwrap();
        assert_eq!(buf.capacity(), 8);

        let mut src = Trickle::new(b"defgh", 5);
        buf.read_from(&mut src).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.capacity(), 16);
    }

    #[test]
    fn test_full_read_with_delimiter_does_not_grow() {
        let mut buf = ReceiveBuffer::new(4);
        let mut src = Cursor::new(b"abc\n".to_vec());

        buf.fill_frame(&mut src).unwrap();
        assert_eq!(buf.capacity(), 4);
    }

    #[test]
    fn test_append_finds_delimiter_in_new_span() {
        let mut buf = ReceiveBuffer::new(2);
        assert_eq!(buf.append(b"abc").unwrap(), None);
        assert!(buf.capacity() >= 3);
        assert_eq!(buf.append(b"de\nf").unwrap(), Some(5));
        assert_eq!(buf.append(b"\n").unwrap(), Some(5));
        assert_eq!(buf.frame(), b"abcde\n");
    }

    #[test]
    fn test_read_after_exact_fill() {
        let mut buf = ReceiveBuffer::new(4);
        buf.append(b"abcd").unwrap();
        assert_eq!(buf.capacity(), 4);

        let mut src = Cursor::new(b"e\n".to_vec());
        assert_eq!(
            buf.fill_frame(&mut src).unwrap(),
            FrameEnd::Delimited { len: 6 }
        );
        assert_eq!(buf.frame(), b"abcde\n");
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buf = ReceiveBuffer::new(2);
        buf.append(b"0123456789").unwrap();
        let grown = buf.capacity();

        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.find_delimiter(), None);
        assert_eq!(buf.capacity(), grown);
    }

    #[test]
    fn test_receive_error() {
        let mut buf = ReceiveBuffer::new(8);
        match buf.fill_frame(&mut Broken) {
            Err(BufferError::Receive(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset)
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(buf.is_empty());
    }
}
