//! A position-tracking stream wrapper used by every format driver.
//!
//! A thin wrapper around `Read` that format drivers use instead of talking to the raw source
//! directly, extended with boundary alignment and forward magic-scanning since every driver
//! here has to tolerate garbage between records.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};

/// Wraps a byte source, tracking how many bytes have been consumed so drivers can align to
/// fixed boundaries and report absolute offsets.
pub struct BlockReader<R: Read> {
    inner: R,
    position: u64,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        BlockReader { inner, position: 0 }
    }

    /// Bytes consumed from the source so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads exactly `buf.len()` bytes, failing with `UnexpectedEof` on a short read.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Reads and returns exactly `n` bytes.
    pub fn read_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    /// Discards `n` bytes, failing with `UnexpectedEof` if the source runs out first.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let mut remaining = n;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let chunk = remaining.min(scratch.len() as u64) as usize;
            self.read_exact(&mut scratch[..chunk])?;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Advances forward to the next position that is a multiple of `boundary`, a no-op if
    /// already aligned.
    pub fn align_to(&mut self, boundary: u64) -> Result<()> {
        let rem = self.position % boundary;
        if rem != 0 {
            self.skip(boundary - rem)?;
        }
        Ok(())
    }

    /// Scans forward one byte at a time until `magic` is found at the current position,
    /// consuming up through the end of the match. Returns the absolute offset at which the
    /// match started. Fails with `UnexpectedEof` if the source is exhausted first.
    pub fn scan_for_magic(&mut self, magic: &[u8]) -> Result<u64> {
        let mut window = vec![0u8; magic.len()];
        self.read_exact(&mut window)?;
        let mut start = self.position - magic.len() as u64;
        loop {
            if window == magic {
                return Ok(start);
            }
            window.remove(0);
            window.push(self.read_u8()?);
            start += 1;
        }
    }

    /// Returns a borrow of the underlying reader, for drivers that need to hand it to a
    /// lower-level helper (e.g. a decompressor operating on a bounded slice already read out).
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: Read + Seek> BlockReader<R> {
    /// Seeks the underlying source to an absolute offset, keeping the tracked position in sync.
    /// Only available when the source supports `Seek` (scanning drivers that need to rewind
    /// after a lookahead, unlike the forward-only magic-scanning path every driver otherwise
    /// uses).
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.position = pos;
        Ok(())
    }
}

impl<R: Read> Read for BlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// Convenience used by drivers that need `UnexpectedEof` semantics without going through
/// `BlockReader` (e.g. reading directly from a `&[u8]` slice already in memory).
pub fn require_exact<R: Read>(mut r: R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn align_to_skips_to_next_boundary() {
        let mut r = BlockReader::new(Cursor::new(vec![0u8; 20]));
        r.read_vec(3).unwrap();
        assert_eq!(r.position(), 3);
        r.align_to(8).unwrap();
        assert_eq!(r.position(), 8);
        r.align_to(8).unwrap();
        assert_eq!(r.position(), 8);
    }

    #[test]
    fn scan_for_magic_finds_offset_and_consumes_match() {
        let data = [0xFFu8, 0xFF, 0xAB, 0xBA, 0xAB, 0xBA, 0x01];
        let mut r = BlockReader::new(Cursor::new(data));
        let offset = r.scan_for_magic(&[0xAB, 0xBA, 0xAB, 0xBA]).unwrap();
        assert_eq!(offset, 2);
        assert_eq!(r.position(), 6);
    }

    #[test]
    fn short_read_is_unexpected_eof() {
        let mut r = BlockReader::new(Cursor::new(vec![0u8; 2]));
        let mut buf = [0u8; 4];
        assert!(matches!(r.read_exact(&mut buf), Err(Error::UnexpectedEof)));
    }
}
