//! Strips trailing error-correction bytes from fixed-size tape segments.
//!
//! No correction is performed or attempted, only removal. Every window is processed independently
//! of its neighbors; a truncated tail window (fewer than `seg_size` bytes remaining) is silently
//! dropped rather than padded.

use std::io::{Read, Write};

use crate::error::Result;

/// Parameters for one ECC-stripping pass.
#[derive(Debug, Clone, Copy)]
pub struct EccOptions {
    /// Logical size of one segment, including its trailing ECC bytes.
    pub seg_size: usize,
    /// Number of trailing bytes per segment to discard.
    pub ecc_size: usize,
}

/// Copies `source` to `sink` in `seg_size`-byte windows, writing only the leading
/// `seg_size - ecc_size` bytes of each window.
pub struct EccStripper {
    options: EccOptions,
}

impl EccStripper {
    pub fn new(options: EccOptions) -> Self {
        EccStripper { options }
    }

    pub fn strip<R: Read, W: Write>(&self, mut source: R, mut sink: W) -> Result<u64> {
        let EccOptions { seg_size, ecc_size } = self.options;
        let payload_size = seg_size.saturating_sub(ecc_size);
        let mut buf = vec![0u8; seg_size];
        let mut written = 0u64;

        loop {
            let mut filled = 0;
            while filled < seg_size {
                let n = source.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled < seg_size {
                // Truncated tail window: dropped rather than padded.
                break;
            }
            sink.write_all(&buf[..payload_size])?;
            written += payload_size as u64;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn strips_trailing_ecc_bytes_per_segment() {
        let seg_size = 8;
        let ecc_size = 2;
        let segments = 3;
        let input: Vec<u8> = (0..(segments * seg_size) as u8).collect();

        let stripper = EccStripper::new(EccOptions { seg_size, ecc_size });
        let mut out = Vec::new();
        let written = stripper
            .strip(Cursor::new(input.clone()), &mut out)
            .unwrap();

        let payload = seg_size - ecc_size;
        assert_eq!(written as usize, segments * payload);
        for seg in 0..segments {
            for j in 0..payload {
                assert_eq!(out[seg * payload + j], input[seg * seg_size + j]);
            }
        }
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let stripper = EccStripper::new(EccOptions {
            seg_size: 8,
            ecc_size: 2,
        });
        let mut out = Vec::new();
        let written = stripper.strip(Cursor::new(vec![0u8; 5]), &mut out).unwrap();
        assert_eq!(written, 0);
        assert!(out.is_empty());
    }
}
