//! Walks the compressed QIC-113 segment layout and drives a [`Decompressor`] over its framed
//! bodies, writing the logical (decompressed) byte stream to an output while preserving
//! cross-segment absolute-position offsets.
//!
//! Each segment carries an absolute-position prefix, then a stream of variably-sized frames;
//! a frame's declared absolute position can run behind the output cursor (a tape re-splice)
//! rather than only ever advancing it, which this walk has to tolerate by reopening a split
//! output at the right offset instead of assuming monotonic progress.

use std::io::{Read, Seek, SeekFrom, Write};

use log::warn;

use crate::blockreader::BlockReader;
use crate::decompressor::Decompressor;
use crate::endian::read_u16_le;
use crate::error::{Error, Result};

const SEGMENT_ALIGN: u64 = 0x100;
const MIN_FRAME_BUDGET: u64 = 18;
const MAX_FRAME_SIZE: u64 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsPosWidth {
    Four,
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSizeWidth {
    Two,
    Four,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentExpanderOptions {
    pub seg_size: u64,
    pub abs_pos_width: AbsPosWidth,
    pub frame_size_width: FrameSizeWidth,
    pub have_extent_offset: bool,
}

/// Drives `decompressor` (or writes verbatim, per frame) over the segment layout read from
/// `source`, producing output through `open_output` — a factory invoked once up front and again
/// each time an out-of-order split forces a new output stream.
pub struct SegmentExpander<D: Decompressor> {
    options: SegmentExpanderOptions,
    decompressor: D,
}

impl<D: Decompressor> SegmentExpander<D> {
    pub fn new(options: SegmentExpanderOptions, decompressor: D) -> Self {
        SegmentExpander {
            options,
            decompressor,
        }
    }

    fn read_abs_pos<R: Read>(&self, r: &mut R) -> Result<u64> {
        match self.options.abs_pos_width {
            AbsPosWidth::Four => Ok(crate::endian::read_u32_le(r)? as u64),
            AbsPosWidth::Eight => crate::endian::read_u64_le(r),
        }
    }

    fn read_frame_size<R: Read>(&self, r: &mut R) -> Result<u32> {
        match self.options.frame_size_width {
            FrameSizeWidth::Two => Ok(crate::endian::read_u16_le(r)? as u32),
            FrameSizeWidth::Four => crate::endian::read_u32_le(r),
        }
    }

    /// Processes every segment in `source`, writing the expanded stream to `sink`. `sink` must
    /// support seeking so that out-of-order absolute positions can pad the output forward.
    pub fn expand<R: Read, W: Write + Seek>(
        &mut self,
        source: &mut BlockReader<R>,
        sink: &mut W,
        mut open_split: impl FnMut(u32) -> Result<Box<dyn WriteSeek>>,
    ) -> Result<()> {
        let mut output_pos: u64 = 0;
        let mut split_count: u32 = 0;
        let mut active: Option<Box<dyn WriteSeek>> = None;

        loop {
            if source.align_to(SEGMENT_ALIGN).is_err() {
                break;
            }
            let segment_start = source.position();

            if self.options.have_extent_offset {
                match read_u16_le(source) {
                    Ok(_) => {}
                    Err(_) => break,
                }
            }

            let mut abs_pos = match self.read_abs_pos(source) {
                Ok(v) => v,
                Err(_) => break,
            };

            let header_len = source.position() - segment_start;
            let mut budget = self.options.seg_size.saturating_sub(header_len);

            while budget >= MIN_FRAME_BUDGET {
                let frame_size_raw = match self.read_frame_size(source) {
                    Ok(v) => v,
                    Err(_) => return Ok(()),
                };
                budget = budget.saturating_sub(match self.options.frame_size_width {
                    FrameSizeWidth::Two => 2,
                    FrameSizeWidth::Four => 4,
                });
                if frame_size_raw == 0 {
                    break;
                }

                let size_bits = match self.options.frame_size_width {
                    FrameSizeWidth::Two => 16,
                    FrameSizeWidth::Four => 32,
                };
                let uncompressed_flag = 1u32 << (size_bits - 1);
                let uncompressed = frame_size_raw & uncompressed_flag != 0;
                let frame_size = (frame_size_raw & !uncompressed_flag) as u64;

                if frame_size > MAX_FRAME_SIZE {
                    return Err(Error::corrupt(format!(
                        "segment frame size {frame_size:#x} exceeds maximum"
                    )));
                }

                let payload = source.read_vec(frame_size as usize)?;
                budget = budget.saturating_sub(frame_size);

                if abs_pos < output_pos {
                    split_count += 1;
                    active = Some(open_split(split_count)?);
                    output_pos = abs_pos;
                }

                let target: &mut dyn WriteSeek = match active.as_mut() {
                    Some(w) => w.as_mut(),
                    None => sink as &mut dyn WriteSeek,
                };

                if abs_pos != output_pos {
                    target.seek(SeekFrom::Start(abs_pos))?;
                }

                if uncompressed {
                    target.write_all(&payload)?;
                } else {
                    let mut decoded = Vec::new();
                    match self.decompressor.decompress_frame(&payload, &mut decoded) {
                        Ok(()) => {
                            target.write_all(&decoded)?;
                        }
                        Err(e) => {
                            warn!("segment frame at abs_pos {abs_pos:#x} failed to decompress: {e}");
                            continue;
                        }
                    }
                    abs_pos += decoded.len() as u64;
                    output_pos = abs_pos;
                    continue;
                }
                abs_pos += payload.len() as u64;
                output_pos = abs_pos;
            }
        }
        Ok(())
    }
}

/// Object-safe `Write + Seek` alias used so split outputs can be boxed trait objects.
pub trait WriteSeek: Write + Seek {}
impl<T: Write + Seek> WriteSeek for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CoreResult;
    use std::io::Cursor;

    struct Passthrough;
    impl Decompressor for Passthrough {
        fn decompress_frame(&mut self, input: &[u8], sink: &mut Vec<u8>) -> CoreResult<()> {
            sink.extend_from_slice(input);
            Ok(())
        }
    }

    fn build_segment(abs_pos: u32, frames: &[(bool, &[u8])], seg_size: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&abs_pos.to_le_bytes());
        for (uncompressed, data) in frames {
            let mut size = data.len() as u16;
            if *uncompressed {
                size |= 0x8000;
            }
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(data);
        }
        out.extend_from_slice(&0u16.to_le_bytes());
        out.resize(seg_size as usize, 0xAA);
        out
    }

    #[test]
    fn expands_single_segment_verbatim_frame() {
        let seg_size = 64;
        let seg = build_segment(0, &[(true, b"hello!!!")], seg_size);
        let mut source = BlockReader::new(Cursor::new(seg));
        let options = SegmentExpanderOptions {
            seg_size,
            abs_pos_width: AbsPosWidth::Four,
            frame_size_width: FrameSizeWidth::Two,
            have_extent_offset: false,
        };
        let mut expander = SegmentExpander::new(options, Passthrough);
        let mut out = Cursor::new(Vec::new());
        expander
            .expand(&mut source, &mut out, |_| unreachable!("no split expected"))
            .unwrap();
        assert_eq!(out.into_inner(), b"hello!!!");
    }

    #[test]
    fn oversized_frame_is_fatal() {
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes());
        // uncompressed flag (bit 31) clear, masked size 0x2_0000 exceeds MAX_FRAME_SIZE (0xFFFF)
        out.extend_from_slice(&0x0002_0000u32.to_le_bytes());
        out.resize(64, 0);
        let mut source = BlockReader::new(Cursor::new(out));
        let options = SegmentExpanderOptions {
            seg_size: 64,
            abs_pos_width: AbsPosWidth::Four,
            frame_size_width: FrameSizeWidth::Four,
            have_extent_offset: false,
        };
        let mut expander = SegmentExpander::new(options, Passthrough);
        let mut sink = Cursor::new(Vec::new());
        let result = expander.expand(&mut source, &mut sink, |_| unreachable!());
        assert!(matches!(result, Err(Error::CorruptFrame(_))));
    }
}
