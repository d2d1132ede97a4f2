//! Experimental TXPLUS v45 LZ77-style dictionary decompressor.
//!
//! TXPLUS's body compression scheme was never fully validated against real tapes; this is a
//! best-effort reconstruction of its dictionary discipline, not a byte-exact port of a known
//! reference decoder. The `txplus` format driver keeps this behind
//! [`crate::format::txplus::TxplusOptions`] and writes the raw body by default.
//!
//! Unlike QIC-122/ALDC, TXPLUS bits are consumed least-significant-bit first, and the dictionary
//! index width grows as entries accumulate (an LZW-style variable code width).

use crate::bitreader::{BitOrder, BitReader};
use crate::decompressor::Decompressor;
use crate::error::{Error, Result};

/// Decodes TXPLUS frames against a growing dictionary of variable-length byte runs.
pub struct TxDecompressor {
    dictionary: Vec<Vec<u8>>,
}

impl TxDecompressor {
    pub fn new() -> Self {
        TxDecompressor {
            dictionary: Vec::new(),
        }
    }

    /// Bits needed to index an entry in a dictionary of `len` live entries, plus the one
    /// reserved sentinel index that clears the dictionary.
    fn index_bits(len: usize) -> u32 {
        let slots = len + 1; // + 1 for the reset sentinel
        if slots <= 1 {
            1
        } else {
            32 - ((slots - 1) as u32).leading_zeros()
        }
    }

    fn reset(&mut self) {
        self.dictionary.clear();
    }
}

impl Default for TxDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for TxDecompressor {
    fn decompress_frame(&mut self, input: &[u8], sink: &mut Vec<u8>) -> Result<()> {
        self.reset();
        let mut bits = BitReader::new(input, BitOrder::Lsb);

        loop {
            if bits.aligned() && bits.bytes_remaining() == 0 {
                break;
            }
            let tag = bits.next_bit()?;
            if tag == 0 {
                let byte = bits.next_bits(8)? as u8;
                sink.push(byte);
                self.dictionary.push(vec![byte]);
                continue;
            }

            let width = Self::index_bits(self.dictionary.len());
            let idx = bits.next_bits(width)? as usize;
            if idx == self.dictionary.len() {
                // Sentinel code: the dictionary is cleared and must not leak into the next
                // frame or the next use of this code within the same frame.
                self.reset();
                continue;
            }
            if idx > self.dictionary.len() {
                return Err(Error::corrupt("txplus: dictionary index out of range"));
            }

            let slot = self.dictionary[idx].clone();
            sink.extend_from_slice(&slot);

            // Virtual extension: the new entry is the referenced slot plus one byte, taken
            // from the first byte of the *next* dictionary slot if one exists, else the
            // referenced slot's own first byte.
            let extra = if idx + 1 < self.dictionary.len() {
                self.dictionary[idx + 1][0]
            } else {
                slot[0]
            };
            let mut extended = slot;
            extended.push(extra);
            self.dictionary.push(extended);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BitWriter {
        bytes: Vec<u8>,
        cur: u8,
        filled: u8,
    }

    impl BitWriter {
        fn new() -> Self {
            BitWriter {
                bytes: Vec::new(),
                cur: 0,
                filled: 0,
            }
        }

        /// LSB-first: bit 0 of `value` is written first into the current byte's low end.
        fn push_bits(&mut self, value: u32, n: u32) {
            for i in 0..n {
                let bit = (value >> i) & 1;
                self.cur |= (bit as u8) << self.filled;
                self.filled += 1;
                if self.filled == 8 {
                    self.bytes.push(self.cur);
                    self.cur = 0;
                    self.filled = 0;
                }
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.filled > 0 {
                self.bytes.push(self.cur);
            }
            self.bytes
        }
    }

    #[test]
    fn literals_build_single_byte_dictionary_entries() {
        let mut w = BitWriter::new();
        for &b in b"ab" {
            w.push_bits(0, 1);
            w.push_bits(b as u32, 8);
        }
        let frame = w.finish();

        let mut dec = TxDecompressor::new();
        let mut out = Vec::new();
        dec.decompress_frame(&frame, &mut out).unwrap();
        assert_eq!(out, b"ab");
        assert_eq!(dec.dictionary, vec![vec![b'a'], vec![b'b']]);
    }

    #[test]
    fn reference_extends_with_next_slots_first_byte() {
        let mut w = BitWriter::new();
        // literal 'a' -> dict = [[a]]
        w.push_bits(0, 1);
        w.push_bits(b'a' as u32, 8);
        // literal 'b' -> dict = [[a],[b]]
        w.push_bits(0, 1);
        w.push_bits(b'b' as u32, 8);
        // reference index 0 ([a]); dict has 2 entries so index_bits(2) = bits for 3 slots = 2
        w.push_bits(1, 1);
        w.push_bits(0, 2);
        let frame = w.finish();

        let mut dec = TxDecompressor::new();
        let mut out = Vec::new();
        dec.decompress_frame(&frame, &mut out).unwrap();
        assert_eq!(out, b"aba");
        // new entry extends [a] with the first byte of the next slot [b] -> [a, b]
        assert_eq!(dec.dictionary[2], vec![b'a', b'b']);
    }

    #[test]
    fn sentinel_clears_dictionary() {
        let mut w = BitWriter::new();
        w.push_bits(0, 1);
        w.push_bits(b'z' as u32, 8);
        // dict = [[z]], index_bits(1) = bits for 2 slots = 1; sentinel index == dict.len() == 1
        w.push_bits(1, 1);
        w.push_bits(1, 1);
        let frame = w.finish();

        let mut dec = TxDecompressor::new();
        let mut out = Vec::new();
        dec.decompress_frame(&frame, &mut out).unwrap();
        assert_eq!(out, b"z");
        assert!(dec.dictionary.is_empty());
    }
}
