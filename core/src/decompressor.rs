//! The shared contract implemented by every frame decompressor: one method that turns a
//! compressed buffer into decoded bytes, with construction-time parameters (window size, variant)
//! baked into the implementing type rather than passed on every call.

use crate::error::Result;

/// Expands one compressed frame into `sink`, appending decoded bytes.
///
/// Per the data model, a decompressor's internal state (bit cursor, sliding window) is scoped
/// to a single frame: implementations must not carry history between calls.
pub trait Decompressor {
    fn decompress_frame(&mut self, input: &[u8], sink: &mut Vec<u8>) -> Result<()>;
}
