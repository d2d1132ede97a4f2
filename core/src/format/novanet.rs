//! NovaNET 8 driver: a stream of 0x20-byte block headers, with multiple logical streams
//! interleaved by `stream_index` and each stream's open/close nesting tracked via its own
//! push-down stack in a `HashMap<stream_index, Vec<OpenObject>>`, rather than assuming a single
//! linear cursor.

use std::collections::HashMap;
use std::io::Read;

use log::warn;

use crate::blockreader::BlockReader;
use crate::entry::{DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const BLOCK_HEADER_SIZE: usize = 0x20;
const MAGIC: &[u8; 4] = b"F600";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegType {
    Server = 1,
    Network = 2,
    Node = 3,
    Path = 4,
    Registry = 0xD,
}

impl SegType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => SegType::Server,
            2 => SegType::Network,
            3 => SegType::Node,
            4 => SegType::Path,
            0xD => SegType::Registry,
            _ => return None,
        })
    }
}

struct OpenObject {
    path: Vec<String>,
    body: Vec<u8>,
    next_offset: u32,
}

pub struct NovaNetDriver<R: Read> {
    source: BlockReader<R>,
    streams: HashMap<u32, Vec<OpenObject>>,
    pending: std::collections::VecDeque<Entry<'static>>,
    done: bool,
}

impl<R: Read> NovaNetDriver<R> {
    pub fn new(source: BlockReader<R>) -> Self {
        NovaNetDriver {
            source,
            streams: HashMap::new(),
            pending: std::collections::VecDeque::new(),
            done: false,
        }
    }

    /// Parses name/path TLVs out of an `MHDR`/metadata `DATA` block body.
    fn parse_path_tlvs(body: &[u8]) -> Vec<String> {
        let mut path = Vec::new();
        let mut i = 0;
        while i + 5 <= body.len() {
            let seg_type = body[i];
            let len = u32::from_le_bytes([body[i + 1], body[i + 2], body[i + 3], body[i + 4]]) as usize;
            i += 5;
            if i + len > body.len() {
                break;
            }
            if matches!(
                SegType::from_u8(seg_type),
                Some(SegType::Node) | Some(SegType::Path)
            ) {
                path.push(String::from_utf8_lossy(&body[i..i + len]).into_owned());
            }
            i += len;
        }
        path
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Ok(Some(entry));
            }
            if self.done {
                return Ok(None);
            }

            let header_start = match self.source.scan_for_magic(MAGIC) {
                Ok(_) => {}
                Err(_) => {
                    self.done = true;
                    return Ok(None);
                }
            };
            let _ = header_start;

            let stream_index = crate::endian::read_u32_le(&mut self.source)?;
            let block_length = crate::endian::read_u32_le(&mut self.source)? as usize;
            let mut block_type = [0u8; 4];
            self.source.read_exact(&mut block_type)?;
            // 16 bytes consumed so far (magic, stream index, length, type); the remaining
            // 16 bytes of the fixed 0x20-byte header carry type-specific fields (a 32-bit
            // absolute offset for DATA blocks, reserved otherwise).
            let fixed_tail = self.source.read_vec(BLOCK_HEADER_SIZE - 16)?;
            let payload_len = block_length.saturating_sub(BLOCK_HEADER_SIZE);
            let tail = self.source.read_vec(payload_len)?;
            let abs_offset = u32::from_le_bytes([
                fixed_tail[0],
                fixed_tail[1],
                fixed_tail[2],
                fixed_tail[3],
            ]);

            let stack = self.streams.entry(stream_index).or_default();

            match &block_type {
                b"OBGN" => {
                    stack.push(OpenObject {
                        path: Vec::new(),
                        body: Vec::new(),
                        next_offset: 0,
                    });
                }
                b"OEND" => {
                    if let Some(obj) = stack.pop() {
                        if !obj.path.is_empty() {
                            let size = obj.body.len() as u64;
                            self.pending.push_back(Entry::file(
                                obj.path,
                                size,
                                DataSource::new(std::io::Cursor::new(obj.body), size),
                            ));
                        }
                    }
                }
                b"MHDR" | b"SBGN" | b"SEND" => {
                    // Metadata/session framing with nothing to materialize directly.
                }
                b"DATA" => {
                    let payload = &tail[..];
                    if let Some(obj) = stack.last_mut() {
                        if obj.path.is_empty() {
                            obj.path = Self::parse_path_tlvs(payload);
                        } else {
                            if abs_offset != obj.next_offset {
                                warn!(
                                    "novanet: stream {stream_index} data block out of order (expected {}, found {abs_offset})",
                                    obj.next_offset
                                );
                            }
                            obj.body.extend_from_slice(payload);
                            obj.next_offset = abs_offset + payload.len() as u32;
                        }
                    }
                }
                _ => {
                    return Err(Error::corrupt(format!(
                        "novanet: unknown block type {:?}",
                        String::from_utf8_lossy(&block_type)
                    )));
                }
            }
        }
    }
}

impl<R: Read> EntrySource<'static> for NovaNetDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds one 0x20-byte-header block: `abs_offset` fills the DATA-specific first word of
    /// the fixed tail (ignored by non-DATA types), `payload` is the variable body beyond the
    /// fixed 0x20-byte header.
    fn block(stream: u32, block_type: &[u8; 4], abs_offset: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&stream.to_le_bytes());
        let total_len = (BLOCK_HEADER_SIZE + payload.len()) as u32;
        out.extend_from_slice(&total_len.to_le_bytes());
        out.extend_from_slice(block_type);
        out.extend_from_slice(&abs_offset.to_le_bytes());
        out.resize(out.len() + (BLOCK_HEADER_SIZE - 16 - 4), 0); // remaining reserved fixed-tail bytes
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn single_stream_file_roundtrip() {
        let mut name_tlv = vec![SegType::Path as u8];
        name_tlv.extend_from_slice(&5u32.to_le_bytes());
        name_tlv.extend_from_slice(b"a.txt");

        let mut bytes = block(1, b"OBGN", 0, &[]);
        bytes.extend(block(1, b"DATA", 0, &name_tlv));
        bytes.extend(block(1, b"DATA", 0, b"hello"));
        bytes.extend(block(1, b"OEND", 0, &[]));

        let mut driver = NovaNetDriver::new(BlockReader::new(Cursor::new(bytes)));
        let entry = driver.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, vec!["a.txt".to_string()]);
        assert_eq!(entry.size, 5);
    }
}
