//! ArcServe / Arcada driver.
//!
//! A file header (`AB BA AB BA`) is followed by a sequence of chunks (`AC CA AC CA`). Chunk type
//! 0 ends the sequence, type 0xC carries an alternate name, type 0x1 starts or continues data,
//! and type 0x10 stores its length at a different offset than the others. Data chunks may embed
//! a sub-TLV stream; a sub-type 0x1D entry with length 0 means "the rest of this chunk is raw
//! payload", the signal to stop parsing sub-TLVs and just read bytes.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::entry::{DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const FILE_MAGIC: [u8; 4] = [0xAB, 0xBA, 0xAB, 0xBA];
const CHUNK_MAGIC: [u8; 4] = [0xAC, 0xCA, 0xAC, 0xCA];

const CHUNK_END: u8 = 0x0;
const CHUNK_ALT_NAME: u8 = 0xC;
const CHUNK_DATA: u8 = 0x1;
const CHUNK_VARIANT_LENGTH: u8 = 0x10;

const SUB_TYPE_REST_IS_PAYLOAD: u8 = 0x1D;

pub struct ArcServeDriver<R: Read> {
    source: BlockReader<R>,
    done: bool,
}

impl<R: Read> ArcServeDriver<R> {
    pub fn new(source: BlockReader<R>) -> Self {
        ArcServeDriver {
            source,
            done: false,
        }
    }

    fn read_chunk_header(&mut self) -> Result<Option<(u8, usize)>> {
        if self.source.scan_for_magic(&CHUNK_MAGIC).is_err() {
            return Ok(None);
        }
        let chunk_type = self.source.read_u8()?;
        let len = if chunk_type == CHUNK_VARIANT_LENGTH {
            self.source.skip(0x14 - 5)?; // seek to the offset-0x14 length field
            crate::endian::read_u32_le(&mut self.source)? as usize
        } else {
            self.source.skip(0xC - 5)?; // seek to the offset-0xC length field
            crate::endian::read_u32_le(&mut self.source)? as usize
        };
        Ok(Some((chunk_type, len)))
    }

    /// Parses a data chunk's body, which is either a raw byte run or a sub-TLV stream that ends
    /// once a sub-type-0x1D zero-length marker says the remainder is payload.
    fn parse_data_chunk(&mut self, len: usize) -> Result<Vec<u8>> {
        let body = self.source.read_vec(len)?;
        let mut cursor = std::io::Cursor::new(&body);
        let mut offset = 0usize;
        loop {
            if offset + 5 > body.len() {
                break;
            }
            let mut header = [0u8; 5];
            cursor.read_exact(&mut header)?;
            let sub_type = header[0];
            let sub_len =
                u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
            offset += 5;
            if sub_type == SUB_TYPE_REST_IS_PAYLOAD && sub_len == 0 {
                return Ok(body[offset..].to_vec());
            }
            if offset + sub_len > body.len() {
                break;
            }
            cursor.set_position((offset + sub_len) as u64);
            offset += sub_len;
        }
        Ok(Vec::new())
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        if self.done {
            return Ok(None);
        }
        if self.source.scan_for_magic(&FILE_MAGIC).is_err() {
            self.done = true;
            return Ok(None);
        }

        let name_len = self.source.read_u8()? as usize;
        let name_bytes = self.source.read_vec(name_len)?;
        let mut path: Vec<String> = vec![String::from_utf8_lossy(&name_bytes).into_owned()];
        let mut body = Vec::new();

        loop {
            let (chunk_type, len) = match self.read_chunk_header()? {
                Some(v) => v,
                None => {
                    self.done = true;
                    break;
                }
            };
            match chunk_type {
                CHUNK_END => break,
                CHUNK_ALT_NAME => {
                    let alt = self.source.read_vec(len)?;
                    path = vec![String::from_utf8_lossy(&alt).into_owned()];
                }
                CHUNK_DATA => {
                    body.extend(self.parse_data_chunk(len)?);
                }
                _ => {
                    self.source.skip(len as u64)?;
                }
            }
        }

        if path.is_empty() {
            return Err(Error::corrupt("arcserve: file header produced no name"));
        }
        let size = body.len() as u64;
        Ok(Some(Entry::file(
            path,
            size,
            DataSource::new(std::io::Cursor::new(body), size),
        )))
    }
}

impl<R: Read> EntrySource<'static> for ArcServeDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(chunk_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = CHUNK_MAGIC.to_vec();
        out.push(chunk_type);
        if chunk_type == CHUNK_VARIANT_LENGTH {
            out.resize(out.len() + (0x14 - 5), 0);
        } else {
            out.resize(out.len() + (0xC - 5), 0);
        }
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn parses_file_with_raw_data_chunk() {
        let mut bytes = FILE_MAGIC.to_vec();
        bytes.push(5);
        bytes.extend_from_slice(b"a.txt");

        let mut sub_tlv = vec![SUB_TYPE_REST_IS_PAYLOAD];
        sub_tlv.extend_from_slice(&0u32.to_le_bytes());
        sub_tlv.extend_from_slice(b"hello");
        bytes.extend(chunk(CHUNK_DATA, &sub_tlv));
        bytes.extend(chunk(CHUNK_END, &[]));

        let mut driver = ArcServeDriver::new(BlockReader::new(Cursor::new(bytes)));
        let entry = driver.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, vec!["a.txt".to_string()]);
        assert_eq!(entry.size, 5);
    }
}
