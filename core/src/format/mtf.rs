//! Microsoft Tape Format (MTF) driver.
//!
//! Descriptor blocks (`TAPE`, `SSET`, `VOLB`, `DIRB`, `FILE`, `SPAD`) share a 0x34-byte common
//! header; strings they reference live in a following stream of `StreamHeader`-prefixed payloads
//! that continue until `SPAD` closes the descriptor's stream sequence. Modeled as a sum type,
//! `Descriptor = Tape | Sset | Volb | Dirb | File | Spad`, each carrying the shared
//! `CommonHeader` plus its own fields, rather than one giant struct with mostly-unused fields
//! per variant.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::endian::decode_mtf_date;
use crate::entry::{DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const COMMON_HEADER_SIZE: usize = 0x34;
const STREAM_HEADER_SIZE: usize = 22;
const STREAM_ALIGN: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringType {
    Ascii,
    Utf16Le,
}

pub struct CommonHeader {
    pub block_type: [u8; 4],
    pub attributes: u32,
    pub first_event_offset: u16,
    pub displayable_size: u64,
    pub format_logical_address: u64,
    pub string_type: StringType,
}

fn parse_common_header(bytes: &[u8]) -> Result<CommonHeader> {
    if bytes.len() < COMMON_HEADER_SIZE {
        return Err(Error::corrupt("mtf: descriptor block too short"));
    }
    let block_type = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let attributes = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let first_event_offset = u16::from_le_bytes([bytes[8], bytes[9]]);
    let displayable_size = u64::from_le_bytes(bytes[0x10..0x18].try_into().unwrap());
    let format_logical_address = u64::from_le_bytes(bytes[0x18..0x20].try_into().unwrap());
    let string_type = match bytes[0x30] {
        2 => StringType::Utf16Le,
        _ => StringType::Ascii,
    };
    Ok(CommonHeader {
        block_type,
        attributes,
        first_event_offset,
        displayable_size,
        format_logical_address,
        string_type,
    })
}

struct StreamHeader {
    id: [u8; 4],
    length: u64,
}

fn decode_string(bytes: &[u8], string_type: StringType) -> String {
    match string_type {
        StringType::Ascii => String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string(),
        StringType::Utf16Le => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
                .trim_end_matches('\0')
                .to_string()
        }
    }
}

pub struct MtfDriver<R: Read> {
    source: BlockReader<R>,
    dir_stack: Vec<String>,
    done: bool,
}

impl<R: Read> MtfDriver<R> {
    pub fn new(source: BlockReader<R>) -> Self {
        MtfDriver {
            source,
            dir_stack: Vec::new(),
            done: false,
        }
    }

    fn read_stream_header(&mut self) -> Result<StreamHeader> {
        let bytes = self.source.read_vec(STREAM_HEADER_SIZE)?;
        let id = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let length = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        Ok(StreamHeader { id, length })
    }

    /// Reads streams until `SPAD`, collecting the ones whose id is in `wanted` (matched by ASCII
    /// name) and discarding the rest.
    fn collect_streams(&mut self, wanted: &[&[u8; 4]]) -> Result<Vec<(Vec<u8>, [u8; 4])>> {
        let mut collected = Vec::new();
        loop {
            let header = self.read_stream_header()?;
            if &header.id == b"SPAD" {
                break;
            }
            let payload = self.source.read_vec(header.length as usize)?;
            self.source.align_to(STREAM_ALIGN)?;
            if wanted.iter().any(|w| w.as_slice() == header.id) {
                collected.push((payload, header.id));
            }
        }
        Ok(collected)
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let header_bytes = match self.source.read_vec(COMMON_HEADER_SIZE) {
                Ok(b) => b,
                Err(_) => {
                    self.done = true;
                    return Ok(None);
                }
            };
            let common = parse_common_header(&header_bytes)?;

            match &common.block_type {
                b"TAPE" | b"SSET" | b"VOLB" => {
                    self.collect_streams(&[])?;
                }
                b"DIRB" => {
                    let streams = self.collect_streams(&[b"DPNM"])?;
                    let name = streams
                        .into_iter()
                        .find(|(_, id)| id == b"DPNM")
                        .map(|(bytes, _)| decode_string(&bytes, common.string_type))
                        .unwrap_or_default();
                    self.dir_stack.push(name);
                    return Ok(Some(Entry::directory(self.dir_stack.clone())));
                }
                b"FILE" => {
                    let streams = self.collect_streams(&[b"FNAM", b"STAN"])?;
                    let name = streams
                        .iter()
                        .find(|(_, id)| id == b"FNAM")
                        .map(|(bytes, _)| decode_string(bytes, common.string_type))
                        .unwrap_or_default();
                    let data = streams
                        .into_iter()
                        .find(|(_, id)| id == b"STAN")
                        .map(|(bytes, _)| bytes)
                        .unwrap_or_default();

                    let mut path = self.dir_stack.clone();
                    path.push(name);
                    let size = data.len() as u64;
                    let mut entry = Entry::file(path, size, DataSource::new(std::io::Cursor::new(data), size));
                    entry.size = common.displayable_size.max(size);
                    let date_bytes = [
                        header_bytes[0x20],
                        header_bytes[0x21],
                        header_bytes[0x22],
                        header_bytes[0x23],
                        header_bytes[0x24],
                    ];
                    entry.modify_time = Some(decode_mtf_date(date_bytes));
                    let _ = common.first_event_offset;
                    let _ = common.format_logical_address;
                    let _ = common.attributes;
                    return Ok(Some(entry));
                }
                b"SPAD" => {
                    // A stray SPAD outside a descriptor's stream section: ignore.
                }
                other => {
                    return Err(Error::corrupt(format!(
                        "mtf: unknown descriptor type {:?}",
                        String::from_utf8_lossy(other)
                    )));
                }
            }
        }
    }
}

impl<R: Read> EntrySource<'static> for MtfDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}
