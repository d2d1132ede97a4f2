//! Mountain FileSafe driver (Ver4 / Ver4b / Ver5).
//!
//! A 0x200-byte volume header precedes a catalog of 0x20-byte records; a record whose first
//! byte is `0xFF` and repeats twice in a row terminates the catalog. A `0x5C`-first-byte record
//! sets the "current directory" used by subsequent file records until the next such record.
//! File bodies follow the catalog in order, each preceded by its own small header.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::endian::decode_dos_date_time;
use crate::entry::{DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const VOLUME_HEADER_SIZE: usize = 0x200;
const CATALOG_RECORD_SIZE: usize = 0x20;
const CURRENT_DIR_MARKER: u8 = 0x5C;
const CATALOG_END_MARKER: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Ver4,
    Ver4b,
    Ver5,
}

pub fn detect_variant(prefix: &[u8; 4], byte_at_0xe0: Option<u8>) -> Variant {
    if prefix[0] == 0x55 {
        Variant::Ver5
    } else if byte_at_0xe0.is_some() {
        Variant::Ver4b
    } else {
        Variant::Ver4
    }
}

struct CatalogEntry {
    dir: Vec<String>,
    name: String,
    size: u64,
    date: crate::endian::Timestamp,
    sequence: u16,
}

pub struct FileSafeDriver<R: Read> {
    source: BlockReader<R>,
    variant: Variant,
    catalog: std::vec::IntoIter<CatalogEntry>,
}

impl<R: Read> FileSafeDriver<R> {
    pub fn open(mut source: BlockReader<R>, variant: Variant) -> Result<Self> {
        source.skip(VOLUME_HEADER_SIZE as u64)?;

        let mut current_dir: Vec<String> = Vec::new();
        let mut entries = Vec::new();
        let mut prev_was_end = false;

        loop {
            let record = source.read_vec(CATALOG_RECORD_SIZE)?;
            if record[0] == CATALOG_END_MARKER {
                if prev_was_end {
                    break;
                }
                prev_was_end = true;
                continue;
            }
            prev_was_end = false;

            if record[0] == CURRENT_DIR_MARKER {
                let end = record[1..].iter().position(|&b| b == 0).map(|p| p + 1).unwrap_or(record.len());
                let name = String::from_utf8_lossy(&record[1..end]).into_owned();
                current_dir = name.split(['\\', '/']).filter(|s| !s.is_empty()).map(String::from).collect();
                continue;
            }

            let name_end = record[0..8].iter().position(|&b| b == b' ' || b == 0).unwrap_or(8);
            let ext_end = record[8..11].iter().position(|&b| b == b' ' || b == 0).unwrap_or(3);
            let mut name = String::from_utf8_lossy(&record[0..name_end]).into_owned();
            if ext_end > 0 {
                name.push('.');
                name.push_str(&String::from_utf8_lossy(&record[8..8 + ext_end]));
            }

            let time = u16::from_le_bytes([record[0x16], record[0x16 + 1]]);
            let date = u16::from_le_bytes([record[0x18], record[0x18 + 1]]);
            let sequence = u16::from_le_bytes([record[0x14], record[0x14 + 1]]);
            let size = u32::from_le_bytes(record[0x1C..0x20].try_into().unwrap()) as u64;

            entries.push(CatalogEntry {
                dir: current_dir.clone(),
                name,
                size,
                date: decode_dos_date_time(date, time),
                sequence,
            });
        }

        Ok(FileSafeDriver {
            source,
            variant,
            catalog: entries.into_iter(),
        })
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        let record = match self.catalog.next() {
            Some(r) => r,
            None => return Ok(None),
        };

        match self.variant {
            Variant::Ver4 | Variant::Ver4b => {
                let mut marker = [0u8; 2];
                self.source.read_exact(&mut marker)?;
                if marker != [0x55, 0xAA] {
                    return Err(Error::bad_magic("55aa", hex_two(marker)));
                }
            }
            Variant::Ver5 => {
                let mut prefix = self.source.read_vec(0x18)?;
                let name_len = prefix[0x17 - 1] as usize;
                let _ = self.source.read_vec(name_len)?;
                prefix.clear();
            }
        }

        let body = self.source.read_vec(record.size as usize)?;
        let mut path = record.dir;
        path.push(record.name);
        let size = record.size;
        let mut entry = Entry::file(path, size, DataSource::new(std::io::Cursor::new(body), size));
        entry.modify_time = Some(record.date);
        let _ = record.sequence;
        Ok(Some(entry))
    }
}

impl<R: Read> EntrySource<'static> for FileSafeDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

fn hex_two(b: [u8; 2]) -> String {
    format!("{:02x}{:02x}", b[0], b[1])
}
