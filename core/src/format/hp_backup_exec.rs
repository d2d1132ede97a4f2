//! HP / Backup Exec driver: a catalog stream and a data stream arrive as two separate inputs.
//!
//! The catalog is parsed fully up front into an ordered list of records (name, size, packed
//! date/time, flags), then the data stream is consumed strictly in catalog order.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::endian::decode_dos_date_time;
use crate::entry::{DataSource, Entry, EntryKind, EntrySource};
use crate::error::{Error, Result};

const DATA_ALIGN: u64 = 0x4000;

pub struct CatalogRecord {
    pub path: Vec<String>,
    pub size: u64,
    pub flags: u32,
    pub date_time: crate::endian::Timestamp,
    pub is_directory: bool,
}

/// Parses the full catalog stream into memory.
pub fn parse_catalog<R: Read>(source: &mut BlockReader<R>) -> Result<Vec<CatalogRecord>> {
    let mut records = Vec::new();
    loop {
        let header_len = match crate::endian::read_u16_le(source) {
            Ok(v) => v as usize,
            Err(_) => break,
        };
        if header_len < 2 {
            break;
        }
        let body = source.read_vec(header_len - 2)?;
        if body.len() < 16 {
            return Err(Error::corrupt("hp/backup-exec: catalog record too short"));
        }
        let flags = u32::from_le_bytes(body[0..4].try_into().unwrap());
        let packed_date = u32::from_le_bytes(body[4..8].try_into().unwrap());
        let packed_time = u32::from_le_bytes(body[8..12].try_into().unwrap());
        let size = u32::from_le_bytes(body[12..16].try_into().unwrap()) as u64;
        let name_bytes = &body[16..];
        let full_name = String::from_utf8_lossy(name_bytes)
            .trim_end_matches('\0')
            .to_string();
        let path: Vec<String> = full_name
            .split(['\\', '/'])
            .filter(|s| !s.is_empty() && !s.contains(':'))
            .map(|s| s.to_string())
            .collect();

        let date_time = decode_dos_date_time(packed_date as u16, packed_time as u16);
        let is_directory = flags & 0x10 != 0;
        records.push(CatalogRecord {
            path,
            size,
            flags,
            date_time,
            is_directory,
        });
    }
    Ok(records)
}

/// Streams file bodies from the data file, in catalog order, aligned to `DATA_ALIGN` boundaries.
pub struct HpBackupExecDriver<R: Read> {
    data: BlockReader<R>,
    records: std::vec::IntoIter<CatalogRecord>,
}

impl<R: Read> HpBackupExecDriver<R> {
    pub fn new(data: BlockReader<R>, records: Vec<CatalogRecord>) -> Self {
        HpBackupExecDriver {
            data,
            records: records.into_iter(),
        }
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        let record = match self.records.next() {
            Some(r) => r,
            None => return Ok(None),
        };

        if record.is_directory {
            let mut entry = Entry::directory(record.path);
            entry.modify_time = Some(record.date_time);
            entry.kind = EntryKind::Directory;
            return Ok(Some(entry));
        }

        self.data.align_to(DATA_ALIGN)?;
        let body = self.data.read_vec(record.size as usize)?;
        let mut entry = Entry::file(
            record.path,
            record.size,
            DataSource::new(std::io::Cursor::new(body), record.size),
        );
        entry.modify_time = Some(record.date_time);
        Ok(Some(entry))
    }
}

impl<R: Read> EntrySource<'static> for HpBackupExecDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_catalog_record(name: &str, flags: u32, size: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&flags.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes()); // packed date
        body.extend_from_slice(&0u32.to_le_bytes()); // packed time
        body.extend_from_slice(&size.to_le_bytes());
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        let mut out = ((body.len() + 2) as u16).to_le_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn parses_file_catalog_record_path() {
        let bytes = build_catalog_record("C:\\docs\\a.txt", 0, 42);
        let mut reader = BlockReader::new(Cursor::new(bytes));
        let records = parse_catalog(&mut reader).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, vec!["docs".to_string(), "a.txt".to_string()]);
        assert!(!records[0].is_directory);
        assert_eq!(records[0].size, 42);
    }
}
