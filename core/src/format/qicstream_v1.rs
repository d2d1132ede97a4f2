//! QIC-Stream v1 (DOS QIC-113) driver.
//!
//! Records begin with the magic `33 CC 33 CC`; the body carries a variable-length metadata blob
//! (packed date, attribute flags, total record size), then a length-prefixed name and
//! NUL-separated subdirectory path. File data follows the header directly.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::endian::decode_qic_packed_date;
use crate::entry::{Attributes, DataSource, Entry, EntryKind, EntrySource};
use crate::error::{Error, Result};

const MAGIC: [u8; 4] = [0x33, 0xCC, 0x33, 0xCC];

const NOT_READ_ONLY: u8 = 0x02;
const HIDDEN: u8 = 0x08;
const SYSTEM: u8 = 0x10;
const DIRECTORY: u8 = 0x20;
#[allow(dead_code)]
const LAST_ENTRY: u8 = 0x40;
const FINAL_ENTRY: u8 = 0x80;

/// Reads sequential QIC-Stream v1 records from `source`.
pub struct QicStreamV1Driver<R: Read> {
    source: BlockReader<R>,
    done: bool,
}

impl<R: Read> QicStreamV1Driver<R> {
    pub fn new(source: BlockReader<R>) -> Self {
        QicStreamV1Driver {
            source,
            done: false,
        }
    }

    fn find_next_magic(&mut self) -> Result<()> {
        self.source.scan_for_magic(&MAGIC)?;
        Ok(())
    }

    /// Parses one record. `size` accounts for the header bytes already consumed via `m`, the
    /// file-name, and the subdirectory so the caller can derive the remaining data length.
    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        if self.done {
            return Ok(None);
        }
        if self.find_next_magic().is_err() {
            self.done = true;
            return Ok(None);
        }

        let meta_len = self.source.read_u8()? as usize;
        let meta = self.source.read_vec(meta_len)?;
        if meta.len() < 9 {
            return Err(Error::corrupt("qicstream v1: metadata block too short"));
        }
        let flags = meta[0];
        let packed_date = u32::from_le_bytes([meta[1], meta[2], meta[3], meta[4]]);
        let total_size = u32::from_le_bytes([meta[5], meta[6], meta[7], meta[8]]);

        let name_len = self.source.read_u8()? as usize;
        let name_bytes = self.source.read_vec(name_len)?;
        let name = String::from_utf8_lossy(&name_bytes).into_owned();

        let subdir_len = self.source.read_u8()? as usize;
        let subdir_bytes = self.source.read_vec(subdir_len)?;

        let mut path: Vec<String> = subdir_bytes
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
        if !name.is_empty() {
            path.push(name);
        }

        let mut attrs = Attributes::empty();
        if flags & NOT_READ_ONLY == 0 {
            attrs.insert(Attributes::READ_ONLY);
        }
        if flags & HIDDEN != 0 {
            attrs.insert(Attributes::HIDDEN);
        }
        if flags & SYSTEM != 0 {
            attrs.insert(Attributes::SYSTEM);
        }
        let is_dir = flags & DIRECTORY != 0;
        if flags & FINAL_ENTRY != 0 {
            self.done = true;
        }

        let header_consumed = 1 + meta_len + 1 + name_len + 1 + subdir_len;
        let data_size = (total_size as usize).saturating_sub(header_consumed) as u64;

        if is_dir {
            let mut entry = Entry::directory(path);
            entry.attributes = attrs | Attributes::DIRECTORY;
            entry.modify_time = Some(decode_qic_packed_date(packed_date));
            return Ok(Some(entry));
        }

        let data = self.source.read_vec(data_size as usize)?;
        let mut entry = Entry::file(
            path,
            data_size,
            DataSource::new(std::io::Cursor::new(data), data_size),
        );
        entry.attributes = attrs;
        entry.modify_time = Some(decode_qic_packed_date(packed_date));
        Ok(Some(entry))
    }
}

impl<R: Read> EntrySource<'static> for QicStreamV1Driver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_record(name: &str, data: &[u8], flags: u8) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        let mut meta = Vec::new();
        meta.push(flags);
        meta.extend_from_slice(&0u32.to_le_bytes()); // packed date
        let header_len = 1 + 9 + 1 + name.len() + 1; // meta_len byte + meta + name_len + name + subdir_len
        let total_size = header_len + data.len();
        meta.extend_from_slice(&(total_size as u32).to_le_bytes());
        out.push(meta.len() as u8);
        out.extend_from_slice(&meta);
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out.push(0); // empty subdir
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn parses_single_file_record() {
        let bytes = build_record("readme.txt", b"hello", NOT_READ_ONLY);
        let mut driver = QicStreamV1Driver::new(BlockReader::new(Cursor::new(bytes)));
        let entry = driver.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, vec!["readme.txt".to_string()]);
        assert_eq!(entry.kind, EntryKind::File);
        assert!(!entry.attributes.contains(Attributes::READ_ONLY));
    }

    #[test]
    fn tolerates_garbage_before_magic() {
        let mut bytes = vec![0xDE, 0xAD, 0xBE, 0xEF];
        bytes.extend(build_record("a.txt", b"x", NOT_READ_ONLY));
        let mut driver = QicStreamV1Driver::new(BlockReader::new(Cursor::new(bytes)));
        let entry = driver.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, vec!["a.txt".to_string()]);
    }
}
