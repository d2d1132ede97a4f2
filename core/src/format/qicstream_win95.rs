//! QIC-Stream Win95 driver (qicstream95 / qicstream1a).
//!
//! Two magics alternate: a file-header magic `33 CC 33 CC` carrying the UTF-16LE name, and a
//! data-header magic `66 99 66 99` marking the start of the body. The declared file size is not
//! trusted directly; it is derived from the distance to the next file header, minus that
//! header's own six-byte magic-and-length preamble, so this driver needs a seekable source to
//! rewind to the body after scanning ahead for the boundary.

use std::io::{Read, Seek, SeekFrom};

use crate::blockreader::BlockReader;
use crate::entry::{DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const FILE_MAGIC: [u8; 4] = [0x33, 0xCC, 0x33, 0xCC];
const DATA_MAGIC: [u8; 4] = [0x66, 0x99, 0x66, 0x99];

pub struct QicStreamWin95Driver<R: Read + Seek> {
    source: BlockReader<R>,
    done: bool,
}

impl<R: Read + Seek> QicStreamWin95Driver<R> {
    pub fn new(source: BlockReader<R>) -> Self {
        QicStreamWin95Driver {
            source,
            done: false,
        }
    }

    fn read_name(&mut self) -> Result<Vec<String>> {
        let name_len = crate::endian::read_u16_le(&mut self.source)? as usize;
        let mut units = Vec::with_capacity(name_len);
        for _ in 0..name_len {
            units.push(crate::endian::read_u16_le(&mut self.source)?);
        }
        let name = String::from_utf16_lossy(&units);

        let subdir_len = crate::endian::read_u16_le(&mut self.source)? as usize;
        let subdir_bytes = self.source.read_vec(subdir_len)?;
        let mut path: Vec<String> = subdir_bytes
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
        if !name.is_empty() {
            path.push(name);
        }
        Ok(path)
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        if self.done {
            return Ok(None);
        }
        if self.source.scan_for_magic(&FILE_MAGIC).is_err() {
            self.done = true;
            return Ok(None);
        }
        let path = self.read_name()?;

        if self.source.scan_for_magic(&DATA_MAGIC).is_err() {
            self.done = true;
            return Err(Error::corrupt("qicstream win95: data header not found"));
        }
        let data_start = self.source.position();

        let next_header_offset = self.source.scan_for_magic(&FILE_MAGIC).ok();
        let end_of_source = if next_header_offset.is_none() {
            self.source.inner_mut().seek(SeekFrom::End(0))?
        } else {
            0
        };

        let size = match next_header_offset {
            Some(offset) => offset.saturating_sub(data_start).saturating_sub(6),
            None => end_of_source.saturating_sub(data_start),
        };

        self.source.seek_to(data_start)?;
        let body = self.source.read_vec(size as usize)?;

        if next_header_offset.is_none() {
            self.done = true;
        } else {
            // Resume scanning for the *next* entry's header from where the lookahead left off,
            // which is already the current position after re-reading the body.
            self.source.seek_to(data_start + size)?;
        }

        Ok(Some(Entry::file(
            path,
            size,
            DataSource::new(std::io::Cursor::new(body), size),
        )))
    }
}

impl<R: Read + Seek> EntrySource<'static> for QicStreamWin95Driver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}
