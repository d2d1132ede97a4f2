//! QIC-Stream v4 / Maynstream driver.
//!
//! Fixed 0x50-byte headers introduced by a lead byte (`0x08` directory, `0x09` file); anything
//! else is garbage to realign past by skipping a fixed 0x1FE-byte span, the closest thing this
//! format gives to a magic. Maynstream reuses the same header layout but additionally treats a
//! non-zero primary size as a continuation-from-prior-tape marker.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::endian::Timestamp;
use crate::entry::{Continuation, DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const LEAD_DIRECTORY: u8 = 0x08;
const LEAD_FILE: u8 = 0x09;
const HEADER_SIZE: usize = 0x50;
const REALIGN_SKIP: u64 = 0x1FE;
const NAME_LEN_OFFSET: usize = 0x4C;
const SIZE_PRIMARY_OFFSET: usize = 0x04;
const SIZE_SECONDARY_OFFSET: usize = 0x08;
const EXTENSION_FLAG_OFFSET: usize = 0x16;
const EXTENSION_SIZE: usize = 0x24;

/// Whether continuation markers (Maynstream) are interpreted, or ignored (plain v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    QicStreamV4,
    Maynstream,
}

pub struct QicStreamV4Driver<R: Read> {
    source: BlockReader<R>,
    variant: Variant,
    done: bool,
}

impl<R: Read> QicStreamV4Driver<R> {
    pub fn new(source: BlockReader<R>, variant: Variant) -> Self {
        QicStreamV4Driver {
            source,
            variant,
            done: false,
        }
    }

    fn read_date(header: &[u8], offset: usize) -> Timestamp {
        let field = |i: usize| u16::from_le_bytes([header[offset + i * 2], header[offset + i * 2 + 1]]);
        Timestamp::new(
            field(0) as i32,
            field(1) as u8,
            field(2) as u8,
            field(3) as u8,
            field(4) as u8,
            field(5) as u8,
        )
    }

    fn split_path(bytes: &[u8]) -> Vec<String> {
        bytes
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let lead = match self.source.read_u8() {
                Ok(b) => b,
                Err(_) => {
                    self.done = true;
                    return Ok(None);
                }
            };

            if lead != LEAD_DIRECTORY && lead != LEAD_FILE {
                if self.source.skip(REALIGN_SKIP).is_err() {
                    self.done = true;
                    return Ok(None);
                }
                continue;
            }

            let header = self.source.read_vec(HEADER_SIZE)?;
            let primary_size =
                u32::from_le_bytes(header[SIZE_PRIMARY_OFFSET..SIZE_PRIMARY_OFFSET + 4].try_into().unwrap());
            let secondary_size = u64::from_le_bytes(
                header[SIZE_SECONDARY_OFFSET..SIZE_SECONDARY_OFFSET + 8]
                    .try_into()
                    .unwrap(),
            );
            let size = if primary_size != 0 {
                primary_size as u64
            } else {
                secondary_size
            };

            let has_extension = header[EXTENSION_FLAG_OFFSET] != 0;
            if has_extension {
                self.source.skip(EXTENSION_SIZE as u64)?;
            }

            let name_len = u16::from_le_bytes([header[NAME_LEN_OFFSET], header[NAME_LEN_OFFSET + 1]]) as usize;
            let name_bytes = self.source.read_vec(name_len)?;
            let path = Self::split_path(&name_bytes);
            let date = Self::read_date(&header, 0x20);

            if lead == LEAD_DIRECTORY {
                let mut entry = Entry::directory(path);
                entry.modify_time = Some(date);
                return Ok(Some(entry));
            }

            let is_continuation =
                self.variant == Variant::Maynstream && primary_size != 0 && secondary_size != 0;

            let data = self.source.read_vec(size as usize)?;
            let mut entry = Entry::file(path, size, DataSource::new(std::io::Cursor::new(data), size));
            entry.modify_time = Some(date);
            if is_continuation {
                entry.continuation = Continuation::Append;
            }
            return Ok(Some(entry));
        }
    }
}

impl<R: Read> EntrySource<'static> for QicStreamV4Driver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}
