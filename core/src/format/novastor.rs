//! NovaStor v4 driver: fixed 0x80-byte headers aligned to 0x400 boundaries.
//!
//! A name sentinel (`0xFF` at the name field's first byte) means the real name lives in a
//! following 0x100-byte block rather than the header itself, since 0x52 bytes isn't always
//! enough for a full path.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::endian::decode_dos_date_time;
use crate::entry::{DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const HEADER_SIZE: usize = 0x80;
const HEADER_ALIGN: u64 = 0x400;
const NAME_OFFSET: usize = 0x0E;
const NAME_FIELD_LEN: usize = 0x52;
const MAGIC_OFFSET: usize = 0x74;
const MAGIC: &[u8] = b"<<NoVaStOr>>";
const NAME_OVERFLOW_SENTINEL: u8 = 0xFF;
const OVERFLOW_BLOCK_SIZE: usize = 0x100;

pub struct NovaStorV4Driver<R: Read> {
    source: BlockReader<R>,
    done: bool,
}

impl<R: Read> NovaStorV4Driver<R> {
    pub fn new(source: BlockReader<R>) -> Self {
        NovaStorV4Driver {
            source,
            done: false,
        }
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        if self.done {
            return Ok(None);
        }
        if self.source.align_to(HEADER_ALIGN).is_err() {
            self.done = true;
            return Ok(None);
        }

        let header = match self.source.read_vec(HEADER_SIZE) {
            Ok(h) => h,
            Err(_) => {
                self.done = true;
                return Ok(None);
            }
        };

        let magic = &header[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC.len()];
        if magic != MAGIC {
            return Err(Error::bad_magic(
                String::from_utf8_lossy(MAGIC).into_owned(),
                String::from_utf8_lossy(magic).into_owned(),
            ));
        }

        let size = u32::from_le_bytes(header[0..4].try_into().unwrap()) as u64;
        let date = u16::from_le_bytes([header[4], header[5]]);
        let time = u16::from_le_bytes([header[6], header[7]]);
        let attributes_byte = header[0x0D];

        let name = if header[NAME_OFFSET] == NAME_OVERFLOW_SENTINEL {
            let overflow = self.source.read_vec(OVERFLOW_BLOCK_SIZE)?;
            let end = overflow.iter().position(|&b| b == 0).unwrap_or(overflow.len());
            String::from_utf8_lossy(&overflow[..end]).into_owned()
        } else {
            let name_bytes = &header[NAME_OFFSET..NAME_OFFSET + NAME_FIELD_LEN];
            let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
            String::from_utf8_lossy(&name_bytes[..end]).into_owned()
        };

        let data = self.source.read_vec(size as usize)?;
        let mut entry = Entry::file(
            vec![name],
            size,
            DataSource::new(std::io::Cursor::new(data), size),
        );
        entry.modify_time = Some(decode_dos_date_time(date, time));
        entry.attributes = crate::entry::Attributes::from_bits_truncate(attributes_byte);
        Ok(Some(entry))
    }
}

impl<R: Read> EntrySource<'static> for NovaStorV4Driver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build(name: &str, data: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&(data.len() as u32).to_le_bytes());
        header[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name.as_bytes());
        header[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC.len()].copy_from_slice(MAGIC);
        let mut out = header;
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn parses_inline_name_record() {
        let bytes = build("file.dat", b"payload!");
        let mut driver = NovaStorV4Driver::new(BlockReader::new(Cursor::new(bytes)));
        let entry = driver.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, vec!["file.dat".to_string()]);
        assert_eq!(entry.size, 8);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = build("file.dat", b"x");
        bytes[MAGIC_OFFSET] = 0;
        let mut driver = NovaStorV4Driver::new(BlockReader::new(Cursor::new(bytes)));
        assert!(driver.next_entry().is_err());
    }
}
