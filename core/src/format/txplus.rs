//! TXPLUS v45 driver.
//!
//! Tape header `?TXVer-45`; 512-byte sectors each carrying a trailing 2-byte checksum that is
//! stripped (not verified) from every body read. File headers are fixed 0x60-byte records; a
//! body whose first byte is 0 is compressed by the experimental scheme in
//! [`crate::txdecompress::TxDecompressor`], gated by [`TxplusOptions::trust_compression`] since
//! that decoder was never validated against a real tape image.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::decompressor::Decompressor;
use crate::endian::decode_dos_date_time;
use crate::entry::{DataSource, Entry, EntrySource};
use crate::error::{Error, Result};
use crate::txdecompress::TxDecompressor;

const TAPE_HEADER_MAGIC: &[u8] = b"?TXVer-45";
const SECTOR_SIZE: usize = 512;
const CHECKSUM_SIZE: usize = 2;
const FILE_HEADER_SIZE: usize = 0x60;
const FILE_MAGIC: u32 = 0x3A3A_3A3A;
#[cfg(test)]
const PADDING_BYTE: u8 = 0x50;

#[derive(Debug, Clone, Copy)]
pub struct TxplusOptions {
    /// When false (the default), a body flagged as compressed is written raw instead of run
    /// through `TxDecompressor`, since the scheme's correctness on real data is unconfirmed.
    pub trust_compression: bool,
}

impl Default for TxplusOptions {
    fn default() -> Self {
        TxplusOptions {
            trust_compression: false,
        }
    }
}

pub struct TxplusDriver<R: Read> {
    source: BlockReader<R>,
    options: TxplusOptions,
    started: bool,
    done: bool,
}

impl<R: Read> TxplusDriver<R> {
    pub fn new(source: BlockReader<R>, options: TxplusOptions) -> Self {
        TxplusDriver {
            source,
            options,
            started: false,
            done: false,
        }
    }

    fn read_sector_stripped(&mut self, sectors: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(sectors * (SECTOR_SIZE - CHECKSUM_SIZE));
        for _ in 0..sectors {
            let sector = self.source.read_vec(SECTOR_SIZE)?;
            out.extend_from_slice(&sector[..SECTOR_SIZE - CHECKSUM_SIZE]);
        }
        Ok(out)
    }

    fn ensure_tape_header(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        let header = self.source.read_vec(TAPE_HEADER_MAGIC.len())?;
        if header != TAPE_HEADER_MAGIC {
            return Err(Error::bad_magic(
                String::from_utf8_lossy(TAPE_HEADER_MAGIC).into_owned(),
                String::from_utf8_lossy(&header).into_owned(),
            ));
        }
        self.started = true;
        Ok(())
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        if self.done {
            return Ok(None);
        }
        self.ensure_tape_header()?;

        let sectors_needed = (FILE_HEADER_SIZE + SECTOR_SIZE - 1) / SECTOR_SIZE;
        let header = match self.read_sector_stripped(sectors_needed) {
            Ok(h) => h,
            Err(_) => {
                self.done = true;
                return Ok(None);
            }
        };
        if header.len() < FILE_HEADER_SIZE {
            self.done = true;
            return Ok(None);
        }

        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if magic != FILE_MAGIC {
            self.done = true;
            return Ok(None);
        }

        let size = u32::from_le_bytes(header[4..8].try_into().unwrap()) as u64;
        let date = u16::from_le_bytes([header[8], header[9]]);
        let time = u16::from_le_bytes([header[10], header[11]]);
        let attr = header[12];
        let path_bytes = &header[13..13 + 80.min(header.len() - 13)];
        let end = path_bytes.iter().position(|&b| b == 0).unwrap_or(path_bytes.len());
        let path_str = String::from_utf8_lossy(&path_bytes[..end]).into_owned();
        let path: Vec<String> = path_str
            .split(['\\', '/'])
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let body_sectors = (size as usize + SECTOR_SIZE - 1) / SECTOR_SIZE;
        let raw_body = self.read_sector_stripped(body_sectors.max(1))?;
        let compressed = !raw_body.is_empty() && raw_body[0] == 0;

        let body = if compressed && self.options.trust_compression {
            let mut decoder = TxDecompressor::default();
            let mut decoded = Vec::new();
            decoder.decompress_frame(&raw_body[1..], &mut decoded)?;
            decoded
        } else {
            raw_body.into_iter().take(size as usize).collect::<Vec<u8>>()
        };

        let final_size = if compressed && self.options.trust_compression {
            body.len() as u64
        } else {
            size
        };
        let mut entry = Entry::file(
            path,
            final_size,
            DataSource::new(std::io::Cursor::new(body), final_size),
        );
        entry.modify_time = Some(decode_dos_date_time(date, time));
        entry.attributes = crate::entry::Attributes::from_bits_truncate(attr);
        Ok(Some(entry))
    }
}

impl<R: Read> EntrySource<'static> for TxplusDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sector(body: &[u8]) -> Vec<u8> {
        let mut out = body.to_vec();
        out.resize(SECTOR_SIZE - CHECKSUM_SIZE, PADDING_BYTE);
        out.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        out
    }

    fn build_file_header(size: u32, path: &str) -> Vec<u8> {
        let mut header = vec![0u8; FILE_HEADER_SIZE];
        header[0..4].copy_from_slice(&FILE_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&size.to_le_bytes());
        header[13..13 + path.len()].copy_from_slice(path.as_bytes());
        header
    }

    #[test]
    fn parses_uncompressed_body() {
        let mut bytes = TAPE_HEADER_MAGIC.to_vec();
        bytes.extend(sector(&build_file_header(5, "DATA.TXT")));
        bytes.extend(sector(b"hello"));

        let mut driver = TxplusDriver::new(BlockReader::new(Cursor::new(bytes)), TxplusOptions::default());
        let entry = driver.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, vec!["DATA.TXT".to_string()]);
        assert_eq!(entry.size, 5);
    }
}
