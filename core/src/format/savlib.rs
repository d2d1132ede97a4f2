//! SAV/LIB (AS/400) driver. EBCDIC throughout; 0x200-byte blocks.
//!
//! A descriptor block is recognized by the magic `0xFFFFFFFF` followed by the EBCDIC string
//! `L/D OBJECT DESCRIPTOR`. Content whose leading two bytes are `0xC4FF` is RLE-compressed,
//! decoded by [`decompress_rle`]; everything else is copied through as raw bytes. A `QSRDSSPC.1`
//! object is a secondary catalog mapping base name to extension, applied to restore extensions
//! stripped by the AS/400 naming convention. The restored extension also selects the
//! conventional source-physical-file library (e.g. `CLP` members live under `QCLSRC`), which
//! becomes the object's output subdirectory.

use std::collections::HashMap;
use std::io::Read;

use log::warn;

use crate::blockreader::BlockReader;
use crate::entry::{DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const BLOCK_SIZE: usize = 0x200;
const DESCRIPTOR_MAGIC: u32 = 0xFFFFFFFF;
const DESCRIPTOR_TAG: &[u8] = b"L/D OBJECT DESCRIPTOR";
const RLE_MAGIC_PREFIX: u8 = 0xC4;
const RLE_MAGIC_SECOND_BYTE: u8 = 0xFF;
const EXTENSION_CATALOG_OBJECT: &str = "QSRDSSPC.1";

/// Whether the legacy `0x80` EBCDIC byte (which this driver's source tapes used as an ad hoc
/// newline) is translated to `\n` on output. See the options struct in the driver factory.
#[derive(Debug, Clone, Copy)]
pub struct SavLibOptions {
    pub translate_0x80_to_newline: bool,
}

impl Default for SavLibOptions {
    fn default() -> Self {
        SavLibOptions {
            translate_0x80_to_newline: true,
        }
    }
}

/// A minimal EBCDIC (code page 37) to ASCII table covering the characters these descriptors
/// actually use: uppercase letters, digits, space, period, slash.
fn ebcdic_to_ascii(bytes: &[u8], translate_0x80: bool) -> Vec<u8> {
    bytes
        .iter()
        .map(|&b| match b {
            0x40 => b' ',
            0x4B => b'.',
            0x61 => b'/',
            0xC1..=0xC9 => b'A' + (b - 0xC1),
            0xD1..=0xD9 => b'J' + (b - 0xD1),
            0xE2..=0xE9 => b'S' + (b - 0xE2),
            0xF0..=0xF9 => b'0' + (b - 0xF0),
            0x80 if translate_0x80 => b'\n',
            other => other,
        })
        .collect()
}

/// Decodes the SAV/LIB RLE scheme: each opcode byte packs a 6-bit count in the low bits and a
/// 2-bit code in the high bits. Code 3 repeats the next byte `count` times; code 2 emits `count`
/// EBCDIC spaces (`0x40`); code 0 copies `count` literal bytes; code 1 ("compacted characters")
/// is not understood and is warned about, emitting `count` zero bytes as a placeholder.
pub fn decompress_rle<R: Read>(mut source: R, out_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(out_len);
    while out.len() < out_len {
        let mut op = [0u8; 1];
        source.read_exact(&mut op)?;
        let count = (op[0] & 0x3F) as usize;
        let code = op[0] >> 6;
        match code {
            3 => {
                let mut byte = [0u8; 1];
                source.read_exact(&mut byte)?;
                out.extend(std::iter::repeat(byte[0]).take(count));
            }
            2 => out.extend(std::iter::repeat(0x40u8).take(count)),
            0 => {
                let mut buf = vec![0u8; count];
                source.read_exact(&mut buf)?;
                out.extend_from_slice(&buf);
            }
            1 => {
                warn!("sav/lib: compacted-character RLE code is not decoded, emitting zeros");
                out.extend(std::iter::repeat(0u8).take(count));
            }
            _ => unreachable!("2-bit field"),
        }
    }
    out.truncate(out_len);
    Ok(out)
}

/// Conventional AS/400 source-physical-file library for a restored member extension, e.g. a
/// `CLP` (CL program source) member lives under `QCLSRC`. Extensions with no conventional
/// library land at the root of the output tree.
fn source_library_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_uppercase().as_str() {
        "CLP" => Some("QCLSRC"),
        "RPG" | "RPGLE" => Some("QRPGSRC"),
        "CBL" | "CBLLE" => Some("QCBLSRC"),
        "PF" | "LF" | "DSPF" | "PRTF" => Some("QDDSSRC"),
        _ => None,
    }
}

struct Descriptor {
    name: String,
    object_type: u16,
    block_count: u32,
    data_size: u32,
    version: [u8; 4],
}

pub struct SavLibDriver<R: Read> {
    source: BlockReader<R>,
    options: SavLibOptions,
    extension_catalog: HashMap<String, String>,
    done: bool,
}

impl<R: Read> SavLibDriver<R> {
    pub fn new(source: BlockReader<R>, options: SavLibOptions) -> Self {
        SavLibDriver {
            source,
            options,
            extension_catalog: HashMap::new(),
            done: false,
        }
    }

    fn read_descriptor(&mut self) -> Result<Option<Descriptor>> {
        loop {
            let magic = match crate::endian::read_u32_be(&mut self.source) {
                Ok(v) => v,
                Err(_) => return Ok(None),
            };
            if magic != DESCRIPTOR_MAGIC {
                self.source.skip(BLOCK_SIZE as u64 - 4)?;
                continue;
            }
            let tag_raw = self.source.read_vec(DESCRIPTOR_TAG.len())?;
            let tag = ebcdic_to_ascii(&tag_raw, false);
            if tag != DESCRIPTOR_TAG {
                continue;
            }

            let name_raw = self.source.read_vec(30)?;
            let name_bytes = ebcdic_to_ascii(&name_raw, false);
            let name = String::from_utf8_lossy(&name_bytes)
                .trim_end()
                .to_string();
            let object_type = crate::endian::read_u16_be(&mut self.source)?;
            let block_count = crate::endian::read_u32_be(&mut self.source)?;
            let data_size = crate::endian::read_u32_be(&mut self.source)?;
            let mut version = [0u8; 4];
            self.source.read_exact(&mut version)?;

            let header_consumed = 4 + DESCRIPTOR_TAG.len() + 30 + 2 + 4 + 4 + 4;
            self.source.skip((BLOCK_SIZE - header_consumed) as u64)?;

            return Ok(Some(Descriptor {
                name,
                object_type,
                block_count,
                data_size,
                version,
            }));
        }
    }

    fn effective_size(d: &Descriptor) -> u64 {
        if &d.version == b"6380" {
            ((d.block_count.saturating_sub(0x10)) as u64) * 512
        } else {
            d.data_size as u64
        }
    }

    /// Reads an object's content, RLE-expanding it to `out_len` bytes if its leading two bytes
    /// are the `0xC4FF` compressed-content marker, otherwise returning it raw.
    fn read_content(&mut self, out_len: usize) -> Result<Vec<u8>> {
        if out_len == 0 {
            return Ok(Vec::new());
        }
        let marker = crate::endian::read_u16_be(&mut self.source)?;
        let marker_bytes = marker.to_be_bytes();
        if marker_bytes[0] == RLE_MAGIC_PREFIX && marker_bytes[1] == RLE_MAGIC_SECOND_BYTE {
            return decompress_rle(&mut self.source, out_len);
        }
        let mut raw = marker_bytes.to_vec();
        if out_len > raw.len() {
            raw.extend(self.source.read_vec(out_len - raw.len())?);
        } else {
            raw.truncate(out_len);
        }
        Ok(raw)
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        if self.done {
            return Ok(None);
        }
        let descriptor = match self.read_descriptor()? {
            Some(d) => d,
            None => {
                self.done = true;
                return Ok(None);
            }
        };

        let size = Self::effective_size(&descriptor);
        let raw = self.read_content(size as usize)?;
        let translated = ebcdic_to_ascii(&raw, self.options.translate_0x80_to_newline);

        if descriptor.name == EXTENSION_CATALOG_OBJECT {
            self.parse_extension_catalog(&translated);
            return self.next_entry();
        }

        let mut name = descriptor.name.clone();
        let mut path = Vec::new();
        if let Some(ext) = self.extension_catalog.get(&descriptor.name) {
            name = format!("{name}.{ext}");
            if let Some(library) = source_library_for_extension(ext) {
                path.push(library.to_string());
            }
        }
        path.push(name);
        let _ = descriptor.object_type;

        let final_size = translated.len() as u64;
        Ok(Some(Entry::file(
            path,
            final_size,
            DataSource::new(std::io::Cursor::new(translated), final_size),
        )))
    }

    fn parse_extension_catalog(&mut self, body: &[u8]) {
        let text = String::from_utf8_lossy(body);
        for line in text.lines() {
            if let Some((base, ext)) = line.split_once('=') {
                self.extension_catalog
                    .insert(base.trim().to_string(), ext.trim().to_string());
            }
        }
    }
}

impl<R: Read> EntrySource<'static> for SavLibDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}
