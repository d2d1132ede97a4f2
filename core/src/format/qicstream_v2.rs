//! QIC-Stream v2 driver: a control-code stream rather than fixed headers.
//!
//! Single-byte opcodes drive a small state machine. `ContentsStart` (1) ends any catalog-only
//! prefix; `File`/`Directory` (5/6) introduce length-prefixed headers; `DataChunk` (9) carries a
//! 16-bit length followed by raw bytes; `AscendParent` (3) pops the directory stack maintained
//! here explicitly rather than relying on recursion.

use std::io::Read;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::blockreader::BlockReader;
use crate::entry::{DataSource, Entry, EntryKind, EntrySource};
use crate::error::{Error, Result};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
enum Opcode {
    ContentsStart = 1,
    CatalogStart = 2,
    AscendParent = 3,
    File = 5,
    Directory = 6,
    DataChunk = 9,
}

pub struct QicStreamV2Driver<R: Read> {
    source: BlockReader<R>,
    dir_stack: Vec<String>,
    contents_started: bool,
    done: bool,
}

impl<R: Read> QicStreamV2Driver<R> {
    pub fn new(source: BlockReader<R>) -> Self {
        QicStreamV2Driver {
            source,
            dir_stack: Vec::new(),
            contents_started: false,
            done: false,
        }
    }

    fn current_path(&self, name: &str) -> Vec<String> {
        let mut path = self.dir_stack.clone();
        if !name.is_empty() {
            path.push(name.to_string());
        }
        path
    }

    fn read_header_name(&mut self) -> Result<String> {
        let len = self.source.read_u8()? as usize;
        let bytes = self.source.read_vec(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns the next materializable entry, skipping catalog-only records and directory-stack
    /// bookkeeping opcodes transparently.
    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let raw_opcode = match self.source.read_u8() {
                Ok(b) => b,
                Err(_) => {
                    self.done = true;
                    return Ok(None);
                }
            };
            let opcode = Opcode::from_u8(raw_opcode).ok_or_else(|| {
                Error::corrupt(format!("qicstream v2: unknown opcode {raw_opcode:#x}"))
            })?;

            match opcode {
                Opcode::ContentsStart => {
                    self.contents_started = true;
                }
                Opcode::CatalogStart => {
                    // Catalog records are optional and may duplicate what ContentsStart later
                    // replays; skip them entirely rather than double-materializing entries.
                }
                Opcode::AscendParent => {
                    self.dir_stack.pop();
                }
                Opcode::Directory => {
                    let name = self.read_header_name()?;
                    if !self.contents_started {
                        continue;
                    }
                    let path = self.current_path(&name);
                    self.dir_stack.push(name);
                    return Ok(Some(Entry::directory(path)));
                }
                Opcode::File => {
                    let name = self.read_header_name()?;
                    if !self.contents_started {
                        continue;
                    }
                    let path = self.current_path(&name);
                    let mut body = Vec::new();
                    loop {
                        let raw_next_op = self.source.read_u8()?;
                        if Opcode::from_u8(raw_next_op) != Some(Opcode::DataChunk) {
                            return Err(Error::corrupt(
                                "qicstream v2: expected DataChunk opcode after File header",
                            ));
                        }
                        let len = crate::endian::read_u16_le(&mut self.source)? as usize;
                        let chunk = self.source.read_vec(len)?;
                        let is_last = len == 0;
                        body.extend_from_slice(&chunk);
                        if is_last {
                            break;
                        }
                    }
                    let size = body.len() as u64;
                    return Ok(Some(Entry::file(
                        path,
                        size,
                        DataSource::new(std::io::Cursor::new(body), size),
                    )));
                }
                Opcode::DataChunk => {
                    // A stray DataChunk outside a File header: consume and discard, it belongs
                    // to a catalog section we chose not to materialize.
                    let len = crate::endian::read_u16_le(&mut self.source)? as usize;
                    self.source.skip(len as u64)?;
                }
            }
        }
    }
}

impl<R: Read> EntrySource<'static> for QicStreamV2Driver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(name: &str) -> Vec<u8> {
        let mut out = vec![name.len() as u8];
        out.extend_from_slice(name.as_bytes());
        out
    }

    #[test]
    fn directory_then_file_with_single_chunk() {
        let mut bytes = vec![Opcode::ContentsStart as u8];
        bytes.push(Opcode::Directory as u8);
        bytes.extend(header("docs"));
        bytes.push(Opcode::File as u8);
        bytes.extend(header("a.txt"));
        bytes.push(Opcode::DataChunk as u8);
        bytes.extend_from_slice(&5u16.to_le_bytes());
        bytes.extend_from_slice(b"hello");
        bytes.push(Opcode::DataChunk as u8);
        bytes.extend_from_slice(&0u16.to_le_bytes());

        let mut driver = QicStreamV2Driver::new(BlockReader::new(Cursor::new(bytes)));
        let dir = driver.next_entry().unwrap().unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
        assert_eq!(dir.path, vec!["docs".to_string()]);

        let file = driver.next_entry().unwrap().unwrap();
        assert_eq!(file.path, vec!["docs".to_string(), "a.txt".to_string()]);
        assert_eq!(file.size, 5);

        assert!(driver.next_entry().unwrap().is_none());
    }

    #[test]
    fn ascend_parent_pops_directory_stack() {
        let mut bytes = vec![Opcode::ContentsStart as u8, Opcode::Directory as u8];
        bytes.extend(header("a"));
        bytes.push(Opcode::AscendParent as u8);
        bytes.push(Opcode::Directory as u8);
        bytes.extend(header("b"));

        let mut driver = QicStreamV2Driver::new(BlockReader::new(Cursor::new(bytes)));
        let a = driver.next_entry().unwrap().unwrap();
        assert_eq!(a.path, vec!["a".to_string()]);
        let b = driver.next_entry().unwrap().unwrap();
        assert_eq!(b.path, vec!["b".to_string()]);
    }
}
