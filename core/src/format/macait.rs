//! MacAIT FourCC (Retrospect-lineage) driver. Big-endian throughout.
//!
//! Every block is `name[4] | length[4] | body[length-8]`. `Rxvr` is a volume header to skip;
//! `Diry`/`File`/`Fork`/`Cont` build up the entry stream. An all-zero block name is a padding
//! marker that realigns forward to the next 0x200 boundary rather than a real record.

use std::io::Read;

use crate::blockreader::BlockReader;
use crate::endian::{decode_mac_1904, Timestamp};
use crate::entry::{Continuation, DataSource, Entry, EntrySource};
use crate::error::{Error, Result};

const REALIGN: u64 = 0x200;
const VOLUME_HEADER_SKIP: u64 = 0x2000;

struct Block {
    name: [u8; 4],
    body: Vec<u8>,
}

pub struct MacAitDriver<R: Read> {
    source: BlockReader<R>,
    dir_stack: Vec<String>,
    /// Name and mtime announced by the last `File` block, consumed by the `Fork` that opens it.
    pending_file: Option<(String, Timestamp)>,
    /// Full path of the fork currently being assembled, so trailing `Cont` blocks append to it
    /// instead of landing at the bare directory path.
    current_path: Option<Vec<String>>,
    done: bool,
}

impl<R: Read> MacAitDriver<R> {
    pub fn new(source: BlockReader<R>) -> Self {
        MacAitDriver {
            source,
            dir_stack: Vec::new(),
            pending_file: None,
            current_path: None,
            done: false,
        }
    }

    fn read_block(&mut self) -> Result<Option<Block>> {
        let mut name = [0u8; 4];
        if self.source.read_exact(&mut name).is_err() {
            return Ok(None);
        }
        if name == [0, 0, 0, 0] {
            self.source.align_to(REALIGN)?;
            return self.read_block();
        }
        let length = crate::endian::read_u32_be(&mut self.source)? as usize;
        if length < 8 {
            return Err(Error::corrupt("macait: block length smaller than its own header"));
        }
        let body = self.source.read_vec(length - 8)?;
        Ok(Some(Block { name, body }))
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let block = match self.read_block()? {
                Some(b) => b,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            };

            match &block.name {
                b"Rxvr" => {
                    self.source.skip(VOLUME_HEADER_SKIP)?;
                }
                b"Diry" => {
                    let name = parse_name(&block.body);
                    let mut path = self.dir_stack.clone();
                    path.push(name.clone());
                    self.dir_stack.push(name);
                    self.pending_file = None;
                    self.current_path = None;
                    return Ok(Some(Entry::directory(path)));
                }
                b"File" => {
                    let name = parse_name(&block.body);
                    let date = if block.body.len() >= 8 {
                        decode_mac_1904(u32::from_be_bytes(block.body[4..8].try_into().unwrap()))
                    } else {
                        decode_mac_1904(0)
                    };
                    self.pending_file = Some((name, date));
                    self.current_path = None;
                }
                b"Fork" => {
                    if block.body.len() < 0x16 {
                        return Err(Error::corrupt("macait: Fork header too short"));
                    }
                    let size = u32::from_be_bytes(block.body[0..4].try_into().unwrap()) as u64;
                    let data = block.body[0x16..].to_vec();
                    let actual = data.len() as u64;
                    let (name, date) = self
                        .pending_file
                        .take()
                        .unwrap_or_else(|| ("FORK".to_string(), decode_mac_1904(0)));
                    let mut path = self.dir_stack.clone();
                    path.push(name);
                    self.current_path = Some(path.clone());
                    let mut entry = Entry::file(path, size, DataSource::new(std::io::Cursor::new(data), actual));
                    entry.modify_time = Some(date);
                    return Ok(Some(entry));
                }
                b"Cont" => {
                    let path = self.current_path.clone().unwrap_or_else(|| self.dir_stack.clone());
                    let size = block.body.len() as u64;
                    let mut entry = Entry::file(
                        path,
                        size,
                        DataSource::new(std::io::Cursor::new(block.body), size),
                    );
                    entry.continuation = Continuation::Append;
                    return Ok(Some(entry));
                }
                other => {
                    return Err(Error::corrupt(format!(
                        "macait: unknown block type {:?}",
                        String::from_utf8_lossy(other)
                    )));
                }
            }
        }
    }
}

impl<R: Read> EntrySource<'static> for MacAitDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

fn parse_name(body: &[u8]) -> String {
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).into_owned()
}
