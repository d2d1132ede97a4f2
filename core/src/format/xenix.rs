//! Xenix on-disk (v2 / v3) driver.
//!
//! The inode table is modeled as an arena keyed by inode number, with directory children
//! recorded as name/inode lists rather than pointers. v3's heuristic scan (when the root is
//! absent or corrupted) builds the same arena by finding `.`/`..` pairs in every block and
//! grafting unreachable subtrees under synthesized `unknownN` names, using an explicit visited
//! set so cycles from corrupted data can't loop forever.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::blockreader::BlockReader;
use crate::endian::{decode_unix_time, read_u24, ByteOrder3};
use crate::entry::{DataSource, Entry, EntryKind, EntrySource};
use crate::error::Result;

const INODE_SIZE: u64 = 0x40;
const INODE_TABLE_START_BLOCK: u64 = 2;
const DIRENT_SIZE: usize = 0x10;
const NAME_LEN: usize = 14;
const MODE_DIRECTORY: u16 = 0x4000;
const MODE_TYPE_MASK: u16 = 0xF000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XenixVersion {
    V2,
    V3,
}

#[derive(Debug, Clone, Copy)]
pub struct XenixOptions {
    pub version: XenixVersion,
    pub base_offset: u64,
    pub byte_order: ByteOrder3,
    /// Forces the heuristic whole-disk inode scan even if the root directory parses cleanly.
    pub force_heuristic: bool,
}

struct Inode {
    number: u32,
    mode: u16,
    size: u32,
    direct_blocks: [u32; 10],
    mtime: u32,
}

impl Inode {
    fn is_directory(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_DIRECTORY
    }
}

struct DirEntry {
    inode: u32,
    name: String,
}

/// The reconstructed filesystem tree: inodes addressed by number, directory contents as
/// `(name, child_inode)` lists rather than a pointer-based tree.
pub struct XenixDriver<R: Read + Seek> {
    source: BlockReader<R>,
    options: XenixOptions,
    block_size: u64,
    inodes: HashMap<u32, Inode>,
    children: HashMap<u32, Vec<DirEntry>>,
    root: u32,
    output_queue: Vec<(Vec<String>, u32)>,
}

const ROOT_INODE: u32 = 2;

impl<R: Read + Seek> XenixDriver<R> {
    pub fn open(mut source: BlockReader<R>, options: XenixOptions) -> Result<Self> {
        let block_size = match options.version {
            XenixVersion::V2 => 0x400,
            XenixVersion::V3 => {
                source.seek_to(options.base_offset + 0x200)?;
                let fs_type = source.read_u8()?;
                match fs_type {
                    1 => 0x200,
                    2 => 0x400,
                    _ => 0x400,
                }
            }
        };

        let mut driver = XenixDriver {
            source,
            options,
            block_size,
            inodes: HashMap::new(),
            children: HashMap::new(),
            root: ROOT_INODE,
            output_queue: Vec::new(),
        };

        driver.load_inode_table()?;

        if options.force_heuristic || !driver.inodes.contains_key(&ROOT_INODE) {
            driver.heuristic_rebuild()?;
        } else {
            driver.walk_from_root()?;
        }

        Ok(driver)
    }

    fn block_offset(&self, block: u64) -> u64 {
        self.options.base_offset + block * self.block_size
    }

    fn read_inode(&mut self, number: u32) -> Result<Inode> {
        let offset = self.block_offset(INODE_TABLE_START_BLOCK) + (number as u64 - 1) * INODE_SIZE;
        self.source.seek_to(offset)?;

        let mode = crate::endian::read_u16_le(&mut self.source)?;
        let _nlink = crate::endian::read_u16_le(&mut self.source)?;
        let _uid = crate::endian::read_u16_le(&mut self.source)?;
        let _gid = crate::endian::read_u16_le(&mut self.source)?;
        let size = crate::endian::read_u32_le(&mut self.source)?;
        let mut direct_blocks = [0u32; 10];
        for slot in direct_blocks.iter_mut() {
            *slot = read_u24(&mut self.source, self.options.byte_order)?;
        }
        let _single_indirect = read_u24(&mut self.source, self.options.byte_order)?;
        let _double_indirect = read_u24(&mut self.source, self.options.byte_order)?;
        let _triple_indirect = read_u24(&mut self.source, self.options.byte_order)?;
        let _atime = crate::endian::read_u32_le(&mut self.source)?;
        let mtime = crate::endian::read_u32_le(&mut self.source)?;
        let _ctime = crate::endian::read_u32_le(&mut self.source)?;

        Ok(Inode {
            number,
            mode,
            size,
            direct_blocks,
            mtime,
        })
    }

    /// Reads every inode slot present in the table up to a generous bound; entries with mode 0
    /// are holes (never allocated, or freed) and are skipped.
    fn load_inode_table(&mut self) -> Result<()> {
        const MAX_INODES: u32 = 4096;
        for number in 1..=MAX_INODES {
            let inode = match self.read_inode(number) {
                Ok(i) => i,
                Err(_) => break,
            };
            if inode.mode != 0 {
                self.inodes.insert(number, inode);
            }
        }
        Ok(())
    }

    fn read_directory_entries(&mut self, inode_number: u32) -> Result<Vec<DirEntry>> {
        let inode = match self.inodes.get(&inode_number) {
            Some(i) => i,
            None => return Ok(Vec::new()),
        };
        let size = inode.size;
        let blocks = inode.direct_blocks;

        let mut entries = Vec::new();
        let mut remaining = size as i64;
        for &block in blocks.iter() {
            if remaining <= 0 || block == 0 {
                break;
            }
            self.source.seek_to(self.block_offset(block as u64))?;
            let to_read = remaining.min(self.block_size as i64) as usize;
            let data = self.source.read_vec(to_read)?;
            for chunk in data.chunks_exact(DIRENT_SIZE) {
                let child_inode = u16::from_le_bytes([chunk[0], chunk[1]]) as u32;
                if child_inode == 0 {
                    continue;
                }
                let name_end = chunk[2..2 + NAME_LEN]
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(NAME_LEN);
                let name = String::from_utf8_lossy(&chunk[2..2 + name_end]).into_owned();
                if name == "." || name == ".." {
                    continue;
                }
                entries.push(DirEntry {
                    inode: child_inode,
                    name,
                });
            }
            remaining -= self.block_size as i64;
        }
        Ok(entries)
    }

    fn walk_from_root(&mut self) -> Result<()> {
        let mut visited = std::collections::HashSet::new();
        self.walk(self.root, Vec::new(), &mut visited)
    }

    fn walk(
        &mut self,
        inode_number: u32,
        path: Vec<String>,
        visited: &mut std::collections::HashSet<u32>,
    ) -> Result<()> {
        if !visited.insert(inode_number) {
            return Ok(());
        }
        let entries = self.read_directory_entries(inode_number)?;
        for entry in entries {
            let mut child_path = path.clone();
            child_path.push(entry.name);
            let is_dir = self
                .inodes
                .get(&entry.inode)
                .map(|i| i.is_directory())
                .unwrap_or(false);
            if is_dir {
                self.output_queue.push((child_path.clone(), entry.inode));
                self.walk(entry.inode, child_path, visited)?;
            } else {
                self.output_queue.push((child_path, entry.inode));
            }
        }
        Ok(())
    }

    /// v3 heuristic mode: scans every block for the `.`/`..` directory-entry signature and
    /// rebuilds parent/child links from what it finds, grafting anything unreachable from the
    /// discovered root under a synthesized `unknownN` name.
    fn heuristic_rebuild(&mut self) -> Result<()> {
        let mut parent_of: HashMap<u32, u32> = HashMap::new();
        let candidates: Vec<u32> = self
            .inodes
            .iter()
            .filter(|(_, inode)| inode.is_directory())
            .map(|(&n, _)| n)
            .collect();

        for &dir_inode in &candidates {
            let entries = self.read_directory_entries(dir_inode)?;
            self.children.entry(dir_inode).or_default();
            for e in entries {
                parent_of.insert(e.inode, dir_inode);
                self.children
                    .entry(dir_inode)
                    .or_default()
                    .push(DirEntry {
                        inode: e.inode,
                        name: e.name,
                    });
            }
        }

        let mut visited = std::collections::HashSet::new();
        if self.inodes.contains_key(&ROOT_INODE) {
            self.walk_from_root_using_children(ROOT_INODE, Vec::new(), &mut visited);
        }

        let mut orphan_id = 0u32;
        for &dir_inode in &candidates {
            if visited.contains(&dir_inode) {
                continue;
            }
            let name = format!("unknown{orphan_id}");
            orphan_id += 1;
            self.output_queue.push((vec![name.clone()], dir_inode));
            self.walk_from_root_using_children(dir_inode, vec![name], &mut visited);
        }
        Ok(())
    }

    fn walk_from_root_using_children(
        &mut self,
        inode_number: u32,
        path: Vec<String>,
        visited: &mut std::collections::HashSet<u32>,
    ) {
        if !visited.insert(inode_number) {
            return;
        }
        let children = self.children.get(&inode_number).map(|c| {
            c.iter()
                .map(|e| (e.inode, e.name.clone()))
                .collect::<Vec<_>>()
        });
        let Some(children) = children else { return };
        for (child_inode, name) in children {
            let mut child_path = path.clone();
            child_path.push(name);
            self.output_queue.push((child_path.clone(), child_inode));
            self.walk_from_root_using_children(child_inode, child_path, visited);
        }
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        let (path, inode_number) = match self.output_queue.pop() {
            Some(v) => v,
            None => return Ok(None),
        };
        let inode = match self.inodes.get(&inode_number) {
            Some(i) => i,
            None => return self.next_entry(),
        };

        if inode.is_directory() {
            return Ok(Some(Entry::directory(path)));
        }

        let size = inode.size as u64;
        let blocks = inode.direct_blocks;
        let mtime = decode_unix_time(inode.mtime as i64);
        let block_size = self.block_size;

        let mut body = Vec::with_capacity(size as usize);
        let mut remaining = size as i64;
        for &block in blocks.iter() {
            if remaining <= 0 || block == 0 {
                break;
            }
            self.source.seek_to(self.block_offset(block as u64))?;
            let to_read = remaining.min(block_size as i64) as usize;
            body.extend(self.source.read_vec(to_read)?);
            remaining -= block_size as i64;
        }

        let mut entry = Entry::file(path, size, DataSource::new(std::io::Cursor::new(body), size));
        entry.modify_time = Some(mtime);
        Ok(Some(entry))
    }
}

impl<R: Read + Seek> EntrySource<'static> for XenixDriver<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'static>>> {
        self.next_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_inode(buf: &mut [u8], offset: usize, mode: u16, size: u32, blocks: &[u32]) {
        buf[offset..offset + 2].copy_from_slice(&mode.to_le_bytes());
        buf[offset + 8..offset + 12].copy_from_slice(&size.to_le_bytes());
        for (i, &b) in blocks.iter().enumerate() {
            let pos = offset + 14 + i * 3;
            buf[pos..pos + 3].copy_from_slice(&b.to_le_bytes()[0..3]);
        }
    }

    fn dirent(inode: u32, name: &str) -> Vec<u8> {
        let mut out = (inode as u16).to_le_bytes().to_vec();
        let mut name_bytes = name.as_bytes().to_vec();
        name_bytes.resize(NAME_LEN, 0);
        out.extend_from_slice(&name_bytes);
        out
    }

    #[test]
    fn walks_root_directory_to_a_file() {
        let block_size = 0x400u64;
        let image_size = block_size * 8;
        let mut image = vec![0u8; image_size as usize];

        // Root (inode 2) directory content: one dirent pointing at inode 3 ("hello.txt"),
        // stored in block 4.
        let mut root_block = dirent(3, "hello.txt");
        root_block.resize(DIRENT_SIZE, 0);
        let root_block_no = 4u32;
        let base = (root_block_no as u64 * block_size) as usize;
        image[base..base + root_block.len()].copy_from_slice(&root_block);

        // File body in block 5.
        let file_block_no = 5u32;
        let fbase = (file_block_no as u64 * block_size) as usize;
        image[fbase..fbase + 5].copy_from_slice(b"hello");

        let inode_table_base = (INODE_TABLE_START_BLOCK * block_size) as usize;
        write_inode(
            &mut image[inode_table_base..],
            (ROOT_INODE as usize - 1) * INODE_SIZE as usize,
            MODE_DIRECTORY,
            DIRENT_SIZE as u32,
            &[root_block_no],
        );
        write_inode(
            &mut image[inode_table_base..],
            (3 - 1) * INODE_SIZE as usize,
            0o100000,
            5,
            &[file_block_no],
        );

        let options = XenixOptions {
            version: XenixVersion::V2,
            base_offset: 0,
            byte_order: ByteOrder3::Little,
            force_heuristic: false,
        };
        let mut driver =
            XenixDriver::open(BlockReader::new(Cursor::new(image)), options).unwrap();
        let entry = driver.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, vec!["hello.txt".to_string()]);
        assert_eq!(entry.size, 5);
    }
}
