//! The common record every format driver emits: a filesystem entry recovered from a tape or
//! disk dump, independent of which on-tape layout produced it.

use std::io::Read;

use crate::endian::Timestamp;
use crate::error::Result;

/// A tiny bitflags stand-in, used so the attribute set reads like a real bitflags type
/// (`contains`, `insert`, `union`, `empty`) without pulling in the `bitflags` crate for five
/// bits spread across fourteen format drivers.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($ty);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn bits(self) -> $ty {
                self.0
            }

            pub const fn from_bits_truncate(bits: $ty) -> Self {
                let mut mask: $ty = 0;
                $(mask |= $value;)*
                $name(bits & mask)
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }
    };
}

/// What an [`Entry`] represents on the reconstructed filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// A whole-volume marker (e.g. MTF's `VOLB`, Xenix's superblock) with no direct output.
    Volume,
    /// A catalog/listing record that documents entries rather than being one itself.
    Catalog,
    /// Recognized but intentionally not materialized (e.g. an unsupported record type).
    Skip,
}

bitflags_like! {
    /// Attribute bits carried by most legacy formats; not every format sets every bit.
    pub struct Attributes: u8 {
        const READ_ONLY = 0b0000_0001;
        const HIDDEN    = 0b0000_0010;
        const SYSTEM    = 0b0000_0100;
        const ARCHIVE   = 0b0000_1000;
        const DIRECTORY = 0b0001_0000;
    }
}

/// A lazily-read, length-bounded view over an entry's body. Format drivers construct this from
/// whatever underlying stream they hold; `OutputSink` is the only consumer that actually reads
/// it in full.
pub struct DataSource<'a> {
    reader: Box<dyn Read + 'a>,
    remaining: u64,
}

impl<'a> DataSource<'a> {
    pub fn new(reader: impl Read + 'a, size: u64) -> Self {
        DataSource {
            reader: Box::new(reader),
            remaining: size,
        }
    }

    pub fn empty() -> Self {
        DataSource {
            reader: Box::new(std::io::empty()),
            remaining: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

impl<'a> Read for DataSource<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let cap = (buf.len() as u64).min(self.remaining) as usize;
        let n = self.reader.read(&mut buf[..cap])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Whether a file entry is a fresh write, or the continuation of one started on a prior volume
/// (Maynstream, Mountain FileSafe spanning tapes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Start,
    Append,
}

/// One filesystem entry recovered from a format driver: a file, directory, or structural marker.
pub struct Entry<'a> {
    /// Ordered path components; never contains `..`, a drive letter, or a leading separator.
    pub path: Vec<String>,
    pub kind: EntryKind,
    pub size: u64,
    pub create_time: Option<Timestamp>,
    pub modify_time: Option<Timestamp>,
    pub access_time: Option<Timestamp>,
    pub attributes: Attributes,
    pub continuation: Continuation,
    pub data: Option<DataSource<'a>>,
}

impl<'a> Entry<'a> {
    pub fn directory(path: Vec<String>) -> Self {
        Entry {
            path,
            kind: EntryKind::Directory,
            size: 0,
            create_time: None,
            modify_time: None,
            access_time: None,
            attributes: Attributes::DIRECTORY,
            continuation: Continuation::Start,
            data: None,
        }
    }

    pub fn file(path: Vec<String>, size: u64, data: DataSource<'a>) -> Self {
        Entry {
            path,
            kind: EntryKind::File,
            size,
            create_time: None,
            modify_time: None,
            access_time: None,
            attributes: Attributes::empty(),
            continuation: Continuation::Start,
            data: Some(data),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.continuation == Continuation::Append
    }
}

/// Something that yields a stream of recovered entries, failing on unrecoverable corruption.
/// Every format driver implements this over its own `BlockReader<R>`.
pub trait EntrySource<'a> {
    fn next_entry(&mut self) -> Result<Option<Entry<'a>>>;
}
