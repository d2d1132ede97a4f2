//! One module per recognized tape/disk dump format. Each driver wraps a
//! [`crate::blockreader::BlockReader`] and exposes an iterator-like `next_entry` returning
//! [`crate::entry::Entry`] records, parsing forward incrementally rather than re-parsing the
//! whole stream on every access.

pub mod qicstream_v1;
pub mod qicstream_win95;
pub mod qicstream_v2;
pub mod qicstream_v4;
pub mod hp_backup_exec;
pub mod arcserve;
pub mod novastor;
pub mod novanet;
pub mod filesafe;
pub mod macait;
pub mod mtf;
pub mod savlib;
pub mod txplus;
pub mod xenix;
