//! Decoding pipeline for legacy tape and floppy backup dump images.
//!
//! [`blockreader`] and [`segment`] provide the generic, position-tracking, frame-expanding
//! plumbing that every format shares, [`decompressor`] is the trait codecs implement against,
//! and each module under [`format`] is a self-contained driver for one on-tape or on-disk
//! layout, built on top of those primitives.
//!
//! Callers typically construct a `BlockReader` over their input, pick the driver matching the
//! detected format, and pull [`entry::Entry`] records from its `next_entry` method until it
//! returns `None`, handing each one to an [`output::OutputSink`] to materialize on disk.

pub mod aldc;
pub mod bitreader;
pub mod blockreader;
pub mod decompressor;
pub mod ecc;
pub mod endian;
pub mod entry;
pub mod error;
pub mod format;
pub mod output;
pub mod qic122;
pub mod segment;
pub mod txdecompress;
pub mod window;

pub use error::{Error, Result};
