//! Materializes recovered [`Entry`] records onto a real filesystem.
//!
//! Timestamps and permissions are applied with best-effort `filetime` calls after the body is
//! written, with failures logged and swallowed rather than propagated, since a metadata write
//! failing shouldn't discard an otherwise-recovered file. Also handles path sanitization, name
//! collisions, and header-byte sniffing against the declared extension.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use log::warn;

use crate::entry::{Continuation, Entry, EntryKind};
use crate::error::Result;

const MAX_PATH_LEN: usize = 259;

/// Magic bytes checked against a file's declared extension on first read. A mismatch is a
/// warning only, never a fatal error, since plenty of legitimately recovered files fail it
/// (renamed extensions, truncated bodies).
const MAGIC_CHECKS: &[(&str, &[u8])] = &[("exe", b"MZ"), ("zip", b"PK"), ("dwg", b"AC")];

/// Recreates entries under a base directory, handling path sanitization, collision
/// resolution, timestamp/attribute application, and continuation appends.
pub struct OutputSink {
    base: PathBuf,
    dry_run: bool,
}

impl OutputSink {
    pub fn new(base: impl Into<PathBuf>, dry_run: bool) -> Self {
        OutputSink {
            base: base.into(),
            dry_run,
        }
    }

    /// Replaces characters that are invalid in a filesystem path component with `_`.
    /// Idempotent: sanitizing an already-sanitized component changes nothing.
    pub fn sanitize_component(name: &str) -> String {
        name.chars()
            .map(|c| match c {
                '\0'..='\x1f' | '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                c => c,
            })
            .collect()
    }

    fn build_path(&self, components: &[String]) -> PathBuf {
        let mut path = self.base.clone();
        for c in components {
            path.push(Self::sanitize_component(c));
        }
        path
    }

    /// Appends `_` to a path's file name until it no longer collides with an existing entry.
    fn disambiguate(mut path: PathBuf) -> PathBuf {
        while path.exists() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            path.set_file_name(format!("{name}_"));
        }
        path
    }

    fn truncate_if_too_long(path: PathBuf) -> PathBuf {
        let s = path.to_string_lossy();
        if s.len() <= MAX_PATH_LEN {
            return path;
        }
        let truncated: String = s.chars().take(MAX_PATH_LEN).collect();
        PathBuf::from(truncated)
    }

    fn check_magic(path: &Path, head: &[u8]) {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_ascii_lowercase(),
            None => return,
        };
        for (known_ext, magic) in MAGIC_CHECKS {
            if ext == *known_ext && !head.starts_with(magic) {
                warn!(
                    "{}: expected {} magic for .{} but found {:02x?}",
                    path.display(),
                    known_ext,
                    known_ext,
                    &head[..head.len().min(magic.len())]
                );
            }
        }
    }

    /// Writes one entry, returning the path it was (or would have been, in dry-run mode)
    /// written to.
    pub fn write_entry(&self, entry: &mut Entry) -> Result<PathBuf> {
        let path = self.build_path(&entry.path);

        match entry.kind {
            EntryKind::Directory => {
                if !self.dry_run {
                    if path.is_file() {
                        let renamed = Self::disambiguate(path.clone());
                        fs::create_dir_all(&renamed)?;
                        return Ok(renamed);
                    }
                    fs::create_dir_all(&path)?;
                }
                Ok(path)
            }
            EntryKind::Volume | EntryKind::Catalog | EntryKind::Skip => Ok(path),
            EntryKind::File => {
                let path = Self::truncate_if_too_long(path);
                let append = entry.is_continuation();
                let final_path = if append {
                    path
                } else {
                    Self::disambiguate(path)
                };

                if self.dry_run {
                    return Ok(final_path);
                }

                if let Some(parent) = final_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(!append)
                    .append(append)
                    .open(&final_path)?;

                if let Some(data) = entry.data.as_mut() {
                    copy_with_magic_check(data, &mut file, &final_path)?;
                }

                if !append || entry.continuation == Continuation::Start {
                    apply_metadata(entry, &final_path);
                }

                Ok(final_path)
            }
        }
    }
}

fn copy_with_magic_check(data: &mut dyn Read, file: &mut File, path: &Path) -> Result<()> {
    let mut buf = [0u8; 64 * 1024];
    let mut first = true;
    loop {
        let n = data.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if first {
            OutputSink::check_magic(path, &buf[..n]);
            first = false;
        }
        file.write_all(&buf[..n])?;
    }
    Ok(())
}

fn apply_metadata(entry: &Entry, path: &Path) {
    if let Some(modify) = entry.modify_time {
        let ft = FileTime::from_unix_time(modify.unix_timestamp(), 0);
        if let Err(e) = filetime::set_file_mtime(path, ft) {
            warn!("{}: failed to set modification time: {e}", path.display());
        }
    }
    if let Some(create) = entry.create_time.or(entry.access_time) {
        let ft = FileTime::from_unix_time(create.unix_timestamp(), 0);
        if let Err(e) = filetime::set_file_atime(path, ft) {
            warn!("{}: failed to set access time: {e}", path.display());
        }
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if entry.attributes.contains(crate::entry::Attributes::READ_ONLY) {
            if let Ok(meta) = fs::metadata(path) {
                let mut perms = meta.permissions();
                perms.set_mode(perms.mode() & !0o222);
                let _ = fs::set_permissions(path, perms);
            }
        }
    }
}
