//! The path resolver (spec §4.5).
//!
//! Splits a textual path (via [`crate::path::split`]) and walks it from
//! either the root directory or a caller-supplied working directory,
//! descending through every component but the last. `.` and `..` are
//! resolved without ever being looked up as stored directory entries — they
//! fall out of a directory's own sector and its `parent` field instead
//! (spec invariant 5).

use std::sync::Arc;

use crate::cache::BufferCache;
use crate::device::BlockDevice;
use crate::directory;
use crate::error::{FsError, FsResult};
use crate::freemap::FreeMap;
use crate::inode::Inode;
use crate::path;
use crate::table::InodeTable;

/// Opens the entry named `name` inside `dir`. `.` reopens `dir` itself;
/// `..` opens `dir`'s parent (itself, at the root); anything else is a
/// lookup among `dir`'s stored entries.
pub(crate) fn resolve_name<D: BlockDevice>(
    table: &InodeTable<D>,
    cache: &Arc<BufferCache<D>>,
    dir: &Inode<D>,
    name: &str,
) -> FsResult<Inode<D>> {
    match name {
        "." => Ok(table.open(cache.clone(), dir.sector())),
        ".." => Ok(table.open(cache.clone(), dir.parent_sector())),
        _ => {
            let sector = directory::lookup(dir, name).ok_or(FsError::NotFound)?;
            Ok(table.open(cache.clone(), sector))
        }
    }
}

/// The outcome of walking a path: the directory that holds (or, for a
/// creation call, should hold) the final path component, and that
/// component's name. `file_name` is `"."` exactly when `path` was empty of
/// components (the all-slashes case, spec §4.5's second special case).
pub(crate) struct Resolved<D: BlockDevice> {
    pub(crate) directory: Inode<D>,
    pub(crate) file_name: String,
}

/// Splits and walks `path`. A leading `/` starts the walk at `root`;
/// otherwise it starts at `cwd`. Every component but the last must resolve
/// to a directory, or the walk fails with [`FsError::NotDirectory`].
pub(crate) fn resolve<D: BlockDevice>(
    table: &InodeTable<D>,
    cache: &Arc<BufferCache<D>>,
    free_map: &FreeMap<D>,
    root: &Inode<D>,
    cwd: &Inode<D>,
    path: &str,
) -> FsResult<Resolved<D>> {
    let (absolute, components) = path::split(path)?;

    let start_sector = if absolute { root.sector() } else { cwd.sector() };
    let mut current = table.open(cache.clone(), start_sector);

    if components.is_empty() {
        return Ok(Resolved {
            directory: current,
            file_name: ".".to_string(),
        });
    }

    for component in &components[..components.len() - 1] {
        let next = match resolve_name(table, cache, &current, component) {
            Ok(next) => next,
            Err(e) => {
                table.close(current, free_map);
                return Err(e);
            }
        };
        if !next.is_directory() {
            table.close(next, free_map);
            table.close(current, free_map);
            return Err(FsError::NotDirectory);
        }
        table.close(current, free_map);
        current = next;
    }

    Ok(Resolved {
        directory: current,
        file_name: components[components.len() - 1].to_string(),
    })
}
