//! The mounted file system: format/mount/unmount lifecycle plus the
//! path-facing operations a syscall layer calls (spec §4.6, §6
//! "Initialization / shutdown").
//!
//! One `Filesystem<D>` owns the cache, the free map, and the open-inode
//! table for a single mounted device — a generalization of the teacher's
//! single process-wide `fs_device`/`free_map` globals, forced by not having
//! one implicit kernel-wide device (spec.md's expanded design notes, §4.6).

use std::sync::Arc;

use crate::cache::BufferCache;
use crate::config::{DEFAULT_DIR_ENTRIES, ROOT_DIR_SECTOR};
use crate::device::BlockDevice;
use crate::directory::{self, DIR_ENTRY_SIZE};
use crate::error::{FsError, FsResult};
use crate::freemap::FreeMap;
use crate::handle::FileHandle;
use crate::inode::Inode;
use crate::resolver::{self, Resolved};
use crate::table::InodeTable;

/// A mounted file system over one block device.
pub struct Filesystem<D: BlockDevice> {
    cache: Arc<BufferCache<D>>,
    free_map: Arc<FreeMap<D>>,
    table: Arc<InodeTable<D>>,
    root_sector: u32,
}

impl<D: BlockDevice> Filesystem<D> {
    /// Formats `device`: lays down a fresh free-map file at
    /// [`crate::config::FREE_MAP_SECTOR`] and an empty root directory at
    /// [`ROOT_DIR_SECTOR`], then mounts the result (spec §6, `do_format`).
    pub fn format(device: Arc<D>) -> FsResult<Self> {
        let cache = Arc::new(BufferCache::new(device.clone()));
        let sector_count = device.sector_count();
        let free_map = FreeMap::format(cache.clone(), sector_count)?;
        directory::create(&cache, &free_map, ROOT_DIR_SECTOR, DEFAULT_DIR_ENTRIES)?;
        cache.flush_all();

        Ok(Self {
            cache,
            free_map: Arc::new(free_map),
            table: Arc::new(InodeTable::new()),
            root_sector: ROOT_DIR_SECTOR,
        })
    }

    /// Mounts an already-formatted `device`, reopening its free map and
    /// root directory (spec §6, `filesys_init(format: false)`).
    pub fn mount(device: Arc<D>) -> FsResult<Self> {
        let cache = Arc::new(BufferCache::new(device.clone()));
        let sector_count = device.sector_count();
        let free_map = FreeMap::open(cache.clone(), sector_count)?;

        Ok(Self {
            cache,
            free_map: Arc::new(free_map),
            table: Arc::new(InodeTable::new()),
            root_sector: ROOT_DIR_SECTOR,
        })
    }

    /// Flushes every dirty cache entry to the device. Consumes `self`: per
    /// spec §6, "it is a hard error to perform any file operation
    /// afterwards", which Rust's ownership enforces statically rather than
    /// at runtime — there is no `Filesystem` left to call anything on.
    pub fn unmount(self) {
        self.cache.flush_all();
    }

    /// Opens a fresh handle onto the root directory — the initial working
    /// directory for a new top-level caller.
    pub fn root_inode(&self) -> Inode<D> {
        self.table.open(self.cache.clone(), self.root_sector)
    }

    fn resolve(&self, cwd: &Inode<D>, path: &str) -> FsResult<Resolved<D>> {
        let root = self.table.open(self.cache.clone(), self.root_sector);
        let result = resolver::resolve(&self.table, &self.cache, &self.free_map, &root, cwd, path);
        self.table.close(root, &self.free_map);
        result
    }

    /// Resolves `path` (relative to `cwd` unless absolute) to an open
    /// handle. Fails with [`FsError::NotFound`] if the final component does
    /// not exist.
    pub fn open_by_path(&self, cwd: &Inode<D>, path: &str) -> FsResult<FileHandle<D>> {
        let resolved = self.resolve(cwd, path)?;
        let result = resolver::resolve_name(&self.table, &self.cache, &resolved.directory, &resolved.file_name);
        self.table.close(resolved.directory, &self.free_map);
        let inode = result?;
        Ok(FileHandle::new(inode, self.free_map.clone(), self.table.clone()))
    }

    /// Creates a new file or directory at `path`. `initial_size` is the
    /// initial length in bytes for a regular file; directories are always
    /// created empty, sized for [`crate::config::DEFAULT_DIR_ENTRIES`]
    /// entries before their first grow (spec §6's `do_format` convention,
    /// generalized to every `mkdir`).
    pub fn create(
        &self,
        cwd: &Inode<D>,
        path: &str,
        initial_size: u64,
        is_directory: bool,
    ) -> FsResult<()> {
        let resolved = self.resolve(cwd, path)?;
        if resolved.file_name == "." || resolved.file_name == ".." {
            self.table.close(resolved.directory, &self.free_map);
            return Err(FsError::Exists);
        }
        if directory::lookup(&resolved.directory, &resolved.file_name).is_some() {
            self.table.close(resolved.directory, &self.free_map);
            return Err(FsError::Exists);
        }

        let sector = match self.free_map.allocate(1) {
            Ok(sector) => sector,
            Err(e) => {
                self.table.close(resolved.directory, &self.free_map);
                return Err(e);
            }
        };

        let size = if is_directory {
            (DEFAULT_DIR_ENTRIES * DIR_ENTRY_SIZE) as u64
        } else {
            initial_size
        };
        if let Err(e) = Inode::create(&self.cache, &self.free_map, sector, size, is_directory) {
            self.free_map.release(sector, 1);
            self.table.close(resolved.directory, &self.free_map);
            return Err(e);
        }

        let child = self.table.open(self.cache.clone(), sector);
        match directory::add(&resolved.directory, &self.free_map, &resolved.file_name, sector) {
            Ok(ofs) => {
                Inode::link_child(&resolved.directory, &child, ofs);
                self.table.close(child, &self.free_map);
                self.table.close(resolved.directory, &self.free_map);
                Ok(())
            }
            Err(e) => {
                child.mark_removed();
                self.table.close(child, &self.free_map);
                self.table.close(resolved.directory, &self.free_map);
                Err(e)
            }
        }
    }

    /// Removes the file or directory at `path`. Fails with
    /// [`FsError::NotEmpty`] if it names a non-empty subdirectory.
    pub fn remove(&self, cwd: &Inode<D>, path: &str) -> FsResult<()> {
        let resolved = self.resolve(cwd, path)?;
        if resolved.file_name == "." || resolved.file_name == ".." {
            self.table.close(resolved.directory, &self.free_map);
            return Err(FsError::NotFound);
        }
        let result = directory::remove(&self.table, &self.free_map, &resolved.directory, &resolved.file_name);
        self.table.close(resolved.directory, &self.free_map);
        result
    }

    /// Resolves `path` to a directory and returns it, for a caller to adopt
    /// as its new current working directory. Fails with
    /// [`FsError::NotDirectory`] if `path` does not name a directory.
    pub fn chdir(&self, cwd: &Inode<D>, path: &str) -> FsResult<Inode<D>> {
        let resolved = self.resolve(cwd, path)?;
        let result = resolver::resolve_name(&self.table, &self.cache, &resolved.directory, &resolved.file_name);
        self.table.close(resolved.directory, &self.free_map);
        let inode = result?;
        if !inode.is_directory() {
            self.table.close(inode, &self.free_map);
            return Err(FsError::NotDirectory);
        }
        Ok(inode)
    }

    /// Releases a working-directory handle obtained from [`Filesystem::chdir`]
    /// or [`Filesystem::root_inode`] once the caller is done with it.
    pub fn close_inode(&self, inode: Inode<D>) {
        self.table.close(inode, &self.free_map);
    }

    /// Total sectors on the mounted device.
    pub fn sector_count(&self) -> u32 {
        self.free_map.sector_count()
    }

    /// Free sectors remaining on the mounted device.
    pub fn free_sector_count(&self) -> u32 {
        self.free_map.free_count()
    }
}
