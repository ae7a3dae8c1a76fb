//! The file handle surface (spec §4.6).
//!
//! One `FileHandle` exists per *opener*, as opposed to [`crate::inode::Inode`]
//! which is shared by every opener of the same sector: the position cursor,
//! the directory-readdir cursor, and whether this particular opener is
//! holding a deny-write lock are all per-handle state layered on top of the
//! shared inode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::directory;
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::freemap::FreeMap;
use crate::inode::Inode;
use crate::table::InodeTable;

/// A per-opener handle onto an [`Inode`], dispatching to regular-file or
/// directory operations as the syscall-facing layer expects (spec §4.6).
pub struct FileHandle<D: BlockDevice> {
    inode: Inode<D>,
    free_map: Arc<FreeMap<D>>,
    table: Arc<InodeTable<D>>,
    position: Mutex<u64>,
    readdir_cursor: Mutex<usize>,
    /// Whether *this* handle currently holds a deny-write lock on `inode`,
    /// so [`FileHandle::close`] can release it automatically rather than
    /// leaking a hold past the handle's own lifetime.
    denies_write: AtomicBool,
    closed: AtomicBool,
}

impl<D: BlockDevice> FileHandle<D> {
    pub(crate) fn new(inode: Inode<D>, free_map: Arc<FreeMap<D>>, table: Arc<InodeTable<D>>) -> Self {
        Self {
            inode,
            free_map,
            table,
            position: Mutex::new(0),
            readdir_cursor: Mutex::new(0),
            denies_write: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> FsResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(FsError::Closed)
        } else {
            Ok(())
        }
    }

    /// Reads up to `buf.len()` bytes starting at the handle's current
    /// position, advancing it by the number of bytes actually read.
    pub fn read(&self, buf: &mut [u8]) -> FsResult<usize> {
        self.check_open()?;
        if self.inode.is_directory() {
            return Err(FsError::NotDirectory);
        }
        let mut pos = self.position.lock().unwrap();
        let n = self.inode.read_at(buf, *pos);
        *pos += n as u64;
        Ok(n)
    }

    /// Writes `buf` starting at the handle's current position, growing the
    /// underlying file if necessary, and advances the position by the
    /// number of bytes actually written.
    pub fn write(&self, buf: &[u8]) -> FsResult<usize> {
        self.check_open()?;
        if self.inode.is_directory() {
            return Err(FsError::NotDirectory);
        }
        let mut pos = self.position.lock().unwrap();
        let n = self.inode.write_at(&self.free_map, buf, *pos)?;
        *pos += n as u64;
        Ok(n)
    }

    /// Moves the handle's position cursor to `pos`, independent of the
    /// file's current length (a seek past end-of-file is legal; the next
    /// write there grows the file and leaves the gap readable as zeros).
    pub fn seek(&self, pos: u64) -> FsResult<()> {
        self.check_open()?;
        *self.position.lock().unwrap() = pos;
        Ok(())
    }

    /// Returns the handle's current position.
    pub fn tell(&self) -> FsResult<u64> {
        self.check_open()?;
        Ok(*self.position.lock().unwrap())
    }

    /// Returns the underlying file's length in bytes.
    pub fn length(&self) -> FsResult<u64> {
        self.check_open()?;
        Ok(self.inode.length())
    }

    /// Returns the next live directory entry's name, advancing this
    /// handle's own readdir cursor, or `Ok(None)` once exhausted. Fails
    /// with [`FsError::NotDirectory`] on a regular-file handle.
    pub fn readdir(&self) -> FsResult<Option<String>> {
        self.check_open()?;
        if !self.inode.is_directory() {
            return Err(FsError::NotDirectory);
        }
        let mut cursor = self.readdir_cursor.lock().unwrap();
        Ok(directory::readdir_next(&self.inode, &mut cursor))
    }

    /// Returns `true` if this handle refers to a directory.
    pub fn is_directory(&self) -> bool {
        self.inode.is_directory()
    }

    /// Returns the sector number backing this handle's inode — the
    /// closest analogue to a classic `inumber`.
    pub fn inumber(&self) -> u32 {
        self.inode.sector()
    }

    /// Acquires a deny-write hold on the underlying inode, idempotently
    /// with respect to this handle (calling it twice in a row on the same
    /// handle holds only one lock, matching the executable-loader's use:
    /// "deny writes to the binary I'm running", not "deny writes N times").
    pub fn deny_write(&self) -> FsResult<()> {
        self.check_open()?;
        if !self.denies_write.swap(true, Ordering::AcqRel) {
            self.inode.deny_write();
        }
        Ok(())
    }

    /// Releases this handle's deny-write hold, if it is holding one.
    pub fn allow_write(&self) -> FsResult<()> {
        self.check_open()?;
        if self.denies_write.swap(false, Ordering::AcqRel) {
            self.inode.allow_write();
        }
        Ok(())
    }

    /// Closes the handle: releases any deny-write hold it still has, then
    /// closes its reference to the underlying inode (triggering deferred
    /// reclamation if this was both the last opener and the file had been
    /// removed). Idempotent — closing twice is a no-op the second time.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.denies_write.swap(false, Ordering::AcqRel) {
            self.inode.allow_write();
        }
        self.table.close(self.inode.clone(), &self.free_map);
    }
}

impl<D: BlockDevice> Drop for FileHandle<D> {
    fn drop(&mut self) {
        self.close();
    }
}
