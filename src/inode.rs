//! The on-disk inode and its in-memory handle.
//!
//! Layout and addressing follow spec §4.3: 118 direct pointers, one indirect
//! pointer covering 128 more sectors, and one doubly-indirect pointer
//! covering 128*128 more. The single entry point for changing an inode's
//! size is [`Inode::resize`] (spec §4.3.2); every grow, shrink, and create
//! goes through it.
//!
//! `RawInode` carries a 118-entry `[u32; _]` array, which is past what
//! `zerocopy` 0.5's blanket array impls cover — the teacher hits the same
//! wall with `Dinode` in `fs/ufs/inode.rs` and reads/writes it through a raw
//! pointer cast instead of a derive. We do the same here, and for the
//! indirect/doubly-indirect index blocks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scopeguard::ScopeGuard;
use static_assertions::const_assert_eq;

use crate::cache::BufferCache;
use crate::config::{DIRECT_COUNT, INDEX_ENTRIES, INODE_MAGIC, MAX_FILE_SIZE, SECTOR_SIZE};
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::freemap::FreeMap;

/// On-disk inode. Exactly one sector long (spec §4.3, "Data Model").
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawInode {
    pub(crate) direct: [u32; DIRECT_COUNT],
    pub(crate) indirect: u32,
    pub(crate) doubly_indirect: u32,
    pub(crate) length: u32,
    pub(crate) magic: u32,
    pub(crate) is_directory: u32,
    pub(crate) parent: u32,
    pub(crate) ofs: u32,
    pub(crate) num_files: u32,
    _reserved: [u8; 8],
}

const_assert_eq!(core::mem::size_of::<RawInode>(), SECTOR_SIZE);

impl RawInode {
    fn new(is_directory: bool, parent: u32, ofs: u32) -> Self {
        Self {
            direct: [0; DIRECT_COUNT],
            indirect: 0,
            doubly_indirect: 0,
            length: 0,
            magic: INODE_MAGIC,
            is_directory: is_directory as u32,
            parent,
            ofs,
            num_files: 0,
            _reserved: [0; 8],
        }
    }
}

fn read_raw<D: BlockDevice>(cache: &BufferCache<D>, sector: u32) -> RawInode {
    let mut buf = [0u8; SECTOR_SIZE];
    cache.read(sector, &mut buf);
    // SAFETY: RawInode is repr(C), exactly SECTOR_SIZE bytes (checked above),
    // and every field accepts any bit pattern (u32s and a byte array).
    let raw = unsafe { *(buf.as_ptr() as *const RawInode) };
    assert_eq!(raw.magic, INODE_MAGIC, "corrupt inode at sector {sector}");
    raw
}

fn write_raw<D: BlockDevice>(cache: &BufferCache<D>, sector: u32, raw: &RawInode) {
    let mut buf = [0u8; SECTOR_SIZE];
    unsafe {
        *(buf.as_mut_ptr() as *mut RawInode) = *raw;
    }
    cache.write(sector, &buf);
}

fn read_index_block<D: BlockDevice>(cache: &BufferCache<D>, sector: u32) -> [u32; INDEX_ENTRIES] {
    let mut buf = [0u8; SECTOR_SIZE];
    cache.read(sector, &mut buf);
    unsafe { *(buf.as_ptr() as *const [u32; INDEX_ENTRIES]) }
}

fn write_index_block<D: BlockDevice>(
    cache: &BufferCache<D>,
    sector: u32,
    block: &[u32; INDEX_ENTRIES],
) {
    let mut buf = [0u8; SECTOR_SIZE];
    unsafe {
        *(buf.as_mut_ptr() as *mut [u32; INDEX_ENTRIES]) = *block;
    }
    cache.write(sector, &buf);
}

/// Translates a byte offset into the data sector that holds it, per spec
/// §4.3.1. Returns `None` past end-of-file or over an unallocated hole.
fn sector_for_offset<D: BlockDevice>(
    cache: &BufferCache<D>,
    raw: &RawInode,
    pos: u64,
) -> Option<u32> {
    if pos >= raw.length as u64 {
        return None;
    }

    let direct_bytes = DIRECT_COUNT as u64 * SECTOR_SIZE as u64;
    let indirect_bytes = direct_bytes + INDEX_ENTRIES as u64 * SECTOR_SIZE as u64;

    if pos < direct_bytes {
        let slot = raw.direct[(pos / SECTOR_SIZE as u64) as usize];
        return (slot != 0).then_some(slot);
    }

    if pos < indirect_bytes {
        if raw.indirect == 0 {
            return None;
        }
        let block = read_index_block(cache, raw.indirect);
        let idx = ((pos - direct_bytes) / SECTOR_SIZE as u64) as usize;
        let slot = block[idx];
        return (slot != 0).then_some(slot);
    }

    if raw.doubly_indirect == 0 {
        return None;
    }
    let rem = pos - indirect_bytes;
    let outer_idx = (rem / (INDEX_ENTRIES as u64 * SECTOR_SIZE as u64)) as usize;
    let outer = read_index_block(cache, raw.doubly_indirect);
    let inner_sector = outer[outer_idx];
    if inner_sector == 0 {
        return None;
    }
    let inner = read_index_block(cache, inner_sector);
    let inner_idx = ((rem / SECTOR_SIZE as u64) % INDEX_ENTRIES as u64) as usize;
    let slot = inner[inner_idx];
    (slot != 0).then_some(slot)
}

/// Grows or shrinks `raw` to `new_size`, slot by slot, tier by tier. Does
/// not touch `raw.length`; the caller sets it once every tier succeeds.
///
/// This is the authoritative rewrite of the doubly-indirect tier: the
/// original's version reused one index variable across two nested loops and
/// could corrupt unrelated sectors. Here each tier is symmetric — allocate
/// or release a slot, and release an index block's own sector once every
/// slot it covers goes back to zero.
fn resize_tiers<D: BlockDevice>(
    cache: &BufferCache<D>,
    free_map: &FreeMap<D>,
    raw: &mut RawInode,
    new_size: u64,
) -> FsResult<()> {
    let direct_bytes = DIRECT_COUNT as u64 * SECTOR_SIZE as u64;
    let indirect_bytes = direct_bytes + INDEX_ENTRIES as u64 * SECTOR_SIZE as u64;

    for i in 0..DIRECT_COUNT {
        let threshold = i as u64 * SECTOR_SIZE as u64;
        if new_size <= threshold && raw.direct[i] != 0 {
            free_map.release(raw.direct[i], 1);
            raw.direct[i] = 0;
        } else if new_size > threshold && raw.direct[i] == 0 {
            raw.direct[i] = free_map.allocate(1)?;
        }
    }

    let need_indirect = new_size > direct_bytes || raw.indirect != 0;
    if need_indirect {
        let mut block = if raw.indirect == 0 {
            raw.indirect = free_map.allocate(1)?;
            let zeroed = [0u32; INDEX_ENTRIES];
            // Persisted immediately: if a later allocation in this same
            // call fails and `resize_tiers` is re-entered on `raw` during
            // rollback, `raw.indirect` is already nonzero and this sector
            // gets re-read rather than re-zeroed. It must actually hold
            // zeros on disk, not whatever a previously-freed file left
            // behind — a stale nonzero entry there would read back as a
            // live child sector number and get released out from under an
            // unrelated file.
            write_index_block(cache, raw.indirect, &zeroed);
            zeroed
        } else {
            read_index_block(cache, raw.indirect)
        };

        for j in 0..INDEX_ENTRIES {
            let threshold = direct_bytes + j as u64 * SECTOR_SIZE as u64;
            if new_size <= threshold && block[j] != 0 {
                free_map.release(block[j], 1);
                block[j] = 0;
            } else if new_size > threshold && block[j] == 0 {
                block[j] = free_map.allocate(1)?;
            }
        }

        if new_size <= direct_bytes && block.iter().all(|&s| s == 0) {
            free_map.release(raw.indirect, 1);
            raw.indirect = 0;
        } else {
            write_index_block(cache, raw.indirect, &block);
        }
    }

    let need_doubly = new_size > indirect_bytes || raw.doubly_indirect != 0;
    if need_doubly {
        let mut outer = if raw.doubly_indirect == 0 {
            raw.doubly_indirect = free_map.allocate(1)?;
            let zeroed = [0u32; INDEX_ENTRIES];
            // See the matching comment on the indirect block above: must be
            // durably zero before any rollback re-read can observe it.
            write_index_block(cache, raw.doubly_indirect, &zeroed);
            zeroed
        } else {
            read_index_block(cache, raw.doubly_indirect)
        };

        for m in 0..INDEX_ENTRIES {
            let inner_base =
                indirect_bytes + m as u64 * INDEX_ENTRIES as u64 * SECTOR_SIZE as u64;
            let need_inner = new_size > inner_base || outer[m] != 0;
            if !need_inner {
                continue;
            }

            let mut inner = if outer[m] == 0 {
                outer[m] = free_map.allocate(1)?;
                let zeroed = [0u32; INDEX_ENTRIES];
                // Same reasoning as the indirect/doubly-indirect blocks
                // above: durably zero before `outer[m]`'s nonzero entry can
                // cause a rollback re-entry to trust stale disk content.
                write_index_block(cache, outer[m], &zeroed);
                zeroed
            } else {
                read_index_block(cache, outer[m])
            };

            for k in 0..INDEX_ENTRIES {
                let threshold = inner_base + k as u64 * SECTOR_SIZE as u64;
                if new_size <= threshold && inner[k] != 0 {
                    free_map.release(inner[k], 1);
                    inner[k] = 0;
                } else if new_size > threshold && inner[k] == 0 {
                    inner[k] = free_map.allocate(1)?;
                }
            }

            if new_size <= inner_base && inner.iter().all(|&s| s == 0) {
                free_map.release(outer[m], 1);
                outer[m] = 0;
            } else {
                write_index_block(cache, outer[m], &inner);
            }
        }

        if new_size <= indirect_bytes && outer.iter().all(|&s| s == 0) {
            free_map.release(raw.doubly_indirect, 1);
            raw.doubly_indirect = 0;
        } else {
            write_index_block(cache, raw.doubly_indirect, &outer);
        }
    }

    Ok(())
}

/// Shared, reference-counted state for one open inode. `InodeTable` hands
/// out clones of the `Arc` so that every opener of the same sector observes
/// the same `open_count`/`deny_write_count`/`removed` state (spec §4.3,
/// "at most one in-memory inode per sector").
struct InodeMeta {
    sector: u32,
    open_count: AtomicUsize,
    deny_write_count: AtomicUsize,
    removed: AtomicBool,
    io_lock: Mutex<()>,
}

/// A handle to an open inode. Cloning shares the same underlying inode
/// (`Arc`s all the way down) without touching `open_count` — see
/// [`Inode::reopen`] for the counted variant used by the open-inode table.
/// Implemented by hand rather than `#[derive(Clone)]`: a derive would add a
/// spurious `D: Clone` bound, since it can't see that `Arc<BufferCache<D>>`
/// is `Clone` regardless of `D`.
pub struct Inode<D: BlockDevice> {
    meta: Arc<InodeMeta>,
    cache: Arc<BufferCache<D>>,
}

impl<D: BlockDevice> Clone for Inode<D> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<D: BlockDevice> Inode<D> {
    pub(crate) fn new_open(cache: Arc<BufferCache<D>>, sector: u32) -> Self {
        Self {
            meta: Arc::new(InodeMeta {
                sector,
                open_count: AtomicUsize::new(1),
                deny_write_count: AtomicUsize::new(0),
                removed: AtomicBool::new(false),
                io_lock: Mutex::new(()),
            }),
            cache,
        }
    }

    pub(crate) fn reopen(&self) -> Self {
        self.meta.open_count.fetch_add(1, Ordering::AcqRel);
        Self {
            meta: self.meta.clone(),
            cache: self.cache.clone(),
        }
    }

    /// Decrements `open_count` and returns the count remaining afterward.
    /// The caller (the open-inode table) is responsible for reclaiming the
    /// inode's storage once this reaches zero and [`Inode::is_removed`].
    pub(crate) fn decrement_open(&self) -> usize {
        self.meta.open_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn same_inode(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.meta, &other.meta)
    }

    /// Formats a brand-new inode at `sector` and persists it, per spec
    /// §4.3.2 "Creation". Grows from empty straight to `initial_size` using
    /// the same tiered allocator as any other resize.
    pub(crate) fn create(
        cache: &BufferCache<D>,
        free_map: &FreeMap<D>,
        sector: u32,
        initial_size: u64,
        is_directory: bool,
    ) -> FsResult<()> {
        if initial_size > MAX_FILE_SIZE {
            return Err(FsError::TooLong);
        }
        // `parent` is a bootstrap placeholder: nothing has linked this inode
        // into a directory yet, so "self" is the only sector known to write
        // back to. `Inode::link_child` overwrites it once the caller adds a
        // directory entry.
        let mut raw = RawInode::new(is_directory, sector, 0);
        resize_tiers(cache, free_map, &mut raw, initial_size)?;
        raw.length = initial_size as u32;
        write_raw(cache, sector, &raw);
        Ok(())
    }

    pub fn sector(&self) -> u32 {
        self.meta.sector
    }

    /// The buffer cache backing this inode, for callers (the directory
    /// layer, resolving a child's sector into a fresh [`Inode`]) that need
    /// to hand it to [`crate::table::InodeTable::open`] without threading a
    /// separate cache handle of their own.
    pub(crate) fn cache(&self) -> Arc<BufferCache<D>> {
        self.cache.clone()
    }

    pub fn open_count(&self) -> usize {
        self.meta.open_count.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removed(&self) {
        self.meta.removed.store(true, Ordering::Release);
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.meta.removed.load(Ordering::Acquire)
    }

    fn read_raw(&self) -> RawInode {
        read_raw(&self.cache, self.meta.sector)
    }

    fn write_raw(&self, raw: &RawInode) {
        write_raw(&self.cache, self.meta.sector, raw)
    }

    pub fn is_directory(&self) -> bool {
        self.read_raw().is_directory != 0
    }

    pub fn length(&self) -> u64 {
        self.read_raw().length as u64
    }

    pub fn parent_sector(&self) -> u32 {
        self.read_raw().parent
    }

    pub fn entry_offset(&self) -> u32 {
        self.read_raw().ofs
    }

    pub fn num_files(&self) -> u32 {
        self.read_raw().num_files
    }

    /// Records this inode's directory linkage: which directory it lives in
    /// and at what byte offset within that directory's entries (spec §4.4's
    /// `inode_file_add` counterpart). Bumps the *parent*'s `num_files`
    /// unconditionally — it counts every live entry in the directory (spec
    /// §3, `num_files`'s field definition), not just subdirectory children,
    /// so that a directory holding only plain files is still detected as
    /// non-empty on removal.
    pub(crate) fn link_child(parent: &Inode<D>, child: &Inode<D>, ofs: u32) {
        let mut child_raw = child.read_raw();
        child_raw.parent = parent.sector();
        child_raw.ofs = ofs;
        child.write_raw(&child_raw);

        let mut parent_raw = parent.read_raw();
        parent_raw.num_files += 1;
        parent.write_raw(&parent_raw);
    }

    /// Undoes [`Inode::link_child`]'s bookkeeping when any child — file or
    /// subdirectory — is unlinked from `parent`.
    pub(crate) fn unlink_child(parent: &Inode<D>) {
        let mut parent_raw = parent.read_raw();
        parent_raw.num_files = parent_raw.num_files.saturating_sub(1);
        parent.write_raw(&parent_raw);
    }

    pub fn deny_write(&self) {
        let prev = self.meta.deny_write_count.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev + 1 <= self.meta.open_count.load(Ordering::Acquire));
    }

    pub fn allow_write(&self) {
        let prev = self.meta.deny_write_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1);
    }

    fn write_denied(&self) -> bool {
        self.meta.deny_write_count.load(Ordering::Acquire) > 0
    }

    /// Best-effort rollback on failure: reattempt a resize down to
    /// `original_length`. This direction only releases sectors, so per spec
    /// §4.3.2 it "cannot itself fail for lack of space" — any error from it
    /// is swallowed.
    fn rollback_to(&self, free_map: &FreeMap<D>, raw: &mut RawInode, original_length: u64) {
        let _ = resize_tiers(&self.cache, free_map, raw, original_length);
        raw.length = original_length as u32;
    }

    /// Core of [`Inode::resize`], assuming `self.meta.io_lock` is already
    /// held by the caller. Returns the inode's on-disk state as of the end
    /// of the resize, for a caller (`write_at`) that needs it without a
    /// second `read_raw` outside the lock it just released.
    fn resize_locked(&self, free_map: &FreeMap<D>, new_size: u64) -> FsResult<RawInode> {
        if new_size > MAX_FILE_SIZE {
            return Err(FsError::TooLong);
        }

        let raw = self.read_raw();
        let original_length = raw.length as u64;
        let mut raw = scopeguard::guard(raw, |mut raw| {
            self.rollback_to(free_map, &mut raw, original_length);
            self.write_raw(&raw);
        });

        resize_tiers(&self.cache, free_map, &mut raw, new_size)?;
        raw.length = new_size as u32;
        self.write_raw(&raw);
        Ok(ScopeGuard::into_inner(raw))
    }

    /// Changes this inode's size to `new_size`, allocating or releasing
    /// sectors tier by tier (spec §4.3.2). On failure the inode is left at
    /// its original size.
    pub fn resize(&self, free_map: &FreeMap<D>, new_size: u64) -> FsResult<()> {
        let _guard = self.meta.io_lock.lock().unwrap();
        self.resize_locked(free_map, new_size)?;
        Ok(())
    }

    /// Copies up to `buf.len()` bytes starting at `offset` into `buf`.
    /// Returns the number of bytes actually read, short of `buf.len()` only
    /// at end of file (spec §4.3.3).
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> usize {
        let _guard = self.meta.io_lock.lock().unwrap();
        let raw = self.read_raw();
        let mut done = 0usize;

        while done < buf.len() {
            let pos = offset + done as u64;
            if pos >= raw.length as u64 {
                break;
            }
            let sector_ofs = (pos % SECTOR_SIZE as u64) as usize;
            let inode_left = raw.length as u64 - pos;
            let sector_left = SECTOR_SIZE - sector_ofs;
            let chunk = (buf.len() - done)
                .min(sector_left)
                .min(inode_left as usize);
            if chunk == 0 {
                break;
            }

            let Some(sector) = sector_for_offset(&self.cache, &raw, pos) else {
                break;
            };
            let mut sector_buf = [0u8; SECTOR_SIZE];
            self.cache.read(sector, &mut sector_buf);
            buf[done..done + chunk].copy_from_slice(&sector_buf[sector_ofs..sector_ofs + chunk]);
            done += chunk;
        }

        done
    }

    /// Writes `buf` at `offset`, growing the inode first if the write
    /// extends past the current length (spec §4.3.3). Fails atomically —
    /// either every byte is written, or none are and the inode keeps its
    /// original size.
    ///
    /// The grow check and the grow itself run inside the same critical
    /// section as the data-write loop below — a single acquisition of
    /// `self.meta.io_lock`, not two independent lock/unlock cycles — so
    /// that inode length and its index blocks are observed atomically by
    /// concurrent writers on this inode (spec §5). Two separate critical
    /// sections would let a second, smaller concurrent write read a stale
    /// pre-grow length, then `resize` down to it after this write already
    /// grew and allocated into it, releasing sectors this write is about to
    /// use.
    pub fn write_at(&self, free_map: &FreeMap<D>, buf: &[u8], offset: u64) -> FsResult<usize> {
        if self.write_denied() {
            return Err(FsError::Denied);
        }

        let _guard = self.meta.io_lock.lock().unwrap();

        let needed_len = offset + buf.len() as u64;
        let raw = self.read_raw();
        let raw = if needed_len > raw.length as u64 {
            self.resize_locked(free_map, needed_len)?
        } else {
            raw
        };
        let mut done = 0usize;

        while done < buf.len() {
            let pos = offset + done as u64;
            let sector_ofs = (pos % SECTOR_SIZE as u64) as usize;
            let inode_left = raw.length as u64 - pos;
            let sector_left = SECTOR_SIZE - sector_ofs;
            let chunk = (buf.len() - done)
                .min(sector_left)
                .min(inode_left as usize);
            if chunk == 0 {
                break;
            }

            let sector = sector_for_offset(&self.cache, &raw, pos)
                .expect("sector must be allocated after a successful resize");

            if sector_ofs == 0 && chunk == SECTOR_SIZE {
                let mut sector_buf = [0u8; SECTOR_SIZE];
                sector_buf.copy_from_slice(&buf[done..done + chunk]);
                self.cache.write(sector, &sector_buf);
            } else {
                let mut sector_buf = [0u8; SECTOR_SIZE];
                self.cache.read(sector, &mut sector_buf);
                sector_buf[sector_ofs..sector_ofs + chunk]
                    .copy_from_slice(&buf[done..done + chunk]);
                self.cache.write(sector, &sector_buf);
            }
            done += chunk;
        }

        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    fn harness() -> (Arc<BufferCache<MemoryDisk>>, FreeMap<MemoryDisk>) {
        let cache = Arc::new(BufferCache::new(Arc::new(MemoryDisk::new(4096))));
        let free_map = FreeMap::format(cache.clone(), 4096).unwrap();
        (cache, free_map)
    }

    #[test]
    fn create_then_read_zeroed_region() {
        let (cache, free_map) = harness();
        let sector = free_map.allocate(1).unwrap();
        Inode::create(&cache, &free_map, sector, 1024, false).unwrap();
        let inode = Inode::new_open(cache, sector);

        assert_eq!(inode.length(), 1024);
        let mut buf = [0xAAu8; 16];
        let n = inode.read_at(&mut buf, 0);
        assert_eq!(n, 16);
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn write_then_read_roundtrip_across_sector_boundary() {
        let (cache, free_map) = harness();
        let sector = free_map.allocate(1).unwrap();
        Inode::create(&cache, &free_map, sector, 0, false).unwrap();
        let inode = Inode::new_open(cache, sector);

        let data: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let written = inode.write_at(&free_map, &data, 100).unwrap();
        assert_eq!(written, data.len());
        assert_eq!(inode.length(), 2100);

        let mut out = vec![0u8; data.len()];
        let read = inode.read_at(&mut out, 100);
        assert_eq!(read, data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn write_spanning_direct_and_indirect_tiers() {
        let (cache, free_map) = harness();
        let sector = free_map.allocate(1).unwrap();
        Inode::create(&cache, &free_map, sector, 0, false).unwrap();
        let inode = Inode::new_open(cache, sector);

        let direct_bytes = DIRECT_COUNT as u64 * SECTOR_SIZE as u64;
        let data = vec![0x5Au8; 4096];
        let offset = direct_bytes - 2048;
        inode.write_at(&free_map, &data, offset).unwrap();

        let mut out = vec![0u8; data.len()];
        inode.read_at(&mut out, offset);
        assert_eq!(out, data);
    }

    #[test]
    fn shrink_releases_sectors_back_to_free_map() {
        let (cache, free_map) = harness();
        let sector = free_map.allocate(1).unwrap();
        Inode::create(&cache, &free_map, sector, 0, false).unwrap();
        let inode = Inode::new_open(cache, sector);

        let direct_bytes = DIRECT_COUNT as u64 * SECTOR_SIZE as u64;
        inode.resize(&free_map, direct_bytes * 2).unwrap();
        let free_after_grow = free_map.free_count();

        inode.resize(&free_map, 0).unwrap();
        assert_eq!(inode.length(), 0);
        assert!(free_map.free_count() > free_after_grow);

        let raw = inode.read_raw();
        assert_eq!(raw.indirect, 0, "indirect index sector must be released too");
    }

    #[test]
    fn resize_rolls_back_on_no_space() {
        let cache = Arc::new(BufferCache::new(Arc::new(MemoryDisk::new(140))));
        let free_map = FreeMap::format(cache.clone(), 140).unwrap();
        let sector = free_map.allocate(1).unwrap();
        Inode::create(&cache, &free_map, sector, 0, false).unwrap();
        let inode = Inode::new_open(cache, sector);

        // Device is far too small to back a doubly-indirect-spanning file.
        let huge = MAX_FILE_SIZE;
        let err = inode.resize(&free_map, huge).unwrap_err();
        assert_eq!(err, FsError::NoSpace);
        assert_eq!(inode.length(), 0, "failed resize must leave length unchanged");
    }

    #[test]
    fn deny_write_blocks_write_at() {
        let (cache, free_map) = harness();
        let sector = free_map.allocate(1).unwrap();
        Inode::create(&cache, &free_map, sector, 0, false).unwrap();
        let inode = Inode::new_open(cache, sector);

        inode.deny_write();
        let err = inode.write_at(&free_map, b"hi", 0).unwrap_err();
        assert_eq!(err, FsError::Denied);
        inode.allow_write();
        assert!(inode.write_at(&free_map, b"hi", 0).is_ok());
    }
}
