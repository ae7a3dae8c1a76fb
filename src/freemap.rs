//! The free-sector bitmap allocator (spec §4.2).
//!
//! One bit per sector, packed into `u64` words, persisted as an ordinary
//! file through its own backing inode. A single mutex serializes every
//! scan-and-flip against the bitmap's on-disk copy, the way `my-freemap.c`'s
//! `mem_lock` wraps `bitmap_scan_and_flip`/`bitmap_write` together: another
//! thread must never observe an in-memory allocation that hasn't made it to
//! disk yet.

use std::sync::{Arc, Mutex};

use crate::cache::BufferCache;
use crate::config::{FREE_MAP_SECTOR, ROOT_DIR_SECTOR};
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::inode::Inode;

fn bit(bits: &[u64], idx: u32) -> bool {
    (bits[idx as usize / 64] >> (idx as usize % 64)) & 1 == 1
}

fn set_bit(bits: &mut [u64], idx: u32) {
    bits[idx as usize / 64] |= 1 << (idx as usize % 64);
}

fn clear_bit(bits: &mut [u64], idx: u32) {
    bits[idx as usize / 64] &= !(1 << (idx as usize % 64));
}

fn find_run(bits: &[u64], sector_count: u32, count: u32) -> Option<u32> {
    let mut run_start = 0u32;
    let mut run_len = 0u32;
    for s in 0..sector_count {
        if !bit(bits, s) {
            if run_len == 0 {
                run_start = s;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start);
            }
        } else {
            run_len = 0;
        }
    }
    None
}

fn pack(bits: &[u64]) -> Vec<u8> {
    bits.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn unpack(bytes: &[u8], words: usize) -> Vec<u64> {
    let mut bits = vec![0u64; words];
    for (i, word) in bits.iter_mut().enumerate() {
        let mut buf = [0u8; 8];
        let start = i * 8;
        buf.copy_from_slice(&bytes[start..start + 8]);
        *word = u64::from_le_bytes(buf);
    }
    bits
}

struct FreeMapState<D: BlockDevice> {
    bits: Vec<u64>,
    sector_count: u32,
    /// `None` only during [`FreeMap::format`]'s bootstrap, before the
    /// bitmap's own backing file exists to persist through (mirrors
    /// `free_map_file`'s null check in `free_map_allocate`).
    file: Option<Inode<D>>,
}

/// The device-wide free-sector bitmap.
pub struct FreeMap<D: BlockDevice> {
    state: Mutex<FreeMapState<D>>,
}

impl<D: BlockDevice> FreeMap<D> {
    /// Builds a fresh, all-free bitmap (except `FREE_MAP_SECTOR` and
    /// `ROOT_DIR_SECTOR`, which are busy by construction) and creates its
    /// backing file, per spec §4.2 "Initialization".
    pub fn format(cache: Arc<BufferCache<D>>, sector_count: u32) -> FsResult<Self> {
        let words = (sector_count as usize).div_ceil(64).max(1);
        let mut bits = vec![0u64; words];
        set_bit(&mut bits, FREE_MAP_SECTOR);
        set_bit(&mut bits, ROOT_DIR_SECTOR);

        let free_map = FreeMap {
            state: Mutex::new(FreeMapState {
                bits,
                sector_count,
                file: None,
            }),
        };

        let bitmap_bytes = (words * 8) as u64;
        // `file` is `None` here, so `Inode::create`'s internal resize calls
        // only mutate `bits` in memory; nothing is persisted until the file
        // itself exists below.
        Inode::create(&cache, &free_map, FREE_MAP_SECTOR, bitmap_bytes, false)?;

        let inode = Inode::new_open(cache, FREE_MAP_SECTOR);
        {
            let mut state = free_map.state.lock().unwrap();
            state.file = Some(inode);
        }
        free_map.persist()?;
        Ok(free_map)
    }

    /// Reopens an already-formatted bitmap from its backing file (spec §4.2
    /// "Mount").
    pub fn open(cache: Arc<BufferCache<D>>, sector_count: u32) -> FsResult<Self> {
        let words = (sector_count as usize).div_ceil(64).max(1);
        let inode = Inode::new_open(cache, FREE_MAP_SECTOR);
        let mut bytes = vec![0u8; words * 8];
        inode.read_at(&mut bytes, 0);
        let bits = unpack(&bytes, words);

        Ok(FreeMap {
            state: Mutex::new(FreeMapState {
                bits,
                sector_count,
                file: Some(inode),
            }),
        })
    }

    fn persist(&self) -> FsResult<()> {
        let state = self.state.lock().unwrap();
        self.persist_locked(&state)
    }

    /// Writes the whole bitmap through its backing file. A no-op during
    /// bootstrap, before the file exists. Never grows the file — its size
    /// is fixed at format time — so this never recurses back into
    /// [`FreeMap::allocate`] despite taking `self` as the allocator for
    /// `Inode::write_at`.
    fn persist_locked(&self, state: &FreeMapState<D>) -> FsResult<()> {
        let Some(file) = &state.file else {
            return Ok(());
        };
        let bytes = pack(&state.bits);
        let written = file.write_at(self, &bytes, 0)?;
        if written != bytes.len() {
            return Err(FsError::NoSpace);
        }
        Ok(())
    }

    /// Allocates `count` consecutive sectors and returns the first. Rolls
    /// the in-memory bits back and fails with [`FsError::NoSpace`] if no
    /// such run exists, or if persisting the updated bitmap fails.
    pub fn allocate(&self, count: u32) -> FsResult<u32> {
        let mut state = self.state.lock().unwrap();
        let first = find_run(&state.bits, state.sector_count, count).ok_or(FsError::NoSpace)?;
        for s in first..first + count {
            set_bit(&mut state.bits, s);
        }
        if let Err(e) = self.persist_locked(&state) {
            for s in first..first + count {
                clear_bit(&mut state.bits, s);
            }
            return Err(e);
        }
        Ok(first)
    }

    /// Releases `count` consecutive sectors starting at `first`. Every one
    /// of them must currently be allocated.
    pub fn release(&self, first: u32, count: u32) {
        let mut state = self.state.lock().unwrap();
        for s in first..first + count {
            debug_assert!(bit(&state.bits, s), "releasing sector {s} twice");
            clear_bit(&mut state.bits, s);
        }
        // Best-effort, like the original `free_map_release`: there is no
        // sane rollback for a release that fails to persist.
        let _ = self.persist_locked(&state);
    }

    pub fn sector_count(&self) -> u32 {
        self.state.lock().unwrap().sector_count
    }

    pub fn free_count(&self) -> u32 {
        let state = self.state.lock().unwrap();
        (0..state.sector_count)
            .filter(|&s| !bit(&state.bits, s))
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    fn cache(sectors: u32) -> Arc<BufferCache<MemoryDisk>> {
        Arc::new(BufferCache::new(Arc::new(MemoryDisk::new(sectors))))
    }

    #[test]
    fn format_reserves_free_map_and_root_sectors() {
        let free_map = FreeMap::format(cache(512), 512).unwrap();
        assert!(free_map.free_count() < 512);
        let first = free_map.allocate(1).unwrap();
        assert_ne!(first, FREE_MAP_SECTOR);
        assert_ne!(first, ROOT_DIR_SECTOR);
    }

    #[test]
    fn allocate_finds_contiguous_run_and_release_frees_it() {
        let free_map = FreeMap::format(cache(512), 512).unwrap();
        let before = free_map.free_count();
        let first = free_map.allocate(4).unwrap();
        assert_eq!(free_map.free_count(), before - 4);
        free_map.release(first, 4);
        assert_eq!(free_map.free_count(), before);
    }

    #[test]
    fn allocate_fails_with_no_space_when_device_is_full() {
        let free_map = FreeMap::format(cache(4), 4).unwrap();
        // Two sectors (free map + root) are already reserved; the bitmap's
        // own data sector may take a third, leaving at most one free.
        loop {
            if free_map.allocate(1).is_err() {
                break;
            }
        }
        assert_eq!(free_map.allocate(1), Err(FsError::NoSpace));
    }

    #[test]
    fn reopen_after_format_observes_the_same_bitmap() {
        let device = Arc::new(MemoryDisk::new(512));
        let cache = Arc::new(BufferCache::new(device));
        let first = {
            let free_map = FreeMap::format(cache.clone(), 512).unwrap();
            free_map.allocate(8).unwrap()
        };
        let reopened = FreeMap::open(cache, 512).unwrap();
        assert_eq!(reopened.allocate(1).unwrap() != first, true);
        // The 8 sectors allocated before close must still read as busy.
        assert!(reopened.free_count() < 512 - 8);
    }
}
