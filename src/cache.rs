//! The unified buffer cache.
//!
//! A fixed-capacity, write-back cache of disk sectors with a second-chance
//! (clock) eviction policy, mediating every access to the block device
//! (spec §4.1). Caching disk blocks in memory reduces the number of disk
//! accesses and gives every other subsystem — inodes, directories, the free
//! map — a single synchronization point for sectors shared across threads.

use std::sync::{Arc, Mutex};

use log::trace;

use crate::config::{NUM_CACHE_ENTRIES, SECTOR_SIZE};
use crate::device::BlockDevice;

struct CacheEntry {
    sector: u32,
    dirty: bool,
    recently_used: bool,
    valid: bool,
    data: [u8; SECTOR_SIZE],
}

impl CacheEntry {
    const fn empty() -> Self {
        Self {
            sector: 0,
            dirty: false,
            recently_used: false,
            valid: false,
            data: [0; SECTOR_SIZE],
        }
    }
}

/// Hit/miss/eviction counters, exposed for diagnostics. Not part of the
/// spec's contract, but the kind of bookkeeping the teacher keeps alongside
/// lock-protected state rather than bolting on externally.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner {
    entries: Vec<CacheEntry>,
    clock_hand: usize,
    stats: CacheStats,
}

impl Inner {
    /// Finds (or installs) the entry for `sector`, running the clock
    /// algorithm on a miss, and returns its index. See spec §4.1,
    /// "Lookup / admit algorithm".
    fn admit<D: BlockDevice>(&mut self, device: &D, sector: u32) -> usize {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.valid && entry.sector == sector {
                entry.recently_used = true;
                self.stats.hits += 1;
                return i;
            }
        }

        self.stats.misses += 1;
        loop {
            let hand = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % self.entries.len();
            let entry = &mut self.entries[hand];

            if entry.valid && entry.recently_used {
                entry.recently_used = false;
                continue;
            }

            if entry.valid && entry.dirty {
                trace!("cache: evicting dirty sector {}", entry.sector);
                device.write(entry.sector, &entry.data);
                self.stats.evictions += 1;
            }

            device.read(sector, &mut entry.data);
            entry.valid = true;
            entry.dirty = false;
            entry.recently_used = true;
            entry.sector = sector;
            return hand;
        }
    }
}

/// A 64-entry, write-back cache of sectors from a single block device.
pub struct BufferCache<D: BlockDevice> {
    device: Arc<D>,
    inner: Mutex<Inner>,
}

impl<D: BlockDevice> BufferCache<D> {
    /// Builds a fresh cache with every entry invalid, the way `cache_init`
    /// (re)initializes the global cache at mount time.
    pub fn new(device: Arc<D>) -> Self {
        let mut entries = Vec::with_capacity(NUM_CACHE_ENTRIES);
        entries.resize_with(NUM_CACHE_ENTRIES, CacheEntry::empty);
        Self {
            device,
            inner: Mutex::new(Inner {
                entries,
                clock_hand: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Copies the cached contents of `sector` into `out`.
    pub fn read(&self, sector: u32, out: &mut [u8; SECTOR_SIZE]) {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.admit(&*self.device, sector);
        out.copy_from_slice(&inner.entries[idx].data);
    }

    /// Overwrites the cached contents of `sector` with `buf` and marks the
    /// entry dirty; the write reaches disk only at the next eviction or
    /// [`BufferCache::flush_all`].
    pub fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.admit(&*self.device, sector);
        inner.entries[idx].data.copy_from_slice(buf);
        inner.entries[idx].dirty = true;
    }

    /// Writes every dirty entry back to the device. Calling this twice in a
    /// row is a no-op the second time: every entry is clean after the first
    /// call.
    pub fn flush_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        for entry in &mut inner.entries {
            if entry.dirty {
                self.device.write(entry.sector, &entry.data);
                entry.dirty = false;
            }
        }
    }

    /// Current hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    fn cache(sectors: u32) -> BufferCache<MemoryDisk> {
        BufferCache::new(Arc::new(MemoryDisk::new(sectors)))
    }

    #[test]
    fn read_after_write_same_sector() {
        let cache = cache(4);
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0] = 0xAB;
        cache.write(2, &buf);

        let mut out = [0u8; SECTOR_SIZE];
        cache.read(2, &mut out);
        assert_eq!(out, buf);
    }

    #[test]
    fn flush_all_clears_dirty_bits_and_is_idempotent() {
        let device = Arc::new(MemoryDisk::new(4));
        let cache = BufferCache::new(device.clone());
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0] = 7;
        cache.write(1, &buf);

        cache.flush_all();
        let mut on_disk = [0u8; SECTOR_SIZE];
        device.read(1, &mut on_disk);
        assert_eq!(on_disk, buf);

        // Idempotent: flushing again changes nothing.
        cache.flush_all();
        let mut on_disk_again = [0u8; SECTOR_SIZE];
        device.read(1, &mut on_disk_again);
        assert_eq!(on_disk_again, buf);
    }

    #[test]
    fn eviction_writes_back_dirty_entries() {
        let device = Arc::new(MemoryDisk::new((NUM_CACHE_ENTRIES + 4) as u32));
        let cache = BufferCache::new(device.clone());

        let mut buf = [0u8; SECTOR_SIZE];
        buf[0] = 0x42;
        cache.write(0, &buf);

        // Touch NUM_CACHE_ENTRIES more distinct sectors to force sector 0 out.
        for s in 1..=NUM_CACHE_ENTRIES as u32 {
            let mut scratch = [0u8; SECTOR_SIZE];
            cache.read(s, &mut scratch);
        }

        let mut on_disk = [0u8; SECTOR_SIZE];
        device.read(0, &mut on_disk);
        assert_eq!(on_disk, buf, "dirty entry must be written back on eviction");
    }

    #[test]
    fn distinct_sectors_do_not_alias() {
        let cache = cache(8);
        let mut a = [0u8; SECTOR_SIZE];
        a[0] = 1;
        let mut b = [0u8; SECTOR_SIZE];
        b[0] = 2;
        cache.write(3, &a);
        cache.write(4, &b);

        let mut out = [0u8; SECTOR_SIZE];
        cache.read(3, &mut out);
        assert_eq!(out[0], 1);
        cache.read(4, &mut out);
        assert_eq!(out[0], 2);
    }
}
