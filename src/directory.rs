//! The directory layer (spec §4.4).
//!
//! A directory is an ordinary file whose bytes are a flat array of
//! fixed-width entries — `{in_use, name, inode_sector}` — looked up,
//! inserted, and removed linearly. `.` and `..` are never stored; callers
//! above this layer synthesize them from the inode's own `parent` field
//! (spec invariant 5).

use zerocopy::{AsBytes, FromBytes};

use crate::cache::BufferCache;
use crate::config::NAME_MAX;
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::freemap::FreeMap;
use crate::inode::Inode;
use crate::table::InodeTable;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes)]
struct RawDirEntry {
    inode_sector: u32,
    in_use: u8,
    name: [u8; NAME_MAX],
    _reserved: u8,
}

const ENTRY_SIZE: usize = core::mem::size_of::<RawDirEntry>();

fn entry_name(entry: &RawDirEntry) -> &str {
    let len = entry.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
    core::str::from_utf8(&entry.name[..len]).unwrap_or("")
}

fn read_entry<D: BlockDevice>(dir: &Inode<D>, index: usize) -> RawDirEntry {
    let mut buf = [0u8; ENTRY_SIZE];
    dir.read_at(&mut buf, (index * ENTRY_SIZE) as u64);
    RawDirEntry::read_from(&buf[..]).expect("fixed-size buffer matches RawDirEntry layout")
}

fn write_entry<D: BlockDevice>(
    dir: &Inode<D>,
    free_map: &FreeMap<D>,
    index: usize,
    entry: &RawDirEntry,
) -> FsResult<()> {
    dir.write_at(free_map, entry.as_bytes(), (index * ENTRY_SIZE) as u64)?;
    Ok(())
}

fn entry_count<D: BlockDevice>(dir: &Inode<D>) -> usize {
    dir.length() as usize / ENTRY_SIZE
}

/// Size in bytes of one packed directory entry, for callers (the directory
/// creation path in [`crate::filesystem`]) that need to size a fresh
/// directory file in entries rather than bytes.
pub(crate) const DIR_ENTRY_SIZE: usize = ENTRY_SIZE;

/// Creates a new, empty directory file sized for `initial_entries` entries
/// before its first grow (matches `do_format`'s `dir_create(ROOT_DIR_SECTOR,
/// 16)`).
pub(crate) fn create<D: BlockDevice>(
    cache: &BufferCache<D>,
    free_map: &FreeMap<D>,
    sector: u32,
    initial_entries: usize,
) -> FsResult<()> {
    Inode::create(
        cache,
        free_map,
        sector,
        (initial_entries * ENTRY_SIZE) as u64,
        true,
    )
}

/// Looks up `name` in `dir`, returning the sector of its inode if present.
pub(crate) fn lookup<D: BlockDevice>(dir: &Inode<D>, name: &str) -> Option<u32> {
    for i in 0..entry_count(dir) {
        let entry = read_entry(dir, i);
        if entry.in_use != 0 && entry_name(&entry) == name {
            return Some(entry.inode_sector);
        }
    }
    None
}

/// Adds an entry for `name` pointing at `inode_sector`, reusing a freed slot
/// if one exists and growing the directory file by one entry otherwise.
/// Fails with [`FsError::Exists`] if `name` is already present. Returns the
/// byte offset of the entry within `dir`, for the caller to record as the
/// new child's `ofs` (spec §4.4, "records ... its `ofs`").
pub(crate) fn add<D: BlockDevice>(
    dir: &Inode<D>,
    free_map: &FreeMap<D>,
    name: &str,
    inode_sector: u32,
) -> FsResult<u32> {
    if name.is_empty() || name.len() > NAME_MAX {
        return Err(FsError::TooLong);
    }

    let count = entry_count(dir);
    let mut free_slot = None;
    for i in 0..count {
        let entry = read_entry(dir, i);
        if entry.in_use != 0 {
            if entry_name(&entry) == name {
                return Err(FsError::Exists);
            }
        } else if free_slot.is_none() {
            free_slot = Some(i);
        }
    }

    let mut raw_name = [0u8; NAME_MAX];
    raw_name[..name.len()].copy_from_slice(name.as_bytes());
    let entry = RawDirEntry {
        inode_sector,
        in_use: 1,
        name: raw_name,
        _reserved: 0,
    };
    let slot = free_slot.unwrap_or(count);
    write_entry(dir, free_map, slot, &entry)?;
    Ok((slot * ENTRY_SIZE) as u32)
}

/// Removes `name` from `dir`, closing and reclaiming its inode if this was
/// the last link. Decrements `dir`'s `num_files` (spec §4.4, mirroring
/// `inode_file_remove`). Fails with [`FsError::NotEmpty`] if the entry is a
/// non-empty directory.
pub(crate) fn remove<D: BlockDevice>(
    table: &InodeTable<D>,
    free_map: &FreeMap<D>,
    dir: &Inode<D>,
    name: &str,
) -> FsResult<()> {
    let mut found = None;
    for i in 0..entry_count(dir) {
        let entry = read_entry(dir, i);
        if entry.in_use != 0 && entry_name(&entry) == name {
            found = Some((i, entry));
            break;
        }
    }
    let (slot, entry) = found.ok_or(FsError::NotFound)?;

    let child = table.open(dir.cache(), entry.inode_sector);
    if child.is_directory() && child.num_files() > 0 {
        table.close(child, free_map);
        return Err(FsError::NotEmpty);
    }

    let mut cleared = entry;
    cleared.in_use = 0;
    write_entry(dir, free_map, slot, &cleared)?;

    Inode::unlink_child(dir);
    child.mark_removed();
    table.close(child, free_map);
    Ok(())
}

/// Lists the names of every live entry in `dir`. `.` and `..` are not among
/// them — they are synthesized by callers from the inode's own sector and
/// `parent` field.
pub(crate) fn readdir<D: BlockDevice>(dir: &Inode<D>) -> Vec<String> {
    let mut names = Vec::new();
    for i in 0..entry_count(dir) {
        let entry = read_entry(dir, i);
        if entry.in_use != 0 {
            names.push(entry_name(&entry).to_string());
        }
    }
    names
}

/// Advances `*cursor` past the next live entry starting from its current
/// value and returns that entry's name, or `None` once every slot has been
/// visited. Backs a [`crate::handle::FileHandle`]'s `readdir` cursor (spec
/// §4.4's `readdir`): each handle keeps its own cursor, so two openers of
/// the same directory enumerate independently.
pub(crate) fn readdir_next<D: BlockDevice>(dir: &Inode<D>, cursor: &mut usize) -> Option<String> {
    let count = entry_count(dir);
    while *cursor < count {
        let idx = *cursor;
        *cursor += 1;
        let entry = read_entry(dir, idx);
        if entry.in_use != 0 {
            return Some(entry_name(&entry).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;
    use std::sync::Arc;

    fn harness() -> (Arc<BufferCache<MemoryDisk>>, FreeMap<MemoryDisk>, InodeTable<MemoryDisk>) {
        let cache = Arc::new(BufferCache::new(Arc::new(MemoryDisk::new(512))));
        let free_map = FreeMap::format(cache.clone(), 512).unwrap();
        let table = InodeTable::new();
        (cache, free_map, table)
    }

    #[test]
    fn add_then_lookup_round_trips() {
        let (cache, free_map, table) = harness();
        let dir_sector = free_map.allocate(1).unwrap();
        create(&cache, &free_map, dir_sector, 4).unwrap();
        let dir = table.open_at(cache.clone(), dir_sector);

        let file_sector = free_map.allocate(1).unwrap();
        add(&dir, &free_map, "hello.txt", file_sector).unwrap();

        assert_eq!(lookup(&dir, "hello.txt"), Some(file_sector));
        assert_eq!(lookup(&dir, "missing"), None);
    }

    #[test]
    fn add_duplicate_name_fails() {
        let (cache, free_map, table) = harness();
        let dir_sector = free_map.allocate(1).unwrap();
        create(&cache, &free_map, dir_sector, 4).unwrap();
        let dir = table.open_at(cache.clone(), dir_sector);

        let a = free_map.allocate(1).unwrap();
        let b = free_map.allocate(1).unwrap();
        add(&dir, &free_map, "x", a).unwrap();
        assert_eq!(add(&dir, &free_map, "x", b), Err(FsError::Exists));
    }

    #[test]
    fn remove_reuses_freed_slot_and_readdir_reflects_live_entries() {
        let (cache, free_map, table) = harness();
        let dir_sector = free_map.allocate(1).unwrap();
        create(&cache, &free_map, dir_sector, 4).unwrap();
        let dir = table.open_at(cache.clone(), dir_sector);

        let a_sector = free_map.allocate(1).unwrap();
        crate::inode::Inode::create(&cache, &free_map, a_sector, 0, false).unwrap();
        add(&dir, &free_map, "a", a_sector).unwrap();

        let b_sector = free_map.allocate(1).unwrap();
        crate::inode::Inode::create(&cache, &free_map, b_sector, 0, false).unwrap();
        add(&dir, &free_map, "b", b_sector).unwrap();

        assert_eq!(readdir(&dir), vec!["a".to_string(), "b".to_string()]);

        remove(&table, &free_map, &dir, "a").unwrap();
        assert_eq!(readdir(&dir), vec!["b".to_string()]);
        assert_eq!(lookup(&dir, "a"), None);

        let c_sector = free_map.allocate(1).unwrap();
        crate::inode::Inode::create(&cache, &free_map, c_sector, 0, false).unwrap();
        add(&dir, &free_map, "c", c_sector).unwrap();
        // "c" should have landed in the slot freed by removing "a", not grown
        // the directory file.
        assert_eq!(entry_count(&dir), 2);
    }

    #[test]
    fn remove_nonempty_subdirectory_fails() {
        let (cache, free_map, table) = harness();
        let root_sector = free_map.allocate(1).unwrap();
        create(&cache, &free_map, root_sector, 4).unwrap();
        let root = table.open_at(cache.clone(), root_sector);

        let sub_sector = free_map.allocate(1).unwrap();
        create(&cache, &free_map, sub_sector, 4).unwrap();
        Inode::link_child(&root, &table.open_at(cache.clone(), sub_sector), 0);
        add(&root, &free_map, "sub", sub_sector).unwrap();

        let sub = table.open_at(cache.clone(), sub_sector);
        let leaf_sector = free_map.allocate(1).unwrap();
        crate::inode::Inode::create(&cache, &free_map, leaf_sector, 0, false).unwrap();
        add(&sub, &free_map, "leaf", leaf_sector).unwrap();

        assert_eq!(
            remove(&table, &free_map, &root, "sub"),
            Err(FsError::NotEmpty)
        );
    }
}
