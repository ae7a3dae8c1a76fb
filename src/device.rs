//! The external block device collaborator.
//!
//! Everything below this trait is out of scope for the file system core
//! (spec §1): a real block device, a RAM disk, or a file-backed disk image
//! all implement it identically from the core's point of view.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::config::SECTOR_SIZE;

/// A fixed-capacity array of 512-byte sectors.
///
/// Implementations are assumed infallible: a real disk faults the kernel on
/// I/O error rather than returning one, so the buffer cache built on top of
/// this trait surfaces no I/O errors of its own (spec §4.1, "Failure
/// model").
pub trait BlockDevice: Send + Sync {
    /// Copies the contents of `sector` into `buf`.
    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]);

    /// Overwrites the contents of `sector` with `buf`.
    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]);

    /// Total number of addressable sectors.
    fn sector_count(&self) -> u32;
}

/// An in-memory block device, mainly for tests.
pub struct MemoryDisk {
    sectors: std::sync::Mutex<Vec<[u8; SECTOR_SIZE]>>,
}

impl MemoryDisk {
    /// Creates a zeroed disk of `sector_count` sectors.
    pub fn new(sector_count: u32) -> Self {
        Self {
            sectors: std::sync::Mutex::new(vec![[0u8; SECTOR_SIZE]; sector_count as usize]),
        }
    }
}

impl BlockDevice for MemoryDisk {
    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) {
        let sectors = self.sectors.lock().unwrap();
        buf.copy_from_slice(&sectors[sector as usize]);
    }

    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) {
        let mut sectors = self.sectors.lock().unwrap();
        sectors[sector as usize].copy_from_slice(buf);
    }

    fn sector_count(&self) -> u32 {
        self.sectors.lock().unwrap().len() as u32
    }
}

/// A block device backed by a real file on the host file system, for tests
/// and tools that want to exercise the "external block device" boundary
/// the way an actual consumer (a FUSE binary, say) would rather than
/// through an in-memory stand-in.
pub struct FileDisk {
    file: File,
    sector_count: u32,
}

impl FileDisk {
    /// Creates (truncating if it already exists) a file at `path` sized to
    /// hold exactly `sector_count` sectors, zero-filled.
    pub fn create(path: &Path, sector_count: u32) -> std::io::Result<Self> {
        let file = File::create(path)?;
        file.set_len(sector_count as u64 * SECTOR_SIZE as u64)?;
        Ok(Self { file, sector_count })
    }

    /// Reopens an already-formatted disk image at `path` without
    /// truncating it, inferring the sector count from the file's length.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let sector_count = (len / SECTOR_SIZE as u64) as u32;
        Ok(Self { file, sector_count })
    }
}

impl BlockDevice for FileDisk {
    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) {
        self.file
            .read_exact_at(buf, sector as u64 * SECTOR_SIZE as u64)
            .expect("sector read must succeed");
    }

    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) {
        self.file
            .write_all_at(buf, sector as u64 * SECTOR_SIZE as u64)
            .expect("sector write must succeed");
    }

    fn sector_count(&self) -> u32 {
        self.sector_count
    }
}
