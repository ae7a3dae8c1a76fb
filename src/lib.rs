//! `sectorfs` — the core of an on-disk file system layered over a
//! fixed-size block device.
//!
//! This crate implements a unified write-back buffer cache, a growable
//! multi-level-indexed inode, a sector-bitmap free-space allocator,
//! hierarchical path resolution, and a directory layer. The surrounding
//! operating system — thread scheduling, virtual memory, the userspace
//! system-call ABI — is deliberately out of scope; this crate exposes the
//! narrow [`BlockDevice`] trait it consumes and the [`Filesystem`]/
//! [`FileHandle`] surface it offers in their place.
//!
//! No journaling, crash recovery, snapshotting, quotas, permissions,
//! extended attributes, or symbolic links: single-host, single-device
//! operation over a block device that never itself fails.

pub mod cache;
pub mod config;
pub mod device;
pub mod directory;
pub mod error;
pub mod filesystem;
pub mod handle;
pub mod inode;
pub mod path;
pub mod resolver;
pub mod table;

pub use cache::{BufferCache, CacheStats};
pub use device::{BlockDevice, FileDisk, MemoryDisk};
pub use error::{FsError, FsResult};
pub use filesystem::Filesystem;
pub use handle::FileHandle;
pub use inode::Inode;
