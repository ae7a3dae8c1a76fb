//! Error kinds surfaced by the file system core.
//!
//! These map one-to-one onto the error kinds a syscall-facing layer needs to
//! translate into its own ABI; this crate never defines that ABI itself.

use thiserror::Error;

/// An error returned by a file system operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    /// A path component or directory entry was not found.
    #[error("no such file or directory")]
    NotFound,
    /// Creation of a name that already exists in its parent directory.
    #[error("file or directory already exists")]
    Exists,
    /// Removal of a directory that still has live entries.
    #[error("directory not empty")]
    NotEmpty,
    /// Path traversal hit a non-directory before the final component.
    #[error("not a directory")]
    NotDirectory,
    /// The free-sector map has no run of sectors of the requested length, or
    /// persisting the bitmap failed.
    #[error("no space left on device")]
    NoSpace,
    /// A path component, or the resulting file, exceeds a length limit.
    #[error("name or file too long")]
    TooLong,
    /// The operation is blocked by an outstanding `deny_write` hold.
    #[error("file is denied for writing")]
    Denied,
    /// The operation was attempted on a handle that has already been closed.
    #[error("operation on closed handle")]
    Closed,
}

/// Convenience alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;
