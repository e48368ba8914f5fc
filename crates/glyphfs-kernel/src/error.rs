//! Status codes shared by every layer of glyphfs.
//!
//! Drivers, codecs and overlays all fail with [`FsError`]. Each variant maps to
//! one POSIX-style [`Errno`] whose numeric value is negative, Linux numbering.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// POSIX-style status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Errno {
    EPERM,
    ENOENT,
    EIO,
    ENOMEM,
    EBUSY,
    EEXIST,
    ENOTDIR,
    EISDIR,
    EINVAL,
    ENOSPC,
    EROFS,
    ENAMETOOLONG,
    ENOSYS,
}

impl Errno {
    /// Negative status value as returned across the driver contract.
    pub fn code(self) -> i32 {
        -match self {
            Errno::EPERM => 1,
            Errno::ENOENT => 2,
            Errno::EIO => 5,
            Errno::ENOMEM => 12,
            Errno::EBUSY => 16,
            Errno::EEXIST => 17,
            Errno::ENOTDIR => 20,
            Errno::EISDIR => 21,
            Errno::EINVAL => 22,
            Errno::ENOSPC => 28,
            Errno::EROFS => 30,
            Errno::ENAMETOOLONG => 36,
            Errno::ENOSYS => 38,
        }
    }

    /// Symbolic name, e.g. `"ENOENT"`.
    pub fn name(self) -> &'static str {
        match self {
            Errno::EPERM => "EPERM",
            Errno::ENOENT => "ENOENT",
            Errno::EIO => "EIO",
            Errno::ENOMEM => "ENOMEM",
            Errno::EBUSY => "EBUSY",
            Errno::EEXIST => "EEXIST",
            Errno::ENOTDIR => "ENOTDIR",
            Errno::EISDIR => "EISDIR",
            Errno::EINVAL => "EINVAL",
            Errno::ENOSPC => "ENOSPC",
            Errno::EROFS => "EROFS",
            Errno::ENAMETOOLONG => "ENAMETOOLONG",
            Errno::ENOSYS => "ENOSYS",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Filesystem operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("is a directory: {0}")]
    IsDirectory(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
    #[error("no space left: {0}")]
    NoSpace(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation not permitted: {0}")]
    PermissionDenied(String),
    #[error("resource busy: {0}")]
    Busy(String),
    #[error("read-only filesystem")]
    ReadOnly,
    #[error("name too long: {0}")]
    NameTooLong(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl FsError {
    /// The status code this error reports across the driver contract.
    pub fn errno(&self) -> Errno {
        match self {
            FsError::NotFound(_) => Errno::ENOENT,
            FsError::AlreadyExists(_) => Errno::EEXIST,
            FsError::IsDirectory(_) => Errno::EISDIR,
            FsError::NotDirectory(_) => Errno::ENOTDIR,
            FsError::NoSpace(_) => Errno::ENOSPC,
            FsError::OutOfMemory => Errno::ENOMEM,
            FsError::InvalidArgument(_) => Errno::EINVAL,
            FsError::PermissionDenied(_) => Errno::EPERM,
            FsError::Busy(_) => Errno::EBUSY,
            FsError::ReadOnly => Errno::EROFS,
            FsError::NameTooLong(_) => Errno::ENAMETOOLONG,
            FsError::Io(_) => Errno::EIO,
            FsError::NotSupported(_) => Errno::ENOSYS,
        }
    }

    /// Shorthand for `self.errno().code()`.
    pub fn code(&self) -> i32 {
        self.errno().code()
    }
}

impl From<std::collections::TryReserveError> for FsError {
    fn from(_: std::collections::TryReserveError) -> Self {
        FsError::OutOfMemory
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => FsError::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => FsError::AlreadyExists(err.to_string()),
            ErrorKind::PermissionDenied => FsError::PermissionDenied(err.to_string()),
            ErrorKind::IsADirectory => FsError::IsDirectory(err.to_string()),
            ErrorKind::NotADirectory => FsError::NotDirectory(err.to_string()),
            ErrorKind::DirectoryNotEmpty => FsError::Busy(err.to_string()),
            ErrorKind::ReadOnlyFilesystem => FsError::ReadOnly,
            ErrorKind::InvalidInput => FsError::InvalidArgument(err.to_string()),
            ErrorKind::OutOfMemory => FsError::OutOfMemory,
            ErrorKind::StorageFull => FsError::NoSpace(err.to_string()),
            ErrorKind::Unsupported => FsError::NotSupported(err.to_string()),
            _ => FsError::Io(err.to_string()),
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        use io::ErrorKind;
        let kind = match err.errno() {
            Errno::ENOENT => ErrorKind::NotFound,
            Errno::EEXIST => ErrorKind::AlreadyExists,
            Errno::EPERM => ErrorKind::PermissionDenied,
            Errno::EISDIR => ErrorKind::IsADirectory,
            Errno::ENOTDIR => ErrorKind::NotADirectory,
            Errno::EBUSY => ErrorKind::DirectoryNotEmpty,
            Errno::EROFS => ErrorKind::ReadOnlyFilesystem,
            Errno::EINVAL | Errno::ENAMETOOLONG => ErrorKind::InvalidInput,
            Errno::ENOMEM => ErrorKind::OutOfMemory,
            Errno::ENOSPC => ErrorKind::StorageFull,
            Errno::ENOSYS => ErrorKind::Unsupported,
            Errno::EIO => ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
