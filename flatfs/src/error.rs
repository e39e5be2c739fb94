use core::fmt;

/// Failure reported by a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// block id or byte range falls outside the device
    OutOfRange { block_id: usize },
    /// the medium itself failed
    Io,
}

/// Filesystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Device id other than the supported one
    UnsupportedDevice,
    /// Inode number beyond the configured inode count
    OutOfRange,
    /// Bad mode, flags or offset
    InvalidArgument,
    /// Filename longer than `MAX_NAME_LENGTH`
    NameTooLong,
    /// No such file
    NotFound,
    /// File exists
    AlreadyExists,
    /// File is already open
    AlreadyOpen,
    /// No free root directory slot
    DirectoryFull,
    /// No free open file table slot
    TableFull,
    /// No free data blocks or inodes
    OutOfSpace,
    /// Descriptor out of range, closed, or unbound
    InvalidDescriptor,
    /// Access mode forbids the operation
    PermissionDenied,
    /// Access beyond the direct blocks of an inode
    UnsupportedFileSize,
    /// Underlying block read/write failed
    DeviceIo,
    /// No filesystem has been formatted or mounted
    NotFormatted,
    /// Superblock magic mismatch
    Corrupted,
}

pub type FsResult<T> = core::result::Result<T, FsError>;

impl From<DeviceError> for FsError {
    fn from(_: DeviceError) -> Self {
        FsError::DeviceIo
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::OutOfRange { block_id } => {
                write!(f, "block {} out of device range", block_id)
            }
            DeviceError::Io => write!(f, "device i/o failure"),
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::UnsupportedDevice => "unsupported device",
            FsError::OutOfRange => "inode number out of range",
            FsError::InvalidArgument => "invalid argument",
            FsError::NameTooLong => "file name too long",
            FsError::NotFound => "no such file",
            FsError::AlreadyExists => "file already exists",
            FsError::AlreadyOpen => "file already open",
            FsError::DirectoryFull => "root directory is full",
            FsError::TableFull => "open file table is full",
            FsError::OutOfSpace => "no space left on device",
            FsError::InvalidDescriptor => "bad file descriptor",
            FsError::PermissionDenied => "permission denied",
            FsError::UnsupportedFileSize => "file size beyond direct blocks",
            FsError::DeviceIo => "device i/o error",
            FsError::NotFormatted => "no file system formatted",
            FsError::Corrupted => "invalid file system",
        };
        f.write_str(msg)
    }
}
