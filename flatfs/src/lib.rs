#![no_std]
extern crate alloc;

pub use crate::block_dev::{BlockDevice, MemBlockDevice};

mod bitmap;
mod block_buf;
mod block_dev;
mod directory;
pub mod error;
mod ffs;
mod file_table;
pub mod layout;
pub mod vfs;

pub const BLOCK_SIZE: usize = 512;
pub use directory::{DirEntry, RootDirectory, DIRECTORY_SIZE, MAX_NAME_LENGTH};
pub use error::{DeviceError, FsError, FsResult};
pub use ffs::FlatFileSystem;
pub use file_table::{OpenFlags, FILE_TABLE_LEN};
pub use layout::{DiskInode, SuperBlock};
