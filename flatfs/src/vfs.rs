//! Process-wide file system: one attached device and one explicitly
//! formatted (or mounted) `FlatFileSystem`. Callers serialize their own use;
//! the mutex only guards the statics.
use crate::block_dev::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::ffs::FlatFileSystem;
use crate::file_table::OpenFlags;
use crate::layout::DiskInode;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

lazy_static! {
    static ref BLOCK_DEVICE: Mutex<Option<Arc<dyn BlockDevice>>> = Mutex::new(None);
    static ref FILE_SYSTEM: Mutex<Option<FlatFileSystem>> = Mutex::new(None);
}

/// Make `block_device` device 0. Any live file system is dropped.
pub fn attach_device(block_device: Arc<dyn BlockDevice>) {
    *FILE_SYSTEM.lock() = None;
    *BLOCK_DEVICE.lock() = Some(block_device);
}

fn attached_device() -> FsResult<Arc<dyn BlockDevice>> {
    BLOCK_DEVICE
        .lock()
        .as_ref()
        .map(Arc::clone)
        .ok_or(FsError::UnsupportedDevice)
}

pub fn format(dev: u32, inode_num: i32) -> FsResult<()> {
    let ffs = FlatFileSystem::format(attached_device()?, dev, inode_num)?;
    *FILE_SYSTEM.lock() = Some(ffs);
    Ok(())
}

pub fn mount(dev: u32) -> FsResult<()> {
    let ffs = FlatFileSystem::mount(attached_device()?, dev)?;
    *FILE_SYSTEM.lock() = Some(ffs);
    Ok(())
}

pub fn unmount() {
    *FILE_SYSTEM.lock() = None;
}

fn with_fs<T>(f: impl FnOnce(&mut FlatFileSystem) -> FsResult<T>) -> FsResult<T> {
    let mut fs = FILE_SYSTEM.lock();
    let ffs = fs.as_mut().ok_or(FsError::NotFormatted)?;
    f(ffs)
}

pub fn open(filename: &str, flags: OpenFlags) -> FsResult<usize> {
    with_fs(|ffs| ffs.open(filename, flags))
}

pub fn close(fd: usize) -> FsResult<()> {
    with_fs(|ffs| ffs.close(fd))
}

pub fn create(filename: &str, mode: OpenFlags) -> FsResult<usize> {
    with_fs(|ffs| ffs.create(filename, mode))
}

pub fn read(fd: usize, buf: &mut [u8]) -> FsResult<usize> {
    with_fs(|ffs| ffs.read(fd, buf))
}

pub fn write(fd: usize, buf: &[u8]) -> FsResult<usize> {
    with_fs(|ffs| ffs.write(fd, buf))
}

pub fn seek(fd: usize, offset: isize) -> FsResult<usize> {
    with_fs(|ffs| ffs.seek(fd, offset))
}

pub fn seek_set(fd: usize, pos: usize) -> FsResult<usize> {
    with_fs(|ffs| ffs.seek_set(fd, pos))
}

pub fn link(src: &str, dst: &str) -> FsResult<()> {
    with_fs(|ffs| ffs.link(src, dst))
}

pub fn unlink(filename: &str) -> FsResult<()> {
    with_fs(|ffs| ffs.unlink(filename))
}

pub fn stat(filename: &str) -> FsResult<DiskInode> {
    with_fs(|ffs| ffs.stat(filename))
}

pub fn list() -> FsResult<Vec<(String, u32)>> {
    with_fs(|ffs| Ok(ffs.list()))
}

pub fn print_free_mask() -> FsResult<String> {
    with_fs(|ffs| Ok(ffs.print_free_mask()))
}

pub fn dump_superblock() -> FsResult<String> {
    with_fs(|ffs| Ok(ffs.dump_superblock()))
}
