use crate::error::{FsError, FsResult};
use alloc::string::String;
use alloc::vec::Vec;

pub const MAX_NAME_LENGTH: usize = 24;
pub const DIRECTORY_SIZE: usize = 16;

/// should be 28 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntry {
    inode_num: u32,
    name: [u8; MAX_NAME_LENGTH],
}

impl DirEntry {
    pub fn empty() -> Self {
        Self {
            inode_num: 0,
            name: [0u8; MAX_NAME_LENGTH],
        }
    }
    pub fn new(name: &str, inode_num: u32) -> FsResult<Self> {
        check_name(name)?;
        let mut new_name = [0u8; MAX_NAME_LENGTH];
        new_name[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self {
            inode_num,
            name: new_name,
        })
    }
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&x| x == 0)
            .unwrap_or(MAX_NAME_LENGTH);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
    pub fn inode_num(&self) -> u32 {
        self.inode_num
    }
    pub fn is_free(&self) -> bool {
        self.inode_num == 0
    }
}

pub fn check_name(name: &str) -> FsResult<()> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(FsError::NameTooLong);
    }
    if name.is_empty() || name.as_bytes().contains(&0) {
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}

/// The single flat namespace, a fixed arena of entries.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RootDirectory {
    num_entries: u32,
    entries: [DirEntry; DIRECTORY_SIZE],
}

impl RootDirectory {
    pub fn empty() -> Self {
        Self {
            num_entries: 0,
            entries: [DirEntry::empty(); DIRECTORY_SIZE],
        }
    }

    pub fn num_entries(&self) -> u32 {
        self.num_entries
    }

    /// Slot binding `name` to a live inode.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| !e.is_free() && e.name() == name)
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.is_free())
    }

    pub fn entry(&self, slot: usize) -> &DirEntry {
        &self.entries[slot]
    }

    pub fn bind(&mut self, slot: usize, entry: DirEntry) {
        debug_assert!(self.entries[slot].is_free());
        self.entries[slot] = entry;
        self.num_entries += 1;
    }

    pub fn clear(&mut self, slot: usize) {
        if !self.entries[slot].is_free() {
            self.num_entries -= 1;
        }
        self.entries[slot] = DirEntry::empty();
    }

    pub fn list(&self) -> Vec<(String, u32)> {
        self.entries
            .iter()
            .filter(|e| !e.is_free())
            .map(|e| (String::from(e.name()), e.inode_num()))
            .collect()
    }
}
