use crate::directory::DirEntry;
use crate::error::{FsError, FsResult};
use bitflags::bitflags;

pub const FILE_TABLE_LEN: usize = 16;

bitflags! {
    ///Open file flags
    pub struct OpenFlags: u32 {
        ///Read only
        const RDONLY = 0;
        ///Write only
        const WRONLY = 1 << 0;
        ///Read & Write
        const RDWR = 1 << 1;
        ///Create a new file
        const CREATE = 1 << 9;
    }
}

impl OpenFlags {
    /// Exactly one of the three access modes.
    pub fn is_access_mode(&self) -> bool {
        *self == Self::RDONLY || *self == Self::WRONLY || *self == Self::RDWR
    }
    /// Return (readable, writable)
    pub fn read_write(&self) -> (bool, bool) {
        if self.is_empty() {
            (true, false)
        } else if self.contains(Self::WRONLY) {
            (false, true)
        } else {
            (true, true)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    Closed,
    Open,
}

#[derive(Clone, Copy, Debug)]
pub struct OpenFile {
    pub state: FileState,
    pub inode_id: u32,
    pub flags: OpenFlags,
    pub cursor: usize,
    /// name the slot was opened under; kept across close for reopen
    pub dirent: Option<DirEntry>,
}

impl OpenFile {
    const fn closed() -> Self {
        Self {
            state: FileState::Closed,
            inode_id: 0,
            flags: OpenFlags::RDONLY,
            cursor: 0,
            dirent: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == FileState::Open
    }

    fn is_bound_to(&self, inode_id: u32, name: &str) -> bool {
        self.inode_id == inode_id && self.dirent.map_or(false, |d| d.name() == name)
    }

    /// Bind (or rebind) the slot to a file and open it at offset 0.
    pub fn open(&mut self, dirent: DirEntry, flags: OpenFlags) {
        self.state = FileState::Open;
        self.inode_id = dirent.inode_num();
        self.flags = flags;
        self.cursor = 0;
        self.dirent = Some(dirent);
    }

    fn release(&mut self) {
        *self = Self::closed();
    }
}

pub struct OpenFileTable {
    slots: [OpenFile; FILE_TABLE_LEN],
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self {
            slots: [OpenFile::closed(); FILE_TABLE_LEN],
        }
    }

    /// Slot previously bound to this inode under this name.
    pub fn find_bound(&self, inode_id: u32, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.is_bound_to(inode_id, name))
    }

    /// First closed slot, preferring ones that hold no stale binding.
    pub fn claim_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| !s.is_open() && s.dirent.is_none())
            .or_else(|| self.slots.iter().position(|s| !s.is_open()))
    }

    pub fn slot_mut(&mut self, fd: usize) -> FsResult<&mut OpenFile> {
        self.slots.get_mut(fd).ok_or(FsError::InvalidDescriptor)
    }

    pub fn get_open(&self, fd: usize) -> FsResult<&OpenFile> {
        match self.slots.get(fd) {
            Some(slot) if slot.is_open() => Ok(slot),
            _ => Err(FsError::InvalidDescriptor),
        }
    }

    pub fn get_open_mut(&mut self, fd: usize) -> FsResult<&mut OpenFile> {
        match self.slots.get_mut(fd) {
            Some(slot) if slot.is_open() => Ok(slot),
            _ => Err(FsError::InvalidDescriptor),
        }
    }

    pub fn close(&mut self, fd: usize) -> FsResult<()> {
        let slot = self.slot_mut(fd)?;
        slot.state = FileState::Closed;
        slot.cursor = 0;
        Ok(())
    }

    /// Drop every slot bound to `inode_id`.
    pub fn release_inode(&mut self, inode_id: u32) {
        self.slots
            .iter_mut()
            .filter(|s| s.inode_id == inode_id)
            .for_each(OpenFile::release);
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(OpenFile::release);
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}
