use crate::directory::RootDirectory;
use crate::BLOCK_SIZE;

pub const FLATFS_MAGIC_NUM: u32 = 0xf1a7_f500;

pub const SB_BLK: usize = 0;
pub const BM_BLK: usize = 1;
pub const FIRST_INODE_BLOCK: usize = 2;

pub const SUPPORTED_DEVICE: u32 = 0;
pub const DEFAULT_NUM_BLOCKS: usize = 512;
pub const DEFAULT_NUM_INODES: u32 = 128;

pub const INODE_DIRECT_CNT: usize = 12;
/// largest file the direct blocks can address
pub const MAX_FILE_SIZE: usize = INODE_DIRECT_CNT * BLOCK_SIZE;

pub const INODE_TYPE_FILE: u16 = 1;
pub const INODE_TYPE_DIR: u16 = 2;

/// Filesystem descriptor, persisted in block 0.
/// should be no more than BLOCK_SIZE bytes
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SuperBlock {
    pub magic: u32,
    pub nblocks: u32,
    pub blocksz: u32,
    pub ninodes: u32,
    pub inodes_used: u32,
    pub free_mask_bytes: u32,
    /// first block the data allocator may hand out
    pub data_start: u32,
    pub root_dir: RootDirectory,
}

impl SuperBlock {
    pub fn new(nblocks: u32, ninodes: u32, free_mask_bytes: u32) -> Self {
        Self {
            magic: FLATFS_MAGIC_NUM,
            nblocks,
            blocksz: BLOCK_SIZE as u32,
            ninodes,
            inodes_used: 0,
            free_mask_bytes,
            data_start: (FIRST_INODE_BLOCK + inode_blocks(ninodes)) as u32,
            root_dir: RootDirectory::empty(),
        }
    }
    pub fn is_valid(&self) -> bool {
        self.magic == FLATFS_MAGIC_NUM && self.blocksz == BLOCK_SIZE as u32
    }
}

/// size should be 64 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskInode {
    /// 0 marks an unused record
    pub id: u32,
    pub type_: u16,
    pub nlink: u16,
    pub device: u32,
    pub size: u32,
    pub blocks: [u32; INODE_DIRECT_CNT],
}

pub const DISK_INODE_SIZE: usize = core::mem::size_of::<DiskInode>();
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / DISK_INODE_SIZE;

/// Blocks reserved for inode records. Slot 0 is never handed out but still
/// occupies space, so numbers `1..=ninodes` all need a home.
pub fn inode_blocks(ninodes: u32) -> usize {
    (ninodes as usize + 1 + INODES_PER_BLOCK - 1) / INODES_PER_BLOCK
}

impl DiskInode {
    pub fn empty() -> Self {
        Self {
            id: 0,
            type_: 0,
            nlink: 0,
            device: 0,
            size: 0,
            blocks: [0; INODE_DIRECT_CNT],
        }
    }
    pub fn new_file(id: u32, device: u32, blocks: [u32; INODE_DIRECT_CNT]) -> Self {
        Self {
            id,
            type_: INODE_TYPE_FILE,
            nlink: 1,
            device,
            size: 0,
            blocks,
        }
    }
    pub fn is_used(&self) -> bool {
        self.id != 0
    }
    pub fn is_file(&self) -> bool {
        self.type_ == INODE_TYPE_FILE
    }

    /// Disk block holding byte `offset` of the file.
    pub fn block_for(&self, offset: usize) -> Option<u32> {
        self.blocks.get(offset / BLOCK_SIZE).copied()
    }
}
