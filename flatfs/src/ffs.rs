use crate::bitmap::FreeMask;
use crate::block_buf::BlockBuf;
use crate::block_dev::BlockDevice;
use crate::directory::{check_name, DirEntry};
use crate::error::{FsError, FsResult};
use crate::file_table::{OpenFileTable, OpenFlags};
use crate::layout::{
    inode_blocks, DiskInode, SuperBlock, BM_BLK, DEFAULT_NUM_INODES, DISK_INODE_SIZE,
    FIRST_INODE_BLOCK, INODES_PER_BLOCK, INODE_DIRECT_CNT, MAX_FILE_SIZE, SB_BLK,
    SUPPORTED_DEVICE,
};
use crate::BLOCK_SIZE;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::min;
use log::{debug, info, warn};

/// superblock, free mask, inodes, data
pub struct FlatFileSystem {
    pub block_device: Arc<dyn BlockDevice>,
    sb: SuperBlock,
    free_mask: FreeMask,
    file_table: OpenFileTable,
}

fn check_device(dev: u32) -> FsResult<()> {
    if dev != SUPPORTED_DEVICE {
        warn!("unsupported device {}", dev);
        return Err(FsError::UnsupportedDevice);
    }
    Ok(())
}

impl FlatFileSystem {
    /// Create a new flat file system on the device.
    /// block_device: block device, addressed as `dev`
    /// inode_num: max number of inodes, the default when below 1
    pub fn format(
        block_device: Arc<dyn BlockDevice>,
        dev: u32,
        inode_num: i32,
    ) -> FsResult<Self> {
        check_device(dev)?;
        let total_blocks = block_device.num_blocks();
        if total_blocks > BLOCK_SIZE * 8 {
            // the whole mask must fit in BM_BLK
            return Err(FsError::InvalidArgument);
        }
        let ninodes = if inode_num < 1 {
            DEFAULT_NUM_INODES
        } else {
            inode_num as u32
        };
        let free_mask_bytes = FreeMask::bytes_for(total_blocks);
        let sb = SuperBlock::new(total_blocks as u32, ninodes, free_mask_bytes as u32);
        let data_start = sb.data_start as usize;
        if data_start + INODE_DIRECT_CNT > total_blocks {
            return Err(FsError::OutOfSpace);
        }

        // clear all blocks
        let zero = BlockBuf::zeroed();
        for i in 0..total_blocks {
            zero.store(i, &block_device)?;
        }

        let mut free_mask = FreeMask::new(total_blocks);
        free_mask.set_bit(SB_BLK);
        free_mask.set_bit(BM_BLK);
        for i in FIRST_INODE_BLOCK..data_start {
            free_mask.set_bit(i);
        }

        let ffs = Self {
            block_device,
            sb,
            free_mask,
            file_table: OpenFileTable::new(),
        };
        ffs.store_super_block(&ffs.sb)?;
        ffs.free_mask.store(&ffs.block_device)?;
        info!(
            "formatted device {}: {} blocks, {} inodes, data from block {}",
            dev, total_blocks, ninodes, data_start
        );
        Ok(ffs)
    }

    /// Load a previously formatted file system from the device.
    pub fn mount(block_device: Arc<dyn BlockDevice>, dev: u32) -> FsResult<Self> {
        check_device(dev)?;
        let buf = BlockBuf::load(SB_BLK, &block_device)?;
        let sb = *buf.as_ref::<SuperBlock>(0);
        if !sb.is_valid()
            || sb.nblocks as usize > block_device.num_blocks()
            || sb.free_mask_bytes as usize != FreeMask::bytes_for(sb.nblocks as usize)
        {
            warn!("no flat file system on device {}", dev);
            return Err(FsError::Corrupted);
        }
        let free_mask = FreeMask::load(&block_device, sb.free_mask_bytes as usize)?;
        info!(
            "mounted device {}: {} files, {} inodes used",
            dev,
            sb.root_dir.num_entries(),
            sb.inodes_used
        );
        Ok(Self {
            block_device,
            sb,
            free_mask,
            file_table: OpenFileTable::new(),
        })
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    /// Get the block id and offset of the inode
    pub fn get_disk_inode_pos(&self, inode_id: u32) -> (usize, usize) {
        let inode_id = inode_id as usize;
        (
            FIRST_INODE_BLOCK + inode_id / INODES_PER_BLOCK,
            (inode_id % INODES_PER_BLOCK) * DISK_INODE_SIZE,
        )
    }

    pub fn get_inode(&self, dev: u32, inode_id: u32) -> FsResult<DiskInode> {
        check_device(dev)?;
        if inode_id > self.sb.ninodes {
            warn!("get_inode: inode {} out of range", inode_id);
            return Err(FsError::OutOfRange);
        }
        let (block_id, offset) = self.get_disk_inode_pos(inode_id);
        let buf = BlockBuf::load(block_id, &self.block_device)?;
        debug!("get_inode {} from block {} +{}", inode_id, block_id, offset);
        Ok(*buf.as_ref::<DiskInode>(offset))
    }

    /// Read-modify-write of the block holding the inode.
    pub fn put_inode(&self, dev: u32, inode_id: u32, inode: &DiskInode) -> FsResult<()> {
        check_device(dev)?;
        if inode_id > self.sb.ninodes {
            warn!("put_inode: inode {} out of range", inode_id);
            return Err(FsError::OutOfRange);
        }
        let (block_id, offset) = self.get_disk_inode_pos(inode_id);
        let mut buf = BlockBuf::load(block_id, &self.block_device)?;
        *buf.as_mut_ref::<DiskInode>(offset) = *inode;
        buf.store(block_id, &self.block_device)?;
        debug!("put_inode {} to block {} +{}", inode_id, block_id, offset);
        Ok(())
    }

    fn store_super_block(&self, sb: &SuperBlock) -> FsResult<()> {
        let mut buf = BlockBuf::zeroed();
        *buf.as_mut_ref::<SuperBlock>(0) = *sb;
        buf.store(SB_BLK, &self.block_device)
    }

    /// Restore a block already written by a failed update.
    fn undo(&self, what: &str, result: FsResult<()>) {
        if let Err(e) = result {
            warn!("could not roll back {}: {}", what, e);
        }
    }

    /// Lowest inode number whose record is unused.
    fn alloc_inode_id(&self) -> FsResult<u32> {
        let mut loaded: Option<(usize, BlockBuf)> = None;
        for inode_id in 1..=self.sb.ninodes {
            let (block_id, offset) = self.get_disk_inode_pos(inode_id);
            if loaded.as_ref().map(|(id, _)| *id) != Some(block_id) {
                loaded = Some((block_id, BlockBuf::load(block_id, &self.block_device)?));
            }
            if let Some((_, buf)) = &loaded {
                if !buf.as_ref::<DiskInode>(offset).is_used() {
                    return Ok(inode_id);
                }
            }
        }
        Err(FsError::OutOfSpace)
    }

    /// Claim the first `INODE_DIRECT_CNT` free blocks from `data_start` on.
    fn alloc_data_blocks(&self, free_mask: &mut FreeMask) -> FsResult<[u32; INODE_DIRECT_CNT]> {
        let found = free_mask
            .find_free(
                self.sb.data_start as usize,
                self.sb.nblocks as usize,
                INODE_DIRECT_CNT,
            )
            .ok_or(FsError::OutOfSpace)?;
        let mut blocks = [0u32; INODE_DIRECT_CNT];
        for (slot, &block_id) in blocks.iter_mut().zip(found.iter()) {
            free_mask.set_bit(block_id);
            *slot = block_id as u32;
        }
        debug!("allocated data blocks {:?}", blocks);
        Ok(blocks)
    }

    fn is_data_block(&self, block_id: usize) -> bool {
        block_id >= self.sb.data_start as usize && block_id < self.sb.nblocks as usize
    }

    pub fn open(&mut self, filename: &str, flags: OpenFlags) -> FsResult<usize> {
        if !flags.is_access_mode() {
            return Err(FsError::InvalidArgument);
        }
        check_name(filename)?;
        let slot = self.sb.root_dir.find(filename).ok_or(FsError::NotFound)?;
        let dirent = *self.sb.root_dir.entry(slot);

        if let Some(fd) = self.file_table.find_bound(dirent.inode_num(), filename) {
            let file = self.file_table.slot_mut(fd)?;
            if file.is_open() {
                return Err(FsError::AlreadyOpen);
            }
            file.open(dirent, flags);
            return Ok(fd);
        }

        let fd = self.file_table.claim_slot().ok_or(FsError::TableFull)?;
        self.file_table.slot_mut(fd)?.open(dirent, flags);
        Ok(fd)
    }

    pub fn close(&mut self, fd: usize) -> FsResult<()> {
        self.file_table.close(fd)
    }

    /// Create `filename` and open it read-write. `mode` must be `CREATE`.
    pub fn create(&mut self, filename: &str, mode: OpenFlags) -> FsResult<usize> {
        if mode != OpenFlags::CREATE {
            return Err(FsError::InvalidArgument);
        }
        check_name(filename)?;
        if self.sb.root_dir.find(filename).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self.sb.root_dir.free_slot().ok_or(FsError::DirectoryFull)?;
        let fd = self.file_table.claim_slot().ok_or(FsError::TableFull)?;
        let inode_id = self.alloc_inode_id()?;
        let mut free_mask = self.free_mask.clone();
        let blocks = self.alloc_data_blocks(&mut free_mask)?;
        let dirent = DirEntry::new(filename, inode_id)?;
        let mut sb = self.sb;
        sb.root_dir.bind(slot, dirent);
        sb.inodes_used += 1;

        // inode, mask, superblock; undone in reverse if a later write fails
        let inode = DiskInode::new_file(inode_id, SUPPORTED_DEVICE, blocks);
        self.put_inode(SUPPORTED_DEVICE, inode_id, &inode)?;
        if let Err(e) = free_mask.store(&self.block_device) {
            self.undo("inode", self.put_inode(SUPPORTED_DEVICE, inode_id, &DiskInode::empty()));
            return Err(e);
        }
        if let Err(e) = self.store_super_block(&sb) {
            self.undo("free mask", self.free_mask.store(&self.block_device));
            self.undo("inode", self.put_inode(SUPPORTED_DEVICE, inode_id, &DiskInode::empty()));
            return Err(e);
        }
        self.sb = sb;
        self.free_mask = free_mask;

        self.file_table.slot_mut(fd)?.open(dirent, OpenFlags::RDWR);
        info!("created {} as inode {} (fd {})", filename, inode_id, fd);
        Ok(fd)
    }

    /// Move the cursor by `offset`, returning the new position.
    pub fn seek(&mut self, fd: usize, offset: isize) -> FsResult<usize> {
        let file = self.file_table.get_open_mut(fd)?;
        file.cursor = file
            .cursor
            .checked_add_signed(offset)
            .ok_or(FsError::InvalidArgument)?;
        Ok(file.cursor)
    }

    pub fn seek_set(&mut self, fd: usize, pos: usize) -> FsResult<usize> {
        let file = self.file_table.get_open_mut(fd)?;
        file.cursor = pos;
        Ok(file.cursor)
    }

    /// Read from the cursor, stopping at the end of the file.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> FsResult<usize> {
        let file = self.file_table.get_open(fd)?;
        let (inode_id, flags, offset) = (file.inode_id, file.flags, file.cursor);
        if flags == OpenFlags::WRONLY {
            return Ok(0);
        }
        if inode_id == 0 {
            return Err(FsError::InvalidDescriptor);
        }
        let inode = self.get_inode(SUPPORTED_DEVICE, inode_id)?;
        let end = min(offset.saturating_add(buf.len()), inode.size as usize);
        if end <= offset {
            return Ok(0);
        }

        let mut start = offset;
        let mut read_size = 0usize;
        loop {
            let end_current_block = min(end, (start / BLOCK_SIZE + 1) * BLOCK_SIZE);
            let block_read_size = end_current_block - start;
            let block_id = inode.block_for(start).ok_or(FsError::OutOfRange)?;
            let dst = &mut buf[read_size..read_size + block_read_size];
            self.block_device
                .read_block(block_id as usize, start % BLOCK_SIZE, dst)?;
            read_size += block_read_size;
            if end_current_block == end {
                break;
            }
            start = end_current_block;
        }
        self.file_table.get_open_mut(fd)?.cursor = end;
        Ok(read_size)
    }

    /// Write at the cursor, growing the file up to `MAX_FILE_SIZE`.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> FsResult<usize> {
        let file = self.file_table.get_open(fd)?;
        let (inode_id, flags, offset) = (file.inode_id, file.flags, file.cursor);
        if !flags.read_write().1 {
            return Err(FsError::PermissionDenied);
        }
        if inode_id == 0 {
            return Err(FsError::InvalidDescriptor);
        }
        let end = offset
            .checked_add(buf.len())
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(FsError::UnsupportedFileSize)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inode = self.get_inode(SUPPORTED_DEVICE, inode_id)?;

        let mut start = offset;
        let mut write_size = 0usize;
        loop {
            let end_current_block = min(end, (start / BLOCK_SIZE + 1) * BLOCK_SIZE);
            let block_write_size = end_current_block - start;
            let block_id = inode
                .block_for(start)
                .ok_or(FsError::UnsupportedFileSize)?;
            let src = &buf[write_size..write_size + block_write_size];
            self.block_device
                .write_block(block_id as usize, start % BLOCK_SIZE, src)?;
            write_size += block_write_size;
            if end_current_block == end {
                break;
            }
            start = end_current_block;
        }
        if end > inode.size as usize {
            inode.size = end as u32;
            self.put_inode(SUPPORTED_DEVICE, inode_id, &inode)?;
        }
        self.file_table.get_open_mut(fd)?.cursor = end;
        Ok(write_size)
    }

    /// Bind `dst` to the inode behind `src`.
    pub fn link(&mut self, src: &str, dst: &str) -> FsResult<()> {
        check_name(src)?;
        check_name(dst)?;
        let src_slot = self.sb.root_dir.find(src).ok_or(FsError::NotFound)?;
        if self.sb.root_dir.find(dst).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self.sb.root_dir.free_slot().ok_or(FsError::NotFound)?;
        let inode_id = self.sb.root_dir.entry(src_slot).inode_num();
        let dirent = DirEntry::new(dst, inode_id)?;

        let inode = self.get_inode(SUPPORTED_DEVICE, inode_id)?;
        let linked = DiskInode {
            nlink: inode.nlink + 1,
            ..inode
        };
        let mut sb = self.sb;
        sb.root_dir.bind(slot, dirent);

        self.put_inode(SUPPORTED_DEVICE, inode_id, &linked)?;
        if let Err(e) = self.store_super_block(&sb) {
            self.undo("inode", self.put_inode(SUPPORTED_DEVICE, inode_id, &inode));
            return Err(e);
        }
        self.sb = sb;
        info!("linked {} -> inode {} (nlink {})", dst, inode_id, linked.nlink);
        Ok(())
    }

    /// Remove a name; the last name also frees the inode and its blocks.
    pub fn unlink(&mut self, filename: &str) -> FsResult<()> {
        check_name(filename)?;
        let slot = self.sb.root_dir.find(filename).ok_or(FsError::NotFound)?;
        let inode_id = self.sb.root_dir.entry(slot).inode_num();
        let inode = self.get_inode(SUPPORTED_DEVICE, inode_id)?;
        let mut sb = self.sb;
        sb.root_dir.clear(slot);

        if inode.nlink > 1 {
            let unlinked = DiskInode {
                nlink: inode.nlink - 1,
                ..inode
            };
            self.put_inode(SUPPORTED_DEVICE, inode_id, &unlinked)?;
            if let Err(e) = self.store_super_block(&sb) {
                self.undo("inode", self.put_inode(SUPPORTED_DEVICE, inode_id, &inode));
                return Err(e);
            }
            self.sb = sb;
            info!("unlinked {} (inode {} nlink {})", filename, inode_id, unlinked.nlink);
            return Ok(());
        }

        let data_blocks: Vec<usize> = inode
            .blocks
            .iter()
            .map(|&b| b as usize)
            .filter(|&b| self.is_data_block(b))
            .collect();
        // zeroed while still owned, so a failure here frees nothing
        let zero = BlockBuf::zeroed();
        for &block_id in data_blocks.iter() {
            zero.store(block_id, &self.block_device)?;
        }
        let mut free_mask = self.free_mask.clone();
        data_blocks.iter().for_each(|&b| free_mask.clear_bit(b));
        sb.inodes_used = sb.inodes_used.saturating_sub(1);

        // superblock, mask, inode; undone in reverse if a later write fails
        self.store_super_block(&sb)?;
        if let Err(e) = free_mask.store(&self.block_device) {
            self.undo("superblock", self.store_super_block(&self.sb));
            return Err(e);
        }
        if let Err(e) = self.put_inode(SUPPORTED_DEVICE, inode_id, &DiskInode::empty()) {
            self.undo("free mask", self.free_mask.store(&self.block_device));
            self.undo("superblock", self.store_super_block(&self.sb));
            return Err(e);
        }
        self.sb = sb;
        self.free_mask = free_mask;
        self.file_table.release_inode(inode_id);
        info!("unlinked {}, freed inode {}", filename, inode_id);
        Ok(())
    }

    pub fn stat(&self, filename: &str) -> FsResult<DiskInode> {
        check_name(filename)?;
        let slot = self.sb.root_dir.find(filename).ok_or(FsError::NotFound)?;
        self.get_inode(SUPPORTED_DEVICE, self.sb.root_dir.entry(slot).inode_num())
    }

    pub fn fstat(&self, fd: usize) -> FsResult<DiskInode> {
        let inode_id = self.file_table.get_open(fd)?.inode_id;
        self.get_inode(SUPPORTED_DEVICE, inode_id)
    }

    /// (name, inode number) for every live directory entry
    pub fn list(&self) -> Vec<(String, u32)> {
        self.sb.root_dir.list()
    }

    pub fn is_allocated(&self, block_id: usize) -> bool {
        self.free_mask.get_bit(block_id)
    }

    pub fn free_blocks(&self) -> usize {
        self.free_mask.count_free(self.sb.nblocks as usize)
    }

    pub fn print_free_mask(&self) -> String {
        let dump = self.free_mask.render();
        info!("free mask:\n{}", dump);
        dump
    }

    pub fn dump_superblock(&self) -> String {
        let sb = &self.sb;
        let dump = format!(
            "nblocks: {}\nblocksz: {}\nninodes: {}\ninodes_used: {}\n\
             sizeof(DiskInode): {}\nINODES_PER_BLOCK: {}\nNUM_INODE_BLOCKS: {}\n\
             data_start: {}\nroot entries: {}\n",
            sb.nblocks,
            sb.blocksz,
            sb.ninodes,
            sb.inodes_used,
            DISK_INODE_SIZE,
            INODES_PER_BLOCK,
            inode_blocks(sb.ninodes),
            sb.data_start,
            sb.root_dir.num_entries(),
        );
        info!("superblock:\n{}", dump);
        dump
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_dev::MemBlockDevice;
    use crate::error::DeviceError;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn ram_disk(blocks: usize) -> Arc<dyn BlockDevice> {
        Arc::new(MemBlockDevice::new(blocks))
    }

    const NO_FAULT: usize = usize::MAX;
    const ANY_BLOCK: usize = usize::MAX - 1;

    /// RAM disk whose writes to `fail_block` (or to any block) fail on demand.
    struct FlakyDevice {
        inner: MemBlockDevice,
        fail_block: AtomicUsize,
    }

    impl FlakyDevice {
        fn new(blocks: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: MemBlockDevice::new(blocks),
                fail_block: AtomicUsize::new(NO_FAULT),
            })
        }
        fn fail_writes_to(&self, block_id: usize) {
            self.fail_block.store(block_id, Ordering::Relaxed);
        }
    }

    impl BlockDevice for FlakyDevice {
        fn num_blocks(&self) -> usize {
            self.inner.num_blocks()
        }
        fn read_block(
            &self,
            block_id: usize,
            offset: usize,
            buf: &mut [u8],
        ) -> Result<(), DeviceError> {
            self.inner.read_block(block_id, offset, buf)
        }
        fn write_block(
            &self,
            block_id: usize,
            offset: usize,
            buf: &[u8],
        ) -> Result<(), DeviceError> {
            let fail = self.fail_block.load(Ordering::Relaxed);
            if fail == ANY_BLOCK || fail == block_id {
                return Err(DeviceError::Io);
            }
            self.inner.write_block(block_id, offset, buf)
        }
    }

    #[test]
    fn format_reserves_metadata_blocks() {
        let ffs = FlatFileSystem::format(ram_disk(512), 0, 64).unwrap();
        let data_start = ffs.super_block().data_start as usize;
        assert_eq!(data_start, FIRST_INODE_BLOCK + 9);
        for b in 0..data_start {
            assert!(ffs.is_allocated(b), "block {} should be reserved", b);
        }
        assert!(!ffs.is_allocated(data_start));
        assert_eq!(ffs.free_blocks(), 512 - data_start);
        assert_eq!(ffs.super_block().inodes_used, 0);
    }

    #[test]
    fn format_rejects_bad_arguments() {
        assert_eq!(
            FlatFileSystem::format(ram_disk(64), 1, 8).err(),
            Some(FsError::UnsupportedDevice)
        );
        assert_eq!(
            FlatFileSystem::format(ram_disk(BLOCK_SIZE * 8 + 1), 0, 8).err(),
            Some(FsError::InvalidArgument)
        );
        // 3 metadata blocks + 11 free is one short of a file
        assert_eq!(
            FlatFileSystem::format(ram_disk(14), 0, 4).err(),
            Some(FsError::OutOfSpace)
        );
    }

    #[test]
    fn format_uses_default_inode_count() {
        let ffs = FlatFileSystem::format(ram_disk(512), 0, 0).unwrap();
        assert_eq!(ffs.super_block().ninodes, DEFAULT_NUM_INODES);
        let ffs = FlatFileSystem::format(ram_disk(512), 0, -3).unwrap();
        assert_eq!(ffs.super_block().ninodes, DEFAULT_NUM_INODES);
    }

    #[test]
    fn inode_store_round_trip_shares_blocks() {
        let ffs = FlatFileSystem::format(ram_disk(128), 0, 16).unwrap();
        let a = DiskInode::new_file(3, 0, [7; INODE_DIRECT_CNT]);
        let b = DiskInode::new_file(4, 0, [9; INODE_DIRECT_CNT]);
        ffs.put_inode(0, 3, &a).unwrap();
        ffs.put_inode(0, 4, &b).unwrap();
        assert_eq!(ffs.get_disk_inode_pos(3).0, ffs.get_disk_inode_pos(4).0);
        assert_eq!(ffs.get_inode(0, 3).unwrap(), a);
        assert_eq!(ffs.get_inode(0, 4).unwrap(), b);
        assert!(!ffs.get_inode(0, 5).unwrap().is_used());
    }

    #[test]
    fn inode_store_checks_device_and_range() {
        let ffs = FlatFileSystem::format(ram_disk(128), 0, 16).unwrap();
        assert_eq!(ffs.get_inode(2, 1), Err(FsError::UnsupportedDevice));
        assert_eq!(ffs.get_inode(0, 17), Err(FsError::OutOfRange));
        assert_eq!(
            ffs.put_inode(0, 17, &DiskInode::empty()),
            Err(FsError::OutOfRange)
        );
        assert!(ffs.get_inode(0, 16).is_ok());
    }

    #[test]
    fn mount_sees_persisted_state() {
        let dev = ram_disk(256);
        let mut ffs = FlatFileSystem::format(Arc::clone(&dev), 0, 32).unwrap();
        let fd = ffs.create("notes", OpenFlags::CREATE).unwrap();
        ffs.write(fd, b"persisted").unwrap();
        ffs.link("notes", "alias").unwrap();
        drop(ffs);

        let mut ffs = FlatFileSystem::mount(dev, 0).unwrap();
        assert_eq!(ffs.super_block().inodes_used, 1);
        assert_eq!(ffs.stat("alias").unwrap().nlink, 2);
        let fd = ffs.open("alias", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(ffs.read(fd, &mut buf).unwrap(), 9);
        assert_eq!(&buf[..9], b"persisted");
        let inode = ffs.stat("notes").unwrap();
        assert!(inode.blocks.iter().all(|&b| ffs.is_allocated(b as usize)));
    }

    #[test]
    fn mount_rejects_blank_device() {
        assert_eq!(
            FlatFileSystem::mount(ram_disk(64), 0).err(),
            Some(FsError::Corrupted)
        );
    }

    #[test]
    fn device_failure_is_an_error_not_zero() {
        let dev = FlakyDevice::new(128);
        let mut ffs = FlatFileSystem::format(dev.clone(), 0, 8).unwrap();
        let fd = ffs.create("f", OpenFlags::CREATE).unwrap();
        dev.fail_writes_to(ANY_BLOCK);
        assert_eq!(ffs.write(fd, b"data"), Err(FsError::DeviceIo));
        assert_eq!(
            ffs.create("g", OpenFlags::CREATE).err(),
            Some(FsError::DeviceIo)
        );
        dev.fail_writes_to(NO_FAULT);
        assert_eq!(ffs.list().len(), 1);
    }

    #[test]
    fn failed_create_leaves_nothing_behind() {
        for failing in [BM_BLK, SB_BLK] {
            let dev = FlakyDevice::new(128);
            let mut ffs = FlatFileSystem::format(dev.clone(), 0, 8).unwrap();
            let free = ffs.free_blocks();
            dev.fail_writes_to(failing);
            assert_eq!(ffs.create("g", OpenFlags::CREATE), Err(FsError::DeviceIo));
            assert!(ffs.list().is_empty());
            assert_eq!(ffs.free_blocks(), free);
            assert_eq!(ffs.super_block().inodes_used, 0);
            assert!(!ffs.get_inode(0, 1).unwrap().is_used());
            assert_eq!(ffs.open("g", OpenFlags::RDONLY), Err(FsError::NotFound));

            dev.fail_writes_to(NO_FAULT);
            let fd = ffs.create("g", OpenFlags::CREATE).unwrap();
            assert_eq!(ffs.fstat(fd).unwrap().id, 1);
            let remounted = FlatFileSystem::mount(dev.clone(), 0).unwrap();
            assert_eq!(remounted.free_blocks(), free - INODE_DIRECT_CNT);
            assert_eq!(remounted.list().len(), 1);
        }
    }

    #[test]
    fn failed_link_keeps_link_count() {
        let dev = FlakyDevice::new(128);
        let mut ffs = FlatFileSystem::format(dev.clone(), 0, 8).unwrap();
        ffs.create("src", OpenFlags::CREATE).unwrap();
        dev.fail_writes_to(SB_BLK);
        assert_eq!(ffs.link("src", "dst"), Err(FsError::DeviceIo));
        assert_eq!(ffs.stat("dst"), Err(FsError::NotFound));
        assert_eq!(ffs.stat("src").unwrap().nlink, 1);

        dev.fail_writes_to(NO_FAULT);
        ffs.link("src", "dst").unwrap();
        assert_eq!(ffs.stat("dst").unwrap().nlink, 2);
    }

    #[test]
    fn failed_unlink_keeps_file_allocated() {
        let dev = FlakyDevice::new(128);
        let mut ffs = FlatFileSystem::format(dev.clone(), 0, 8).unwrap();
        ffs.create("a", OpenFlags::CREATE).unwrap();
        ffs.create("b", OpenFlags::CREATE).unwrap();
        ffs.link("b", "b2").unwrap();
        let free = ffs.free_blocks();

        // last link: superblock written, mask write fails
        dev.fail_writes_to(BM_BLK);
        assert_eq!(ffs.unlink("a"), Err(FsError::DeviceIo));
        let inode = ffs.stat("a").unwrap();
        assert!(inode.blocks.iter().all(|&b| ffs.is_allocated(b as usize)));
        assert_eq!(ffs.free_blocks(), free);
        assert_eq!(ffs.super_block().inodes_used, 2);

        // one of two links: superblock write fails
        dev.fail_writes_to(SB_BLK);
        assert_eq!(ffs.unlink("b2"), Err(FsError::DeviceIo));
        assert_eq!(ffs.stat("b").unwrap().nlink, 2);

        dev.fail_writes_to(NO_FAULT);
        let remounted = FlatFileSystem::mount(dev.clone(), 0).unwrap();
        assert_eq!(remounted.list().len(), 3);
        assert_eq!(remounted.free_blocks(), free);
        ffs.unlink("a").unwrap();
        ffs.unlink("b2").unwrap();
        assert_eq!(ffs.free_blocks(), free + INODE_DIRECT_CNT);
        assert_eq!(ffs.stat("b").unwrap().nlink, 1);
    }

    #[test]
    fn huge_cursor_is_not_an_overflow() {
        let mut ffs = FlatFileSystem::format(ram_disk(128), 0, 8).unwrap();
        let fd = ffs.create("a", OpenFlags::CREATE).unwrap();
        assert_eq!(ffs.seek_set(fd, usize::MAX).unwrap(), usize::MAX);
        assert_eq!(ffs.read(fd, &mut [0u8; 4]).unwrap(), 0);
        assert_eq!(ffs.write(fd, b"x"), Err(FsError::UnsupportedFileSize));
        assert_eq!(ffs.seek(fd, 1), Err(FsError::InvalidArgument));
        assert_eq!(ffs.seek(fd, isize::MIN).unwrap(), usize::MAX - isize::MIN.unsigned_abs());
        assert_eq!(ffs.stat("a").unwrap().size, 0);
    }

    #[test]
    fn inode_ids_are_not_reissued_while_linked() {
        let mut ffs = FlatFileSystem::format(ram_disk(256), 0, 16).unwrap();
        ffs.create("a", OpenFlags::CREATE).unwrap();
        ffs.link("a", "b").unwrap();
        ffs.unlink("a").unwrap();
        ffs.create("c", OpenFlags::CREATE).unwrap();
        assert_ne!(ffs.stat("c").unwrap().id, ffs.stat("b").unwrap().id);
    }

    #[test]
    fn diagnostics_render() {
        let ffs = FlatFileSystem::format(ram_disk(64), 0, 8).unwrap();
        let mask = ffs.print_free_mask();
        // superblock, bitmask and two inode blocks
        assert!(mask.starts_with("11110000"));
        assert_eq!(mask.lines().count(), 1);
        let sb = ffs.dump_superblock();
        assert!(sb.contains("ninodes: 8\n"));
        assert!(sb.contains("INODES_PER_BLOCK: 8\n"));
        assert!(sb.contains("NUM_INODE_BLOCKS: 2\n"));
    }
}
