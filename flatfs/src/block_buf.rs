use crate::block_dev::BlockDevice;
use crate::error::FsResult;
use crate::BLOCK_SIZE;
use alloc::sync::Arc;

/// One block worth of bytes, aligned so on-disk records can be viewed in
/// place. Lives only for the get/put call that loaded it.
#[repr(C, align(8))]
pub struct BlockBuf {
    data: [u8; BLOCK_SIZE],
}

impl BlockBuf {
    pub fn zeroed() -> Self {
        Self {
            data: [0u8; BLOCK_SIZE],
        }
    }

    pub fn load(block_id: usize, block_device: &Arc<dyn BlockDevice>) -> FsResult<Self> {
        let mut buf = Self::zeroed();
        block_device.read_block(block_id, 0, &mut buf.data)?;
        Ok(buf)
    }

    pub fn store(&self, block_id: usize, block_device: &Arc<dyn BlockDevice>) -> FsResult<()> {
        block_device.write_block(block_id, 0, &self.data)?;
        Ok(())
    }

    pub fn as_ref<T>(&self, offset: usize) -> &T
    where
        T: Sized,
    {
        let type_size = core::mem::size_of::<T>();
        assert!(offset + type_size <= BLOCK_SIZE);
        assert_eq!(offset % core::mem::align_of::<T>(), 0);
        unsafe { &*(self.data.as_ptr().add(offset) as *const T) }
    }

    pub fn as_mut_ref<T>(&mut self, offset: usize) -> &mut T
    where
        T: Sized,
    {
        let type_size = core::mem::size_of::<T>();
        assert!(offset + type_size <= BLOCK_SIZE);
        assert_eq!(offset % core::mem::align_of::<T>(), 0);
        unsafe { &mut *(self.data.as_mut_ptr().add(offset) as *mut T) }
    }
}
