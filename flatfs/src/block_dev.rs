use crate::error::DeviceError;
use crate::BLOCK_SIZE;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

/// Synchronous block-addressed storage.
///
/// `offset` is a byte offset inside the block and `offset + buf.len()` must
/// not exceed `BLOCK_SIZE`.
pub trait BlockDevice: Send + Sync {
    fn num_blocks(&self) -> usize;
    fn read_block(&self, block_id: usize, offset: usize, buf: &mut [u8])
        -> Result<(), DeviceError>;
    fn write_block(&self, block_id: usize, offset: usize, buf: &[u8]) -> Result<(), DeviceError>;
}

/// RAM disk
pub struct MemBlockDevice {
    blocks: usize,
    data: Mutex<Vec<u8>>,
}

impl MemBlockDevice {
    pub fn new(blocks: usize) -> Self {
        Self {
            blocks,
            data: Mutex::new(vec![0u8; blocks * BLOCK_SIZE]),
        }
    }

    fn range(&self, block_id: usize, offset: usize, len: usize) -> Result<usize, DeviceError> {
        if block_id >= self.blocks || offset + len > BLOCK_SIZE {
            return Err(DeviceError::OutOfRange { block_id });
        }
        Ok(block_id * BLOCK_SIZE + offset)
    }
}

impl BlockDevice for MemBlockDevice {
    fn num_blocks(&self) -> usize {
        self.blocks
    }

    fn read_block(
        &self,
        block_id: usize,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), DeviceError> {
        let start = self.range(block_id, offset, buf.len())?;
        let data = self.data.lock();
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, offset: usize, buf: &[u8]) -> Result<(), DeviceError> {
        let start = self.range(block_id, offset, buf.len())?;
        let mut data = self.data.lock();
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_block_access() {
        let dev = MemBlockDevice::new(4);
        dev.write_block(2, 10, b"abc").unwrap();
        let mut buf = [0u8; 5];
        dev.read_block(2, 9, &mut buf).unwrap();
        assert_eq!(&buf, b"\0abc\0");
    }

    #[test]
    fn rejects_out_of_range() {
        let dev = MemBlockDevice::new(4);
        let mut buf = [0u8; 8];
        assert_eq!(
            dev.read_block(4, 0, &mut buf),
            Err(DeviceError::OutOfRange { block_id: 4 })
        );
        assert!(dev.write_block(0, BLOCK_SIZE - 4, &buf).is_err());
    }
}
