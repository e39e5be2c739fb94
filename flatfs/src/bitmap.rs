use crate::block_dev::BlockDevice;
use crate::error::FsResult;
use crate::layout::BM_BLK;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

/// One bit per device block, set = allocated.
/// Block `b` lives in byte `b / 8`, counted from the high-order bit.
#[derive(Clone)]
pub struct FreeMask {
    bits: Vec<u8>,
}

impl FreeMask {
    /// Zeroed mask covering `nblocks` blocks (rounded up to whole bytes).
    pub fn new(nblocks: usize) -> Self {
        Self {
            bits: vec![0u8; Self::bytes_for(nblocks)],
        }
    }

    pub fn bytes_for(nblocks: usize) -> usize {
        (nblocks + 7) / 8
    }

    pub fn set_bit(&mut self, b: usize) {
        self.bits[b / 8] |= 0x80 >> (b % 8);
    }

    pub fn clear_bit(&mut self, b: usize) {
        self.bits[b / 8] &= !(0x80u8 >> (b % 8));
    }

    pub fn get_bit(&self, b: usize) -> bool {
        (self.bits[b / 8] << (b % 8)) & 0x80 != 0
    }

    /// First `count` clear bits in `[start, end)`, or None if there are fewer.
    pub fn find_free(&self, start: usize, end: usize, count: usize) -> Option<Vec<usize>> {
        let found: Vec<usize> = (start..end)
            .filter(|&b| !self.get_bit(b))
            .take(count)
            .collect();
        if found.len() == count {
            Some(found)
        } else {
            None
        }
    }

    pub fn count_free(&self, nblocks: usize) -> usize {
        (0..nblocks).filter(|&b| !self.get_bit(b)).count()
    }

    pub fn store(&self, block_device: &Arc<dyn BlockDevice>) -> FsResult<()> {
        block_device.write_block(BM_BLK, 0, &self.bits)?;
        Ok(())
    }

    pub fn load(block_device: &Arc<dyn BlockDevice>, len_bytes: usize) -> FsResult<Self> {
        let mut bits = vec![0u8; len_bytes];
        block_device.read_block(BM_BLK, 0, &mut bits)?;
        Ok(Self { bits })
    }

    /// Eight bytes per line, lowest-numbered block first.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, byte) in self.bits.iter().enumerate() {
            for j in 0..8 {
                out.push(if (byte << j) & 0x80 != 0 { '1' } else { '0' });
            }
            if i % 8 == 7 {
                out.push('\n');
            }
        }
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}
