use crate::fs::{SFSError, BLOCK_SIZE};
use crate::io::{BlockNumber, BlockStorage};

use log::debug;

/// One filesystem block worth of bytes.
pub type Block = [u8; BLOCK_SIZE];

/// An in-memory image of a block device.
///
/// Every block is read once when the disk is loaded, after which the filesystem works
/// against memory. Mutable access marks a block dirty and [`Disk::flush`] writes the dirty
/// set back to the device. Shared access (`&Disk`) is read-only, exclusive access
/// (`&mut Disk`) is required to change any block.
pub struct Disk<T: BlockStorage> {
    dev: T,
    blocks: Vec<Block>,
    dirty: Vec<bool>,
}

impl<T: BlockStorage> Disk<T> {
    /// Reads the full contents of `dev` into memory.
    pub fn load(mut dev: T) -> Result<Self, SFSError> {
        let count = dev.block_count();
        let mut blocks = vec![[0; BLOCK_SIZE]; count];
        for (blocknr, block) in blocks.iter_mut().enumerate() {
            dev.read_block(blocknr, block)?;
        }
        debug!("loaded {} blocks from device", count);

        Ok(Self {
            dev,
            blocks,
            dirty: vec![false; count],
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, blocknr: BlockNumber) -> Result<&Block, SFSError> {
        self.blocks
            .get(blocknr)
            .ok_or(SFSError::BlockOutOfRange(blocknr))
    }

    pub fn block_mut(&mut self, blocknr: BlockNumber) -> Result<&mut Block, SFSError> {
        let block = self
            .blocks
            .get_mut(blocknr)
            .ok_or(SFSError::BlockOutOfRange(blocknr))?;
        self.dirty[blocknr] = true;
        Ok(block)
    }

    /// Writes every dirty block back to the device and syncs it.
    pub fn flush(&mut self) -> Result<(), SFSError> {
        let mut written = 0;
        for (blocknr, dirty) in self.dirty.iter_mut().enumerate() {
            if *dirty {
                self.dev.write_block(blocknr, &self.blocks[blocknr])?;
                *dirty = false;
                written += 1;
            }
        }
        self.dev.sync_disk()?;
        debug!("flushed {} dirty blocks", written);
        Ok(())
    }

    /// Releases the device without flushing.
    pub fn into_device(self) -> T {
        self.dev
    }
}
