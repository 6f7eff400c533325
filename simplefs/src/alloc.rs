use crate::fs::{BLOCK_SIZE, FIRST_DATA_BLOCK};
use crate::io::{Block, BlockNumber};
use crate::node::{Inum, INODE_CAPACITY};

use log::{debug, warn};
use std::ops::Range;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Both bitmaps share one block, each gets half of it.
pub const BITMAP_BYTES: usize = BLOCK_SIZE / 2;
/// The largest number of blocks (or inodes) a single bitmap can track.
pub const BITMAP_BITS: usize = BITMAP_BYTES * 8;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy)]
pub struct Bitmap {
    /// Stores 2048 bytes mapping each bit to a logical block (or inode slot), for
    /// a total of 16,384 trackable units per bitmap.
    bitmap: [u64; BITMAP_BYTES / 8],
}

impl Bitmap {
    pub fn new() -> Self {
        Self::new_zeroed()
    }

    /// Reads a bitmap from the first `BITMAP_BYTES` of `buf`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        Self::read_from_prefix(buf)
    }

    pub fn serialize(&self) -> &[u8] {
        self.as_bytes()
    }

    pub fn get(&self, nr: usize) -> State {
        assert!(nr < BITMAP_BITS);
        let word = self.bitmap[nr / 64];
        match (word >> (nr % 64)) & 0b01 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, nr: usize) {
        assert!(nr < BITMAP_BITS);
        self.bitmap[nr / 64] |= 0b01_u64 << (nr % 64);
    }

    pub fn set_free(&mut self, nr: usize) {
        assert!(nr < BITMAP_BITS);
        self.bitmap[nr / 64] &= !(0b01_u64 << (nr % 64));
    }

    /// Yields free positions within `range` in ascending order.
    pub fn free_slots(&self, range: Range<usize>) -> impl Iterator<Item = usize> + '_ {
        range.filter(move |&nr| self.get(nr) == State::Free)
    }

    pub fn count_used(&self, range: Range<usize>) -> usize {
        range.filter(|&nr| self.get(nr) == State::Used).count()
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks occupancy of content blocks and inode slots.
///
/// Block indices below [`FIRST_DATA_BLOCK`] hold the superblock, the bitmaps and the
/// inode table. They are marked used on format and are never handed out.
///
/// The allocation policy is the naive one: the lowest free index wins.
pub struct Allocator {
    blocks: Bitmap,
    inodes: Bitmap,
    /// Number of blocks on the device, allocations never reach past it.
    block_count: usize,
}

impl Allocator {
    /// A fresh allocator for a device of `block_count` blocks with only the reserved
    /// blocks in use.
    pub fn new(block_count: usize) -> Self {
        debug_assert!(block_count <= BITMAP_BITS);
        let mut blocks = Bitmap::new();
        for reserved in 0..FIRST_DATA_BLOCK {
            blocks.set_reserved(reserved);
        }
        Self {
            blocks,
            inodes: Bitmap::new(),
            block_count,
        }
    }

    /// Reads both bitmaps from the bitmap block.
    pub fn parse(buf: &Block, block_count: usize) -> Option<Self> {
        let blocks = Bitmap::parse(&buf[..BITMAP_BYTES])?;
        let inodes = Bitmap::parse(&buf[BITMAP_BYTES..])?;
        Some(Self {
            blocks,
            inodes,
            block_count,
        })
    }

    pub fn serialize_into(&self, buf: &mut Block) {
        buf[..BITMAP_BYTES].copy_from_slice(self.blocks.serialize());
        buf[BITMAP_BYTES..].copy_from_slice(self.inodes.serialize());
    }

    pub fn alloc_block(&mut self) -> Option<BlockNumber> {
        let blocknr = self
            .blocks
            .free_slots(FIRST_DATA_BLOCK..self.block_count)
            .next()?;
        self.blocks.set_reserved(blocknr);
        debug!("alloc_block() -> {}", blocknr);
        Some(blocknr)
    }

    pub fn free_block(&mut self, blocknr: BlockNumber) {
        if blocknr < FIRST_DATA_BLOCK || blocknr >= self.block_count {
            warn!("refusing to free reserved or out of range block {}", blocknr);
            return;
        }
        debug!("free_block({})", blocknr);
        self.blocks.set_free(blocknr);
    }

    pub fn alloc_inode(&mut self) -> Option<Inum> {
        let slot = self.inodes.free_slots(0..INODE_CAPACITY).next()?;
        self.inodes.set_reserved(slot);
        debug!("alloc_inode() -> {}", slot);
        Some(slot as Inum)
    }

    /// Marks a specific inode slot as used regardless of the allocation policy.
    pub fn claim_inode(&mut self, inum: Inum) {
        self.inodes.set_reserved(inum as usize);
    }

    pub fn free_inode(&mut self, inum: Inum) {
        debug!("free_inode({})", inum);
        self.inodes.set_free(inum as usize);
    }

    #[cfg(test)]
    pub fn inode_state(&self, inum: Inum) -> State {
        self.inodes.get(inum as usize)
    }

    #[cfg(test)]
    pub fn block_state(&self, blocknr: BlockNumber) -> State {
        self.blocks.get(blocknr)
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn free_blocks(&self) -> usize {
        self.block_count - self.blocks.count_used(0..self.block_count)
    }

    pub fn free_inodes(&self) -> usize {
        INODE_CAPACITY - self.inodes.count_used(0..INODE_CAPACITY)
    }
}
