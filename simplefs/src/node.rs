use crate::alloc::Allocator;
use crate::fs::{SFSError, FIRST_DATA_BLOCK, INODE_TABLE_INDEX};
use crate::fs::{Resource, BLOCK_SIZE};
use crate::io::{Block, BlockNumber, BlockStorage, Disk};

use log::info;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zerocopy::byteorder::{LittleEndian, I64, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Inode number, a direct index into the inode table.
pub type Inum = u32;

pub const NODE_SIZE: usize = 64;
/// The whole table lives in one block.
pub const INODE_CAPACITY: usize = BLOCK_SIZE / NODE_SIZE;
/// The root directory permanently owns the first slot.
pub const ROOT_INUM: Inum = 0;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
const ROOT_DEFAULT_MODE: u32 = S_IFDIR | 0o755;

/// An description of the type of file object pointed to by an Inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// A regular file.
    RegularFile,
    /// A directory containing zero or more regular files or directories.
    Directory,
}

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
/// This structure __must not exceed 64 bytes.__
pub struct Inode {
    /// The file type and permission bits (e.g. 0o40755).
    mode: U32<LittleEndian>,
    /// The number of directory entries referencing this file.
    refs: U32<LittleEndian>,
    /// The total size of the file in bytes.
    size: U32<LittleEndian>,
    /// The single data block holding file bytes or directory entries.
    block: U32<LittleEndian>,
    /// Seconds since epoch of the last access.
    access_time: I64<LittleEndian>,
    /// Seconds since epoch of the last content update.
    update_time: I64<LittleEndian>,
    /// Seconds since epoch of creation.
    create_time: I64<LittleEndian>,
    /// Reserved for future expansion of file attributes up to the 64 byte limit.
    padding: [u8; 24],
}

const _: () = assert!(std::mem::size_of::<Inode>() == NODE_SIZE);

impl Inode {
    /// Resets the record to a fresh, singly referenced node.
    pub fn init(&mut self, mode: u32, block: BlockNumber) {
        *self = Self::new_zeroed();
        self.mode.set(mode);
        self.block.set(block as u32);
        self.refs.set(1);
    }

    pub fn mode(&self) -> u32 {
        self.mode.get()
    }

    /// Replaces the permission bits, the file type is kept.
    pub fn set_permissions(&mut self, mode: u32) {
        self.mode.set((self.mode.get() & S_IFMT) | (mode & !S_IFMT));
    }

    pub fn file_type(&self) -> FileType {
        if self.mode.get() & S_IFMT == S_IFDIR {
            FileType::Directory
        } else {
            FileType::RegularFile
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    pub fn refs(&self) -> u32 {
        self.refs.get()
    }

    pub fn set_refs(&mut self, refs: u32) {
        self.refs.set(refs);
    }

    pub fn link(&mut self) {
        self.refs.set(self.refs.get() + 1);
    }

    /// Drops one reference and returns how many remain.
    pub fn unlink(&mut self) -> u32 {
        let refs = self.refs.get().saturating_sub(1);
        self.refs.set(refs);
        refs
    }

    pub fn size(&self) -> usize {
        self.size.get() as usize
    }

    pub fn set_size(&mut self, size: usize) {
        self.size.set(size as u32);
    }

    pub fn block(&self) -> BlockNumber {
        self.block.get() as BlockNumber
    }

    /// The content block, unless the record points into the reserved region.
    pub fn content_block(&self) -> Option<BlockNumber> {
        Some(self.block()).filter(|&block| block >= FIRST_DATA_BLOCK)
    }

    pub fn atime(&self) -> SystemTime {
        from_epoch_secs(self.access_time.get())
    }

    pub fn mtime(&self) -> SystemTime {
        from_epoch_secs(self.update_time.get())
    }

    pub fn ctime(&self) -> SystemTime {
        from_epoch_secs(self.create_time.get())
    }

    pub fn set_times(&mut self, atime: SystemTime, mtime: SystemTime) {
        self.access_time.set(epoch_secs(atime));
        self.update_time.set(epoch_secs(mtime));
    }

    pub fn touch(&mut self, now: SystemTime) {
        self.update_time.set(epoch_secs(now));
    }

    /// Stamps every timestamp, used right after creation.
    pub fn stamp(&mut self, now: SystemTime) {
        let secs = epoch_secs(now);
        self.access_time.set(secs);
        self.update_time.set(secs);
        self.create_time.set(secs);
    }
}

/// Whole seconds relative to the epoch, saturating at the ends of `i64`.
fn epoch_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_secs())
            .map(|secs| -secs)
            .unwrap_or(i64::MIN),
    }
}

fn from_epoch_secs(secs: i64) -> SystemTime {
    let offset = Duration::from_secs(secs.unsigned_abs());
    let time = if secs >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };
    // Only reachable on platforms with a narrower clock than the stored value.
    time.unwrap_or(UNIX_EPOCH)
}

/// The in-memory copy of the inode table block, indexed directly by inode number.
///
/// Slot occupancy is owned by the [`Allocator`]; the table only holds the records.
/// A freed slot is zeroed so a stale read sees a node with no references.
pub struct InodeTable {
    nodes: Vec<Inode>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self {
            nodes: vec![Inode::new_zeroed(); INODE_CAPACITY],
        }
    }

    pub fn parse(buf: &Block) -> Result<Self, SFSError> {
        let nodes = Inode::slice_from(&buf[..]).ok_or_else(|| {
            SFSError::Corrupted(format!("block {} is not an inode table", INODE_TABLE_INDEX))
        })?;
        Ok(Self {
            nodes: nodes.to_vec(),
        })
    }

    pub fn serialize_into(&self, buf: &mut Block) {
        buf.copy_from_slice(self.nodes.as_bytes());
    }

    /// Verifies every referenced node fits the device: content within one block that
    /// lies in the data region of a device of `block_count` blocks.
    pub fn check(&self, block_count: usize) -> Result<(), SFSError> {
        for (inum, node) in self.nodes.iter().enumerate() {
            if node.refs() == 0 {
                continue;
            }
            if node.size() > BLOCK_SIZE {
                return Err(SFSError::Corrupted(format!(
                    "inode {} claims {} bytes",
                    inum,
                    node.size()
                )));
            }
            if !(FIRST_DATA_BLOCK..block_count).contains(&node.block()) {
                return Err(SFSError::Corrupted(format!(
                    "inode {} points at block {}",
                    inum,
                    node.block()
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, inum: Inum) -> Result<&Inode, SFSError> {
        self.nodes
            .get(inum as usize)
            .ok_or(SFSError::OutOfRange(inum))
    }

    pub fn get_mut(&mut self, inum: Inum) -> Result<&mut Inode, SFSError> {
        self.nodes
            .get_mut(inum as usize)
            .ok_or(SFSError::OutOfRange(inum))
    }

    /// Claims a free slot and hands back its inode number.
    pub fn allocate(&mut self, alloc: &mut Allocator) -> Result<Inum, SFSError> {
        let inum = alloc
            .alloc_inode()
            .ok_or(SFSError::Exhausted(Resource::Inodes))?;
        *self.get_mut(inum)? = Inode::new_zeroed();
        Ok(inum)
    }

    /// Returns the slot to the allocator. The caller has already released the node's
    /// content block.
    pub fn deallocate(&mut self, inum: Inum, alloc: &mut Allocator) -> Result<(), SFSError> {
        if inum == ROOT_INUM {
            return Err(SFSError::InvalidArgument(
                "the root inode cannot be released".to_string(),
            ));
        }
        *self.get_mut(inum)? = Inode::new_zeroed();
        alloc.free_inode(inum);
        Ok(())
    }

    pub fn init(&mut self, inum: Inum, mode: u32, block: BlockNumber) -> Result<(), SFSError> {
        self.get_mut(inum)?.init(mode, block);
        Ok(())
    }

    /// Sets up the root directory unless it already holds references. Returns whether
    /// any work was done.
    pub fn init_root<T: BlockStorage>(
        &mut self,
        alloc: &mut Allocator,
        disk: &mut Disk<T>,
    ) -> Result<bool, SFSError> {
        if self.get(ROOT_INUM)?.refs() > 0 {
            return Ok(false);
        }

        let block = alloc
            .alloc_block()
            .ok_or(SFSError::Exhausted(Resource::Blocks))?;
        disk.block_mut(block)?.fill(0);
        alloc.claim_inode(ROOT_INUM);

        let root = self.get_mut(ROOT_INUM)?;
        root.init(ROOT_DEFAULT_MODE, block);
        // One for the root itself, one for being its own parent.
        root.set_refs(2);
        root.stamp(SystemTime::now());
        info!("initialized root directory in block {}", block);
        Ok(true)
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
