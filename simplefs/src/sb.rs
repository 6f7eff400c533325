use crate::fs::{SFSError, BLOCK_SIZE};

pub const SB_MAGIC: u32 = 0x5346_5342; // SFSB

/// The first block of the file system storing information critical for mounting
/// the file system and verifying the underlying disk is formatted correctly.
///
/// Keeps the size of the file system by tracking the number of blocks on the device
/// and the capacity of the inode table. The number of nodes available in the filesystem
/// ultimately sets the upper bound on how many files can exist.
#[derive(Debug, PartialEq)]
pub struct SuperBlock {
    /// A 32-bit identifying string, in this case SFSB.
    pub sb_magic: u32,
    /// Total blocks on the device, reserved blocks included.
    pub blocks_count: u32,
    /// Capacity of the inode table.
    pub inodes_count: u32,
    /// Blocks holding the superblock, bitmaps and inode table.
    pub reserved_blocks_count: u32,
    /// All blocks available to be allocated by the system.
    pub free_blocks_count: u32,
    /// The number of remaining available inodes.
    pub free_inodes_count: u32,
}

impl SuperBlock {
    pub fn new() -> Self {
        Self {
            sb_magic: SB_MAGIC,
            blocks_count: 0,
            inodes_count: 0,
            reserved_blocks_count: 0,
            free_blocks_count: 0,
            free_inodes_count: 0,
        }
    }

    /// Reads the super block from a buffer of exactly size BLOCK_SIZE.
    pub fn parse(buf: &[u8]) -> Result<Self, SFSError> {
        if buf.len() != BLOCK_SIZE {
            return Err(SFSError::Corrupted(format!(
                "superblock buffer holds {} bytes",
                buf.len()
            )));
        }
        let field = |n: usize| {
            let at = n * 4;
            u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
        };

        let sb = Self {
            sb_magic: field(0),
            blocks_count: field(1),
            inodes_count: field(2),
            reserved_blocks_count: field(3),
            free_blocks_count: field(4),
            free_inodes_count: field(5),
        };
        if sb.sb_magic != SB_MAGIC {
            return Err(SFSError::Corrupted(format!(
                "superblock magic {:#010x} is invalid",
                sb.sb_magic
            )));
        }
        Ok(sb)
    }

    /// Serializes the SuperBlock into a BLOCK_SIZE buffer for writing to disk.
    /// The encoding is a series of struct fields with big endian alignment.
    pub fn serialize(&self) -> Vec<u8> {
        let mut sb_encoded = Vec::with_capacity(BLOCK_SIZE);
        for field in &[
            self.sb_magic,
            self.blocks_count,
            self.inodes_count,
            self.reserved_blocks_count,
            self.free_blocks_count,
            self.free_inodes_count,
        ] {
            sb_encoded.extend_from_slice(&field.to_be_bytes());
        }
        sb_encoded.resize(BLOCK_SIZE, 0);
        sb_encoded
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self::new()
    }
}
