use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use crate::alloc::{Allocator, BITMAP_BITS};
use crate::dir::{self, Directory, DIR_NAME_LEN};
use crate::io::{BlockNumber, BlockStorage, Disk};
use crate::node::{FileType, InodeTable, Inum, INODE_CAPACITY, ROOT_INUM};
use crate::node::{S_IFDIR, S_IFMT, S_IFREG};
use crate::paths;
use crate::sb::SuperBlock;

use log::{debug, info};
use thiserror::Error;

pub const BLOCK_SIZE: usize = 4096;

/// Known locations.
pub const SUPERBLOCK_INDEX: usize = 0;
pub const BITMAP_INDEX: usize = 1;
pub const INODE_TABLE_INDEX: usize = 2;
/// Every block from here on holds file or directory content.
pub const FIRST_DATA_BLOCK: usize = 3;

/// The smallest device that fits the reserved blocks and the root directory.
pub const MIN_BLOCKS: usize = FIRST_DATA_BLOCK + 1;
pub const MAX_BLOCKS: usize = BITMAP_BITS;

/// What ran out when an allocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Inodes,
    Blocks,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Inodes => f.write_str("inodes"),
            Resource::Blocks => f.write_str("blocks"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SFSError {
    #[error("found no file at path")]
    NotFound,
    #[error("parent directory does not exist")]
    NoSuchParent,
    #[error("file already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    NotAFile,
    #[error("directory has no free entries")]
    DirectoryFull,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("no free {0} left")]
    Exhausted(Resource),
    #[error("files are limited to {} bytes", BLOCK_SIZE)]
    FileTooLarge,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("names are limited to {} bytes", DIR_NAME_LEN - 1)]
    NameTooLong,
    #[error("inode {0} is out of range")]
    OutOfRange(Inum),
    #[error("block {0} is out of range")]
    BlockOutOfRange(BlockNumber),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid file system layout: {0}")]
    Corrupted(String),
    #[error("block device failure")]
    Io(#[from] std::io::Error),
}

impl SFSError {
    /// The Linux errno a protocol adapter reports for this error.
    pub fn errno(&self) -> i32 {
        const ENOENT: i32 = 2;
        const EIO: i32 = 5;
        const EEXIST: i32 = 17;
        const ENOTDIR: i32 = 20;
        const EISDIR: i32 = 21;
        const EINVAL: i32 = 22;
        const EFBIG: i32 = 27;
        const ENOSPC: i32 = 28;
        const ENAMETOOLONG: i32 = 36;
        const ENOTEMPTY: i32 = 39;

        match self {
            SFSError::NotFound | SFSError::NoSuchParent => ENOENT,
            SFSError::AlreadyExists => EEXIST,
            SFSError::NotADirectory => ENOTDIR,
            SFSError::NotAFile => EISDIR,
            SFSError::DirectoryFull | SFSError::Exhausted(_) => ENOSPC,
            SFSError::FileTooLarge => EFBIG,
            SFSError::DirectoryNotEmpty => ENOTEMPTY,
            SFSError::NameTooLong => ENAMETOOLONG,
            SFSError::InvalidPath(_) | SFSError::InvalidArgument(_) => EINVAL,
            SFSError::OutOfRange(_)
            | SFSError::BlockOutOfRange(_)
            | SFSError::Corrupted(_)
            | SFSError::Io(_) => EIO,
        }
    }
}

/// Attributes reported for a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub ino: Inum,
    pub kind: FileType,
    /// Type and permission bits.
    pub mode: u32,
    pub size: u64,
    /// Number of directory entries referencing the node.
    pub nlink: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl Stat {
    pub fn permissions(&self) -> u32 {
        self.mode & !S_IFMT
    }
}

/// Capacity figures for the whole file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_size: usize,
    pub blocks: usize,
    pub free_blocks: usize,
    pub inodes: usize,
    pub free_inodes: usize,
    pub max_name_len: usize,
}

/// A small single-block-per-file file system on top of block storage.
///
/// # Layout
/// ================================================================================
/// | SuperBlock | Bitmaps (data region, inodes) | Inode table | Data Region      |
/// ================================================================================
///
/// The bitmaps and inode table are kept in memory and written back to their reserved
/// blocks on [`SFS::sync`]. Every file and directory owns exactly one data block, a
/// directory's block holds a fixed array of entries.
pub struct SFS<T: BlockStorage> {
    disk: Disk<T>,
    super_block: SuperBlock,
    alloc: Allocator,
    inodes: InodeTable,
}

impl<T: BlockStorage> SFS<T> {
    /// Initializes a fresh file system onto owned block storage. Whatever the device held
    /// before is discarded.
    pub fn format(dev: T) -> Result<Self, SFSError> {
        let mut disk = Disk::load(dev)?;
        let blocks = disk.block_count();
        if !(MIN_BLOCKS..=MAX_BLOCKS).contains(&blocks) {
            return Err(SFSError::InvalidArgument(format!(
                "device must hold between {} and {} blocks, found {}",
                MIN_BLOCKS, MAX_BLOCKS, blocks
            )));
        }

        let mut alloc = Allocator::new(blocks);
        let mut inodes = InodeTable::new();
        inodes.init_root(&mut alloc, &mut disk)?;

        let mut super_block = SuperBlock::new();
        super_block.blocks_count = blocks as u32;
        super_block.inodes_count = INODE_CAPACITY as u32;
        super_block.reserved_blocks_count = FIRST_DATA_BLOCK as u32;

        let mut fs = SFS {
            disk,
            super_block,
            alloc,
            inodes,
        };
        fs.sync()?;
        info!("formatted file system with {} blocks", blocks);
        Ok(fs)
    }

    /// Mounts a file system previously written with [`SFS::format`].
    pub fn open(dev: T) -> Result<Self, SFSError> {
        let disk = Disk::load(dev)?;

        let super_block = SuperBlock::parse(disk.block(SUPERBLOCK_INDEX)?)?;
        let blocks = super_block.blocks_count as usize;
        if blocks != disk.block_count() || !(MIN_BLOCKS..=MAX_BLOCKS).contains(&blocks) {
            return Err(SFSError::Corrupted(format!(
                "superblock describes {} blocks, device holds {}",
                blocks,
                disk.block_count()
            )));
        }
        if super_block.inodes_count as usize != INODE_CAPACITY
            || super_block.reserved_blocks_count as usize != FIRST_DATA_BLOCK
        {
            return Err(SFSError::Corrupted(format!(
                "unsupported geometry: {} inodes, {} reserved blocks",
                super_block.inodes_count, super_block.reserved_blocks_count
            )));
        }

        let alloc = Allocator::parse(disk.block(BITMAP_INDEX)?, blocks)
            .ok_or_else(|| SFSError::Corrupted("unreadable bitmaps".to_string()))?;
        let inodes = InodeTable::parse(disk.block(INODE_TABLE_INDEX)?)?;
        inodes.check(blocks)?;

        let mut fs = SFS {
            disk,
            super_block,
            alloc,
            inodes,
        };
        if fs.inodes.init_root(&mut fs.alloc, &mut fs.disk)? {
            fs.sync()?;
        }
        info!(
            "opened file system with {} blocks, {} free",
            blocks,
            fs.alloc.free_blocks()
        );
        Ok(fs)
    }

    /// Writes the in-memory metadata to its reserved blocks and flushes every dirty block
    /// to the device.
    pub fn sync(&mut self) -> Result<(), SFSError> {
        self.super_block.free_blocks_count = self.alloc.free_blocks() as u32;
        self.super_block.free_inodes_count = self.alloc.free_inodes() as u32;

        self.disk
            .block_mut(SUPERBLOCK_INDEX)?
            .copy_from_slice(&self.super_block.serialize());
        self.alloc
            .serialize_into(self.disk.block_mut(BITMAP_INDEX)?);
        self.inodes
            .serialize_into(self.disk.block_mut(INODE_TABLE_INDEX)?);
        self.disk.flush()
    }

    /// Syncs and hands the device back.
    pub fn close(mut self) -> Result<T, SFSError> {
        self.sync()?;
        Ok(self.disk.into_device())
    }

    /// Walks `path` from the root and returns the inode number it names.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> Result<Inum, SFSError> {
        let names = paths::components(path.as_ref())?;
        self.walk(&names)
    }

    fn walk(&self, names: &[&str]) -> Result<Inum, SFSError> {
        let mut inum = ROOT_INUM;
        for name in names {
            // Loading a regular file as a directory fails, so nothing may follow a file.
            inum = Directory::load(&self.inodes, &self.disk, inum)?
                .lookup(name)
                .ok_or(SFSError::NotFound)?;
        }
        Ok(inum)
    }

    /// Resolves the parent directory of `path`, returning it with the final name.
    fn parent<'p>(&self, path: &'p Path) -> Result<(Inum, &'p str), SFSError> {
        let (names, leaf) = paths::split(path)?;
        Ok((self.walk(&names)?, leaf))
    }

    /// Like [`SFS::parent`] for a name about to be added, a missing parent is reported as
    /// such rather than as a missing file.
    fn new_entry_parent<'p>(&self, path: &'p Path) -> Result<(Inum, &'p str), SFSError> {
        self.parent(path).map_err(|e| match e {
            SFSError::NotFound => SFSError::NoSuchParent,
            e => e,
        })
    }

    /// Creates a file or directory at `path`. `mode` carries the type bits, a mode
    /// without any is treated as a regular file.
    pub fn create<P: AsRef<Path>>(&mut self, path: P, mode: u32) -> Result<Inum, SFSError> {
        let path = path.as_ref();
        let mode = match mode & S_IFMT {
            0 => mode | S_IFREG,
            S_IFREG | S_IFDIR => mode,
            other => {
                return Err(SFSError::InvalidArgument(format!(
                    "unsupported file type {:o}",
                    other
                )))
            }
        };

        let (parent, name) = self.new_entry_parent(path)?;
        dir::check_name(name)?;
        if Directory::load(&self.inodes, &self.disk, parent)?
            .lookup(name)
            .is_some()
        {
            return Err(SFSError::AlreadyExists);
        }

        let inum = self.inodes.allocate(&mut self.alloc)?;
        if let Err(e) = self.populate(inum, parent, name, mode) {
            // Undo whatever part of the creation went through.
            self.reclaim(inum)?;
            return Err(e);
        }
        self.touch(parent)?;
        debug!("create {} ({:o}) -> inode {}", path.display(), mode, inum);
        Ok(inum)
    }

    pub fn mkdir<P: AsRef<Path>>(&mut self, path: P, perm: u32) -> Result<Inum, SFSError> {
        self.create(path, S_IFDIR | (perm & !S_IFMT))
    }

    fn populate(
        &mut self,
        inum: Inum,
        parent: Inum,
        name: &str,
        mode: u32,
    ) -> Result<(), SFSError> {
        let block = self
            .alloc
            .alloc_block()
            .ok_or(SFSError::Exhausted(Resource::Blocks))?;
        self.inodes.init(inum, mode, block)?;
        self.inodes.get_mut(inum)?.stamp(SystemTime::now());
        // A recycled block may still hold old bytes or entries.
        self.disk.block_mut(block)?.fill(0);

        Directory::load_mut(&self.inodes, &mut self.disk, parent)?.insert(name, inum)
    }

    /// Adds a second name `to` for the file at `from`.
    pub fn link<P, Q>(&mut self, from: P, to: Q) -> Result<(), SFSError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let target = self.resolve(from)?;
        if self.inodes.get(target)?.is_dir() {
            return Err(SFSError::NotAFile);
        }
        self.link_inode(target, to.as_ref())
    }

    fn link_inode(&mut self, target: Inum, to: &Path) -> Result<(), SFSError> {
        let (parent, name) = self.new_entry_parent(to)?;
        Directory::load_mut(&self.inodes, &mut self.disk, parent)?.insert(name, target)?;
        self.inodes.get_mut(target)?.link();
        self.touch(parent)?;
        debug!("link inode {} as {}", target, to.display());
        Ok(())
    }

    /// Removes the entry at `path`, releasing the file once no entry references it.
    pub fn unlink<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SFSError> {
        let path = path.as_ref();
        let (parent, name) = self.parent(path)?;
        let target = Directory::load(&self.inodes, &self.disk, parent)?
            .lookup(name)
            .ok_or(SFSError::NotFound)?;
        if self.inodes.get(target)?.is_dir() {
            return Err(SFSError::NotAFile);
        }
        self.unlink_entry(parent, name)?;
        debug!("unlink {}", path.display());
        Ok(())
    }

    /// Removes the empty directory at `path`.
    pub fn rmdir<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SFSError> {
        let path = path.as_ref();
        let (parent, name) = self.parent(path)?;
        let target = Directory::load(&self.inodes, &self.disk, parent)?
            .lookup(name)
            .ok_or(SFSError::NotFound)?;
        if !Directory::load(&self.inodes, &self.disk, target)?.is_empty() {
            return Err(SFSError::DirectoryNotEmpty);
        }
        self.unlink_entry(parent, name)?;
        debug!("rmdir {}", path.display());
        Ok(())
    }

    /// Drops the entry and one reference from its target, reclaiming the target when that
    /// was the last one.
    fn unlink_entry(&mut self, parent: Inum, name: &str) -> Result<Inum, SFSError> {
        let inum = Directory::load_mut(&self.inodes, &mut self.disk, parent)?.remove(name)?;
        if self.inodes.get_mut(inum)?.unlink() == 0 {
            self.reclaim(inum)?;
        }
        self.touch(parent)?;
        Ok(inum)
    }

    /// Frees the node's content block and inode slot.
    fn reclaim(&mut self, inum: Inum) -> Result<(), SFSError> {
        let node = self.inodes.get(inum)?;
        if let Some(block) = node.content_block() {
            self.alloc.free_block(block);
        }
        self.inodes.deallocate(inum, &mut self.alloc)?;
        debug!("reclaimed inode {}", inum);
        Ok(())
    }

    /// Moves `from` to `to`, which must not exist yet. The new name is linked before the
    /// old one is removed, so a failure leaves at least the original in place.
    pub fn rename<P, Q>(&mut self, from: P, to: Q) -> Result<(), SFSError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let (from, to) = (from.as_ref(), to.as_ref());
        let target = self.resolve(from)?;

        // Below a file the link itself fails with `NotADirectory`.
        let (to_parent, _) = paths::split(to)?;
        if self.inodes.get(target)?.is_dir() && to_parent.starts_with(&paths::components(from)?) {
            return Err(SFSError::InvalidArgument(format!(
                "cannot move {} inside itself",
                from.display()
            )));
        }

        self.link_inode(target, to)?;
        let (parent, name) = self.parent(from)?;
        self.unlink_entry(parent, name)?;
        debug!("rename {} -> {}", from.display(), to.display());
        Ok(())
    }

    /// Reads up to `length` bytes starting at `offset`. Reading at or past the end of the
    /// file returns nothing.
    pub fn read<P: AsRef<Path>>(
        &self,
        path: P,
        length: usize,
        offset: usize,
    ) -> Result<Vec<u8>, SFSError> {
        let (_, block, size) = self.file(path.as_ref())?;
        if offset >= size {
            return Ok(Vec::new());
        }
        let end = size.min(offset.saturating_add(length));
        Ok(self.disk.block(block)?[offset..end].to_vec())
    }

    /// Writes `data` at `offset`, growing the file as needed.
    pub fn write<P: AsRef<Path>>(
        &mut self,
        path: P,
        data: &[u8],
        offset: usize,
    ) -> Result<usize, SFSError> {
        let (inum, block, size) = self.file(path.as_ref())?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= BLOCK_SIZE)
            .ok_or(SFSError::FileTooLarge)?;

        self.disk.block_mut(block)?[offset..end].copy_from_slice(data);
        let node = self.inodes.get_mut(inum)?;
        node.set_size(size.max(end));
        node.touch(SystemTime::now());
        Ok(data.len())
    }

    /// Sets the file length. Bytes past the end of a file are always kept zeroed, so
    /// growing exposes zeroes.
    pub fn truncate<P: AsRef<Path>>(&mut self, path: P, size: usize) -> Result<(), SFSError> {
        if size > BLOCK_SIZE {
            return Err(SFSError::FileTooLarge);
        }
        let (inum, block, old_size) = self.file(path.as_ref())?;
        if size < old_size {
            self.disk.block_mut(block)?[size..old_size].fill(0);
        }
        let node = self.inodes.get_mut(inum)?;
        node.set_size(size);
        node.touch(SystemTime::now());
        Ok(())
    }

    /// Resolves a regular file to its inode, content block and size.
    fn file(&self, path: &Path) -> Result<(Inum, BlockNumber, usize), SFSError> {
        let inum = self.resolve(path)?;
        let node = self.inodes.get(inum)?;
        if node.is_dir() {
            return Err(SFSError::NotAFile);
        }
        let block = node.content_block().ok_or_else(|| {
            SFSError::Corrupted(format!("file {} has no content block", inum))
        })?;
        if node.size() > BLOCK_SIZE {
            return Err(SFSError::Corrupted(format!(
                "file {} claims {} bytes",
                inum,
                node.size()
            )));
        }
        Ok((inum, block, node.size()))
    }

    pub fn stat<P: AsRef<Path>>(&self, path: P) -> Result<Stat, SFSError> {
        let inum = self.resolve(path)?;
        self.stat_inode(inum)
    }

    fn stat_inode(&self, inum: Inum) -> Result<Stat, SFSError> {
        let node = self.inodes.get(inum)?;
        Ok(Stat {
            ino: inum,
            kind: node.file_type(),
            mode: node.mode(),
            size: node.size() as u64,
            nlink: node.refs(),
            atime: node.atime(),
            mtime: node.mtime(),
            ctime: node.ctime(),
        })
    }

    /// Lists the directory at `path` as it is at the time of the call.
    pub fn readdir<P: AsRef<Path>>(&self, path: P) -> Result<Vec<(String, Stat)>, SFSError> {
        let inum = self.resolve(path)?;
        Directory::load(&self.inodes, &self.disk, inum)?
            .iter()
            .map(|(name, child)| Ok((name.to_string(), self.stat_inode(child)?)))
            .collect()
    }

    /// Replaces the permission bits, the file type stays as it is.
    pub fn chmod<P: AsRef<Path>>(&mut self, path: P, mode: u32) -> Result<(), SFSError> {
        let inum = self.resolve(path)?;
        self.inodes.get_mut(inum)?.set_permissions(mode);
        Ok(())
    }

    pub fn set_time<P: AsRef<Path>>(
        &mut self,
        path: P,
        atime: SystemTime,
        mtime: SystemTime,
    ) -> Result<(), SFSError> {
        let inum = self.resolve(path)?;
        self.inodes.get_mut(inum)?.set_times(atime, mtime);
        Ok(())
    }

    pub fn statfs(&self) -> FsStats {
        FsStats {
            block_size: BLOCK_SIZE,
            blocks: self.alloc.block_count(),
            free_blocks: self.alloc.free_blocks(),
            inodes: INODE_CAPACITY,
            free_inodes: self.alloc.free_inodes(),
            max_name_len: DIR_NAME_LEN - 1,
        }
    }

    fn touch(&mut self, inum: Inum) -> Result<(), SFSError> {
        self.inodes.get_mut(inum)?.touch(SystemTime::now());
        Ok(())
    }
}
