use std::path::Path;

/// Index of a block on a device, from 0 up to `block_count() - 1`.
pub type BlockNumber = usize;

/// Fixed-size block device the file system is laid out on.
///
/// Every transfer moves exactly one block of [`crate::BLOCK_SIZE`] bytes. Implementations
/// do not interpret the contents, checking that a device was formatted is left to
/// [`crate::SFS::open`].
pub trait BlockStorage {
    /// Opens (or creates) a device image of `nblocks` blocks at `path`. Existing
    /// contents are kept.
    fn open_disk<P: AsRef<Path>>(path: P, nblocks: usize) -> std::io::Result<Self>
    where
        Self: Sized;
    fn block_count(&self) -> usize;
    /// Fills `buf` with the contents of block `blocknr`.
    ///
    /// # Errors
    ///
    /// Fails for a block past the end of the device or a buffer shorter than a block.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;
    /// Stores at most one block's worth of `buf` as block `blocknr`.
    ///
    /// # Errors
    ///
    /// Fails for a block past the end of the device.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;
    /// Pushes buffered writes down to the medium.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}
