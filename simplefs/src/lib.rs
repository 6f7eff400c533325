//! A small user-space file system: a fixed inode table, single-block files and
//! directories stored as fixed arrays of entries, all on top of a block device.
//!
//! ```no_run
//! use simplefs::io::FileBlockEmulatorBuilder;
//! use simplefs::{S_IFREG, SFS};
//!
//! let dev = FileBlockEmulatorBuilder::from(std::fs::File::create("disk.img").unwrap())
//!     .with_block_size(64)
//!     .build()
//!     .unwrap();
//! let mut fs = SFS::format(dev).unwrap();
//! fs.create("/hello", S_IFREG | 0o644).unwrap();
//! fs.write("/hello", b"hi", 0).unwrap();
//! fs.sync().unwrap();
//! ```
mod alloc;
mod dir;
mod fs;
pub mod io;
mod node;
mod paths;
mod sb;
mod shared;

pub use crate::dir::{DIR_CAPACITY, DIR_NAME_LEN};
pub use crate::fs::{FsStats, Resource, SFSError, Stat, BLOCK_SIZE, MAX_BLOCKS, MIN_BLOCKS, SFS};
pub use crate::node::{FileType, Inum, INODE_CAPACITY, ROOT_INUM, S_IFDIR, S_IFMT, S_IFREG};
pub use crate::shared::SharedFs;
