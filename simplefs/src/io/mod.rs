mod block;
mod disk;
mod diskemu;

pub use block::{BlockNumber, BlockStorage};
pub use disk::{Block, Disk};
pub use diskemu::{FileBlockEmulator, FileBlockEmulatorBuilder};
