use crate::fs::SFSError;
use crate::io::{BlockStorage, Disk};
use crate::node::{InodeTable, Inum, ROOT_INUM};

use std::mem::size_of;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Bytes reserved for a name, the last one always stays NUL.
pub const DIR_NAME_LEN: usize = 48;
/// Number of entries a directory block holds. Directories never grow past it.
pub const DIR_CAPACITY: usize = 32;

const ENTRIES_LEN: usize = DIR_CAPACITY * size_of::<DirEntry>();

/// A single `name -> inode` record inside a directory block. A zero inode number marks
/// the slot as vacant, which is why the root can never be the target of an entry.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy)]
pub struct DirEntry {
    name: [u8; DIR_NAME_LEN],
    inum: U32<LittleEndian>,
}

impl DirEntry {
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(DIR_NAME_LEN);
        // Names are only ever written from `&str`.
        std::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    pub fn inum(&self) -> Inum {
        self.inum.get()
    }

    fn is_vacant(&self) -> bool {
        self.inum.get() == 0
    }

    fn set(&mut self, name: &str, inum: Inum) {
        self.name = [0; DIR_NAME_LEN];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
        self.inum.set(inum);
    }

    fn clear(&mut self) {
        *self = Self::new_zeroed();
    }
}

/// Checks that `name` fits in an entry and can be told apart from a path.
pub fn check_name(name: &str) -> Result<(), SFSError> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(SFSError::InvalidPath(format!("{:?} is not a valid name", name)));
    }
    if name.len() >= DIR_NAME_LEN {
        return Err(SFSError::NameTooLong);
    }
    Ok(())
}

/// A view over the entry array stored in a directory's data block.
///
/// `Directory<&[DirEntry]>` only reads, `Directory<&mut [DirEntry]>` may also insert and
/// remove. Either way the view borrows the [`Disk`], so it cannot outlive a later
/// allocation against the same storage.
pub struct Directory<E> {
    entries: E,
}

impl<'a> Directory<&'a [DirEntry]> {
    pub fn load<T: BlockStorage>(
        inodes: &InodeTable,
        disk: &'a Disk<T>,
        inum: Inum,
    ) -> Result<Self, SFSError> {
        let blocknr = dir_block(inodes, inum)?;
        let entries = DirEntry::slice_from(&disk.block(blocknr)?[..ENTRIES_LEN])
            .ok_or_else(|| SFSError::Corrupted(format!("block {} holds no entries", blocknr)))?;
        Ok(Self { entries })
    }
}

impl<'a> Directory<&'a mut [DirEntry]> {
    pub fn load_mut<T: BlockStorage>(
        inodes: &InodeTable,
        disk: &'a mut Disk<T>,
        inum: Inum,
    ) -> Result<Self, SFSError> {
        let blocknr = dir_block(inodes, inum)?;
        let entries = DirEntry::mut_slice_from(&mut disk.block_mut(blocknr)?[..ENTRIES_LEN])
            .ok_or_else(|| SFSError::Corrupted(format!("block {} holds no entries", blocknr)))?;
        Ok(Self { entries })
    }
}

fn dir_block(inodes: &InodeTable, inum: Inum) -> Result<usize, SFSError> {
    let node = inodes.get(inum)?;
    if !node.is_dir() {
        return Err(SFSError::NotADirectory);
    }
    node.content_block().ok_or_else(|| {
        SFSError::Corrupted(format!("directory {} has no content block", inum))
    })
}

impl<E: AsRef<[DirEntry]>> Directory<E> {
    /// Finds the inode number stored under `name`.
    pub fn lookup(&self, name: &str) -> Option<Inum> {
        self.occupied()
            .find(|entry| entry.name() == name)
            .map(DirEntry::inum)
    }

    /// Lists `(name, inum)` for every occupied slot, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Inum)> + '_ {
        self.occupied().map(|entry| (entry.name(), entry.inum()))
    }

    pub fn is_empty(&self) -> bool {
        self.occupied().next().is_none()
    }

    fn occupied(&self) -> impl Iterator<Item = &DirEntry> + '_ {
        self.entries.as_ref().iter().filter(|entry| !entry.is_vacant())
    }
}

impl<E: AsRef<[DirEntry]> + AsMut<[DirEntry]>> Directory<E> {
    /// Stores `name -> inum` in the first vacant slot.
    pub fn insert(&mut self, name: &str, inum: Inum) -> Result<(), SFSError> {
        check_name(name)?;
        if inum == ROOT_INUM {
            return Err(SFSError::InvalidArgument(
                "the root inode cannot be the target of an entry".to_string(),
            ));
        }
        if self.lookup(name).is_some() {
            return Err(SFSError::AlreadyExists);
        }
        let slot = self
            .entries
            .as_mut()
            .iter_mut()
            .find(|entry| entry.is_vacant())
            .ok_or(SFSError::DirectoryFull)?;
        slot.set(name, inum);
        Ok(())
    }

    /// Clears the entry stored under `name` and returns the inode it pointed at.
    pub fn remove(&mut self, name: &str) -> Result<Inum, SFSError> {
        let slot = self
            .entries
            .as_mut()
            .iter_mut()
            .find(|entry| !entry.is_vacant() && entry.name() == name)
            .ok_or(SFSError::NotFound)?;
        let inum = slot.inum();
        slot.clear();
        Ok(inum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_block() -> Vec<DirEntry> {
        vec![DirEntry::new_zeroed(); DIR_CAPACITY]
    }

    #[test]
    fn entry_array_fits_in_a_block() {
        assert_eq!(size_of::<DirEntry>(), 52);
        assert!(ENTRIES_LEN <= crate::fs::BLOCK_SIZE);
    }

    #[test]
    fn insert_then_lookup() {
        let mut entries = empty_block();
        let mut dir = Directory {
            entries: &mut entries[..],
        };
        assert!(dir.is_empty());

        dir.insert("hello.txt", 4).unwrap();
        dir.insert("notes", 9).unwrap();

        assert_eq!(dir.lookup("hello.txt"), Some(4));
        assert_eq!(dir.lookup("notes"), Some(9));
        assert_eq!(dir.lookup("hello"), None);
        assert_eq!(dir.iter().count(), 2);
        assert!(!dir.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut entries = empty_block();
        let mut dir = Directory {
            entries: &mut entries[..],
        };
        dir.insert("a", 1).unwrap();
        match dir.insert("a", 2) {
            Err(SFSError::AlreadyExists) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(dir.lookup("a"), Some(1));
    }

    #[test]
    fn full_directory_refuses_new_entries() {
        let mut entries = empty_block();
        let mut dir = Directory {
            entries: &mut entries[..],
        };
        for i in 0..DIR_CAPACITY {
            dir.insert(&format!("f{}", i), i as Inum + 1).unwrap();
        }
        match dir.insert("overflow", 99) {
            Err(SFSError::DirectoryFull) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(dir.iter().count(), DIR_CAPACITY);

        // A freed slot is reused.
        dir.remove("f3").unwrap();
        dir.insert("overflow", 99).unwrap();
        assert_eq!(dir.lookup("overflow"), Some(99));
    }

    #[test]
    fn remove_clears_the_slot() {
        let mut entries = empty_block();
        {
            let mut dir = Directory {
                entries: &mut entries[..],
            };
            dir.insert("gone", 5).unwrap();
            assert_eq!(dir.remove("gone").unwrap(), 5);
            assert!(dir.is_empty());
            assert!(matches!(dir.remove("gone"), Err(SFSError::NotFound)));
        }
        assert!(entries.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn root_cannot_be_an_entry_target() {
        let mut entries = empty_block();
        let mut dir = Directory {
            entries: &mut entries[..],
        };
        assert!(matches!(
            dir.insert("root", ROOT_INUM),
            Err(SFSError::InvalidArgument(_))
        ));
        assert!(dir.is_empty());
    }

    #[test]
    fn names_are_bounded() {
        let longest = "x".repeat(DIR_NAME_LEN - 1);
        assert!(check_name(&longest).is_ok());
        assert!(matches!(
            check_name(&"x".repeat(DIR_NAME_LEN)),
            Err(SFSError::NameTooLong)
        ));
        assert!(check_name("").is_err());
        assert!(check_name("a/b").is_err());

        let mut entries = empty_block();
        let mut dir = Directory {
            entries: &mut entries[..],
        };
        dir.insert(&longest, 3).unwrap();
        assert_eq!(dir.iter().next(), Some((longest.as_str(), 3)));
    }

    #[test]
    fn read_only_view_sees_inserted_entries() {
        let mut entries = empty_block();
        Directory {
            entries: &mut entries[..],
        }
        .insert("x", 2)
        .unwrap();

        let dir = Directory {
            entries: &entries[..],
        };
        assert_eq!(dir.lookup("x"), Some(2));
    }
}
