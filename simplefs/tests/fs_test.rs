use std::time::{Duration, UNIX_EPOCH};

use simplefs::io::{FileBlockEmulator, FileBlockEmulatorBuilder};
use simplefs::{FileType, SFSError, BLOCK_SIZE, DIR_CAPACITY, S_IFDIR, S_IFREG, SFS};
use tempfile::NamedTempFile;

const FILE: u32 = S_IFREG | 0o644;
const DIR: u32 = S_IFDIR | 0o755;

fn device(file: std::fs::File, clear: bool) -> FileBlockEmulator {
  FileBlockEmulatorBuilder::from(file)
    .with_block_size(64)
    .clear_medium(clear)
    .build()
    .unwrap()
}

fn new_fs() -> SFS<FileBlockEmulator> {
  SFS::format(device(tempfile::tempfile().unwrap(), true)).unwrap()
}

#[test]
fn can_initialize_disk_with_filesystem() {
  let tf = NamedTempFile::new().unwrap();

  // Prepare the block with filesystem layout.
  SFS::format(device(tf.reopen().unwrap(), true))
    .unwrap()
    .close()
    .unwrap();

  // Open filesystem and verify init layout.
  let fs = SFS::open(device(tf.reopen().unwrap(), false)).unwrap();
  assert_eq!(fs.resolve("/").unwrap(), 0);
  assert!(fs.readdir("/").unwrap().is_empty());
}

#[test]
fn unformatted_blocks_are_rejected() {
  let tf = NamedTempFile::new().unwrap();
  match SFS::open(device(tf.reopen().unwrap(), true)) {
    Err(SFSError::Corrupted(_)) => (),
    Err(e) => panic!("unexpected error {:?}", e),
    Ok(_) => panic!("opened an unformatted disk"),
  }
}

#[test]
fn tree_survives_remount() {
  let tf = NamedTempFile::new().unwrap();
  let mut fs = SFS::format(device(tf.reopen().unwrap(), true)).unwrap();
  fs.create("/docs", DIR).unwrap();
  fs.create("/docs/readme", FILE).unwrap();
  fs.write("/docs/readme", b"persisted", 0).unwrap();
  let free = fs.statfs();
  fs.close().unwrap();

  let mut fs = SFS::open(device(tf.reopen().unwrap(), false)).unwrap();
  assert_eq!(fs.read("/docs/readme", 100, 0).unwrap(), b"persisted".to_vec());
  assert_eq!(fs.statfs(), free);

  // Allocation state came back too: new files do not collide with old ones.
  let readme = fs.resolve("/docs/readme").unwrap();
  let other = fs.create("/other", FILE).unwrap();
  assert_ne!(readme, other);
}

#[test]
fn created_file_is_listed_in_parent() {
  let mut fs = new_fs();
  fs.create("/dir", DIR).unwrap();
  let inum = fs.create("/dir/file", FILE).unwrap();

  assert_eq!(fs.resolve("/dir/file").unwrap(), inum);
  let listing = fs.readdir("/dir").unwrap();
  assert_eq!(listing.len(), 1);
  assert_eq!(listing[0].0, "file");
  assert_eq!(listing[0].1.ino, inum);
  assert_eq!(listing[0].1.kind, FileType::RegularFile);
}

#[test]
fn create_twice_already_exists() {
  let mut fs = new_fs();
  fs.create("/a", FILE).unwrap();
  assert!(matches!(fs.create("/a", FILE), Err(SFSError::AlreadyExists)));
  assert!(matches!(fs.create("/a", DIR), Err(SFSError::AlreadyExists)));
}

#[test]
fn write_then_read_returns_same_bytes() {
  let mut fs = new_fs();
  fs.create("/blob", FILE).unwrap();

  let bytes: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
  assert_eq!(fs.write("/blob", &bytes, 0).unwrap(), BLOCK_SIZE);
  assert_eq!(fs.read("/blob", BLOCK_SIZE, 0).unwrap(), bytes);
  assert_eq!(fs.stat("/blob").unwrap().size, BLOCK_SIZE as u64);
}

#[test]
fn hard_link_outlives_original_name() {
  let mut fs = new_fs();
  let inum = fs.create("/a", FILE).unwrap();
  fs.write("/a", b"hello", 0).unwrap();

  fs.link("/a", "/b").unwrap();
  assert_eq!(fs.stat("/b").unwrap().nlink, 2);

  fs.unlink("/a").unwrap();
  assert_eq!(fs.read("/b", 5, 0).unwrap(), b"hello".to_vec());
  assert_eq!(fs.stat("/b").unwrap().nlink, 1);
  assert!(matches!(fs.resolve("/a"), Err(SFSError::NotFound)));

  let free = fs.statfs();
  fs.unlink("/b").unwrap();
  let after = fs.statfs();
  assert_eq!(after.free_inodes, free.free_inodes + 1);
  assert_eq!(after.free_blocks, free.free_blocks + 1);

  // The slot is allocatable again.
  assert_eq!(fs.create("/c", FILE).unwrap(), inum);
}

#[test]
fn unlink_missing_entry_is_not_found() {
  let mut fs = new_fs();
  assert!(matches!(fs.unlink("/ghost"), Err(SFSError::NotFound)));
  assert!(matches!(fs.unlink("/no/ghost"), Err(SFSError::NotFound)));
}

#[test]
fn rmdir_requires_empty_directory() {
  let mut fs = new_fs();
  fs.create("/dir", DIR).unwrap();
  fs.create("/dir/f", FILE).unwrap();

  assert!(matches!(fs.rmdir("/dir"), Err(SFSError::DirectoryNotEmpty)));
  assert!(fs.resolve("/dir/f").is_ok());

  fs.unlink("/dir/f").unwrap();
  fs.rmdir("/dir").unwrap();
  assert!(fs.readdir("/").unwrap().is_empty());
}

#[test]
fn full_directory_keeps_its_entries() {
  let mut fs = new_fs();
  fs.create("/d", DIR).unwrap();
  for i in 0..DIR_CAPACITY {
    fs.create(format!("/d/{}", i), FILE).unwrap();
  }

  assert!(matches!(
    fs.create("/d/extra", FILE),
    Err(SFSError::DirectoryFull)
  ));
  assert_eq!(fs.readdir("/d").unwrap().len(), DIR_CAPACITY);
  assert!(matches!(fs.resolve("/d/extra"), Err(SFSError::NotFound)));

  // Links into a full directory fail without touching the source.
  fs.create("/src", FILE).unwrap();
  assert!(matches!(
    fs.link("/src", "/d/extra"),
    Err(SFSError::DirectoryFull)
  ));
  assert_eq!(fs.stat("/src").unwrap().nlink, 1);
}

#[test]
fn rename_moves_content() {
  let mut fs = new_fs();
  let inum = fs.create("/old", FILE).unwrap();
  fs.write("/old", b"data", 0).unwrap();
  fs.create("/dir", DIR).unwrap();

  fs.rename("/old", "/dir/new").unwrap();

  assert!(matches!(fs.resolve("/old"), Err(SFSError::NotFound)));
  assert_eq!(fs.resolve("/dir/new").unwrap(), inum);
  assert_eq!(fs.read("/dir/new", 4, 0).unwrap(), b"data".to_vec());
  assert_eq!(fs.stat("/dir/new").unwrap().nlink, 1);
}

#[test]
fn rename_onto_existing_name_keeps_both() {
  let mut fs = new_fs();
  fs.create("/a", FILE).unwrap();
  fs.create("/b", FILE).unwrap();
  fs.write("/a", b"a", 0).unwrap();

  assert!(matches!(fs.rename("/a", "/b"), Err(SFSError::AlreadyExists)));
  assert_eq!(fs.read("/a", 1, 0).unwrap(), b"a".to_vec());
  assert_eq!(fs.stat("/a").unwrap().nlink, 1);
}

#[test]
fn rename_of_missing_source_fails() {
  let mut fs = new_fs();
  assert!(matches!(fs.rename("/nope", "/x"), Err(SFSError::NotFound)));
  assert!(matches!(fs.resolve("/x"), Err(SFSError::NotFound)));
}

#[test]
fn chmod_round_trips_through_stat() {
  let mut fs = new_fs();
  fs.create("/f", FILE).unwrap();
  fs.chmod("/f", S_IFREG | 0o600).unwrap();
  assert_eq!(fs.stat("/f").unwrap().mode, S_IFREG | 0o600);

  fs.create("/d", DIR).unwrap();
  fs.chmod("/d", 0o700).unwrap();
  let stat = fs.stat("/d").unwrap();
  assert_eq!(stat.permissions(), 0o700);
  assert_eq!(stat.kind, FileType::Directory);

  assert!(matches!(fs.chmod("/missing", 0o600), Err(SFSError::NotFound)));
}

#[test]
fn set_time_updates_stat() {
  let mut fs = new_fs();
  fs.create("/f", FILE).unwrap();
  let atime = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
  let mtime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

  fs.set_time("/f", atime, mtime).unwrap();
  let stat = fs.stat("/f").unwrap();
  assert_eq!(stat.atime, atime);
  assert_eq!(stat.mtime, mtime);

  assert!(matches!(
    fs.set_time("/missing", atime, mtime),
    Err(SFSError::NotFound)
  ));
}

#[test]
fn set_time_accepts_extreme_times() {
  let mut fs = new_fs();
  fs.create("/f", FILE).unwrap();
  let earliest = UNIX_EPOCH - Duration::from_secs(1 << 63);

  fs.set_time("/f", earliest, earliest).unwrap();
  assert_eq!(fs.stat("/f").unwrap().atime, earliest);
  assert_eq!(fs.stat("/f").unwrap().mtime, earliest);
}

#[test]
fn rename_below_a_file_fails() {
  let mut fs = new_fs();
  fs.create("/f", FILE).unwrap();
  assert!(matches!(fs.rename("/f", "/f/x"), Err(SFSError::NotADirectory)));
  assert_eq!(SFSError::NotADirectory.errno(), 20);
  assert!(fs.resolve("/f").is_ok());
}

#[test]
fn nested_directories_resolve() {
  let mut fs = new_fs();
  fs.create("/a", DIR).unwrap();
  fs.create("/a/b", DIR).unwrap();
  fs.create("/a/b/c", DIR).unwrap();
  let leaf = fs.create("/a/b/c/leaf", FILE).unwrap();

  assert_eq!(fs.resolve("/a/b/c/leaf").unwrap(), leaf);
  assert_eq!(fs.resolve("//a//b/c/./leaf").unwrap(), leaf);
  assert!(matches!(fs.resolve("/a/x/c"), Err(SFSError::NotFound)));
  assert!(matches!(fs.resolve("/a/../a"), Err(SFSError::InvalidPath(_))));
}

#[test]
fn long_names_are_rejected_before_allocation() {
  let mut fs = new_fs();
  let before = fs.statfs();
  let name = format!("/{}", "n".repeat(60));
  assert!(matches!(fs.create(&name, FILE), Err(SFSError::NameTooLong)));
  assert_eq!(fs.statfs(), before);
}
