use simplefs::io::FileBlockEmulatorBuilder;
use simplefs::{SFSError, S_IFDIR, S_IFREG, SFS};

pub fn main() -> Result<(), SFSError> {
    env_logger::init();

    let tmp = tempfile::tempfile()?;
    let dev = FileBlockEmulatorBuilder::from(tmp)
        .with_block_size(64)
        .build()?;

    // format a new file system on the device and build a small tree
    let mut sfs = SFS::format(dev)?;
    sfs.create("/etc", S_IFDIR | 0o755)?;
    sfs.create("/etc/motd", S_IFREG | 0o644)?;
    sfs.write("/etc/motd", b"hello from simplefs\n", 0)?;
    sfs.link("/etc/motd", "/motd")?;

    for (name, stat) in sfs.readdir("/")? {
        println!("{:>4} {:o} {:>2} {:>5} /{}", stat.ino, stat.mode, stat.nlink, stat.size, name);
    }
    let motd = sfs.read("/motd", 64, 0)?;
    print!("{}", String::from_utf8_lossy(&motd));

    let stats = sfs.statfs();
    println!(
        "{} of {} blocks free, {} of {} inodes free",
        stats.free_blocks, stats.blocks, stats.free_inodes, stats.inodes
    );
    sfs.close()?;
    Ok(())
}
