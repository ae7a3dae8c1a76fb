//! Exercises the public surface over a real file on disk instead of the
//! in-memory stand-in the unit tests use everywhere else — the "external
//! block device" boundary the way an actual consumer would approach it.

use std::sync::Arc;

use sectorfs::device::FileDisk;
use sectorfs::filesystem::Filesystem;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn format_write_close_remount_round_trips_through_a_real_file() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");

    {
        let disk = FileDisk::create(&path, 4096).unwrap();
        let fs = Filesystem::format(Arc::new(disk)).unwrap();
        let root = fs.root_inode();

        fs.create(&root, "/notes.txt", 0, false).unwrap();
        let mut handle = fs.open_by_path(&root, "/notes.txt").unwrap();
        let payload = b"persisted across a real file-backed device";
        handle.write(payload).unwrap();
        handle.close();

        fs.create(&root, "/dir", 0, true).unwrap();
        let sub = fs.chdir(&root, "/dir").unwrap();
        fs.create(&sub, "child.bin", 0, false).unwrap();
        fs.close_inode(sub);

        fs.close_inode(root);
        fs.unmount();
    }

    // Nothing survives between this block and the one above except the
    // bytes written to `path` itself.
    let disk = FileDisk::open(&path).unwrap();
    let fs = Filesystem::mount(Arc::new(disk)).unwrap();
    let root = fs.root_inode();

    let mut handle = fs.open_by_path(&root, "/notes.txt").unwrap();
    let mut out = vec![0u8; "persisted across a real file-backed device".len()];
    handle.read(&mut out).unwrap();
    assert_eq!(&out, b"persisted across a real file-backed device");

    let child = fs.open_by_path(&root, "/dir/child.bin").unwrap();
    assert_eq!(child.length().unwrap(), 0);

    fs.close_inode(root);
    fs.unmount();
}
