use std::sync::Arc;

use vfs::{DirEntry, Error, FileSystem, MountTable};

struct Fixed(u64);

impl FileSystem for Fixed {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn root(&self) -> u64 {
        1
    }

    fn get_directory(&self, _dir: u64) -> Result<Vec<DirEntry>, Error> {
        Ok(Vec::new())
    }

    fn read_file(&self, _file: &DirEntry, _offset: u64, _buf: &mut [u8]) -> Result<(), Error> {
        Err(Error::NotFound)
    }

    fn write_file(&self, _file: &mut DirEntry, _offset: u64, _buf: &[u8]) -> Result<(), Error> {
        Err(Error::NotFound)
    }

    fn truncate_file(&self, _file: &mut DirEntry, _len: u64) -> Result<(), Error> {
        Err(Error::NotFound)
    }

    fn create_file(&self, _dir: u64, _name: &str, _size: u64) -> Result<u64, Error> {
        Err(Error::OutOfSpace)
    }

    fn create_directory(&self, _dir: u64, _name: &str) -> Result<u64, Error> {
        Err(Error::OutOfSpace)
    }

    fn unlink_file(&self, _dir: u64, _name: &str) -> Result<(), Error> {
        Err(Error::NotFound)
    }

    fn unlink_dir(&self, _dir: u64, _name: &str) -> Result<(), Error> {
        Err(Error::NotFound)
    }

    fn free_space(&self) -> u64 {
        self.0
    }
}

#[test]
fn longest_prefix_wins() {
    let table = MountTable::new();
    table.attach("/", Arc::new(Fixed(1))).unwrap();
    table.attach("/harddisk/", Arc::new(Fixed(2))).unwrap();

    assert_eq!(2, table.free_space("/harddisk/apps/edit").unwrap());
    assert_eq!(2, table.free_space("/harddisk").unwrap());
    assert_eq!(1, table.free_space("/harddiskette").unwrap());

    let (_, rest) = table.resolve("/harddisk/apps/edit").unwrap();
    assert_eq!("apps/edit", rest);
    let (_, rest) = table.resolve("/devices").unwrap();
    assert_eq!("devices", rest);
}

#[test]
fn attach_and_detach() {
    let table = MountTable::default();
    assert_eq!(Err(Error::NotMounted), table.free_space("/x"));
    assert_eq!(Err(Error::InvalidArgument), table.attach("x", Arc::new(Fixed(0))));

    table.attach("/x", Arc::new(Fixed(7))).unwrap();
    assert_eq!(
        Err(Error::AlreadyExists),
        table.attach("/x/", Arc::new(Fixed(8)))
    );

    let fs = table.detach("/x").unwrap();
    assert_eq!("fixed", fs.name());
    assert!(table.detach("/x").is_err());
}

#[test]
fn last_error_is_recorded() {
    vfs::clear_last_error();
    assert_eq!(None, vfs::last_error());

    let ok: Result<u32, Error> = vfs::record(Ok(3));
    assert_eq!(Ok(3), ok);
    assert_eq!(None, vfs::last_error());

    let err: Result<u32, Error> = vfs::record(Err(Error::DirectoryNotEmpty));
    assert!(err.is_err());
    assert_eq!(Some(Error::DirectoryNotEmpty), vfs::last_error());
    assert_eq!("directory not empty", Error::DirectoryNotEmpty.to_string());
}
