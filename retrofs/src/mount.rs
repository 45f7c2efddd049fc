//! 接入VFS

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use vfs::{record, DirEntry, DirEntryType, Error, FileSystem, MountTable};

use crate::sector::SectorId;
use crate::{Inode, RetroFs};

impl Inode {
    /// 只带定位信息的句柄，其余字段在操作时从磁盘刷新
    fn from_dirent(entry: &DirEntry) -> Self {
        Self::new(
            entry.parent.into(),
            &entry.name,
            entry.ty,
            entry.inode.into(),
            entry.size,
            0,
        )
    }

    fn sync_dirent(&self, entry: &mut DirEntry) {
        entry.inode = self.start().into();
        entry.size = self.size();
    }
}

impl FileSystem for RetroFs {
    fn name(&self) -> &'static str {
        "rfs"
    }

    fn root(&self) -> u64 {
        RetroFs::root(self).into()
    }

    fn get_directory(&self, dir: u64) -> Result<Vec<DirEntry>, Error> {
        record(self.list(dir.into())).map(|inodes| inodes.iter().map(Inode::to_dirent).collect())
    }

    fn read_file(&self, file: &DirEntry, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        record(RetroFs::read_file(self, &Inode::from_dirent(file), offset, buf))
    }

    fn write_file(&self, file: &mut DirEntry, offset: u64, buf: &[u8]) -> Result<(), Error> {
        let mut inode = Inode::from_dirent(file);
        record(RetroFs::write_file(self, &mut inode, offset, buf))?;
        inode.sync_dirent(file);
        Ok(())
    }

    fn truncate_file(&self, file: &mut DirEntry, len: u64) -> Result<(), Error> {
        let mut inode = Inode::from_dirent(file);
        record(RetroFs::truncate_file(self, &mut inode, len))?;
        inode.sync_dirent(file);
        Ok(())
    }

    fn create_file(&self, dir: u64, name: &str, size: u64) -> Result<u64, Error> {
        record(RetroFs::create_file(self, dir.into(), name, size)).map(SectorId::into)
    }

    fn create_directory(&self, dir: u64, name: &str) -> Result<u64, Error> {
        record(RetroFs::create_directory(self, dir.into(), name)).map(SectorId::into)
    }

    fn unlink_file(&self, dir: u64, name: &str) -> Result<(), Error> {
        let file = Inode::new(dir.into(), name, DirEntryType::Regular, SectorId::NULL, 0, 0);
        record(RetroFs::unlink_file(self, &file))
    }

    fn unlink_dir(&self, dir: u64, name: &str) -> Result<(), Error> {
        let target = Inode::new(dir.into(), name, DirEntryType::Directory, SectorId::NULL, 0, 0);
        record(RetroFs::unlink_dir(self, &target))
    }

    fn free_space(&self) -> u64 {
        self.get_free_space()
    }
}

/// 挂载设备上的卷（GPT分区或整盘）并接到`table`的`path`上
pub fn attach(
    dev: Arc<dyn BlockDevice>,
    path: &str,
    table: &MountTable,
) -> Result<Arc<RetroFs>, Error> {
    let fs = Arc::new(record(RetroFs::mount(dev))?);
    record(table.attach(path, fs.clone()))?;
    log::info!(
        "rfs: attached at {path}, {} KiB free",
        fs.get_free_space() / 1024
    );
    Ok(fs)
}
