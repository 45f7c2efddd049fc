use alloc::vec::Vec;

use crate::{DirEntry, Error};

/// 挂载到VFS上的文件系统
///
/// 目录以其inode（起始扇区）标识，文件以[`DirEntry`]标识。
/// 会移动文件数据的操作负责更新传入的[`DirEntry`]。
pub trait FileSystem: Send + Sync {
    fn name(&self) -> &'static str;

    /// 根目录的inode
    fn root(&self) -> u64;

    fn get_directory(&self, dir: u64) -> Result<Vec<DirEntry>, Error>;

    fn read_file(&self, file: &DirEntry, offset: u64, buf: &mut [u8]) -> Result<(), Error>;

    fn write_file(&self, file: &mut DirEntry, offset: u64, buf: &[u8]) -> Result<(), Error>;

    fn truncate_file(&self, file: &mut DirEntry, len: u64) -> Result<(), Error>;

    /// 返回新文件的inode
    fn create_file(&self, dir: u64, name: &str, size: u64) -> Result<u64, Error>;

    /// 返回新目录的inode
    fn create_directory(&self, dir: u64, name: &str) -> Result<u64, Error>;

    fn unlink_file(&self, dir: u64, name: &str) -> Result<(), Error>;

    fn unlink_dir(&self, dir: u64, name: &str) -> Result<(), Error>;

    /// 剩余字节数
    fn free_space(&self) -> u64;
}
