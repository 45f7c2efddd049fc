use alloc::string::String;

/// 文件系统与调用者之间交换的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number，即数据区的起始扇区
    pub inode: u64,
    /// 所在目录的inode
    pub parent: u64,
    pub ty: DirEntryType,
    pub name: String,
    /// 逻辑大小，目录为0
    pub size: u64,
}

impl DirEntry {
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.ty == DirEntryType::Directory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    Directory,
    #[default]
    Regular,
}
