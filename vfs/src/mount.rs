use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::{Error, FileSystem};

/// 挂载点到文件系统的映射
pub struct MountTable {
    mounts: Mutex<Vec<(String, Arc<dyn FileSystem>)>>,
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    pub const fn new() -> Self {
        Self {
            mounts: Mutex::new(Vec::new()),
        }
    }

    pub fn attach(&self, path: &str, fs: Arc<dyn FileSystem>) -> Result<(), Error> {
        let path = normalize(path)?;
        let mut mounts = self.mounts.lock();
        if mounts.iter().any(|(p, _)| *p == path) {
            return Err(Error::AlreadyExists);
        }
        mounts.push((path.to_string(), fs));
        Ok(())
    }

    pub fn detach(&self, path: &str) -> Result<Arc<dyn FileSystem>, Error> {
        let path = normalize(path)?;
        let mut mounts = self.mounts.lock();
        let index = mounts
            .iter()
            .position(|(p, _)| *p == path)
            .ok_or(Error::NotMounted)?;
        Ok(mounts.swap_remove(index).1)
    }

    /// 按最长前缀找到路径所在的文件系统，同时返回挂载点之后的部分
    pub fn resolve<'p>(&self, path: &'p str) -> Result<(Arc<dyn FileSystem>, &'p str), Error> {
        if !path.starts_with('/') {
            return Err(Error::InvalidArgument);
        }
        let mounts = self.mounts.lock();
        mounts
            .iter()
            .filter_map(|(mount, fs)| {
                let rest = strip_mount(path, mount)?;
                Some((mount.len(), fs, rest))
            })
            .max_by_key(|(len, ..)| *len)
            .map(|(_, fs, rest)| (Arc::clone(fs), rest))
            .ok_or(Error::NotMounted)
    }

    pub fn free_space(&self, path: &str) -> Result<u64, Error> {
        self.resolve(path).map(|(fs, _)| fs.free_space())
    }
}

fn normalize(path: &str) -> Result<&str, Error> {
    if !path.starts_with('/') {
        return Err(Error::InvalidArgument);
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/" } else { trimmed })
}

/// `path`位于挂载点`mount`之下时返回剩余的相对路径
fn strip_mount<'p>(path: &'p str, mount: &str) -> Option<&'p str> {
    if mount == "/" {
        return Some(path.trim_start_matches('/'));
    }
    let rest = path.strip_prefix(mount)?;
    match rest.strip_prefix('/') {
        Some(rest) => Some(rest),
        None if rest.is_empty() => Some(rest),
        None => None,
    }
}
