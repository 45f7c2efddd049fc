use alloc::vec::Vec;
use core::ops::ControlFlow;

use vfs::Error;

use crate::config::DIR_BLOCK_SECTORS;
use crate::directory::check_name;
use crate::sector::SectorId;
use crate::{Inode, RetroFs};

impl RetroFs {
    /// 目录
    ///
    /// 删除文件的目录项并释放其数据区段。
    ///
    /// 目录项删除后即视为成功，区段释放失败只会泄漏空间。
    pub fn unlink_file(&self, file: &Inode) -> Result<(), Error> {
        let _ns = self.lock_namespace();
        let (block, slot) = self
            .locate(file.parent(), check_name(file.raw_name())?)?
            .ok_or(Error::NotFound)?;
        let current = Inode::from_entry(file.parent(), block.entry(slot));
        if current.is_dir() {
            return Err(Error::IsADirectory);
        }

        self.delete(block, slot)?;
        if current.reserved() > 0 {
            if let Err(err) = self.mark_extent(current.start(), current.reserved(), false) {
                log::warn!(
                    "rfs: unlinked {:?} but could not free {}+{}: {err}",
                    current.name(),
                    current.start(),
                    current.reserved()
                );
            }
        }

        log::debug!("rfs: unlinked file {:?}", current.name());
        Ok(())
    }

    /// 目录
    ///
    /// 删除空目录，释放整条目录块链。链上任何一块还有目录项时失败，不做任何修改。
    pub fn unlink_dir(&self, dir: &Inode) -> Result<(), Error> {
        let _ns = self.lock_namespace();
        let (block, slot) = self
            .locate(dir.parent(), check_name(dir.raw_name())?)?
            .ok_or(Error::NotFound)?;
        let current = Inode::from_entry(dir.parent(), block.entry(slot));
        if !current.is_dir() {
            return Err(Error::NotADirectory);
        }

        let mut chain: Vec<SectorId> = Vec::new();
        let occupied = self.walk(current.start(), |child| {
            if child.used() > 0 {
                return Ok(ControlFlow::Break(child.sector()));
            }
            chain.push(child.sector());
            Ok(ControlFlow::Continue(()))
        })?;
        if let Some(sector) = occupied {
            log::debug!("rfs: directory {:?} still has entries in block {sector}", current.name());
            return Err(Error::DirectoryNotEmpty);
        }

        self.delete(block, slot)?;
        for sector in chain {
            self.release(sector, DIR_BLOCK_SECTORS);
        }

        log::debug!("rfs: unlinked directory {:?}", current.name());
        Ok(())
    }
}
