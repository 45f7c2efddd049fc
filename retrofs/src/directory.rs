//! 目录块链
//!
//! 一个目录由若干目录块串成单向链表，链头的起始扇区就是目录的inode。
//! 每块第一个半扇区是[`DirHeader`]，其余是[`DirEntry`]槽位；
//! 槽位从前往后紧密排列，第一个空槽之后不再有目录项。

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::ops::ControlFlow;

use vfs::{DirEntryType, Error};

use crate::config::{DIR_BLOCK_BYTES, DIR_BLOCK_SECTORS, ENTRIES_PER_BLOCK, MAX_NAME, SECTOR_SIZE, WALK_LIMIT};
use crate::disk::{zeroed, Disk};
use crate::layout::{DirEntry, DirHeader, OnDisk};
use crate::sector::SectorId;
use crate::{Inode, RetroFs};

const SLOT: usize = SECTOR_SIZE / 2;

/// 内存中的一个完整目录块
pub(crate) struct DirBlock {
    sector: SectorId,
    data: Box<[u8]>,
}

impl DirBlock {
    /// 清零的新块，只有头部
    pub fn new(sector: SectorId, title: &[u8], parent: SectorId) -> Result<Self, Error> {
        let mut block = Self {
            sector,
            data: zeroed(DIR_BLOCK_BYTES)?.into_boxed_slice(),
        };
        *block.header_mut() = DirHeader::new(title, parent);
        Ok(block)
    }

    /// 读取并校验头部
    pub fn read(disk: &Disk, sector: SectorId) -> Result<Self, Error> {
        let mut data = zeroed(DIR_BLOCK_BYTES)?.into_boxed_slice();
        disk.read_device(sector, &mut data)?;

        let block = Self { sector, data };
        if !block.header().is_valid() {
            let sectors = block.header().sectors();
            log::error!("rfs: broken directory block at {sector}, declared {sectors} sectors");
            return Err(Error::Corruption);
        }
        Ok(block)
    }

    pub fn write(&self, disk: &Disk) -> Result<(), Error> {
        disk.write_device(self.sector, &self.data)
    }

    #[inline]
    pub fn sector(&self) -> SectorId {
        self.sector
    }

    #[inline]
    pub fn header(&self) -> &DirHeader {
        DirHeader::view(&self.data[..SLOT])
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut DirHeader {
        DirHeader::view_mut(&mut self.data[..SLOT])
    }

    #[inline]
    pub fn entry(&self, slot: usize) -> &DirEntry {
        let offset = (slot + 1) * SLOT;
        DirEntry::view(&self.data[offset..offset + SLOT])
    }

    #[inline]
    pub fn entry_mut(&mut self, slot: usize) -> &mut DirEntry {
        let offset = (slot + 1) * SLOT;
        DirEntry::view_mut(&mut self.data[offset..offset + SLOT])
    }

    /// 已用槽位数，即第一个空槽的下标
    pub fn used(&self) -> usize {
        (0..ENTRIES_PER_BLOCK)
            .find(|&slot| self.entry(slot).is_empty())
            .unwrap_or(ENTRIES_PER_BLOCK)
    }

    pub fn first_empty(&self) -> Option<usize> {
        Some(self.used()).filter(|&used| used < ENTRIES_PER_BLOCK)
    }

    pub fn find(&self, name: &[u8]) -> Option<usize> {
        (0..self.used()).find(|&slot| self.entry(slot).name_matches(name))
    }

    /// 删除一个槽位，后面的目录项前移，最后一个已用槽位清空
    pub fn remove(&mut self, slot: usize) {
        let used = self.used();
        debug_assert!(slot < used);

        let begin = (slot + 1) * SLOT;
        let end = (used + 1) * SLOT;
        self.data.copy_within(begin + SLOT..end, begin);
        *self.entry_mut(used - 1) = DirEntry::EMPTY;
    }
}

/// 目录项在磁盘上的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// 所在目录块的起始扇区
    pub block: SectorId,
    /// 块内槽位
    pub slot: usize,
    pub inode: Inode,
}

/// 名字非空、不含`/`与NUL，且能放进定长字段
///
/// 磁盘上的名字不一定是UTF-8，这里只看字节。
pub(crate) fn check_name(name: &[u8]) -> Result<&[u8], Error> {
    if name.is_empty() || name.len() >= MAX_NAME || name.iter().any(|&b| b == b'/' || b == 0) {
        log::debug!("rfs: rejected name {:?}", String::from_utf8_lossy(name));
        return Err(Error::InvalidArgument);
    }
    Ok(name)
}

impl RetroFs {
    /// 目录
    ///
    /// 列出目录链上的所有目录项。
    pub fn list(&self, dir: SectorId) -> Result<Vec<Inode>, Error> {
        let _ns = self.lock_namespace();
        self.read_dir(dir)
    }

    /// 目录
    ///
    /// 不区分大小写地查找目录项。
    pub fn locate_entry(&self, dir: SectorId, name: &str) -> Result<Location, Error> {
        let _ns = self.lock_namespace();
        let (block, slot) = self
            .locate(dir, check_name(name.as_bytes())?)?
            .ok_or(Error::NotFound)?;
        Ok(Location {
            block: block.sector(),
            slot,
            inode: Inode::from_entry(dir, block.entry(slot)),
        })
    }

    /// 目录
    ///
    /// 写入`entry`：同名目录项原地覆盖，否则放入链上第一个空槽，链满时追加新块。
    /// `reserved`为`None`时保留已有的预留扇区数。
    pub fn upsert_directory_entry(&self, entry: &Inode, reserved: Option<u64>) -> Result<(), Error> {
        let _ns = self.lock_namespace();
        self.upsert(entry, reserved)
    }

    /// 目录
    ///
    /// 删除目录项，块内后续目录项前移。变空的块仍留在链上。
    pub fn delete_directory_entry(&self, entry: &Inode) -> Result<(), Error> {
        let _ns = self.lock_namespace();
        let (block, slot) = self
            .locate(entry.parent(), check_name(entry.raw_name())?)?
            .ok_or(Error::NotFound)?;
        self.delete(block, slot)
    }

    /// 目录
    ///
    /// 在`parent`下创建目录，返回新目录块的起始扇区。
    pub fn create_directory(&self, parent: SectorId, name: &str) -> Result<SectorId, Error> {
        let _ns = self.lock_namespace();
        let raw_name = check_name(name.as_bytes())?;
        if self.locate(parent, raw_name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let start = self.allocate(DIR_BLOCK_SECTORS)?;
        let inode = Inode::new(parent, name, DirEntryType::Directory, start, 0, DIR_BLOCK_SECTORS);
        let created = DirBlock::new(start, raw_name, parent)
            .and_then(|block| block.write(self.disk()))
            .and_then(|_| self.upsert(&inode, Some(DIR_BLOCK_SECTORS)));
        if let Err(err) = created {
            log::debug!("rfs: create_directory {name:?} failed, rolling back {start}");
            self.release(start, DIR_BLOCK_SECTORS);
            return Err(err);
        }

        log::debug!("rfs: created directory {name:?} at {start} in {parent}");
        Ok(start)
    }
}

impl RetroFs {
    /// 沿链遍历目录块，`visit`返回`Break`时提前结束
    ///
    /// 重复访问同一块或超过[`WALK_LIMIT`]都视为链上有环。
    pub(crate) fn walk<T>(
        &self,
        head: SectorId,
        mut visit: impl FnMut(DirBlock) -> Result<ControlFlow<T>, Error>,
    ) -> Result<Option<T>, Error> {
        if head.is_null() {
            return Err(Error::InvalidArgument);
        }
        let mut visited = BTreeSet::new();
        let mut walked = 0;
        let mut current = head;

        while !current.is_null() {
            walked += 1;
            if walked > WALK_LIMIT || !visited.insert(current) {
                log::error!("rfs: directory chain from {head} revisits {current}, cycle suspected");
                return Err(Error::CycleDetected);
            }

            let block = DirBlock::read(self.disk(), current)?;
            let next = block.header().continuation();
            log::trace!("rfs: walk {current} -> {next}");
            if let ControlFlow::Break(found) = visit(block)? {
                return Ok(Some(found));
            }
            current = next;
        }
        Ok(None)
    }

    pub(crate) fn read_dir(&self, dir: SectorId) -> Result<Vec<Inode>, Error> {
        let mut inodes = Vec::new();
        self.walk(dir, |block| {
            for slot in 0..block.used() {
                inodes.push(Inode::from_entry(dir, block.entry(slot)));
            }
            Ok(ControlFlow::<()>::Continue(()))
        })?;
        Ok(inodes)
    }

    pub(crate) fn locate(&self, dir: SectorId, name: &[u8]) -> Result<Option<(DirBlock, usize)>, Error> {
        self.walk(dir, |block| {
            Ok(match block.find(name) {
                Some(slot) => ControlFlow::Break((block, slot)),
                None => ControlFlow::Continue(()),
            })
        })
    }

    /// 按名字查找并复制出目录项
    pub(crate) fn lookup(&self, dir: SectorId, name: &[u8]) -> Result<Inode, Error> {
        let (block, slot) = self.locate(dir, check_name(name)?)?.ok_or(Error::NotFound)?;
        Ok(Inode::from_entry(dir, block.entry(slot)))
    }

    /// 句柄可能已经过期，以磁盘上的目录项为准
    pub(crate) fn refresh(&self, inode: &Inode) -> Result<Inode, Error> {
        self.lookup(inode.parent(), inode.raw_name())
    }

    pub(crate) fn upsert(&self, entry: &Inode, reserved: Option<u64>) -> Result<(), Error> {
        let name = check_name(entry.raw_name())?;
        let mut vacant: Option<(DirBlock, usize)> = None;
        let mut tail: Option<DirBlock> = None;

        let updated = self.walk(entry.parent(), |mut block| {
            if let Some(slot) = block.find(name) {
                let keep = block.entry(slot).sector_length();
                *block.entry_mut(slot) = entry.to_entry(reserved.unwrap_or(keep));
                block.write(self.disk())?;
                return Ok(ControlFlow::Break(()));
            }
            let is_tail = block.header().continuation().is_null();
            if vacant.is_none() {
                if let Some(slot) = block.first_empty() {
                    vacant = Some((block, slot));
                    return Ok(ControlFlow::Continue(()));
                }
            }
            if is_tail {
                tail = Some(block);
            }
            Ok(ControlFlow::Continue(()))
        })?;
        if updated.is_some() {
            return Ok(());
        }

        let raw = entry.to_entry(reserved.unwrap_or(entry.reserved()));
        if let Some((mut block, slot)) = vacant {
            *block.entry_mut(slot) = raw;
            return block.write(self.disk());
        }

        // 整条链都满了，追加一个新块
        let mut tail = tail.ok_or(Error::Corruption)?;
        let next = self.allocate(DIR_BLOCK_SECTORS)?;
        let linked = DirBlock::new(next, tail.header().title(), entry.parent()).and_then(|mut block| {
            *block.entry_mut(0) = raw;
            block.write(self.disk())?;
            tail.header_mut().set_continuation(next);
            tail.write(self.disk())
        });
        if let Err(err) = linked {
            self.release(next, DIR_BLOCK_SECTORS);
            return Err(err);
        }

        log::debug!(
            "rfs: directory {} extended with block {next} after {}",
            entry.parent(),
            tail.sector()
        );
        Ok(())
    }

    pub(crate) fn delete(&self, mut block: DirBlock, slot: usize) -> Result<(), Error> {
        block.remove(slot);
        block.write(self.disk())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enumflags2::BitFlags;

    fn named(name: &str) -> DirEntry {
        DirEntry::new(name.as_bytes(), BitFlags::empty(), SectorId::new(100), 0, 1)
    }

    #[test]
    fn remove_compacts_within_block() {
        let mut block = DirBlock::new(SectorId::new(1), b"", SectorId::NULL).unwrap();
        for (slot, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
            *block.entry_mut(slot) = named(name);
        }
        assert_eq!(4, block.used());

        block.remove(1);
        assert_eq!(3, block.used());
        assert_eq!(b"a", block.entry(0).name());
        assert_eq!(b"c", block.entry(1).name());
        assert_eq!(b"d", block.entry(2).name());
        assert!(block.entry(3).is_empty());

        block.remove(2);
        assert_eq!(2, block.used());
        assert_eq!(Some(1), block.find(b"C"));
        assert_eq!(None, block.find(b"d"));
    }

    #[test]
    fn full_block_has_no_empty_slot() {
        let mut block = DirBlock::new(SectorId::new(1), b"", SectorId::NULL).unwrap();
        for slot in 0..ENTRIES_PER_BLOCK {
            *block.entry_mut(slot) = named("x");
        }
        assert_eq!(ENTRIES_PER_BLOCK, block.used());
        assert_eq!(None, block.first_empty());

        block.remove(ENTRIES_PER_BLOCK - 1);
        assert_eq!(Some(ENTRIES_PER_BLOCK - 1), block.first_empty());
    }

    #[test]
    fn names() {
        assert!(check_name(b"").is_err());
        assert!(check_name(b"a/b").is_err());
        assert!(check_name(b"nul\0").is_err());
        assert!(check_name(&[b'n'; MAX_NAME]).is_err());
        assert!(check_name(&[b'n'; MAX_NAME - 1]).is_ok());
        assert!(check_name(&[0xff, 0xfe, b'x']).is_ok());
    }
}
