use alloc::string::String;
use alloc::vec::Vec;

use enumflags2::BitFlags;
use vfs::{DirEntryType, Error};

use crate::config::{MAP_CHUNK_SECTORS, SECTOR_SIZE};
use crate::directory::check_name;
use crate::disk::zeroed;
use crate::layout::{DirEntry, EntryFlag};
use crate::sector::{bytes_of, sectors_for, SectorId};
use crate::RetroFs;

/// 目录项在内存中的副本，也是文件操作的句柄
///
/// 文件搬迁到新区段后，`start`与`reserved`会随之更新。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    /// 所在目录的链头
    parent: SectorId,
    /// 磁盘上的原始名字
    raw: Vec<u8>,
    /// 用于显示，非UTF-8的字节被替换
    name: String,
    kind: DirEntryType,
    /// 数据区段或目录链头的起始扇区
    start: SectorId,
    /// 逻辑长度，字节
    size: u64,
    /// 预留区段长度，扇区
    reserved: u64,
}

impl Inode {
    pub fn new(
        parent: SectorId,
        name: &str,
        kind: DirEntryType,
        start: SectorId,
        size: u64,
        reserved: u64,
    ) -> Self {
        Self {
            parent,
            raw: name.as_bytes().to_vec(),
            name: name.into(),
            kind,
            start,
            size,
            reserved,
        }
    }

    pub(crate) fn from_entry(parent: SectorId, entry: &DirEntry) -> Self {
        Self {
            parent,
            raw: entry.name().to_vec(),
            name: String::from_utf8_lossy(entry.name()).into_owned(),
            kind: if entry.is_dir() {
                DirEntryType::Directory
            } else {
                DirEntryType::Regular
            },
            start: entry.start(),
            size: entry.length(),
            reserved: entry.sector_length(),
        }
    }

    pub(crate) fn to_entry(&self, reserved: u64) -> DirEntry {
        let flags = match self.kind {
            DirEntryType::Directory => BitFlags::from_flag(EntryFlag::Directory),
            DirEntryType::Regular => BitFlags::empty(),
        };
        DirEntry::new(&self.raw, flags, self.start, self.size, reserved)
    }

    #[inline]
    pub fn parent(&self) -> SectorId {
        self.parent
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 未经转换的名字字节，按名字定位目录项时使用
    #[inline]
    pub fn raw_name(&self) -> &[u8] {
        &self.raw
    }

    #[inline]
    pub fn kind(&self) -> DirEntryType {
        self.kind
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == DirEntryType::Directory
    }

    #[inline]
    pub fn start(&self) -> SectorId {
        self.start
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// 预留区段能容纳的字节数
    #[inline]
    pub fn capacity(&self) -> u64 {
        bytes_of(self.reserved)
    }

    pub fn to_dirent(&self) -> vfs::DirEntry {
        vfs::DirEntry {
            inode: self.start.into(),
            parent: self.parent.into(),
            ty: self.kind,
            name: self.name.clone(),
            size: self.size,
        }
    }

    fn expect_file(&self) -> Result<(), Error> {
        match self.kind {
            DirEntryType::Regular => Ok(()),
            DirEntryType::Directory => Err(Error::IsADirectory),
        }
    }
}

impl RetroFs {
    /// 目录
    ///
    /// 打开`dir`下名为`name`的目录项。
    pub fn open(&self, dir: SectorId, name: &str) -> Result<Inode, Error> {
        let _ns = self.lock_namespace();
        self.lookup(dir, name.as_bytes())
    }

    /// 目录
    ///
    /// `path`: 相对于`dir`的路径，不能出现`.`或`..`，中间的每一段都必须是目录。
    pub fn find(&self, dir: SectorId, path: &str) -> Result<Inode, Error> {
        let _ns = self.lock_namespace();

        let mut cmps = path.split('/').filter(|cmp| !cmp.is_empty());
        let basename = cmps.next_back().ok_or(Error::InvalidArgument)?;
        let mut current = dir;
        for cmp in cmps {
            let inode = self.lookup(current, cmp.as_bytes())?;
            if !inode.is_dir() {
                log::error!("rfs: middle segment {cmp:?} isn't a directory");
                return Err(Error::NotADirectory);
            }
            current = inode.start;
        }
        self.lookup(current, basename.as_bytes())
    }

    /// 目录
    ///
    /// 创建文件，返回数据区段的起始扇区。
    ///
    /// 预留空间取扩展名默认值与`size`中的较大者，至少一个扇区；
    /// 区段清零后才写入目录项，任何一步失败都会释放区段。
    pub fn create_file(&self, dir: SectorId, name: &str, size: u64) -> Result<SectorId, Error> {
        let _ns = self.lock_namespace();
        let raw_name = check_name(name.as_bytes())?;
        if self.locate(dir, raw_name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let reserve = self.options().reservation.for_name(name).max(size);
        let sectors = sectors_for(reserve).max(1);
        let start = self.allocate(sectors)?;

        let inode = Inode::new(dir, name, DirEntryType::Regular, start, size, sectors);
        let created = self
            .disk()
            .clear_device(start, sectors)
            .and_then(|_| self.upsert(&inode, Some(sectors)));
        if let Err(err) = created {
            log::debug!("rfs: create_file {name:?} failed, rolling back {start}+{sectors}");
            self.release(start, sectors);
            return Err(err);
        }

        log::debug!("rfs: created {name:?} at {start}, {sectors} sectors reserved");
        Ok(start)
    }

    /// 文件
    ///
    /// 从`offset`处读满`buf`，读取范围不能超过文件的逻辑长度。
    pub fn read_file(&self, file: &Inode, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        let _ns = self.lock_namespace();
        file.expect_file()?;
        if buf.is_empty() {
            return Ok(());
        }

        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(Error::InvalidArgument)?;

        // 文件可能已被搬迁，区段与长度都以磁盘上的目录项为准
        let current = self.refresh(file)?;
        current.expect_file()?;
        if offset >= current.size || end > current.size {
            log::debug!(
                "rfs: read {}+{} past end of {:?} ({} bytes)",
                offset,
                buf.len(),
                current.name,
                current.size
            );
            return Err(Error::InvalidArgument);
        }
        self.read_range(current.start, offset, buf)
    }

    /// 文件
    ///
    /// 把`data`写到`offset`处。超出预留空间时先搬迁到更大的区段，
    /// 超出逻辑长度时更新目录项中的长度。
    pub fn write_file(&self, file: &mut Inode, offset: u64, data: &[u8]) -> Result<(), Error> {
        let _ns = self.lock_namespace();
        file.expect_file()?;
        if data.is_empty() {
            return Ok(());
        }

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(Error::InvalidArgument)?;

        *file = self.refresh(file)?;
        file.expect_file()?;
        if end > file.capacity() {
            self.extend(file, end)?;
        }

        self.write_range(file.start, offset, data)?;

        if end > file.size {
            file.size = end;
            self.upsert(file, None)?;
        }
        Ok(())
    }

    /// 文件
    ///
    /// 把文件搬迁到至少能容纳`min_bytes`字节的新区段。
    pub fn extend_and_move(&self, file: &mut Inode, min_bytes: u64) -> Result<(), Error> {
        let _ns = self.lock_namespace();
        self.extend(file, min_bytes)
    }

    /// 文件
    ///
    /// 修改逻辑长度，不能超过预留空间，也不会分配新的区段。
    pub fn truncate_file(&self, file: &mut Inode, len: u64) -> Result<(), Error> {
        let _ns = self.lock_namespace();
        file.expect_file()?;

        let mut current = self.refresh(file)?;
        current.expect_file()?;
        if len > current.capacity() {
            log::debug!(
                "rfs: truncate {:?} to {len} > reserved {}",
                current.name,
                current.capacity()
            );
            return Err(Error::TruncateBeyondReservation);
        }

        if len != current.size {
            current.size = len;
            self.upsert(&current, None)?;
        }
        *file = current;
        Ok(())
    }
}

impl RetroFs {
    fn extend(&self, file: &mut Inode, min_bytes: u64) -> Result<(), Error> {
        let current = self.refresh(file)?;
        current.expect_file()?;

        let sectors = sectors_for(min_bytes).max(1);
        if sectors <= current.reserved {
            *file = current;
            return Ok(());
        }

        let start = self.allocate(sectors)?;
        let moved = Inode {
            start,
            reserved: sectors,
            ..current.clone()
        };
        let result = self
            .disk()
            .clear_device(start, sectors)
            .and_then(|_| self.copy_bytes(current.start, start, current.size))
            .and_then(|_| self.upsert(&moved, Some(sectors)));
        if let Err(err) = result {
            log::debug!("rfs: extend {:?} failed, rolling back {start}+{sectors}", current.name);
            self.release(start, sectors);
            return Err(err);
        }

        // 目录项已指向新区段，旧区段释放失败只会泄漏空间
        if current.reserved > 0 {
            if let Err(err) = self.mark_extent(current.start, current.reserved, false) {
                log::warn!(
                    "rfs: could not free old extent {}+{} of {:?}: {err}",
                    current.start,
                    current.reserved,
                    current.name
                );
            }
        }

        log::debug!(
            "rfs: moved {:?} from {}+{} to {start}+{sectors}",
            current.name,
            current.start,
            current.reserved
        );
        *file = moved;
        Ok(())
    }

    /// 复制`bytes`字节的逻辑数据，不足一扇区的尾部之后补零
    fn copy_bytes(&self, from: SectorId, to: SectorId, bytes: u64) -> Result<(), Error> {
        let full = bytes / SECTOR_SIZE as u64;
        let tail = (bytes % SECTOR_SIZE as u64) as usize;

        let chunk = full.clamp(1, MAP_CHUNK_SECTORS);
        let mut buf = zeroed(chunk as usize * SECTOR_SIZE)?;
        let mut done = 0;
        while done < full {
            let n = (full - done).min(MAP_CHUNK_SECTORS);
            let span = &mut buf[..n as usize * SECTOR_SIZE];
            self.disk().read_device(from + done, span)?;
            self.disk().write_device(to + done, span)?;
            done += n;
        }

        if tail > 0 {
            let sector = &mut buf[..SECTOR_SIZE];
            self.disk().read_device(from + full, sector)?;
            sector[tail..].fill(0);
            self.disk().write_device(to + full, sector)?;
        }
        Ok(())
    }

    /// 首尾不足一扇区的部分经由临时扇区，中间的整扇区直接读进`buf`
    fn read_range(&self, start: SectorId, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        let disk = self.disk();
        let mut sector = [0u8; SECTOR_SIZE];
        let mut lba = start + offset / SECTOR_SIZE as u64;
        let mut done = 0;

        let head = (offset % SECTOR_SIZE as u64) as usize;
        if head != 0 {
            disk.read_device(lba, &mut sector)?;
            let n = (SECTOR_SIZE - head).min(buf.len());
            buf[..n].copy_from_slice(&sector[head..head + n]);
            done = n;
            lba = lba + 1;
        }

        let whole = ((buf.len() - done) / SECTOR_SIZE) as u64;
        let mut batched = 0;
        while batched < whole {
            let n = (whole - batched).min(MAP_CHUNK_SECTORS);
            let bytes = n as usize * SECTOR_SIZE;
            disk.read_device(lba, &mut buf[done..done + bytes])?;
            done += bytes;
            lba = lba + n;
            batched += n;
        }

        if done < buf.len() {
            disk.read_device(lba, &mut sector)?;
            let n = buf.len() - done;
            buf[done..].copy_from_slice(&sector[..n]);
        }
        Ok(())
    }

    /// 首尾不足一扇区的部分读出、修改后写回，中间的整扇区直接从`data`写入
    fn write_range(&self, start: SectorId, offset: u64, data: &[u8]) -> Result<(), Error> {
        let disk = self.disk();
        let mut sector = [0u8; SECTOR_SIZE];
        let mut lba = start + offset / SECTOR_SIZE as u64;
        let mut done = 0;

        let head = (offset % SECTOR_SIZE as u64) as usize;
        if head != 0 {
            disk.read_device(lba, &mut sector)?;
            let n = (SECTOR_SIZE - head).min(data.len());
            sector[head..head + n].copy_from_slice(&data[..n]);
            disk.write_device(lba, &sector)?;
            done = n;
            lba = lba + 1;
        }

        let whole = ((data.len() - done) / SECTOR_SIZE) as u64;
        let mut batched = 0;
        while batched < whole {
            let n = (whole - batched).min(MAP_CHUNK_SECTORS);
            let bytes = n as usize * SECTOR_SIZE;
            disk.write_device(lba, &data[done..done + bytes])?;
            done += bytes;
            lba = lba + n;
            batched += n;
        }

        if done < data.len() {
            disk.read_device(lba, &mut sector)?;
            let n = data.len() - done;
            sector[..n].copy_from_slice(&data[done..]);
            disk.write_device(lba, &sector)?;
        }
        Ok(())
    }
}
