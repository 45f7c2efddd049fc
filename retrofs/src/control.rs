use alloc::sync::Arc;

use block_dev::BlockDevice;
use spin::{Mutex, MutexGuard};
use vfs::Error;

use crate::config::{MountOptions, L1_GROUP_SECTORS, RESERVED_SECTORS, SECTOR_SIZE};
use crate::directory::DirBlock;
use crate::disk::Disk;
use crate::fsmap::FreeSpaceMap;
use crate::layout::{DescriptionBlock, OnDisk};
use crate::partition::find_partition;
use crate::sector::{bytes_of, SectorId};

/// 一个已挂载的RetroFS卷
///
/// 所有状态都保存在这里，多个卷可以同时挂载，互不影响。
#[derive(Debug)]
pub struct RetroFs {
    disk: Disk,
    desc: DescriptionBlock,
    options: MountOptions,
    map: Mutex<FreeSpaceMap>,
    /// 目录与文件操作的互斥范围，先于`map`加锁
    namespace: Mutex<()>,
}

impl RetroFs {
    /// 在设备的`[start, start + length)`上创建一个空卷并挂载
    ///
    /// 描述块位于0号扇区，根目录块紧随其后，空闲位图放在卷尾。
    pub fn format(
        dev: Arc<dyn BlockDevice>,
        start: u64,
        length: u64,
        creation_time: u64,
        options: MountOptions,
    ) -> Result<Self, Error> {
        check_device(&dev, start, length)?;

        let map_sectors = length.div_ceil(L1_GROUP_SECTORS);
        if length < RESERVED_SECTORS + map_sectors + 1 {
            log::error!("rfs: {length} sectors is too small for a volume");
            return Err(Error::InvalidArgument);
        }
        let map_start = SectorId::new(length - map_sectors);
        let disk = Disk::new(dev, start, length);

        disk.clear_device(map_start, map_sectors)?;

        let root = SectorId::new(1);
        DirBlock::new(root, b"", SectorId::NULL)?.write(&disk)?;

        let desc = DescriptionBlock::new(length, map_start, map_sectors, creation_time);
        disk.write_device(SectorId::NULL, desc.as_bytes())?;

        let mut map = FreeSpaceMap::build(&disk, map_start, map_sectors)?;
        map.mark_extent(&disk, SectorId::NULL, RESERVED_SECTORS, true)?;
        map.mark_extent(&disk, map_start, map_sectors, true)?;

        log::info!(
            "rfs: formatted {length} sectors at {start}, map {map_sectors} sectors at {map_start}"
        );
        Ok(Self {
            disk,
            desc,
            options,
            map: Mutex::new(map),
            namespace: Mutex::new(()),
        })
    }

    /// 挂载设备上的RetroFS卷
    ///
    /// 设备带GPT且有RetroFS类型的分区时挂载该分区，否则把整个设备作为一个卷。
    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Self, Error> {
        let (start, length) = match find_partition(dev.as_ref()) {
            Some(partition) => partition,
            None => (0, dev.num_sectors()),
        };
        Self::mount_at(dev, start, length, MountOptions::default())
    }

    /// 挂载从`start`开始、最多`length`个扇区的卷（例如一个分区）
    pub fn mount_at(
        dev: Arc<dyn BlockDevice>,
        start: u64,
        length: u64,
        options: MountOptions,
    ) -> Result<Self, Error> {
        check_device(&dev, start, length)?;

        let mut raw = [0u8; SECTOR_SIZE];
        Disk::new(dev.clone(), start, length).read_device(SectorId::NULL, &mut raw)?;
        let desc = DescriptionBlock::read_from(&raw);
        if !desc.is_valid() {
            log::debug!("rfs: identifier {:#x} is not \"RetroFS1\"", desc.identifier());
            return Err(Error::BadMagic);
        }
        if !desc.is_consistent(length) {
            log::error!("rfs: description block is inconsistent with a {length} sector volume");
            return Err(Error::Corruption);
        }

        let disk = Disk::new(dev, start, desc.total_sectors());
        DirBlock::read(&disk, desc.root_directory())?;
        let map = FreeSpaceMap::build(
            &disk,
            desc.free_space_map_start(),
            desc.free_space_map_length(),
        )?;

        log::info!(
            "rfs: mounted volume at {start}, {} sectors, root at {}",
            desc.total_sectors(),
            desc.root_directory()
        );
        Ok(Self {
            disk,
            desc,
            options,
            map: Mutex::new(map),
            namespace: Mutex::new(()),
        })
    }

    #[inline]
    pub fn root(&self) -> SectorId {
        self.desc.root_directory()
    }

    #[inline]
    pub fn description(&self) -> &DescriptionBlock {
        &self.desc
    }

    #[inline]
    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    #[inline]
    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    /// 剩余的字节数
    pub fn get_free_space(&self) -> u64 {
        bytes_of(self.map.lock().free_sectors())
    }

    pub fn find_free_extent(&self, sectors: u64) -> Result<SectorId, Error> {
        self.map.lock().find_free_extent(&self.disk, sectors)
    }

    pub fn mark_extent(&self, start: SectorId, sectors: u64, used: bool) -> Result<(), Error> {
        self.map.lock().mark_extent(&self.disk, start, sectors, used)
    }

    /// 查找并标记一段连续扇区，中间不会被其它分配插入
    pub fn allocate(&self, sectors: u64) -> Result<SectorId, Error> {
        self.map.lock().allocate(&self.disk, sectors)
    }

    /// 直接查询L0位图
    pub fn is_used(&self, sector: SectorId) -> Result<bool, Error> {
        self.map.lock().is_used(&self.disk, sector)
    }
}

impl RetroFs {
    pub(crate) fn lock_namespace(&self) -> MutexGuard<'_, ()> {
        self.namespace.lock()
    }

    /// 尽力释放一段区段，失败只记录日志
    pub(crate) fn release(&self, start: SectorId, sectors: u64) {
        if let Err(err) = self.mark_extent(start, sectors, false) {
            log::warn!("rfs: leaked extent {start}+{sectors}: {err}");
        }
    }
}

fn check_device(dev: &Arc<dyn BlockDevice>, start: u64, length: u64) -> Result<(), Error> {
    if dev.sector_size() != SECTOR_SIZE {
        log::error!(
            "rfs: device sector size {} is not {SECTOR_SIZE}",
            dev.sector_size()
        );
        return Err(Error::InvalidArgument);
    }
    match start.checked_add(length) {
        Some(end) if length > 0 && end <= dev.num_sectors() => Ok(()),
        _ => Err(Error::InvalidArgument),
    }
}
