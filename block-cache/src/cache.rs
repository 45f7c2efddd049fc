use block_dev::BlockDevice;
use spin::Mutex;

use crate::lru::Lru;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// 设备扇区大小或扇区数为0
    InvalidDevice,
    /// 容量为0
    InvalidArgument,
    /// 请求长度不是整扇区
    Misaligned,
    /// 请求越过了设备末尾
    OutOfBounds,
    /// 请求覆盖的某个扇区不在缓存中
    CacheMiss,
    OutOfMemory,
}

/// 单个块设备的扇区缓存
///
/// 只由写入填充：[`SectorCache::read`]在任何一个扇区未命中时整体失败，
/// 不会回源读取设备。需要回源读取时使用[`crate::Cached`]。
#[derive(Debug)]
pub struct SectorCache {
    sector_size: usize,
    /// 设备扇区总数，用于越界检查
    sectors: u64,
    lru: Mutex<Lru>,
}

impl SectorCache {
    /// 缓存扇区个数的默认上限
    pub const CAPACITY: usize = 8192;

    pub fn new(dev: &dyn BlockDevice) -> Result<Self, CacheError> {
        Self::with_capacity(dev, Self::CAPACITY)
    }

    pub fn with_capacity(dev: &dyn BlockDevice, capacity: usize) -> Result<Self, CacheError> {
        let sector_size = dev.sector_size();
        let sectors = dev.num_sectors();
        if sector_size == 0 || sectors == 0 {
            return Err(CacheError::InvalidDevice);
        }
        if capacity == 0 {
            return Err(CacheError::InvalidArgument);
        }
        log::debug!("sector cache: {capacity} x {sector_size}B over {sectors} sectors");

        Ok(Self {
            sector_size,
            sectors,
            lru: Mutex::new(Lru::new(capacity, sector_size)),
        })
    }

    #[inline]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.lru.lock().capacity()
    }

    /// 当前驻留的扇区数
    #[inline]
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(&self, sector: u64) -> bool {
        self.lru.lock().contains(sector)
    }

    /// 读取`buf.len()`字节。所有扇区都命中才会复制并更新它们的使用顺序。
    pub fn read(&self, sector: u64, buf: &mut [u8]) -> Result<(), CacheError> {
        let count = self.span(sector, buf.len())?;

        let mut lru = self.lru.lock();
        if let Some(missing) = (sector..sector + count).find(|&s| !lru.contains(s)) {
            log::trace!("sector cache miss at {missing}");
            return Err(CacheError::CacheMiss);
        }

        for (s, chunk) in (sector..).zip(buf.chunks_exact_mut(self.sector_size)) {
            let data = lru.get(s).ok_or(CacheError::CacheMiss)?;
            chunk.copy_from_slice(data);
        }
        Ok(())
    }

    /// 写入`data.len()`字节，缺失的扇区按需淘汰后插入
    pub fn write(&self, sector: u64, data: &[u8]) -> Result<(), CacheError> {
        self.span(sector, data.len())?;

        let mut lru = self.lru.lock();
        for (s, chunk) in (sector..).zip(data.chunks_exact(self.sector_size)) {
            lru.put(s, chunk).map_err(|_| {
                log::error!("sector cache: out of memory caching sector {s}");
                CacheError::OutOfMemory
            })?;
        }
        Ok(())
    }

    /// 丢弃`[sector, sector + count)`中的缓存扇区，不在缓存中的扇区忽略
    pub fn evict_range(&self, sector: u64, count: u64) {
        let end = sector.saturating_add(count);
        let evicted = self.lru.lock().remove_range(sector..end);
        if evicted > 0 {
            log::trace!("sector cache: evicted {evicted} sectors in {sector}..{end}");
        }
    }

    /// 丢弃所有缓存的扇区
    pub fn invalidate(&self) {
        self.lru.lock().clear();
    }

    pub fn destroy(self) {
        self.invalidate();
        log::debug!("sector cache destroyed");
    }

    fn span(&self, sector: u64, len: usize) -> Result<u64, CacheError> {
        if len % self.sector_size != 0 {
            return Err(CacheError::Misaligned);
        }
        let count = (len / self.sector_size) as u64;
        match sector.checked_add(count) {
            Some(end) if end <= self.sectors => Ok(count),
            _ => Err(CacheError::OutOfBounds),
        }
    }
}
