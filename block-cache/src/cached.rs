use block_dev::{BlockDevice, Error};
use spin::Mutex;

use crate::cache::{CacheError, SectorCache};

/// 带回源读取的缓存块设备
///
/// 写入先落盘再更新缓存，读取在任一扇区未命中时整段从底层设备读取并填充缓存。
/// 回源读取与写入各自连同缓存更新一起在`io`锁内完成，缓存中的扇区总与设备一致。
#[derive(Debug)]
pub struct Cached<D> {
    dev: D,
    cache: SectorCache,
    io: Mutex<()>,
}

impl<D: BlockDevice> Cached<D> {
    pub fn new(dev: D) -> Result<Self, CacheError> {
        let cache = SectorCache::new(&dev)?;
        Ok(Self {
            dev,
            cache,
            io: Mutex::new(()),
        })
    }

    pub fn with_capacity(dev: D, capacity: usize) -> Result<Self, CacheError> {
        let cache = SectorCache::with_capacity(&dev, capacity)?;
        Ok(Self {
            dev,
            cache,
            io: Mutex::new(()),
        })
    }

    #[inline]
    pub fn cache(&self) -> &SectorCache {
        &self.cache
    }

    #[inline]
    pub fn inner(&self) -> &D {
        &self.dev
    }

    /// 用设备上的最新数据更新缓存，失败时丢弃这一段，免得留下旧数据
    fn fill(&self, sector: u64, buf: &[u8]) {
        if let Err(err) = self.cache.write(sector, buf) {
            log::warn!("cached: could not populate sectors from {sector}: {err:?}");
            let count = (buf.len() / self.cache.sector_size()) as u64;
            self.cache.evict_range(sector, count);
        }
    }
}

impl<D: BlockDevice> BlockDevice for Cached<D> {
    fn sector_size(&self) -> usize {
        self.dev.sector_size()
    }

    fn num_sectors(&self) -> u64 {
        self.dev.num_sectors()
    }

    fn read_block(&self, sector: u64, buf: &mut [u8]) -> Result<(), Error> {
        match self.cache.read(sector, buf) {
            Ok(()) => Ok(()),
            Err(CacheError::CacheMiss) => {
                let _io = self.io.lock();
                self.dev.read_block(sector, buf)?;
                self.fill(sector, buf);
                Ok(())
            }
            Err(err) => Err(to_device_error(err)),
        }
    }

    fn write_block(&self, sector: u64, buf: &[u8]) -> Result<(), Error> {
        let _io = self.io.lock();
        if let Err(err) = self.dev.write_block(sector, buf) {
            // 设备上可能已经写了一部分
            let count = (buf.len() / self.cache.sector_size()) as u64;
            self.cache.evict_range(sector, count);
            return Err(err);
        }
        self.fill(sector, buf);
        Ok(())
    }

    fn clear_blocks(&self, sector: u64, count: u64) -> Result<(), Error> {
        let _io = self.io.lock();
        let result = self.dev.clear_blocks(sector, count);
        self.cache.evict_range(sector, count);
        result
    }

    fn handle_irq(&self) {
        self.dev.handle_irq();
    }
}

fn to_device_error(err: CacheError) -> Error {
    match err {
        CacheError::Misaligned => Error::Misaligned,
        CacheError::OutOfBounds => Error::OutOfRange,
        _ => Error::Io,
    }
}

