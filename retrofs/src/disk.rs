//! 卷内的设备读写

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use vfs::Error;

use crate::config::{MAP_CHUNK_SECTORS, SECTOR_SIZE};
use crate::sector::SectorId;

/// 卷在块设备上的一段连续扇区
///
/// 所有扇区编号都相对于卷的起点，并在访问设备前检查是否越过卷的末尾。
#[derive(Clone)]
pub struct Disk {
    dev: Arc<dyn BlockDevice>,
    /// 卷在设备上的起始扇区
    start: u64,
    total_sectors: u64,
}

impl core::fmt::Debug for Disk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Disk")
            .field("start", &self.start)
            .field("total_sectors", &self.total_sectors)
            .finish_non_exhaustive()
    }
}

impl Disk {
    pub fn new(dev: Arc<dyn BlockDevice>, start: u64, total_sectors: u64) -> Self {
        Self {
            dev,
            start,
            total_sectors,
        }
    }

    #[inline]
    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    pub fn read_device(&self, sector: SectorId, buf: &mut [u8]) -> Result<(), Error> {
        self.check(sector, buf.len() as u64)?;
        self.dev
            .read_block(self.start + sector.get(), buf)
            .map_err(|err| device_error("read", sector, err))
    }

    pub fn write_device(&self, sector: SectorId, buf: &[u8]) -> Result<(), Error> {
        self.check(sector, buf.len() as u64)?;
        self.dev
            .write_block(self.start + sector.get(), buf)
            .map_err(|err| device_error("write", sector, err))
    }

    /// 分批将`count`个扇区清零
    pub fn clear_device(&self, sector: SectorId, count: u64) -> Result<(), Error> {
        self.check(sector, count * SECTOR_SIZE as u64)?;
        let mut done = 0;
        while done < count {
            let n = (count - done).min(MAP_CHUNK_SECTORS);
            self.dev
                .clear_blocks(self.start + sector.get() + done, n)
                .map_err(|err| device_error("clear", sector + done, err))?;
            done += n;
        }
        Ok(())
    }

    fn check(&self, sector: SectorId, bytes: u64) -> Result<(), Error> {
        if bytes % SECTOR_SIZE as u64 != 0 {
            log::error!("rfs: request of {bytes} bytes at {sector} is not sector aligned");
            return Err(Error::InvalidArgument);
        }
        let count = bytes / SECTOR_SIZE as u64;
        match sector.get().checked_add(count) {
            Some(end) if end <= self.total_sectors => Ok(()),
            _ => {
                log::error!("rfs: {count} sectors at {sector} would pass end of volume");
                Err(Error::OutsideVolume)
            }
        }
    }
}

/// 申请清零的缓冲区，失败时报告内存不足而不是直接终止
pub(crate) fn zeroed(len: usize) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

fn device_error(op: &str, sector: SectorId, err: block_dev::Error) -> Error {
    log::error!("rfs: device {op} failed at {sector}: {err:?}");
    match err {
        block_dev::Error::OutOfRange => Error::OutsideVolume,
        _ => Error::DeviceIo,
    }
}
