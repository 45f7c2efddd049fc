//! 扇区粒度的块设备抽象

#![no_std]

extern crate alloc;

mod ram;

use core::any::Any;

pub use self::ram::RamDisk;

/// 绝大多数块设备的物理扇区大小
pub const SECTOR_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 缓冲区长度不是扇区大小的整数倍
    Misaligned,
    /// 请求越过了设备末尾
    OutOfRange,
    /// 介质读写失败
    Io,
}

/// 块设备
///
/// 所有读写都以整扇区为单位，`buf.len()`必须是[`BlockDevice::sector_size`]的倍数，
/// 一次调用可以跨越多个连续扇区。
pub trait BlockDevice: Send + Sync + Any {
    fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }

    /// 设备上的扇区总数
    fn num_sectors(&self) -> u64;

    fn read_block(&self, sector: u64, buf: &mut [u8]) -> Result<(), Error>;

    fn write_block(&self, sector: u64, buf: &[u8]) -> Result<(), Error>;

    /// 将`[sector, sector + count)`清零
    fn clear_blocks(&self, sector: u64, count: u64) -> Result<(), Error> {
        const CHUNK: u64 = 128;

        let zero = alloc::vec![0u8; CHUNK as usize * self.sector_size()];
        let mut done = 0;
        while done < count {
            let n = (count - done).min(CHUNK);
            self.write_block(sector + done, &zero[..n as usize * self.sector_size()])?;
            done += n;
        }
        Ok(())
    }

    fn handle_irq(&self) {}
}

/// 检查一次请求是否整扇区且不越界，返回请求覆盖的扇区数
pub fn check_request(dev: &dyn BlockDevice, sector: u64, len: usize) -> Result<u64, Error> {
    let sector_size = dev.sector_size();
    if sector_size == 0 || len % sector_size != 0 {
        return Err(Error::Misaligned);
    }
    let count = (len / sector_size) as u64;
    match sector.checked_add(count) {
        Some(end) if end <= dev.num_sectors() => Ok(count),
        _ => Err(Error::OutOfRange),
    }
}
