use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;

use crate::{check_request, BlockDevice, Error, SECTOR_SIZE};

/// 内存中的块设备
#[derive(Debug)]
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    sector_size: usize,
    /// 为真时所有写入都返回[`Error::Io`]
    fail_writes: AtomicBool,
    /// 非0时每次写入减1，减到0的那次写入失败
    fail_countdown: AtomicU64,
}

impl RamDisk {
    pub fn new(sectors: u64) -> Self {
        Self::with_sector_size(sectors, SECTOR_SIZE)
    }

    pub fn with_sector_size(sectors: u64, sector_size: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; sectors as usize * sector_size]),
            sector_size,
            fail_writes: AtomicBool::new(false),
            fail_countdown: AtomicU64::new(0),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 接下来`n`次写入成功，第`n + 1`次失败一次，之后恢复正常
    pub fn fail_write_after(&self, n: u64) {
        self.fail_countdown.store(n + 1, Ordering::SeqCst);
    }

    fn write_fails(&self) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            == Ok(1)
    }

    /// 绕过文件系统直接查看或修改底层字节
    pub fn with_bytes<V>(&self, f: impl FnOnce(&mut [u8]) -> V) -> V {
        f(&mut self.data.lock())
    }
}

impl BlockDevice for RamDisk {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn num_sectors(&self) -> u64 {
        (self.data.lock().len() / self.sector_size) as u64
    }

    fn read_block(&self, sector: u64, buf: &mut [u8]) -> Result<(), Error> {
        check_request(self, sector, buf.len())?;
        let offset = sector as usize * self.sector_size;
        buf.copy_from_slice(&self.data.lock()[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_block(&self, sector: u64, buf: &[u8]) -> Result<(), Error> {
        check_request(self, sector, buf.len())?;
        if self.write_fails() {
            return Err(Error::Io);
        }
        let offset = sector as usize * self.sector_size;
        self.data.lock()[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn clear_blocks(&self, sector: u64, count: u64) -> Result<(), Error> {
        check_request(self, sector, count as usize * self.sector_size)?;
        if self.write_fails() {
            return Err(Error::Io);
        }
        let offset = sector as usize * self.sector_size;
        self.data.lock()[offset..offset + count as usize * self.sector_size].fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_partial_and_out_of_range() {
        let disk = RamDisk::new(4);
        let mut buf = [0u8; 100];
        assert_eq!(Err(Error::Misaligned), disk.read_block(0, &mut buf));

        let mut buf = [0u8; 1024];
        assert_eq!(Err(Error::OutOfRange), disk.read_block(3, &mut buf));
        assert!(disk.read_block(2, &mut buf).is_ok());
    }

    #[test]
    fn write_then_read() {
        let disk = RamDisk::new(4);
        disk.write_block(1, &[0xAB; 512]).unwrap();

        let mut buf = [0u8; 1024];
        disk.read_block(0, &mut buf).unwrap();
        assert!(buf[..512].iter().all(|&b| b == 0));
        assert!(buf[512..].iter().all(|&b| b == 0xAB));

        disk.clear_blocks(1, 1).unwrap();
        disk.read_block(1, &mut buf[..512]).unwrap();
        assert!(buf[..512].iter().all(|&b| b == 0));
    }

    #[test]
    fn injected_write_failure() {
        let disk = RamDisk::new(2);
        disk.fail_writes(true);
        assert_eq!(Err(Error::Io), disk.write_block(0, &[1; 512]));
        disk.fail_writes(false);
        assert!(disk.write_block(0, &[1; 512]).is_ok());
    }

    #[test]
    fn one_shot_write_failure() {
        let disk = RamDisk::new(2);
        disk.fail_write_after(1);
        assert!(disk.write_block(0, &[1; 512]).is_ok());
        assert_eq!(Err(Error::Io), disk.clear_blocks(1, 1));
        assert!(disk.write_block(1, &[2; 512]).is_ok());
    }
}
