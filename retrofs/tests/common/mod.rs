#![allow(dead_code)]

use std::sync::Arc;

use block_dev::RamDisk;
use retrofs::{MountOptions, ReservationPolicy, RetroFs};

/// 8 MiB
pub const SECTORS: u64 = 16384;

/// 描述块、根目录与4个位图扇区之外的全部扇区
pub const FREE_SECTORS: u64 = SECTORS - 65 - 4;

pub const FORMATTED_AT: u64 = 1_700_000_000;

pub fn ram() -> Arc<RamDisk> {
    Arc::new(RamDisk::new(SECTORS))
}

/// 文件只按请求大小预留
pub fn exact() -> (Arc<RamDisk>, RetroFs) {
    let dev = ram();
    let options = MountOptions {
        reservation: ReservationPolicy::EXACT,
    };
    let fs = RetroFs::format(dev.clone(), 0, SECTORS, FORMATTED_AT, options).unwrap();
    (dev, fs)
}

/// 按扩展名的默认值预留
pub fn defaults() -> (Arc<RamDisk>, RetroFs) {
    let dev = ram();
    let fs = RetroFs::format(dev.clone(), 0, SECTORS, FORMATTED_AT, MountOptions::default()).unwrap();
    (dev, fs)
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 512) as u8).collect()
}
