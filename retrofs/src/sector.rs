//! 扇区编号

use core::fmt;

use derive_more::{Add, From, Into};

use crate::config::SECTOR_SIZE;

/// 卷内的扇区编号，0号扇区是描述块
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Add, From, Into)]
#[repr(transparent)]
pub struct SectorId(u64);

impl core::ops::Add<u64> for SectorId {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        self + Self(rhs)
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl SectorId {
    /// 用作目录链结尾或“无数据”
    pub const NULL: Self = Self(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// 容纳`bytes`字节所需的扇区数
#[inline]
pub const fn sectors_for(bytes: u64) -> u64 {
    bytes.div_ceil(SECTOR_SIZE as u64)
}

/// 扇区数对应的字节数
#[inline]
pub const fn bytes_of(sectors: u64) -> u64 {
    sectors * SECTOR_SIZE as u64
}
