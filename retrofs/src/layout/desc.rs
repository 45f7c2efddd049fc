use crate::config::{L1_GROUP_SECTORS, RFS_ID, RESERVED_SECTORS};
use crate::sector::SectorId;

/// 描述块，位于卷的0号扇区
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct DescriptionBlock {
    /// 魔数，[`RFS_ID`]
    identifier: u64,
    /// 根目录块的起始扇区
    root_directory: u64,
    /// 空闲位图的起始扇区
    free_space_map_start: u64,
    /// 空闲位图的扇区数
    free_space_map_length: u64,
    /// 保留，总为0
    free_space_map_checksum: u64,
    /// 格式化时为0
    sequence: u64,
    /// 格式化时间（UTC秒），由调用者提供
    creation_time: u64,
    /// 卷的扇区总数
    total_sectors: u64,
    _reserved: [u8; 448],
}

impl DescriptionBlock {
    pub fn new(total_sectors: u64, map_start: SectorId, map_length: u64, creation_time: u64) -> Self {
        Self {
            identifier: RFS_ID.to_le(),
            root_directory: 1u64.to_le(),
            free_space_map_start: map_start.get().to_le(),
            free_space_map_length: map_length.to_le(),
            free_space_map_checksum: 0,
            sequence: 0,
            creation_time: creation_time.to_le(),
            total_sectors: total_sectors.to_le(),
            _reserved: [0; 448],
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.identifier() == RFS_ID
    }

    #[inline]
    pub fn identifier(&self) -> u64 {
        u64::from_le(self.identifier)
    }

    #[inline]
    pub fn root_directory(&self) -> SectorId {
        SectorId::new(u64::from_le(self.root_directory))
    }

    #[inline]
    pub fn free_space_map_start(&self) -> SectorId {
        SectorId::new(u64::from_le(self.free_space_map_start))
    }

    #[inline]
    pub fn free_space_map_length(&self) -> u64 {
        u64::from_le(self.free_space_map_length)
    }

    #[inline]
    pub fn creation_time(&self) -> u64 {
        u64::from_le(self.creation_time)
    }

    #[inline]
    pub fn total_sectors(&self) -> u64 {
        u64::from_le(self.total_sectors)
    }

    /// 各个区域都落在卷内且互不重叠
    pub fn is_consistent(&self, available: u64) -> bool {
        let total = self.total_sectors();
        let root = self.root_directory().get();
        let map_start = self.free_space_map_start().get();
        let map_length = self.free_space_map_length();

        total <= available
            && total > RESERVED_SECTORS
            && root != 0
            && map_start >= RESERVED_SECTORS
            && map_start.checked_add(map_length).is_some_and(|end| end <= total)
            && map_length.saturating_mul(L1_GROUP_SECTORS) >= total
    }
}
