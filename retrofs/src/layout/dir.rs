use enumflags2::{bitflags, BitFlags};

use super::{copy_name, name_of};
use crate::config::{DIR_BLOCK_SECTORS, MAX_NAME};
use crate::sector::SectorId;

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFlag {
    Directory = 0x1,
    /// 只读
    Locked = 0x2,
    /// 目录块头部
    DirStart = 0x4,
}

/// 目录块的第一个半扇区
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct DirHeader {
    flags: u32,
    /// 目录名
    title: [u8; MAX_NAME],
    /// 父目录的起始扇区，续块指向链头
    parent: u64,
    /// 本块的扇区数，总为[`DIR_BLOCK_SECTORS`]
    sectors: u64,
    /// 下一个目录块，0表示链尾
    continuation: u64,
    _reserved: [u8; 100],
}

impl DirHeader {
    pub fn new(title: &[u8], parent: SectorId) -> Self {
        let mut header = Self {
            flags: BitFlags::from_flag(EntryFlag::DirStart).bits().to_le(),
            title: [0; MAX_NAME],
            parent: parent.get().to_le(),
            sectors: DIR_BLOCK_SECTORS.to_le(),
            continuation: 0,
            _reserved: [0; 100],
        };
        copy_name(&mut header.title, title);
        header
    }

    #[inline]
    pub fn flags(&self) -> BitFlags<EntryFlag> {
        BitFlags::from_bits_truncate(u32::from_le(self.flags))
    }

    #[inline]
    pub fn sectors(&self) -> u64 {
        u64::from_le(self.sectors)
    }

    /// 头部标记正确且块大小与约定一致
    pub fn is_valid(&self) -> bool {
        self.flags().contains(EntryFlag::DirStart) && self.sectors() == DIR_BLOCK_SECTORS
    }

    #[inline]
    pub fn title(&self) -> &[u8] {
        name_of(&self.title)
    }

    #[inline]
    pub fn parent(&self) -> SectorId {
        SectorId::new(u64::from_le(self.parent))
    }

    #[inline]
    pub fn continuation(&self) -> SectorId {
        SectorId::new(u64::from_le(self.continuation))
    }

    #[inline]
    pub fn set_continuation(&mut self, next: SectorId) {
        self.continuation = next.get().to_le();
    }
}

/// 目录块中的一个目录项，占半个扇区
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct DirEntry {
    flags: u32,
    /// NUL结尾的名字，首字节为0表示空槽
    name: [u8; MAX_NAME],
    /// 数据区段（或目录链头）的起始扇区
    sector_start: u64,
    /// 逻辑长度，字节
    length: u64,
    /// 预留区段长度，扇区
    sector_length: u64,
    _reserved: [u8; 100],
}

impl DirEntry {
    pub const EMPTY: Self = Self {
        flags: 0,
        name: [0; MAX_NAME],
        sector_start: 0,
        length: 0,
        sector_length: 0,
        _reserved: [0; 100],
    };

    pub fn new(
        name: &[u8],
        flags: BitFlags<EntryFlag>,
        start: SectorId,
        length: u64,
        sector_length: u64,
    ) -> Self {
        let mut entry = Self {
            flags: flags.bits().to_le(),
            sector_start: start.get().to_le(),
            length: length.to_le(),
            sector_length: sector_length.to_le(),
            ..Self::EMPTY
        };
        copy_name(&mut entry.name, name);
        entry
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    #[inline]
    pub fn name(&self) -> &[u8] {
        name_of(&self.name)
    }

    /// 按ASCII不区分大小写比较名字
    #[inline]
    pub fn name_matches(&self, name: &[u8]) -> bool {
        !self.is_empty() && self.name().eq_ignore_ascii_case(name)
    }

    #[inline]
    pub fn flags(&self) -> BitFlags<EntryFlag> {
        BitFlags::from_bits_truncate(u32::from_le(self.flags))
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.flags().contains(EntryFlag::Directory)
    }

    #[inline]
    pub fn start(&self) -> SectorId {
        SectorId::new(u64::from_le(self.sector_start))
    }

    #[inline]
    pub fn length(&self) -> u64 {
        u64::from_le(self.length)
    }

    #[inline]
    pub fn sector_length(&self) -> u64 {
        u64::from_le(self.sector_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::OnDisk;

    #[test]
    fn entry_offsets() {
        let entry = DirEntry::new(
            b"boot.cfg",
            BitFlags::from_flag(EntryFlag::Directory),
            SectorId::new(0x0A0B),
            1000,
            2,
        );
        let bytes = entry.as_bytes();
        assert_eq!(1u32.to_le_bytes(), bytes[0..4]);
        assert_eq!(b"boot.cfg\0", &bytes[4..13]);
        assert_eq!(0x0A0Bu64.to_le_bytes(), bytes[132..140]);
        assert_eq!(1000u64.to_le_bytes(), bytes[140..148]);
        assert_eq!(2u64.to_le_bytes(), bytes[148..156]);
    }

    #[test]
    fn header_offsets() {
        let mut header = DirHeader::new(b"etc", SectorId::new(7));
        header.set_continuation(SectorId::new(0x4000));
        let bytes = header.as_bytes();
        assert_eq!(4u32.to_le_bytes(), bytes[0..4]);
        assert_eq!(7u64.to_le_bytes(), bytes[132..140]);
        assert_eq!(DIR_BLOCK_SECTORS.to_le_bytes(), bytes[140..148]);
        assert_eq!(0x4000u64.to_le_bytes(), bytes[148..156]);
        assert!(DirHeader::read_from(bytes).is_valid());
    }
}
