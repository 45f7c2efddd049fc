//! 在GPT分区表中查找RetroFS分区
//!
//! 0号扇区的MBR第一项是保护分区（类型0xEE，起始LBA为1）时，
//! 1号扇区是GPT头，之后按头部给出的位置逐项比较分区类型GUID。

use block_dev::BlockDevice;

use crate::config::{GPT_TYPE_GUID, SECTOR_SIZE};
use crate::layout::OnDisk;

/// MBR分区表在0号扇区中的偏移
const MBR_TABLE_OFFSET: usize = 0x1BE;
const GPT_PROTECTIVE: u8 = 0xEE;
const GPT_SIGNATURE: [u8; 8] = *b"EFI PART";
/// 规范规定的最小分区项大小
const MIN_ENTRY_SIZE: usize = 128;

#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
struct MbrPartition {
    bootable: u8,
    _chs_first: [u8; 3],
    system_id: u8,
    _chs_last: [u8; 3],
    start_lba: u32,
    _length: u32,
}

#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
struct GptHeader {
    signature: [u8; 8],
    /// 版本、头部大小与校验、本头与备份头的位置、可用范围、磁盘GUID
    _fields: [u8; 64],
    entries_lba: u64,
    entry_count: u32,
    entry_size: u32,
    _entries_crc: u32,
}

#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
struct GptEntry {
    type_guid: [u8; 16],
    _unique_guid: [u8; 16],
    start_lba: u64,
    /// 包含在分区内
    end_lba: u64,
    _attributes: u64,
    _name: [u8; 72],
}

unsafe impl OnDisk for MbrPartition {}
unsafe impl OnDisk for GptHeader {}
unsafe impl OnDisk for GptEntry {}

/// GUID的磁盘形式：前三段小端，后两段按原样
pub(crate) const fn guid_bytes(guid: u128) -> [u8; 16] {
    let be = guid.to_be_bytes();
    let mut out = be;
    out[0] = be[3];
    out[1] = be[2];
    out[2] = be[1];
    out[3] = be[0];
    out[4] = be[5];
    out[5] = be[4];
    out[6] = be[7];
    out[7] = be[6];
    out
}

/// 返回第一个RetroFS分区的`(起始扇区, 扇区数)`
///
/// 没有GPT、读取失败或分区表不合理时都返回`None`，由调用者按整盘挂载。
pub(crate) fn find_partition(dev: &dyn BlockDevice) -> Option<(u64, u64)> {
    if dev.sector_size() != SECTOR_SIZE || dev.num_sectors() < 2 {
        return None;
    }

    let mut sector = [0u8; SECTOR_SIZE];
    dev.read_block(0, &mut sector).ok()?;
    let first = MbrPartition::read_from(&sector[MBR_TABLE_OFFSET..]);
    let start_lba = u32::from_le(first.start_lba);
    if first.bootable != 0 || first.system_id != GPT_PROTECTIVE || start_lba != 1 {
        return None;
    }

    dev.read_block(1, &mut sector).ok()?;
    let header = GptHeader::read_from(&sector);
    if header.signature != GPT_SIGNATURE {
        log::debug!("rfs: protective MBR without a GPT header");
        return None;
    }
    let entries_lba = u64::from_le(header.entries_lba);
    let entry_count = u32::from_le(header.entry_count) as u64;
    let entry_size = u32::from_le(header.entry_size) as usize;
    if !(MIN_ENTRY_SIZE..=SECTOR_SIZE).contains(&entry_size) || SECTOR_SIZE % entry_size != 0 {
        log::warn!("rfs: unsupported GPT entry size {entry_size}");
        return None;
    }
    log::debug!("rfs: GPT with {entry_count} entries at {entries_lba}, {entry_size} bytes each");

    let wanted = guid_bytes(GPT_TYPE_GUID);
    let per_sector = (SECTOR_SIZE / entry_size) as u64;
    let mut loaded = None;
    for index in 0..entry_count {
        let lba = entries_lba.checked_add(index / per_sector)?;
        if loaded != Some(lba) {
            dev.read_block(lba, &mut sector).ok()?;
            loaded = Some(lba);
        }
        let offset = (index % per_sector) as usize * entry_size;
        let entry = GptEntry::read_from(&sector[offset..]);
        if entry.type_guid != wanted {
            continue;
        }

        let start = u64::from_le(entry.start_lba);
        let end = u64::from_le(entry.end_lba);
        if start == 0 || end < start || end >= dev.num_sectors() {
            log::warn!("rfs: GPT entry {index} spans {start}..={end}, outside the device");
            continue;
        }
        log::info!("rfs: found RetroFS partition {index} at {start}, {} sectors", end - start + 1);
        return Some((start, end - start + 1));
    }
    None
}
