//! 空闲空间位图
//!
//! 磁盘上只保存L0位图：每个卷扇区1位，1表示已使用。
//! 挂载时在内存中建立两级索引加速查找：
//!
//! - L1：每[`L1_GROUP_SECTORS`]个扇区一组，恰好对应一个L0扇区，
//!   记录组内空闲扇区数以及“有空闲”“全空闲”两个位集；
//! - L2：每[`L2_GROUPS_PER_SUPER`]个L1组一个超级组，同样记录“有空闲”“全空闲”。

use alloc::vec::Vec;
use core::ops::Range;

use vfs::Error;

use crate::config::{L1_GROUP_SECTORS, L2_GROUPS_PER_SUPER, MAP_CHUNK_SECTORS, SECTOR_SIZE};
use crate::disk::{zeroed, Disk};
use crate::sector::SectorId;

type L0Sector = [u8; SECTOR_SIZE];

#[derive(Debug, Clone, PartialEq, Eq)]
struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn try_new(bits: u64) -> Result<Self, Error> {
        let len = bits.div_ceil(64) as usize;
        let mut words = Vec::new();
        words.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
        words.resize(len, 0);
        Ok(Self { words })
    }

    #[inline]
    fn get(&self, idx: u64) -> bool {
        self.words[(idx >> 6) as usize] & (1 << (idx & 63)) != 0
    }

    #[inline]
    fn set(&mut self, idx: u64, val: bool) {
        let word = &mut self.words[(idx >> 6) as usize];
        if val {
            *word |= 1 << (idx & 63);
        } else {
            *word &= !(1 << (idx & 63));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSpaceMap {
    /// L0位图的起始扇区
    map_start: SectorId,
    total_sectors: u64,
    l1_groups: u64,
    l2_groups: u64,
    l1_free_count: Vec<u16>,
    l1_not_full: BitSet,
    l1_all_free: BitSet,
    l2_not_full: BitSet,
    l2_all_free: BitSet,
}

impl FreeSpaceMap {
    /// 读取整个L0位图，建立L1/L2索引
    pub fn build(disk: &Disk, map_start: SectorId, map_length: u64) -> Result<Self, Error> {
        let total_sectors = disk.total_sectors();
        let l1_groups = total_sectors.div_ceil(L1_GROUP_SECTORS);
        let l2_groups = l1_groups.div_ceil(L2_GROUPS_PER_SUPER);
        if map_length < l1_groups {
            log::error!("rfs: free space map of {map_length} sectors can't cover {l1_groups} groups");
            return Err(Error::Corruption);
        }

        let mut l1_free_count = Vec::new();
        l1_free_count
            .try_reserve_exact(l1_groups as usize)
            .map_err(|_| Error::OutOfMemory)?;
        l1_free_count.resize(l1_groups as usize, 0);

        let mut map = Self {
            map_start,
            total_sectors,
            l1_groups,
            l2_groups,
            l1_free_count,
            l1_not_full: BitSet::try_new(l1_groups)?,
            l1_all_free: BitSet::try_new(l1_groups)?,
            l2_not_full: BitSet::try_new(l2_groups)?,
            l2_all_free: BitSet::try_new(l2_groups)?,
        };

        let chunk = MAP_CHUNK_SECTORS.min(l1_groups) as usize;
        let mut buf = zeroed(chunk * SECTOR_SIZE)?;

        let mut group = 0;
        while group < l1_groups {
            let n = (l1_groups - group).min(MAP_CHUNK_SECTORS);
            let bytes = &mut buf[..n as usize * SECTOR_SIZE];
            disk.read_device(map_start + group, bytes)?;
            for l0 in bytes.chunks_exact(SECTOR_SIZE) {
                let len = map.group_len(group);
                map.set_group_free(group, count_free(l0, len));
                group += 1;
            }
        }
        for sg in 0..l2_groups {
            map.refresh_super(sg);
        }

        log::debug!(
            "rfs: free space map built, {l1_groups} groups, {l2_groups} super groups, {} free sectors",
            map.free_sectors()
        );
        Ok(map)
    }

    pub fn free_sectors(&self) -> u64 {
        self.l1_free_count.iter().map(|&n| n as u64).sum()
    }

    /// 查找至少`need`个连续空闲扇区，返回起始扇区，按扇区号首次适配
    pub fn find_free_extent(&self, disk: &Disk, need: u64) -> Result<SectorId, Error> {
        if need == 0 {
            return Err(Error::InvalidArgument);
        }
        if need > self.free_sectors() {
            return Err(Error::OutOfSpace);
        }

        if need <= L1_GROUP_SECTORS {
            if let Some(start) = self.find_in_group(disk, need)? {
                return Ok(start);
            }
        }
        match self.find_spanning(disk, need)? {
            Some(start) => Ok(start),
            None => {
                log::debug!("rfs: no free extent of {need} sectors");
                Err(Error::OutOfSpace)
            }
        }
    }

    /// 标记`[start, start + len)`的使用状态
    ///
    /// 整个区间先做检查：其中任何扇区已经处于目标状态都会报错且不做任何修改。
    pub fn mark_extent(
        &mut self,
        disk: &Disk,
        start: SectorId,
        len: u64,
        used: bool,
    ) -> Result<(), Error> {
        if len == 0 {
            return Err(Error::InvalidArgument);
        }
        let begin = start.get();
        let end = match begin.checked_add(len) {
            Some(end) if end <= self.total_sectors => end,
            _ => return Err(Error::OutsideVolume),
        };
        let conflict = if used {
            Error::DoubleAllocate
        } else {
            Error::DoubleFree
        };

        let groups = begin / L1_GROUP_SECTORS..(end - 1) / L1_GROUP_SECTORS + 1;

        // 只有首尾两组可能是部分覆盖
        let mut partial: Vec<(u64, L0Sector)> = Vec::with_capacity(2);
        for group in groups.clone() {
            let bits = self.bits_in_group(group, begin, end);
            let group_len = self.group_len(group);
            if bits.start == 0 && bits.end == group_len {
                let free = self.l1_free_count[group as usize] as u64;
                let expected = if used { group_len } else { 0 };
                if free != expected {
                    log::warn!("rfs: mark {begin}+{len} used={used} conflicts in group {group}");
                    return Err(conflict);
                }
            } else {
                let mut l0 = [0u8; SECTOR_SIZE];
                self.read_l0(disk, group, &mut l0)?;
                if bits.clone().any(|i| bit(&l0, i) == used) {
                    log::warn!("rfs: mark {begin}+{len} used={used} conflicts in group {group}");
                    return Err(conflict);
                }
                partial.push((group, l0));
            }
        }

        // 已经落盘的组，出错时按原样写回
        let mut written: Vec<(u64, L0Sector, u64)> = Vec::new();
        let mut result = Ok(());
        for group in groups.clone() {
            let bits = self.bits_in_group(group, begin, end);
            let prior = match partial.iter().find(|(g, _)| *g == group) {
                Some((_, l0)) => *l0,
                None => {
                    let mut l0 = [0u8; SECTOR_SIZE];
                    set_bits(&mut l0, 0..self.group_len(group), !used);
                    l0
                }
            };
            let mut l0 = prior;
            set_bits(&mut l0, bits.clone(), used);

            if let Err(err) = disk.write_device(self.map_start + group, &l0) {
                result = Err(err);
                break;
            }

            let free = self.l1_free_count[group as usize] as u64;
            written.push((group, prior, free));
            let changed = bits.end - bits.start;
            let free = if used { free - changed } else { free + changed };
            self.set_group_free(group, free);
        }

        if result.is_err() {
            for (group, prior, free) in written.into_iter().rev() {
                match disk.write_device(self.map_start + group, &prior) {
                    Ok(()) => self.set_group_free(group, free),
                    Err(err) => {
                        log::warn!("rfs: could not restore map sector of group {group}: {err}")
                    }
                }
            }
        }

        let supers = groups.start / L2_GROUPS_PER_SUPER..groups.end.div_ceil(L2_GROUPS_PER_SUPER);
        for sg in supers {
            self.refresh_super(sg);
        }

        if result.is_ok() {
            log::trace!("rfs: marked {begin}+{len} used={used}");
        }
        result
    }

    /// 查找并标记，整个过程在调用者持有的同一把锁内完成
    pub fn allocate(&mut self, disk: &Disk, need: u64) -> Result<SectorId, Error> {
        let start = self.find_free_extent(disk, need)?;
        self.mark_extent(disk, start, need, true)?;
        log::debug!("rfs: allocated {need} sectors at {start}");
        Ok(start)
    }

    /// 直接读取L0位图查询单个扇区
    pub fn is_used(&self, disk: &Disk, sector: SectorId) -> Result<bool, Error> {
        if sector.get() >= self.total_sectors {
            return Err(Error::OutsideVolume);
        }
        let group = sector.get() / L1_GROUP_SECTORS;
        let mut l0 = [0u8; SECTOR_SIZE];
        self.read_l0(disk, group, &mut l0)?;
        Ok(bit(&l0, sector.get() % L1_GROUP_SECTORS))
    }
}

impl FreeSpaceMap {
    #[inline]
    fn group_start(group: u64) -> u64 {
        group * L1_GROUP_SECTORS
    }

    /// 最后一组可能不满
    #[inline]
    fn group_len(&self, group: u64) -> u64 {
        (self.total_sectors - Self::group_start(group)).min(L1_GROUP_SECTORS)
    }

    /// `[begin, end)`落在组内的位区间
    fn bits_in_group(&self, group: u64, begin: u64, end: u64) -> Range<u64> {
        let gs = Self::group_start(group);
        begin.max(gs) - gs..end.min(gs + self.group_len(group)) - gs
    }

    fn set_group_free(&mut self, group: u64, free: u64) {
        self.l1_free_count[group as usize] = free as u16;
        self.l1_not_full.set(group, free > 0);
        self.l1_all_free.set(group, free == self.group_len(group));
    }

    fn refresh_super(&mut self, sg: u64) {
        let first = sg * L2_GROUPS_PER_SUPER;
        let groups = first..(first + L2_GROUPS_PER_SUPER).min(self.l1_groups);
        let not_full = groups.clone().any(|g| self.l1_not_full.get(g));
        let all_free = groups.into_iter().all(|g| self.l1_all_free.get(g));
        self.l2_not_full.set(sg, not_full);
        self.l2_all_free.set(sg, all_free);
    }

    fn read_l0(&self, disk: &Disk, group: u64, l0: &mut L0Sector) -> Result<(), Error> {
        disk.read_device(self.map_start + group, l0)
    }

    /// 有空闲扇区的组，跳过已满的超级组
    fn candidate_groups(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.l2_groups)
            .filter(move |&sg| self.l2_not_full.get(sg))
            .flat_map(move |sg| {
                let first = sg * L2_GROUPS_PER_SUPER;
                first..(first + L2_GROUPS_PER_SUPER).min(self.l1_groups)
            })
            .filter(move |&g| self.l1_not_full.get(g))
    }

    /// 在单个组内查找
    fn find_in_group(&self, disk: &Disk, need: u64) -> Result<Option<SectorId>, Error> {
        let mut l0 = [0u8; SECTOR_SIZE];
        for group in self.candidate_groups() {
            if (self.l1_free_count[group as usize] as u64) < need {
                continue;
            }
            let start = Self::group_start(group);
            if self.l1_all_free.get(group) {
                return Ok(Some(SectorId::new(start)));
            }
            self.read_l0(disk, group, &mut l0)?;
            if let Some(offset) = free_run(&l0, self.group_len(group), need) {
                return Ok(Some(SectorId::new(start + offset)));
            }
        }
        Ok(None)
    }

    /// 跨组查找：某组末尾的空闲段，接上若干全空闲组，再接下一组开头的空闲段
    fn find_spanning(&self, disk: &Disk, need: u64) -> Result<Option<SectorId>, Error> {
        let mut l0 = [0u8; SECTOR_SIZE];
        let mut run_start = 0;
        let mut run_len = 0;
        let mut prev_group = None;

        for group in self.candidate_groups() {
            // 中间隔着已满的组，连续段断开
            if prev_group.is_none_or(|prev| prev + 1 != group) {
                run_len = 0;
            }
            prev_group = Some(group);

            let start = Self::group_start(group);
            let len = self.group_len(group);
            if self.l1_all_free.get(group) {
                if run_len == 0 {
                    run_start = start;
                }
                run_len += len;
                if run_len >= need {
                    return Ok(Some(SectorId::new(run_start)));
                }
                continue;
            }

            self.read_l0(disk, group, &mut l0)?;
            if run_len > 0 {
                run_len += free_prefix(&l0, len);
                if run_len >= need {
                    return Ok(Some(SectorId::new(run_start)));
                }
            }
            let tail = free_tail(&l0, len);
            run_start = start + len - tail;
            run_len = tail;
            if tail > 0 && run_len >= need {
                return Ok(Some(SectorId::new(run_start)));
            }
        }
        Ok(None)
    }
}

#[inline]
fn bit(l0: &[u8], idx: u64) -> bool {
    l0[(idx >> 3) as usize] & (1 << (idx & 7)) != 0
}

fn set_bits(l0: &mut [u8], bits: Range<u64>, used: bool) {
    for idx in bits {
        let byte = &mut l0[(idx >> 3) as usize];
        if used {
            *byte |= 1 << (idx & 7);
        } else {
            *byte &= !(1 << (idx & 7));
        }
    }
}

/// `[0, len)`中的空闲位数
fn count_free(l0: &[u8], len: u64) -> u64 {
    let full = (len / 8) as usize;
    let used: u64 = l0[..full].iter().map(|b| b.count_ones() as u64).sum::<u64>()
        + (full as u64 * 8..len).filter(|&i| bit(l0, i)).count() as u64;
    len - used
}

/// `[0, len)`中第一段长度至少为`need`的空闲位的起点
fn free_run(l0: &[u8], len: u64, need: u64) -> Option<u64> {
    let mut run = 0;
    let mut idx = 0;
    while idx < len {
        // 整字节已用时直接跳过
        if idx % 8 == 0 && idx + 8 <= len && l0[(idx >> 3) as usize] == 0xFF {
            run = 0;
            idx += 8;
            continue;
        }
        if bit(l0, idx) {
            run = 0;
        } else {
            run += 1;
            if run == need {
                return Some(idx + 1 - need);
            }
        }
        idx += 1;
    }
    None
}

fn free_prefix(l0: &[u8], len: u64) -> u64 {
    (0..len).take_while(|&i| !bit(l0, i)).count() as u64
}

fn free_tail(l0: &[u8], len: u64) -> u64 {
    (0..len).rev().take_while(|&i| !bit(l0, i)).count() as u64
}
