//! 以槽位下标串联的LRU链表
//!
//! 所有节点存放在同一个`Vec`中，`prev`/`next`保存的是槽位下标而不是指针，
//! 查找表的值直接指向节点所在槽位，因此命中时可以O(1)地摘下节点并移到表尾。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::collections::TryReserveError;
use alloc::vec::Vec;
use core::ops::Range;

#[derive(Debug)]
struct Node {
    sector: u64,
    data: Box<[u8]>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct Lru {
    nodes: Vec<Node>,
    index: BTreeMap<u64, usize>,
    /// 最久未使用
    head: Option<usize>,
    /// 最近使用
    tail: Option<usize>,
    /// 被移除的槽位，缓冲区留待复用
    free: Vec<usize>,
    capacity: usize,
    sector_size: usize,
}

impl Lru {
    pub fn new(capacity: usize, sector_size: usize) -> Self {
        Self {
            nodes: Vec::new(),
            index: BTreeMap::new(),
            head: None,
            tail: None,
            free: Vec::new(),
            capacity,
            sector_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn contains(&self, sector: u64) -> bool {
        self.index.contains_key(&sector)
    }

    /// 命中则提升为最近使用
    pub fn get(&mut self, sector: u64) -> Option<&[u8]> {
        let slot = *self.index.get(&sector)?;
        self.touch(slot);
        Some(&*self.nodes[slot].data)
    }

    /// 覆盖或插入一个扇区，缓存已满时先淘汰最久未使用的扇区并复用它的缓冲区
    pub fn put(&mut self, sector: u64, data: &[u8]) -> Result<(), TryReserveError> {
        debug_assert_eq!(data.len(), self.sector_size);

        if let Some(&slot) = self.index.get(&sector) {
            self.nodes[slot].data.copy_from_slice(data);
            self.touch(slot);
            return Ok(());
        }

        if self.len() >= self.capacity {
            if let Some(slot) = self.head {
                self.unlink(slot);
                let node = &mut self.nodes[slot];
                log::trace!("evict sector {} for {sector}", node.sector);
                self.index.remove(&node.sector);
                node.sector = sector;
                node.data.copy_from_slice(data);
                self.index.insert(sector, slot);
                self.push_back(slot);
                return Ok(());
            }
        }

        if let Some(slot) = self.free.pop() {
            let node = &mut self.nodes[slot];
            node.sector = sector;
            node.data.copy_from_slice(data);
            self.index.insert(sector, slot);
            self.push_back(slot);
            return Ok(());
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(self.sector_size)?;
        buf.extend_from_slice(data);
        self.nodes.try_reserve(1)?;

        let slot = self.nodes.len();
        self.nodes.push(Node {
            sector,
            data: buf.into_boxed_slice(),
            prev: None,
            next: None,
        });
        self.index.insert(sector, slot);
        self.push_back(slot);
        Ok(())
    }

    /// 移除落在`sectors`内的所有扇区，返回移除的个数
    pub fn remove_range(&mut self, sectors: Range<u64>) -> usize {
        let slots: Vec<usize> = self.index.range(sectors).map(|(_, &slot)| slot).collect();
        for &slot in &slots {
            self.unlink(slot);
            self.index.remove(&self.nodes[slot].sector);
            self.free.push(slot);
        }
        slots.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// 从最久未使用到最近使用的扇区序列
    #[cfg(test)]
    pub fn order(&self) -> Vec<u64> {
        let mut order = Vec::new();
        let mut cur = self.head;
        while let Some(slot) = cur {
            order.push(self.nodes[slot].sector);
            cur = self.nodes[slot].next;
        }
        order
    }

    fn touch(&mut self, slot: usize) {
        if self.tail != Some(slot) {
            self.unlink(slot);
            self.push_back(slot);
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    fn push_back(&mut self, slot: usize) {
        self.nodes[slot].prev = self.tail;
        self.nodes[slot].next = None;
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }
}
