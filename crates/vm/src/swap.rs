//! 交换区模块
//!
//! 交换区把一个扇区设备按页大小切分为槽位（slot），匿名页被换出时写入一个槽位。
//!
//! ## 分配策略（位图）
//!
//! - **bitmap**：每个 bit 表示一个槽位（0=空闲，1=已占用）
//! - **last_alloc_hint**：上次分配所在的 u64 下标，利用局部性加速查找
//!
//! 释放时直接清除对应 bit。槽位的读写不持有位图锁：槽位一旦分配，
//! 只有持有它的页会访问对应扇区。

use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::SpinLock;

use crate::error::{VmError, VmResult};

/// 交换设备（按扇区寻址的块设备）
pub trait SwapDevice: Send + Sync {
    /// 扇区大小（字节）
    fn sector_size(&self) -> usize;

    /// 扇区总数
    fn total_sectors(&self) -> usize;

    /// 读一个扇区，`buf` 长度等于扇区大小
    fn read_sector(&self, sector: usize, buf: &mut [u8]) -> bool;

    /// 写一个扇区，`buf` 长度等于扇区大小
    fn write_sector(&self, sector: usize, buf: &[u8]) -> bool;
}

/// 交换槽位编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    /// 槽位下标
    pub fn index(self) -> usize {
        self.0
    }
}

/// 槽位位图
struct SlotBitmap {
    /// 位图数据（每个 bit 表示一个槽位：0=空闲，1=已占用）
    bitmap: Vec<u64>,
    /// 总槽位数
    total_slots: usize,
    /// 已占用槽位数
    used_count: usize,
    /// 上次分配的位置提示
    last_alloc_hint: usize,
}

impl SlotBitmap {
    fn new(total_slots: usize) -> Self {
        Self {
            bitmap: alloc::vec![0u64; total_slots.div_ceil(64)],
            total_slots,
            used_count: 0,
            last_alloc_hint: 0,
        }
    }

    #[inline]
    fn is_free(&self, idx: usize) -> bool {
        (self.bitmap[idx / 64] & (1u64 << (idx % 64))) == 0
    }

    #[inline]
    fn mark_used(&mut self, idx: usize) {
        self.bitmap[idx / 64] |= 1u64 << (idx % 64);
    }

    #[inline]
    fn mark_free(&mut self, idx: usize) {
        self.bitmap[idx / 64] &= !(1u64 << (idx % 64));
    }

    /// 从 last_alloc_hint 开始循环查找第一个空闲位
    fn alloc(&mut self) -> Option<usize> {
        let len = self.bitmap.len();
        for offset in 0..len {
            let word_idx = (self.last_alloc_hint + offset) % len;
            let word = self.bitmap[word_idx];
            // 快速跳过全满的 u64
            if word == u64::MAX {
                continue;
            }
            let idx = word_idx * 64 + (!word).trailing_zeros() as usize;
            // 最后一个字的高位不对应槽位
            if idx >= self.total_slots {
                continue;
            }
            self.mark_used(idx);
            self.used_count += 1;
            self.last_alloc_hint = word_idx;
            return Some(idx);
        }
        None
    }

    fn free(&mut self, idx: usize) {
        assert!(idx < self.total_slots, "swap: slot {} out of range", idx);
        assert!(!self.is_free(idx), "swap: double free of slot {}", idx);
        self.mark_free(idx);
        self.used_count -= 1;
    }
}

/// 交换区统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStats {
    /// 总槽位数
    pub total_slots: usize,
    /// 已占用槽位数
    pub used_slots: usize,
}

/// 交换区
pub struct SwapStore {
    device: Option<Arc<dyn SwapDevice>>,
    sector_size: usize,
    sectors_per_page: usize,
    slots: SpinLock<SlotBitmap>,
}

impl SwapStore {
    /// 在 `device` 上建立交换区
    ///
    /// 页大小必须是扇区大小的整数倍；设备末尾不足一页的扇区不使用。
    pub fn new(device: Arc<dyn SwapDevice>, page_size: usize) -> VmResult<Self> {
        let sector_size = device.sector_size();
        if sector_size == 0 || page_size % sector_size != 0 {
            return Err(VmError::InvalidArgument);
        }
        let sectors_per_page = page_size / sector_size;
        let total_slots = device.total_sectors() / sectors_per_page;
        log::info!(
            "swap: {} slots ({} sectors of {} bytes per page)",
            total_slots,
            sectors_per_page,
            sector_size
        );
        Ok(Self {
            device: Some(device),
            sector_size,
            sectors_per_page,
            slots: SpinLock::new(SlotBitmap::new(total_slots)),
        })
    }

    /// 没有交换设备时的空交换区，所有分配都失败
    pub fn disabled() -> Self {
        Self {
            device: None,
            sector_size: 0,
            sectors_per_page: 0,
            slots: SpinLock::new(SlotBitmap::new(0)),
        }
    }

    /// 分配一个槽位，交换区满时返回 `None`
    pub fn alloc_slot(&self) -> Option<SwapSlot> {
        self.slots.lock().alloc().map(SwapSlot)
    }

    /// 释放一个槽位
    ///
    /// # Panics
    /// 重复释放或越界时 panic
    pub fn free_slot(&self, slot: SwapSlot) {
        self.slots.lock().free(slot.0);
    }

    /// 将一页数据写入槽位
    pub fn write_slot(&self, slot: SwapSlot, page: &[u8]) -> VmResult<()> {
        let device = self.device.as_ref().ok_or(VmError::SwapExhausted)?;
        debug_assert_eq!(page.len(), self.sector_size * self.sectors_per_page);
        let first = slot.0 * self.sectors_per_page;
        for (i, chunk) in page.chunks(self.sector_size).enumerate() {
            if !device.write_sector(first + i, chunk) {
                log::error!("swap: failed to write sector {} of slot {}", first + i, slot.0);
                return Err(VmError::IoError);
            }
        }
        Ok(())
    }

    /// 从槽位读出一页数据，不释放槽位
    pub fn read_slot(&self, slot: SwapSlot, page: &mut [u8]) -> VmResult<()> {
        let device = self.device.as_ref().ok_or(VmError::SwapExhausted)?;
        debug_assert_eq!(page.len(), self.sector_size * self.sectors_per_page);
        let first = slot.0 * self.sectors_per_page;
        for (i, chunk) in page.chunks_mut(self.sector_size).enumerate() {
            if !device.read_sector(first + i, chunk) {
                log::error!("swap: failed to read sector {} of slot {}", first + i, slot.0);
                return Err(VmError::IoError);
            }
        }
        Ok(())
    }

    /// 获取交换区的当前状态
    pub fn stats(&self) -> SwapStats {
        let slots = self.slots.lock();
        SwapStats {
            total_slots: slots.total_slots,
            used_slots: slots.used_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::mock::device::MockRamDisk;

    const PAGE: usize = 4096;

    fn store(slots: usize) -> (Arc<MockRamDisk>, SwapStore) {
        let disk = Arc::new(MockRamDisk::new(slots * 8, 512));
        let swap = SwapStore::new(disk.clone(), PAGE).unwrap();
        (disk, swap)
    }

    #[test]
    fn test_alloc_until_full_then_reuse() {
        let (_disk, swap) = store(3);
        let a = swap.alloc_slot().unwrap();
        let b = swap.alloc_slot().unwrap();
        let c = swap.alloc_slot().unwrap();
        assert_eq!([a.index(), b.index(), c.index()], [0, 1, 2]);
        assert!(swap.alloc_slot().is_none());
        assert_eq!(swap.stats().used_slots, 3);

        swap.free_slot(b);
        assert_eq!(swap.alloc_slot(), Some(b));
    }

    #[test]
    fn test_slot_round_trip() {
        let (disk, swap) = store(2);
        let slot = swap.alloc_slot().unwrap();
        let page: Vec<u8> = (0..PAGE).map(|i| (i * 7) as u8).collect();
        swap.write_slot(slot, &page).unwrap();
        assert_eq!(disk.writes(), 8);

        let mut back = vec![0u8; PAGE];
        swap.read_slot(slot, &mut back).unwrap();
        assert_eq!(back, page);
    }

    #[test]
    fn test_partial_trailing_sectors_ignored() {
        let disk = Arc::new(MockRamDisk::new(8 * 2 + 5, 512));
        let swap = SwapStore::new(disk, PAGE).unwrap();
        assert_eq!(swap.stats().total_slots, 2);
    }

    #[test]
    fn test_sector_size_must_divide_page() {
        let disk = Arc::new(MockRamDisk::new(16, 3000));
        assert_eq!(
            SwapStore::new(disk, PAGE).err(),
            Some(VmError::InvalidArgument)
        );
    }

    #[test]
    fn test_device_failure_reported() {
        let (disk, swap) = store(1);
        let slot = swap.alloc_slot().unwrap();
        disk.set_fail_writes(true);
        assert_eq!(swap.write_slot(slot, &[0u8; PAGE]), Err(VmError::IoError));
    }

    #[test]
    fn test_disabled_store_has_no_slots() {
        let swap = SwapStore::disabled();
        assert!(swap.alloc_slot().is_none());
        assert_eq!(swap.stats().total_slots, 0);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let (_disk, swap) = store(1);
        let slot = swap.alloc_slot().unwrap();
        swap.free_slot(slot);
        swap.free_slot(slot);
    }
}
