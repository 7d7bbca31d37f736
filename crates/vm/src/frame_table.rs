//! 帧表模块
//!
//! 帧表登记每一个被用户页占用的物理帧及其占用者，并在物理页池耗尽时选出牺牲帧。
//!
//! ## 置换策略（时钟）
//!
//! 登记项按加入顺序排成一圈，`hand` 指向下一个候选：
//!
//! 1. 钉住（pinned）的帧跳过：它们正在被装载或复制
//! 2. 占用者的页锁被其它上下文持有时跳过（`try_lock`），从不阻塞
//! 3. 访问位为 1 的帧清零后跳过（第二次机会）
//! 4. 否则换出该页，取回其帧
//!
//! 最多扫描两圈；两圈都找不到牺牲帧视为致命错误。
//!
//! ## 锁顺序
//!
//! 页锁 → 帧表锁 可以阻塞；帧表锁 → 页锁 只能 `try_lock`。交换区的锁是叶子锁。

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::SpinLock;

use crate::address::Kva;
use crate::arch_ops::PagePool;
use crate::frame::Frame;
use crate::page::Page;
use crate::swap::SwapStore;

/// 共享的页引用：补充页表持有强引用，帧表持有弱引用
pub type PageRef = Arc<SpinLock<Page>>;

/// 帧表登记项
struct FrameEntry {
    kva: Kva,
    owner: Weak<SpinLock<Page>>,
    pinned: bool,
}

struct FrameTableInner {
    /// 按加入顺序排列，即时钟扫描顺序
    entries: Vec<FrameEntry>,
    /// 时钟指针
    hand: usize,
}

impl FrameTableInner {
    fn position(&self, kva: Kva) -> Option<usize> {
        self.entries.iter().position(|e| e.kva == kva)
    }

    /// 移除登记项，保持时钟指针指向原来的下一个候选
    fn remove_at(&mut self, idx: usize) -> FrameEntry {
        let entry = self.entries.remove(idx);
        if idx < self.hand {
            self.hand -= 1;
        }
        entry
    }
}

/// 帧表统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// 当前被占用的帧数
    pub resident: usize,
    /// 其中被钉住的帧数
    pub pinned: usize,
    /// 累计置换次数
    pub evictions: usize,
}

/// 帧表
pub struct FrameTable {
    pool: Arc<dyn PagePool>,
    inner: SpinLock<FrameTableInner>,
    evictions: AtomicUsize,
}

impl FrameTable {
    /// 在页池上创建帧表
    pub fn new(pool: Arc<dyn PagePool>) -> Self {
        Self {
            pool,
            inner: SpinLock::new(FrameTableInner {
                entries: Vec::new(),
                hand: 0,
            }),
            evictions: AtomicUsize::new(0),
        }
    }

    /// 为 `owner` 取得一个帧
    ///
    /// 页池有空闲页时直接分配，否则置换一个牺牲帧。返回的帧处于钉住状态，
    /// 调用者完成装载后必须调用 [`FrameTable::unpin`]（或失败时 [`FrameTable::free`]）。
    ///
    /// # Panics
    /// 页池耗尽且没有可置换的帧时 panic
    pub fn allocate(&self, owner: &PageRef, swap: &SwapStore) -> Frame {
        let mut inner = self.inner.lock();
        let kva = match self.pool.alloc_page() {
            Some(kva) => kva,
            None => self.evict(&mut inner, swap),
        };
        inner.entries.push(FrameEntry {
            kva,
            owner: Arc::downgrade(owner),
            pinned: true,
        });
        Frame::new(kva)
    }

    fn evict(&self, inner: &mut FrameTableInner, swap: &SwapStore) -> Kva {
        let rounds = inner.entries.len() * 2;
        for _ in 0..rounds {
            if inner.entries.is_empty() {
                break;
            }
            if inner.hand >= inner.entries.len() {
                inner.hand = 0;
            }
            let idx = inner.hand;
            inner.hand += 1;

            let entry = &inner.entries[idx];
            if entry.pinned {
                continue;
            }
            let kva = entry.kva;
            let Some(page_ref) = entry.owner.upgrade() else {
                // 占用者已不存在，帧直接回收
                inner.remove_at(idx);
                return kva;
            };
            let Some(mut page) = page_ref.try_lock() else {
                continue;
            };
            if page.take_accessed() {
                continue;
            }
            match page.swap_out(swap) {
                Ok(frame) => {
                    debug_assert_eq!(frame.kva(), kva);
                    inner.remove_at(idx);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    log::debug!("vm: evicted page {:#x} from frame {:#x}", page.va(), kva);
                    return frame.kva();
                }
                Err(e) => {
                    log::warn!("vm: cannot evict page {:#x}: {}", page.va(), e);
                }
            }
        }
        panic!("vm: frame pool exhausted and no frame can be evicted");
    }

    /// 解除钉住，帧重新成为置换候选
    pub fn unpin(&self, kva: Kva) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.position(kva) {
            inner.entries[idx].pinned = false;
        }
    }

    /// 注销并归还一个帧
    pub fn free(&self, frame: Frame) {
        let kva = frame.kva();
        let mut inner = self.inner.lock();
        match inner.position(kva) {
            Some(idx) => {
                inner.remove_at(idx);
            }
            None => log::warn!("vm: freeing unregistered frame {:#x}", kva),
        }
        drop(inner);
        self.pool.free_page(kva);
    }

    /// 获取帧表的当前状态
    pub fn stats(&self) -> FrameStats {
        let inner = self.inner.lock();
        FrameStats {
            resident: inner.entries.len(),
            pinned: inner.entries.iter().filter(|e| e.pinned).count(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
