//! 自旋锁实现
//!
//! 基于原子操作实现 [`lock_api::RawMutex`]，结合 [`IntrGuard`] 实现中断保护。

use crate::intr_guard::IntrGuard;
use core::{
    hint,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// 原始自旋锁。
///
/// 获取时先在本地 CPU 禁用中断，再自旋等待锁标志；释放时先清除锁标志，
/// 再恢复获取前的中断状态。不可重入。
///
/// 因为 `lock_api` 的守卫不携带额外数据，进入前的中断状态保存在锁自身中：
/// 只有持锁者会写入或读取它。
#[derive(Debug)]
pub struct RawSpinLock {
    lock: AtomicBool,
    saved_intr: AtomicUsize,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            lock: AtomicBool::new(false),
            saved_intr: AtomicUsize::new(0),
        }
    }

    fn try_acquire(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    // 守卫负责恢复本 CPU 的中断状态，不能跨线程移动
    type GuardMarker = lock_api::GuardNoSend;

    fn lock(&self) {
        let guard = IntrGuard::new();
        while !self.try_acquire() {
            while self.lock.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
        self.saved_intr.store(guard.into_raw(), Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        let guard = IntrGuard::new();
        if self.try_acquire() {
            self.saved_intr.store(guard.into_raw(), Ordering::Relaxed);
            true
        } else {
            // 获取失败，guard 在此处 drop 并恢复中断
            false
        }
    }

    unsafe fn unlock(&self) {
        let flags = self.saved_intr.load(Ordering::Relaxed);
        self.lock.store(false, Ordering::Release);
        // SAFETY: flags 由持锁者在 lock/try_lock 中保存，且只恢复一次
        drop(unsafe { IntrGuard::from_raw(flags) });
    }

    fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}
