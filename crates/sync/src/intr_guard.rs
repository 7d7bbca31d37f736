//! 中断保护器
//!
//! 基于 RAII 实现中断保护，在创建时禁用中断，销毁时恢复。
//!
//! 注意：禁用中断只能阻止**本地 CPU** 的“任务 vs 本地中断”并发，
//! 并不能阻止其他 CPU 的并行访问；多核共享数据仍需要配合自旋锁等原语。

use crate::arch_ops;

/// 未注册 [`crate::ArchOps`] 时保存的占位状态
const NO_ARCH: usize = usize::MAX;

/// 中断保护器，基于 RAII 实现中断保护。
///
/// 在创建时原子地禁用中断并保存之前的状态；
/// 在销毁时自动恢复之前的中断状态。
///
/// # 示例
/// ```ignore
/// {
///     let guard = IntrGuard::new(); // 禁用中断
///     // 临界区代码
/// } // 离开作用域，自动恢复中断状态
/// ```
pub struct IntrGuard {
    flags: usize,
}

impl IntrGuard {
    /// 原子地禁用中断并返回一个 IntrGuard 实例。
    pub fn new() -> Self {
        let flags = match arch_ops() {
            // SAFETY: 保存的 flags 会在 drop 时原样恢复
            Some(ops) => unsafe { ops.read_and_disable_interrupts() },
            None => NO_ARCH,
        };
        IntrGuard { flags }
    }

    /// 检查进入临界区前，中断是否处于启用状态。
    ///
    /// 未注册架构操作时视为启用。
    pub fn was_enabled(&self) -> bool {
        match arch_ops() {
            Some(ops) if self.flags != NO_ARCH => self.flags & ops.intr_enable_mask() != 0,
            _ => true,
        }
    }

    /// 放弃 RAII 语义，取出保存的状态
    ///
    /// 供不能持有 guard 对象的锁实现（如 [`crate::RawSpinLock`]）暂存。
    pub(crate) fn into_raw(self) -> usize {
        let flags = self.flags;
        core::mem::forget(self);
        flags
    }

    /// 由 [`IntrGuard::into_raw`] 的结果重建保护器
    ///
    /// # Safety
    /// `flags` 必须来自一次尚未恢复的 `into_raw`
    pub(crate) unsafe fn from_raw(flags: usize) -> Self {
        IntrGuard { flags }
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    /// 当 IntrGuard 离开作用域时，自动恢复中断状态。
    fn drop(&mut self) {
        if self.flags == NO_ARCH {
            return;
        }
        if let Some(ops) = arch_ops() {
            // SAFETY: flags 是在创建 IntrGuard 时保存的
            unsafe { ops.restore_interrupts(self.flags) };
        }
    }
}
