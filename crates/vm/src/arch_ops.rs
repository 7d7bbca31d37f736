//! 架构相关内存管理操作 trait 定义
//!
//! 补充页表只决定“应该映射什么”，真正的硬件页表与物理页池由内核按架构实现。

use crate::address::{Kva, Vaddr};

/// 用户物理页池
///
/// 内核在初始化时实现并交给 [`crate::Vm::new`]。
pub trait PagePool: Send + Sync {
    /// 分配一个用户页，池耗尽时返回 `None`
    ///
    /// 返回页面的内容未定义。
    fn alloc_page(&self) -> Option<Kva>;

    /// 归还一个由 [`PagePool::alloc_page`] 分配的页
    fn free_page(&self, kva: Kva);
}

/// 一个进程的硬件页表
///
/// 脏位与访问位由硬件在用户访存时设置，此处只负责读取和清除。
pub trait Mmu: Send + Sync {
    /// 将用户页 `va` 映射到帧 `kva`；失败（如页表页分配失败）返回 false
    fn set_mapping(&self, va: Vaddr, kva: Kva, writable: bool) -> bool;

    /// 解除 `va` 的映射，返回移除时页表项的脏位
    ///
    /// 读取脏位与移除表项须是一次原子操作，未映射时返回 false。
    fn clear_mapping(&self, va: Vaddr) -> bool;

    /// 读取脏位
    fn is_dirty(&self, va: Vaddr) -> bool;

    /// 设置脏位
    fn set_dirty(&self, va: Vaddr, dirty: bool);

    /// 读取访问位
    fn is_accessed(&self, va: Vaddr) -> bool;

    /// 设置访问位
    fn set_accessed(&self, va: Vaddr, accessed: bool);
}
