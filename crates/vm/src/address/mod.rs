//! 地址模块
//!
//! 此模块提供虚拟内存子系统使用的两类地址：
//!
//! - [`Vaddr`] - 用户虚拟地址，是补充页表的键
//! - [`Kva`] - 内核虚拟地址，即物理帧在内核直接映射区中的地址
//!
//! 两者都实现 [`AlignOps`]，以页大小为参数做对齐计算。页大小来自
//! [`crate::VmConfig`]，不在类型中固化。

use core::fmt;

/// 地址对齐操作
pub trait AlignOps: Sized + Copy {
    /// 取出原始值
    fn as_usize(self) -> usize;

    /// 由原始值构造
    fn from_usize(value: usize) -> Self;

    /// 向下对齐到 `align`（必须是 2 的幂）
    fn align_down(self, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        Self::from_usize(self.as_usize() & !(align - 1))
    }

    /// 向上对齐到 `align`，溢出时返回 `None`
    fn align_up(self, align: usize) -> Option<Self> {
        debug_assert!(align.is_power_of_two());
        let v = self.as_usize().checked_add(align - 1)?;
        Some(Self::from_usize(v & !(align - 1)))
    }

    /// 是否按 `align` 对齐
    fn is_aligned(self, align: usize) -> bool {
        self.as_usize() & (align - 1) == 0
    }

    /// 在 `align` 大小的块内的偏移
    fn offset_in(self, align: usize) -> usize {
        self.as_usize() & (align - 1)
    }
}

/// 用户虚拟地址
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Vaddr(usize);

impl Vaddr {
    /// 创建虚拟地址
    pub const fn new(addr: usize) -> Self {
        Vaddr(addr)
    }

    /// 是否为空地址
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// 加上偏移量，溢出时返回 `None`
    pub fn checked_add(self, offset: usize) -> Option<Self> {
        self.0.checked_add(offset).map(Vaddr)
    }
}

impl AlignOps for Vaddr {
    fn as_usize(self) -> usize {
        self.0
    }

    fn from_usize(value: usize) -> Self {
        Vaddr(value)
    }
}

impl From<usize> for Vaddr {
    fn from(addr: usize) -> Self {
        Vaddr(addr)
    }
}

impl fmt::LowerHex for Vaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// 内核虚拟地址（物理帧的内核映射）
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kva(usize);

impl Kva {
    /// 创建内核虚拟地址
    pub const fn new(addr: usize) -> Self {
        Kva(addr)
    }

    /// 作为可变字节指针
    pub fn as_mut_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }

    /// 作为只读字节指针
    pub fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }
}

impl AlignOps for Kva {
    fn as_usize(self) -> usize {
        self.0
    }

    fn from_usize(value: usize) -> Self {
        Kva(value)
    }
}

impl fmt::LowerHex for Kva {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
