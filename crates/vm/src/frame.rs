//! 物理帧句柄

use crate::address::Kva;

/// 一个用户物理帧
///
/// 由 [`crate::FrameTable`] 创建，同一时刻只被一个页持有。
/// 帧不会在 drop 时自动归还：归还必须经过帧表（[`crate::FrameTable::free`]），
/// 以便同时移除其登记项。
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct Frame {
    kva: Kva,
}

impl Frame {
    pub(crate) fn new(kva: Kva) -> Self {
        Frame { kva }
    }

    /// 帧的内核虚拟地址
    pub fn kva(&self) -> Kva {
        self.kva
    }

    /// 以字节切片访问帧内容
    pub(crate) fn bytes(&self, page_size: usize) -> &[u8] {
        // SAFETY: kva 指向页池分配的完整页面，且该帧由 self 独占持有
        unsafe { core::slice::from_raw_parts(self.kva.as_ptr(), page_size) }
    }

    /// 以可变字节切片访问帧内容
    pub(crate) fn bytes_mut(&mut self, page_size: usize) -> &mut [u8] {
        // SAFETY: 同 bytes，且 &mut self 保证没有其它内核侧引用
        unsafe { core::slice::from_raw_parts_mut(self.kva.as_mut_ptr(), page_size) }
    }
}
