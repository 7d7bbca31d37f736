//! 页模块
//!
//! 一个 [`Page`] 描述一个用户虚拟页：它的地址、权限、当前占用的帧（如果常驻）
//! 以及按类型区分的后备状态 [`PageKind`]。
//!
//! # 状态机
//!
//! ```text
//!            首次 claim
//! Uninit ───────────────► Anon ◄──► (交换区槽位)
//!        └──────────────► File ◄──► (后备文件)
//! ```
//!
//! 类型的转换只在首次装载时发生一次；之后页只在“常驻”与“被换出”之间切换。

mod anon;
mod file;
mod uninit;

pub use anon::AnonPage;
pub use file::{FilePage, FileSpan};
pub use uninit::{LazyLoad, LoadFn, UninitPage};

use alloc::sync::Arc;
use core::mem;

use crate::address::{AlignOps, Kva, Vaddr};
use crate::arch_ops::Mmu;
use crate::error::{VmError, VmResult};
use crate::frame::Frame;
use crate::swap::{SwapSlot, SwapStore};

/// 页类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// 尚未装载
    Uninit,
    /// 匿名页
    Anon,
    /// 文件页
    File,
    /// 页缓存（保留，当前不支持创建）
    PageCache,
}

/// 按类型区分的页状态
#[derive(Debug)]
pub enum PageKind {
    /// 未初始化页
    Uninit(UninitPage),
    /// 匿名页
    Anon(AnonPage),
    /// 文件页
    File(FilePage),
}

/// 一个用户虚拟页
pub struct Page {
    va: Vaddr,
    writable: bool,
    is_stack: bool,
    frame: Option<Frame>,
    /// 所属映射组（以组首页地址标识）
    group: Option<Vaddr>,
    mmu: Arc<dyn Mmu>,
    page_size: usize,
    kind: PageKind,
}

impl Page {
    /// 创建一个未初始化页
    ///
    /// `target` 只能是 [`PageType::Anon`] 或 [`PageType::File`]；
    /// 文件页必须带有 [`LazyLoad::File`] 描述。
    pub fn new_uninit(
        va: Vaddr,
        writable: bool,
        target: PageType,
        loader: Option<LazyLoad>,
        mmu: Arc<dyn Mmu>,
        page_size: usize,
    ) -> VmResult<Self> {
        if !va.is_aligned(page_size) {
            return Err(VmError::InvalidAddress);
        }
        let uninit = match (target, loader) {
            (PageType::Anon, loader) => UninitPage::anon(loader),
            (PageType::File, Some(LazyLoad::File(span))) => UninitPage::file(span),
            (PageType::File, _) | (PageType::Uninit, _) => return Err(VmError::InvalidArgument),
            (PageType::PageCache, _) => return Err(VmError::UnsupportedType),
        };
        Ok(Self {
            va,
            writable,
            is_stack: false,
            frame: None,
            group: None,
            mmu,
            page_size,
            kind: PageKind::Uninit(uninit),
        })
    }

    /// 页起始地址
    pub fn va(&self) -> Vaddr {
        self.va
    }

    /// 是否可写
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// 是否为栈页
    pub fn is_stack(&self) -> bool {
        self.is_stack
    }

    pub(crate) fn set_stack(&mut self, is_stack: bool) {
        self.is_stack = is_stack;
    }

    /// 所属映射组的首页地址
    pub fn group(&self) -> Option<Vaddr> {
        self.group
    }

    pub(crate) fn set_group(&mut self, group: Option<Vaddr>) {
        self.group = group;
    }

    /// 是否常驻内存
    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }

    /// 当前帧的内核地址
    pub fn frame_kva(&self) -> Option<Kva> {
        self.frame.as_ref().map(Frame::kva)
    }

    /// 当前状态的类型标签
    pub fn kind_type(&self) -> PageType {
        match self.kind {
            PageKind::Uninit(_) => PageType::Uninit,
            PageKind::Anon(_) => PageType::Anon,
            PageKind::File(_) => PageType::File,
        }
    }

    /// 有效类型：未初始化页报告其目标类型
    pub fn page_type(&self) -> PageType {
        match &self.kind {
            PageKind::Uninit(u) => u.target(),
            _ => self.kind_type(),
        }
    }

    /// 按类型区分的状态
    pub fn kind(&self) -> &PageKind {
        &self.kind
    }

    /// 被换出的匿名页所在槽位
    pub fn swap_slot(&self) -> Option<SwapSlot> {
        match &self.kind {
            PageKind::Anon(anon) => anon.slot(),
            _ => None,
        }
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    pub(crate) fn attach_frame(&mut self, frame: Frame) {
        debug_assert!(self.frame.is_none(), "page {:#x} already has a frame", self.va);
        self.frame = Some(frame);
    }

    pub(crate) fn detach_frame(&mut self) -> Option<Frame> {
        self.frame.take()
    }

    /// 读取并清除访问位，供时钟算法给予第二次机会
    pub(crate) fn take_accessed(&self) -> bool {
        let accessed = self.mmu.is_accessed(self.va);
        if accessed {
            self.mmu.set_accessed(self.va, false);
        }
        accessed
    }

    /// 把内容装入已绑定的帧
    ///
    /// 未初始化页在此执行一次惰性装载并转为目标类型；装载失败时保持未初始化。
    pub(crate) fn swap_in(&mut self, swap: &SwapStore) -> VmResult<()> {
        let page_size = self.page_size;
        let frame = self.frame.as_mut().ok_or(VmError::NotMapped)?;
        let buf = frame.bytes_mut(page_size);
        match &mut self.kind {
            PageKind::Uninit(uninit) => {
                uninit.load(buf)?;
                let PageKind::Uninit(uninit) =
                    mem::replace(&mut self.kind, PageKind::Anon(AnonPage::new()))
                else {
                    return Err(VmError::UnsupportedType);
                };
                self.kind = uninit.into_initialized();
                Ok(())
            }
            PageKind::Anon(anon) => anon.swap_in(buf, swap),
            PageKind::File(file) => file.swap_in(buf),
        }
    }

    /// 换出：解除映射、保存内容，并把帧交还给调用者
    ///
    /// 保存失败时恢复原映射与脏位，页保持常驻。
    pub(crate) fn swap_out(&mut self, swap: &SwapStore) -> VmResult<Frame> {
        let page_size = self.page_size;
        let frame = self.frame.as_ref().ok_or(VmError::NotMapped)?;
        let kva = frame.kva();
        let dirty = self.mmu.clear_mapping(self.va);

        let buf = frame.bytes(page_size);
        let result = match &mut self.kind {
            PageKind::Uninit(_) => Err(VmError::UnsupportedType),
            PageKind::Anon(anon) => anon.swap_out(buf, swap),
            PageKind::File(file) => file.swap_out(buf, dirty),
        };
        if let Err(e) = result {
            if self.mmu.set_mapping(self.va, kva, self.writable) && dirty {
                self.mmu.set_dirty(self.va, true);
            }
            return Err(e);
        }
        self.frame.take().ok_or(VmError::NotMapped)
    }

    /// 释放页持有的后备资源
    ///
    /// 常驻且 `dirty` 的文件页写回；被换出的匿名页释放槽位。
    /// `dirty` 由调用者在解除映射时取得，帧本身也由调用者归还。
    pub(crate) fn destroy(&mut self, swap: &SwapStore, dirty: bool) {
        self.group = None;
        match &mut self.kind {
            PageKind::Uninit(_) => {}
            PageKind::Anon(anon) => anon.destroy(swap),
            PageKind::File(file) => {
                let Some(frame) = &self.frame else {
                    return;
                };
                if dirty {
                    if let Err(e) = file.span().write_back(frame.bytes(self.page_size)) {
                        log::error!("vm: writeback of {:#x} failed: {}", self.va, e);
                    }
                }
            }
        }
    }

    /// 复制出属于另一个页表的页，不带帧
    ///
    /// 未初始化页复制描述；匿名页得到空状态（内容由调用者填入）；文件页共享区段。
    pub(crate) fn duplicate(&self, mmu: Arc<dyn Mmu>) -> Page {
        let kind = match &self.kind {
            PageKind::Uninit(uninit) => PageKind::Uninit(uninit.clone()),
            PageKind::Anon(_) => PageKind::Anon(AnonPage::new()),
            PageKind::File(file) => PageKind::File(file.clone()),
        };
        Page {
            va: self.va,
            writable: self.writable,
            is_stack: self.is_stack,
            frame: None,
            group: self.group,
            mmu,
            page_size: self.page_size,
            kind,
        }
    }

    /// 以字节切片访问常驻页的内容
    pub(crate) fn frame_bytes(&self) -> Option<&[u8]> {
        self.frame.as_ref().map(|f| f.bytes(self.page_size))
    }
}

impl core::fmt::Debug for Page {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Page")
            .field("va", &self.va)
            .field("writable", &self.writable)
            .field("is_stack", &self.is_stack)
            .field("frame", &self.frame)
            .field("group", &self.group)
            .field("kind", &self.kind)
            .finish()
    }
}
