//! 补充页表
//!
//! 每个进程一个 [`SupplementalPageTable`]，记录每个用户虚拟页应当是什么：
//! 硬件页表只描述当前常驻的页，补充页表还描述尚未装载、已被换出的页。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use sync::SpinLock;

use crate::address::{AlignOps, Vaddr};
use crate::arch_ops::Mmu;
use crate::error::{VmError, VmResult};
use crate::frame_table::PageRef;
use crate::manager::Vm;
use crate::mmap::MappingGroup;
use crate::page::{LazyLoad, Page, PageType};

/// 补充页表
pub struct SupplementalPageTable {
    pub(crate) vm: Arc<Vm>,
    pub(crate) mmu: Arc<dyn Mmu>,
    pub(crate) pages: BTreeMap<Vaddr, PageRef>,
    pub(crate) groups: BTreeMap<Vaddr, MappingGroup>,
    torn_down: bool,
}

impl SupplementalPageTable {
    /// 为一个进程创建空的补充页表
    pub fn new(vm: Arc<Vm>, mmu: Arc<dyn Mmu>) -> Self {
        Self {
            vm,
            mmu,
            pages: BTreeMap::new(),
            groups: BTreeMap::new(),
            torn_down: false,
        }
    }

    /// 虚拟内存子系统
    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    /// 该进程的 MMU
    pub fn mmu(&self) -> &Arc<dyn Mmu> {
        &self.mmu
    }

    fn page_size(&self) -> usize {
        self.vm.config().page_size
    }

    /// 页数
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// 是否没有任何页
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// 按地址顺序遍历页
    pub fn iter(&self) -> impl Iterator<Item = (&Vaddr, &PageRef)> {
        self.pages.iter()
    }

    /// 登记一个页
    ///
    /// 页地址必须页对齐，且该地址尚未被占用。
    pub fn register(&mut self, page: Page) -> VmResult<PageRef> {
        if self.torn_down {
            return Err(VmError::TornDown);
        }
        let va = page.va();
        if !va.is_aligned(self.page_size()) {
            return Err(VmError::InvalidAddress);
        }
        if self.pages.contains_key(&va) {
            return Err(VmError::AlreadyMapped);
        }
        let page = Arc::new(SpinLock::new(page));
        self.pages.insert(va, page.clone());
        Ok(page)
    }

    /// 查找包含 `va` 的页（`va` 向下取整到页边界）
    pub fn lookup(&self, va: Vaddr) -> Option<PageRef> {
        self.pages.get(&va.align_down(self.page_size())).cloned()
    }

    /// 是否存在包含 `va` 的页
    pub fn contains(&self, va: Vaddr) -> bool {
        self.pages.contains_key(&va.align_down(self.page_size()))
    }

    /// 移除包含 `va` 的页并释放其资源
    ///
    /// 若该页属于某个映射组，同时把它从组中摘除。
    pub fn remove(&mut self, va: Vaddr) -> VmResult<()> {
        let va = va.align_down(self.page_size());
        let page = self.pages.remove(&va).ok_or(VmError::NotMapped)?;
        let group = page.lock().group();
        if let Some(base) = group {
            if let Some(g) = self.groups.get_mut(&base) {
                g.members.retain(|m| *m != va);
                if g.members.is_empty() {
                    self.groups.remove(&base);
                }
            }
        }
        self.release(&page);
        Ok(())
    }

    /// 销毁页：释放后备资源，解除映射并归还帧
    pub(crate) fn release(&self, page_ref: &PageRef) {
        let mut page = page_ref.lock();
        let dirty = page.is_resident() && self.mmu.clear_mapping(page.va());
        page.destroy(self.vm.swap(), dirty);
        if let Some(frame) = page.detach_frame() {
            self.vm.frame_table().free(frame);
        }
    }

    /// 创建一个带惰性装载的未初始化页
    pub fn alloc_page_with_initializer(
        &mut self,
        ty: PageType,
        va: Vaddr,
        writable: bool,
        loader: Option<LazyLoad>,
    ) -> VmResult<PageRef> {
        let page = Page::new_uninit(
            va,
            writable,
            ty,
            loader,
            self.mmu.clone(),
            self.page_size(),
        )?;
        self.register(page)
    }

    /// 创建一个首次访问时填零的未初始化页
    pub fn alloc_page(&mut self, ty: PageType, va: Vaddr, writable: bool) -> VmResult<PageRef> {
        self.alloc_page_with_initializer(ty, va, writable, None)
    }

    /// 立即为包含 `va` 的页取得帧并装载内容
    pub fn claim_page(&self, va: Vaddr) -> VmResult<()> {
        let page = self.lookup(va).ok_or(VmError::NotMapped)?;
        self.claim(&page)
    }

    /// 包含 `va` 的页的有效类型
    pub fn page_type(&self, va: Vaddr) -> Option<PageType> {
        self.lookup(va).map(|page| page.lock().page_type())
    }

    /// 取得帧、安装映射、装载内容；已常驻时直接成功
    pub(crate) fn claim(&self, page_ref: &PageRef) -> VmResult<()> {
        let mut page = page_ref.lock();
        if page.is_resident() {
            return Ok(());
        }
        let frames = self.vm.frame_table();
        let frame = frames.allocate(page_ref, self.vm.swap());
        let kva = frame.kva();
        page.attach_frame(frame);

        let result = if self.mmu.set_mapping(page.va(), kva, page.writable()) {
            page.swap_in(self.vm.swap())
        } else {
            Err(VmError::MappingFailed)
        };
        match result {
            Ok(()) => {
                frames.unpin(kva);
                log::debug!("vm: claimed page {:#x} -> frame {:#x}", page.va(), kva);
                Ok(())
            }
            Err(e) => {
                self.mmu.clear_mapping(page.va());
                if let Some(frame) = page.detach_frame() {
                    frames.free(frame);
                }
                log::warn!("vm: failed to claim page {:#x}: {}", page.va(), e);
                Err(e)
            }
        }
    }

    /// 把 `src` 的全部页复制进本页表（fork）
    ///
    /// - 未初始化页：复制惰性装载描述，仍然惰性
    /// - 常驻页：立即分配新帧并复制内容，脏位一并复制
    /// - 被换出的匿名页：从交换区读出到新帧，源槽位保持不变
    /// - 未常驻的文件页：保持未常驻，之后从文件装载
    ///
    /// `src` 的映射组并入本页表已有的映射组。
    ///
    /// 任一页失败即中止并返回错误；已复制的部分留在本页表中，由调用者销毁。
    pub fn copy_from(&mut self, src: &SupplementalPageTable) -> VmResult<()> {
        if self.torn_down {
            return Err(VmError::TornDown);
        }
        for (va, src_ref) in &src.pages {
            let src_page = src_ref.lock();
            let dst_ref = self.register(src_page.duplicate(self.mmu.clone()))?;
            if let Some(bytes) = src_page.frame_bytes() {
                let dirty = src.mmu.is_dirty(*va);
                self.install_copy(&dst_ref, dirty, |buf| {
                    buf.copy_from_slice(bytes);
                    Ok(())
                })?;
            } else if let Some(slot) = src_page.swap_slot() {
                let swap = self.vm.swap();
                self.install_copy(&dst_ref, false, |buf| swap.read_slot(slot, buf))?;
            }
        }
        for (base, group) in &src.groups {
            self.groups.insert(*base, group.clone());
        }
        log::debug!("vm: copied {} pages", src.pages.len());
        Ok(())
    }

    fn install_copy<F>(&self, dst_ref: &PageRef, dirty: bool, fill: F) -> VmResult<()>
    where
        F: FnOnce(&mut [u8]) -> VmResult<()>,
    {
        let mut page = dst_ref.lock();
        let frames = self.vm.frame_table();
        let mut frame = frames.allocate(dst_ref, self.vm.swap());
        let kva = frame.kva();
        if let Err(e) = fill(frame.bytes_mut(page.page_size())) {
            frames.free(frame);
            return Err(e);
        }
        page.attach_frame(frame);
        if !self.mmu.set_mapping(page.va(), kva, page.writable()) {
            if let Some(frame) = page.detach_frame() {
                frames.free(frame);
            }
            return Err(VmError::MappingFailed);
        }
        if dirty {
            self.mmu.set_dirty(page.va(), true);
        }
        frames.unpin(kva);
        Ok(())
    }

    /// 销毁全部页（进程退出）
    ///
    /// 脏文件页写回，交换槽位与帧全部归还。可重复调用；之后不再接受新页。
    pub fn teardown(&mut self) {
        let pages = core::mem::take(&mut self.pages);
        for page in pages.values() {
            self.release(page);
        }
        self.groups.clear();
        if !self.torn_down {
            log::debug!("vm: torn down {} pages", pages.len());
        }
        self.torn_down = true;
    }
}

impl Drop for SupplementalPageTable {
    fn drop(&mut self) {
        self.teardown();
    }
}
