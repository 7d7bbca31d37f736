//! 文件映射（mmap / munmap）
//!
//! 一次 `mmap` 产生一个 [`MappingGroup`]：若干连续的文件页，共享同一个文件句柄，
//! 以首页地址标识。`munmap` 整组解除，脏页写回各自的文件区段。

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::address::{AlignOps, Vaddr};
use crate::error::{VmError, VmResult};
use crate::file::MmFile;
use crate::page::{FileSpan, LazyLoad, Page, PageType};
use crate::spt::SupplementalPageTable;

/// 一次 mmap 建立的页组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingGroup {
    /// 首页地址
    pub base: Vaddr,
    /// 映射长度（字节，未取整）
    pub length: usize,
    /// 组内仍存在的页
    pub members: Vec<Vaddr>,
}

impl SupplementalPageTable {
    /// 把 `file` 从 `offset` 开始的 `length` 字节映射到 `addr`
    ///
    /// 映射是惰性的：只登记文件页，首次访问时才读文件。最后一页超出文件末尾
    /// 或映射长度的部分填零。任一页登记失败时，已登记的页全部撤销。
    pub fn mmap(
        &mut self,
        addr: Vaddr,
        length: usize,
        writable: bool,
        file: Arc<dyn MmFile>,
        offset: usize,
    ) -> VmResult<Vaddr> {
        let config = *self.vm.config();
        let page_size = config.page_size;

        if addr.is_null() || !addr.is_aligned(page_size) {
            return Err(VmError::InvalidAddress);
        }
        if length == 0 || offset % page_size != 0 || file.is_empty() {
            return Err(VmError::InvalidArgument);
        }
        let end = addr
            .checked_add(length)
            .and_then(|end| end.align_up(page_size))
            .ok_or(VmError::InvalidAddress)?;
        if end.as_usize() > config.user_limit {
            return Err(VmError::InvalidAddress);
        }
        // 不得与栈区域重叠
        if addr.as_usize() < config.user_stack_top && end.as_usize() > config.stack_bottom() {
            return Err(VmError::InvalidAddress);
        }
        if self.pages.range(addr..end).next().is_some() {
            return Err(VmError::AlreadyMapped);
        }

        let mut remaining = length.min(file.len().saturating_sub(offset));
        let mut members = Vec::new();
        let mut va = addr;
        while va < end {
            let index = members.len();
            let read_bytes = remaining.min(page_size);
            let span = FileSpan::new(
                file.clone(),
                offset + index * page_size,
                read_bytes,
                page_size - read_bytes,
            );
            let registered = Page::new_uninit(
                va,
                writable,
                PageType::File,
                Some(LazyLoad::File(span)),
                self.mmu.clone(),
                page_size,
            )
            .and_then(|mut page| {
                page.set_group(Some(addr));
                self.register(page)
            });
            if let Err(e) = registered {
                for member in members {
                    if let Some(page) = self.pages.remove(&member) {
                        self.release(&page);
                    }
                }
                return Err(e);
            }
            members.push(va);
            remaining -= read_bytes;
            va = Vaddr::new(va.as_usize() + page_size);
        }

        log::debug!(
            "vm: mmap {:#x}..{:#x} at file offset {}",
            addr,
            end,
            offset
        );
        self.groups.insert(
            addr,
            MappingGroup {
                base: addr,
                length,
                members,
            },
        );
        Ok(addr)
    }

    /// 解除包含 `addr` 的整组映射
    ///
    /// 地址没有页或所在页不属于任何映射组时无操作，因此可以重复调用。
    pub fn munmap(&mut self, addr: Vaddr) {
        let Some(page) = self.lookup(addr) else {
            return;
        };
        let Some(base) = page.lock().group() else {
            return;
        };
        let Some(group) = self.groups.remove(&base) else {
            return;
        };
        for va in &group.members {
            if let Some(page) = self.pages.remove(va) {
                self.release(&page);
            }
        }
        log::debug!("vm: munmap {:#x}, {} pages", base, group.members.len());
    }

    /// 包含 `addr` 的映射组
    pub fn mapping_group(&self, addr: Vaddr) -> Option<&MappingGroup> {
        let base = self.lookup(addr)?.lock().group()?;
        self.groups.get(&base)
    }
}
