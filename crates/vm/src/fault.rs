//! 缺页处理
//!
//! 内核的缺页异常入口把硬件信息整理成 [`PageFault`] 后调用 [`handle_fault`]。
//! 返回错误表示这是一次非法访问，调用者应终止当前进程。

use bitflags::bitflags;

use crate::address::{AlignOps, Vaddr};
use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::page::{Page, PageType};
use crate::spt::SupplementalPageTable;

bitflags! {
    /// 缺页原因
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultFlags: u8 {
        /// 页不存在（否则是对已存在页的保护性错误）
        const NOT_PRESENT = 1 << 0;
        /// 写访问
        const WRITE = 1 << 1;
        /// 来自用户态
        const USER = 1 << 2;
    }
}

/// 一次缺页
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// 触发缺页的地址
    pub addr: Vaddr,
    /// 缺页原因
    pub flags: FaultFlags,
    /// 缺页时的用户栈指针
    pub rsp: Vaddr,
}

impl PageFault {
    /// 创建缺页描述
    pub fn new(addr: Vaddr, flags: FaultFlags, rsp: Vaddr) -> Self {
        Self { addr, flags, rsp }
    }
}

/// 处理一次缺页
///
/// 1. 拒绝空地址、内核地址，以及对已存在页的保护性错误
/// 2. 页存在：写只读页拒绝，否则 claim
/// 3. 页不存在、来自用户态、位于栈区域且不低于栈指针下方的容差：增长一页栈
///
/// 内核代用户访问用户栈（系统调用中）时，调用者应带上 [`FaultFlags::USER`] 和保存的用户栈指针。
pub fn handle_fault(spt: &mut SupplementalPageTable, fault: &PageFault) -> VmResult<()> {
    let config = *spt.vm().config();
    let addr = fault.addr;

    if addr.is_null() || addr.as_usize() >= config.user_limit {
        log::warn!("vm: fault at invalid address {:#x}", addr);
        return Err(VmError::InvalidAddress);
    }
    if !fault.flags.contains(FaultFlags::NOT_PRESENT) {
        log::warn!("vm: protection fault at {:#x}", addr);
        return Err(VmError::PermissionDenied);
    }

    match spt.lookup(addr) {
        Some(page) => {
            if fault.flags.contains(FaultFlags::WRITE) && !page.lock().writable() {
                log::warn!("vm: write to read-only page {:#x}", addr);
                return Err(VmError::PermissionDenied);
            }
            spt.claim(&page)
        }
        None if is_stack_access(&config, fault) => grow_stack(spt, addr.align_down(config.page_size)),
        None => {
            log::warn!("vm: fault at unmapped address {:#x}", addr);
            Err(VmError::NotMapped)
        }
    }
}

fn is_stack_access(config: &VmConfig, fault: &PageFault) -> bool {
    let addr = fault.addr.as_usize();
    fault.flags.contains(FaultFlags::USER)
        && addr < config.user_stack_top
        && addr >= config.stack_bottom()
        && addr >= fault.rsp.as_usize().saturating_sub(config.stack_slack)
}

/// 在 `va` 处新建一个填零的可写栈页并立即 claim
///
/// claim 失败时撤销注册，栈保持原样。
fn grow_stack(spt: &mut SupplementalPageTable, va: Vaddr) -> VmResult<()> {
    let mut page = Page::new_uninit(
        va,
        true,
        PageType::Anon,
        None,
        spt.mmu().clone(),
        spt.vm().config().page_size,
    )?;
    page.set_stack(true);
    let page = spt.register(page)?;
    if let Err(e) = spt.claim(&page) {
        let _ = spt.remove(va);
        return Err(e);
    }
    log::debug!("vm: stack grows to {:#x}", va);
    Ok(())
}
