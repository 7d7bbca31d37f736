//! 虚拟内存子系统的全局状态

use alloc::sync::Arc;

use crate::arch_ops::PagePool;
use crate::config::VmConfig;
use crate::error::VmResult;
use crate::frame_table::FrameTable;
use crate::swap::{SwapDevice, SwapStore};

/// 虚拟内存子系统
///
/// 所有进程共享的部分：配置、帧表与交换区。每个进程的补充页表持有它的 `Arc`。
pub struct Vm {
    config: VmConfig,
    frames: FrameTable,
    swap: SwapStore,
}

impl Vm {
    /// 初始化虚拟内存子系统
    ///
    /// 没有交换设备时交换区为空，匿名页无法被换出。
    pub fn new(
        config: VmConfig,
        pool: Arc<dyn PagePool>,
        swap_device: Option<Arc<dyn SwapDevice>>,
    ) -> VmResult<Arc<Self>> {
        config.validate()?;
        let swap = match swap_device {
            Some(device) => SwapStore::new(device, config.page_size)?,
            None => {
                log::warn!("vm: no swap device, anonymous pages cannot be evicted");
                SwapStore::disabled()
            }
        };
        log::info!(
            "vm: initialized, page size {:#x}, stack top {:#x}",
            config.page_size,
            config.user_stack_top
        );
        Ok(Arc::new(Self {
            config,
            frames: FrameTable::new(pool),
            swap,
        }))
    }

    /// 配置
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// 帧表
    pub fn frame_table(&self) -> &FrameTable {
        &self.frames
    }

    /// 交换区
    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }
}
