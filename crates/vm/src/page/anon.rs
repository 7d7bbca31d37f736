//! 匿名页：没有后备文件，换出时写入交换区

use crate::error::{VmError, VmResult};
use crate::swap::{SwapSlot, SwapStore};

/// 匿名页的状态
///
/// 常驻时 `slot` 为 `None`；被换出后记录所在槽位。
#[derive(Debug, Default)]
pub struct AnonPage {
    slot: Option<SwapSlot>,
}

impl AnonPage {
    pub(crate) fn new() -> Self {
        Self { slot: None }
    }

    /// 换出时占用的槽位
    pub fn slot(&self) -> Option<SwapSlot> {
        self.slot
    }

    /// 从槽位读回并释放槽位；从未换出过时填零
    pub(crate) fn swap_in(&mut self, buf: &mut [u8], swap: &SwapStore) -> VmResult<()> {
        match self.slot {
            Some(slot) => {
                swap.read_slot(slot, buf)?;
                swap.free_slot(slot);
                self.slot = None;
            }
            None => buf.fill(0),
        }
        Ok(())
    }

    pub(crate) fn swap_out(&mut self, buf: &[u8], swap: &SwapStore) -> VmResult<()> {
        let slot = swap.alloc_slot().ok_or(VmError::SwapExhausted)?;
        if let Err(e) = swap.write_slot(slot, buf) {
            swap.free_slot(slot);
            return Err(e);
        }
        self.slot = Some(slot);
        Ok(())
    }

    pub(crate) fn destroy(&mut self, swap: &SwapStore) {
        if let Some(slot) = self.slot.take() {
            swap.free_slot(slot);
        }
    }
}
