//! 虚拟内存配置

use crate::error::{VmError, VmResult};

/// 虚拟内存布局与策略常量
///
/// 由内核在初始化时构造并交给 [`crate::Vm::new`]。
/// [`VmConfig::default`] 给出 x86-64 教学内核的布局。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// 页大小（通常为 4096）
    pub page_size: usize,

    /// 用户地址上界（不含），即内核基址
    pub user_limit: usize,

    /// 用户栈顶地址
    pub user_stack_top: usize,

    /// 栈最多向下增长的字节数
    pub max_stack_size: usize,

    /// 栈指针下方仍视为栈访问的字节数（如 `push` 先访存后移动栈指针）
    pub stack_slack: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            user_limit: 0x80_0400_0000,
            user_stack_top: 0x4748_0000,
            max_stack_size: 8 * 1024 * 1024,
            stack_slack: 32,
        }
    }
}

impl VmConfig {
    /// 检查配置的一致性
    pub fn validate(&self) -> VmResult<()> {
        let ps = self.page_size;
        if !ps.is_power_of_two() {
            return Err(VmError::InvalidArgument);
        }
        if self.user_stack_top % ps != 0
            || self.user_stack_top > self.user_limit
            || self.max_stack_size == 0
            || self.max_stack_size % ps != 0
            || self.max_stack_size > self.user_stack_top
        {
            return Err(VmError::InvalidArgument);
        }
        Ok(())
    }

    /// 栈区域的最低地址
    pub fn stack_bottom(&self) -> usize {
        self.user_stack_top - self.max_stack_size
    }
}
