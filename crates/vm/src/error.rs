//! 虚拟内存错误类型

use core::fmt;

/// 虚拟内存操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 地址为空、未对齐或不在用户空间
    InvalidAddress,
    /// 地址没有对应的页
    NotMapped,
    /// 地址已经有页
    AlreadyMapped,
    /// 访问权限不足（写只读页、对已存在页的保护性缺页）
    PermissionDenied,
    /// 不支持的页类型
    UnsupportedType,
    /// 参数无效
    InvalidArgument,
    /// 文件读取的字节数少于预期
    ShortRead,
    /// 文件写回的字节数少于预期
    ShortWrite,
    /// 底层设备或文件报告错误
    IoError,
    /// MMU 拒绝安装映射
    MappingFailed,
    /// 交换区没有空闲槽位
    SwapExhausted,
    /// 补充页表已被销毁
    TornDown,
}

impl VmError {
    /// 将错误转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            VmError::InvalidAddress => -14,                         // EFAULT
            VmError::NotMapped => -14,                              // EFAULT
            VmError::AlreadyMapped => -17,                          // EEXIST
            VmError::PermissionDenied => -13,                       // EACCES
            VmError::UnsupportedType => -19,                        // ENODEV
            VmError::InvalidArgument => -22,                        // EINVAL
            VmError::ShortRead | VmError::ShortWrite => -5,         // EIO
            VmError::IoError => -5,                                 // EIO
            VmError::MappingFailed | VmError::SwapExhausted => -12, // ENOMEM
            VmError::TornDown => -3,                                // ESRCH
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VmError::InvalidAddress => "invalid address",
            VmError::NotMapped => "address not mapped",
            VmError::AlreadyMapped => "address already mapped",
            VmError::PermissionDenied => "permission denied",
            VmError::UnsupportedType => "unsupported page type",
            VmError::InvalidArgument => "invalid argument",
            VmError::ShortRead => "short read from backing file",
            VmError::ShortWrite => "short write to backing file",
            VmError::IoError => "I/O error",
            VmError::MappingFailed => "MMU refused mapping",
            VmError::SwapExhausted => "swap space exhausted",
            VmError::TornDown => "page table torn down",
        };
        f.write_str(msg)
    }
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;
