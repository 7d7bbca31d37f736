//! 虚拟内存子系统
//!
//! 为教学内核提供按需分页：补充页表、页类型状态机、帧表与置换、交换区、
//! 缺页处理（含栈增长）、文件映射以及 fork 时的地址空间复制。
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与内核的其它部分解耦：
//! - [`PagePool`]：用户物理页池
//! - [`Mmu`]：每个进程的硬件页表
//! - [`SwapDevice`]：交换盘
//! - [`MmFile`]：可映射的文件
//!
//! 内核在启动时用 [`Vm::new`] 创建全局状态，每个进程持有一个 [`SupplementalPageTable`]。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod arch_ops;
mod config;
mod error;
mod file;
mod frame;
mod manager;

pub mod address;
pub mod fault;
pub mod frame_table;
pub mod mmap;
pub mod page;
pub mod spt;
pub mod swap;

#[cfg(test)]
mod tests;

pub use arch_ops::{Mmu, PagePool};
pub use config::VmConfig;
pub use error::{VmError, VmResult};
pub use file::MmFile;
pub use frame::Frame;
pub use manager::Vm;

// Re-export 常用类型
pub use address::{AlignOps, Kva, Vaddr};
pub use fault::{handle_fault, FaultFlags, PageFault};
pub use frame_table::{FrameStats, FrameTable, PageRef};
pub use mmap::MappingGroup;
pub use page::{FileSpan, LazyLoad, Page, PageKind, PageType};
pub use spt::SupplementalPageTable;
pub use swap::{SwapDevice, SwapSlot, SwapStats, SwapStore};
