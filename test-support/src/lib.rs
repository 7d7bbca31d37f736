//! 测试支持 crate
//!
//! 为虚拟内存子系统提供宿主机上的 Mock 实现：物理页池、MMU、交换设备和文件。
//!
//! 这里不依赖 `vm` crate（避免循环依赖）。`vm` crate 在 `cfg(test)` 下
//! 为这些类型实现其 trait（例如 `PagePool` / `Mmu` / `SwapDevice` / `MmFile`）。

pub mod mock;
