//! 设备相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `SwapDevice`）。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// 内存模拟的扇区设备，用作交换盘
pub struct MockRamDisk {
    /// 存储数据
    data: Mutex<Vec<u8>>,

    /// 扇区大小
    sector_size: usize,

    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MockRamDisk {
    /// 创建指定扇区数的内存磁盘
    pub fn new(sectors: usize, sector_size: usize) -> Self {
        Self {
            data: Mutex::new(vec![0u8; sectors * sector_size]),
            sector_size,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// 获取原始数据（用于调试）
    pub fn raw_data(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// 扇区大小
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// 扇区总数
    pub fn total_sectors(&self) -> usize {
        self.data.lock().unwrap().len() / self.sector_size
    }

    /// 读一个扇区
    pub fn read_sector(&self, sector: usize, buf: &mut [u8]) -> bool {
        if buf.len() != self.sector_size {
            return false;
        }

        let data = self.data.lock().unwrap();
        let offset = sector * self.sector_size;

        if offset + self.sector_size > data.len() {
            return false;
        }

        buf.copy_from_slice(&data[offset..offset + self.sector_size]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// 写一个扇区
    pub fn write_sector(&self, sector: usize, buf: &[u8]) -> bool {
        if buf.len() != self.sector_size || self.fail_writes.load(Ordering::Relaxed) {
            return false;
        }

        let mut data = self.data.lock().unwrap();
        let offset = sector * self.sector_size;

        if offset + self.sector_size > data.len() {
            return false;
        }

        data[offset..offset + self.sector_size].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// 累计成功读取的扇区数
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// 累计成功写入的扇区数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// 让之后的写入全部失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}
