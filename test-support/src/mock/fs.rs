//! 文件相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `MmFile`）。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// 内存中的定长文件
///
/// 与内核文件系统一致，`write_at` 不会扩展文件长度。每次写入都会被记录，
/// 便于断言写回的范围。
pub struct MockFile {
    data: Mutex<Vec<u8>>,
    writes: Mutex<Vec<(usize, usize)>>,
    short_reads: AtomicBool,
}

impl MockFile {
    /// 以给定内容创建文件
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
            writes: Mutex::new(Vec::new()),
            short_reads: AtomicBool::new(false),
        }
    }

    /// 创建内容为 `len` 字节规律数据的文件：第 i 字节为 `i % 251`
    pub fn patterned(len: usize) -> Self {
        Self::from_bytes((0..len).map(|i| (i % 251) as u8).collect())
    }

    /// 从 `offset` 读取，返回实际读取的字节数
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        let data = self.data.lock().unwrap();
        if offset >= data.len() {
            return Ok(0);
        }
        let mut n = buf.len().min(data.len() - offset);
        if self.short_reads.load(Ordering::Relaxed) {
            n /= 2;
        }
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    /// 写入 `offset`，不扩展文件，返回实际写入的字节数
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        self.writes.lock().unwrap().push((offset, buf.len()));
        let mut data = self.data.lock().unwrap();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        data[offset..offset + n].copy_from_slice(&buf[..n]);
        Ok(n)
    }

    /// 文件长度
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// 文件是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前内容快照
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// 写入记录：(偏移, 长度)
    pub fn writes(&self) -> Vec<(usize, usize)> {
        self.writes.lock().unwrap().clone()
    }

    /// 让之后的读取只返回一半数据
    pub fn set_short_reads(&self, short: bool) {
        self.short_reads.store(short, Ordering::Relaxed);
    }
}
