//! 文件页：内容来自文件的一段，脏页在换出或销毁时写回

use alloc::sync::Arc;
use core::fmt;

use crate::error::{VmError, VmResult};
use crate::file::MmFile;

/// 一页对应的文件区段
///
/// 页内前 `read_bytes` 字节来自 `file` 的 `offset` 处，其后 `zero_bytes` 字节填零。
#[derive(Clone)]
pub struct FileSpan {
    /// 文件对象
    pub file: Arc<dyn MmFile>,
    /// 文件偏移量（字节）
    pub offset: usize,
    /// 从文件读取的字节数
    pub read_bytes: usize,
    /// 补零的字节数
    pub zero_bytes: usize,
}

impl FileSpan {
    /// 创建文件区段
    pub fn new(file: Arc<dyn MmFile>, offset: usize, read_bytes: usize, zero_bytes: usize) -> Self {
        Self {
            file,
            offset,
            read_bytes,
            zero_bytes,
        }
    }

    /// 把区段读入一整页缓冲区，剩余部分清零
    pub(crate) fn read_into(&self, buf: &mut [u8]) -> VmResult<()> {
        if self.read_bytes > buf.len() {
            return Err(VmError::InvalidArgument);
        }
        let (head, tail) = buf.split_at_mut(self.read_bytes);
        let actual = self
            .file
            .read_at(self.offset, head)
            .map_err(|_| VmError::IoError)?;
        if actual != self.read_bytes {
            log::warn!(
                "Partial read at offset {}: expected {}, got {}",
                self.offset,
                self.read_bytes,
                actual
            );
            return Err(VmError::ShortRead);
        }
        tail.fill(0);
        Ok(())
    }

    /// 把页内前 `read_bytes` 字节写回文件
    pub(crate) fn write_back(&self, buf: &[u8]) -> VmResult<()> {
        if self.read_bytes == 0 {
            return Ok(());
        }
        let actual = self
            .file
            .write_at(self.offset, &buf[..self.read_bytes])
            .map_err(|_| VmError::IoError)?;
        if actual != self.read_bytes {
            log::error!(
                "Partial write at offset {}: expected {}, got {}",
                self.offset,
                self.read_bytes,
                actual
            );
            return Err(VmError::ShortWrite);
        }
        Ok(())
    }
}

// 手动实现 Debug，因为 dyn MmFile 没有实现 Debug
impl fmt::Debug for FileSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSpan")
            .field("file", &"<dyn MmFile>")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .field("zero_bytes", &self.zero_bytes)
            .finish()
    }
}

/// 文件页的状态
#[derive(Debug, Clone)]
pub struct FilePage {
    span: FileSpan,
}

impl FilePage {
    pub(crate) fn new(span: FileSpan) -> Self {
        Self { span }
    }

    /// 对应的文件区段
    pub fn span(&self) -> &FileSpan {
        &self.span
    }

    pub(crate) fn swap_in(&self, buf: &mut [u8]) -> VmResult<()> {
        self.span.read_into(buf)
    }

    /// 换出：只有脏页需要写回，干净页直接丢弃
    pub(crate) fn swap_out(&self, buf: &[u8], dirty: bool) -> VmResult<()> {
        if dirty {
            self.span.write_back(buf)?;
        }
        Ok(())
    }
}
