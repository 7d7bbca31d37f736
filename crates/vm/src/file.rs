//! 文件映射接口 trait 定义

/// 可映射到内存的文件接口
///
/// 此 trait 抽象了文件映射所需的最小接口。
/// `write_at` 不扩展文件；越过文件末尾的部分不会被写入。
pub trait MmFile: Send + Sync {
    /// 从指定偏移读取数据到缓冲区
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize>;

    /// 将缓冲区数据写入指定偏移
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize>;

    /// 文件长度（字节）
    fn len(&self) -> usize;

    /// 文件是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
