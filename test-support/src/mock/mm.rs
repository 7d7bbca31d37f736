//! 内存管理相关操作的 Mock 实现
//!
//! - [`MockPagePool`]：固定容量的用户物理页池，页面来自一块真实的对齐堆内存
//! - [`MockMmu`]：以表模拟硬件页表，记录映射、脏位和访问位，并模拟用户态访存

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::BTreeMap;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// 新分配页面的填充字节，用于暴露忘记清零的代码路径
pub const POISON: u8 = 0xCC;

/// Mock 的用户物理页池
///
/// 分配出的页面内容被填充为 [`POISON`]，与真实内核中 `palloc` 不清零的行为一致。
pub struct MockPagePool {
    page_size: usize,
    capacity: usize,
    base: usize,
    layout: Layout,
    free: Mutex<Vec<usize>>,
    total_allocs: AtomicUsize,
}

impl MockPagePool {
    /// 创建容量为 `capacity` 页的页池
    pub fn new(capacity: usize, page_size: usize) -> Self {
        assert!(capacity > 0, "page pool needs at least one page");
        let layout =
            Layout::from_size_align(capacity * page_size, page_size).expect("invalid pool layout");
        // SAFETY: layout 大小非零
        let base = unsafe { alloc_zeroed(layout) } as usize;
        assert!(base != 0, "host allocation failed");

        // 逆序入栈，使分配按地址升序进行
        let free = (0..capacity).rev().map(|i| base + i * page_size).collect();
        Self {
            page_size,
            capacity,
            base,
            layout,
            free: Mutex::new(free),
            total_allocs: AtomicUsize::new(0),
        }
    }

    /// 分配一页，池耗尽时返回 `None`
    pub fn alloc_page(&self) -> Option<usize> {
        let kva = self.free.lock().unwrap().pop()?;
        // SAFETY: kva 指向池内一个完整且当前未被使用的页面
        unsafe { ptr::write_bytes(kva as *mut u8, POISON, self.page_size) };
        self.total_allocs.fetch_add(1, Ordering::Relaxed);
        Some(kva)
    }

    /// 归还一页；对池外地址或重复释放直接 panic
    pub fn free_page(&self, kva: usize) {
        assert!(self.contains(kva), "freeing foreign page {:#x}", kva);
        let mut free = self.free.lock().unwrap();
        assert!(!free.contains(&kva), "double free of page {:#x}", kva);
        free.push(kva);
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 总容量（页）
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前已分配的页数
    pub fn in_use(&self) -> usize {
        self.capacity - self.free.lock().unwrap().len()
    }

    /// 累计分配次数
    pub fn total_allocs(&self) -> usize {
        self.total_allocs.load(Ordering::Relaxed)
    }

    /// `kva` 是否为本池内的页起始地址
    pub fn contains(&self, kva: usize) -> bool {
        kva >= self.base
            && kva < self.base + self.capacity * self.page_size
            && (kva - self.base) % self.page_size == 0
    }
}

impl Drop for MockPagePool {
    fn drop(&mut self) {
        // SAFETY: base 与 layout 来自 new 中的同一次分配
        unsafe { dealloc(self.base as *mut u8, self.layout) };
    }
}

/// Mock 页表项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPte {
    /// 映射到的内核虚拟地址（页起始）
    pub kva: usize,
    /// 是否可写
    pub writable: bool,
    /// 脏位
    pub dirty: bool,
    /// 访问位
    pub accessed: bool,
}

/// 模拟用户态访存触发的缺页
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// 地址未映射
    NotPresent(usize),
    /// 写只读页
    ReadOnly(usize),
}

impl MockFault {
    /// 触发缺页的地址
    pub fn addr(&self) -> usize {
        match *self {
            MockFault::NotPresent(addr) | MockFault::ReadOnly(addr) => addr,
        }
    }
}

/// Mock 的 MMU
///
/// 一个进程一张表，键为用户页起始地址。
pub struct MockMmu {
    page_size: usize,
    table: Mutex<BTreeMap<usize, MockPte>>,
    refuse_mappings: AtomicBool,
}

impl MockMmu {
    /// 创建空页表
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            table: Mutex::new(BTreeMap::new()),
            refuse_mappings: AtomicBool::new(false),
        }
    }

    /// 安装映射；已存在映射或被设置为拒绝时返回 false
    pub fn set_mapping(&self, va: usize, kva: usize, writable: bool) -> bool {
        assert_eq!(va % self.page_size, 0, "unaligned mapping {:#x}", va);
        if self.refuse_mappings.load(Ordering::Relaxed) {
            return false;
        }
        let mut table = self.table.lock().unwrap();
        if table.contains_key(&va) {
            return false;
        }
        table.insert(
            va,
            MockPte {
                kva,
                writable,
                dirty: false,
                accessed: false,
            },
        );
        true
    }

    /// 移除映射，返回被移除表项的脏位
    pub fn clear_mapping(&self, va: usize) -> bool {
        self.table
            .lock()
            .unwrap()
            .remove(&va)
            .is_some_and(|pte| pte.dirty)
    }

    /// 读取脏位，未映射时为 false
    pub fn is_dirty(&self, va: usize) -> bool {
        self.pte(va).is_some_and(|pte| pte.dirty)
    }

    /// 设置脏位，未映射时忽略
    pub fn set_dirty(&self, va: usize, dirty: bool) {
        if let Some(pte) = self.table.lock().unwrap().get_mut(&va) {
            pte.dirty = dirty;
        }
    }

    /// 读取访问位，未映射时为 false
    pub fn is_accessed(&self, va: usize) -> bool {
        self.pte(va).is_some_and(|pte| pte.accessed)
    }

    /// 设置访问位，未映射时忽略
    pub fn set_accessed(&self, va: usize, accessed: bool) {
        if let Some(pte) = self.table.lock().unwrap().get_mut(&va) {
            pte.accessed = accessed;
        }
    }

    /// 查询页表项
    pub fn pte(&self, va: usize) -> Option<MockPte> {
        self.table.lock().unwrap().get(&va).copied()
    }

    /// 翻译任意用户地址
    pub fn translate(&self, va: usize) -> Option<usize> {
        let offset = va % self.page_size;
        self.pte(va - offset).map(|pte| pte.kva + offset)
    }

    /// 当前映射数
    pub fn mapped_count(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    /// 让之后的 `set_mapping` 全部失败
    pub fn set_refuse_mappings(&self, refuse: bool) {
        self.refuse_mappings.store(refuse, Ordering::Relaxed);
    }

    /// 模拟用户态读，置访问位
    pub fn user_read(&self, va: usize, buf: &mut [u8]) -> Result<(), MockFault> {
        let mut done = 0;
        while done < buf.len() {
            let cur = va + done;
            let offset = cur % self.page_size;
            let chunk = (self.page_size - offset).min(buf.len() - done);
            let mut table = self.table.lock().unwrap();
            let pte = table
                .get_mut(&(cur - offset))
                .ok_or(MockFault::NotPresent(cur))?;
            pte.accessed = true;
            // SAFETY: pte.kva 指向由页池分配的完整页面
            unsafe {
                ptr::copy_nonoverlapping(
                    (pte.kva + offset) as *const u8,
                    buf[done..].as_mut_ptr(),
                    chunk,
                )
            };
            done += chunk;
        }
        Ok(())
    }

    /// 模拟用户态写，置访问位与脏位
    pub fn user_write(&self, va: usize, data: &[u8]) -> Result<(), MockFault> {
        let mut done = 0;
        while done < data.len() {
            let cur = va + done;
            let offset = cur % self.page_size;
            let chunk = (self.page_size - offset).min(data.len() - done);
            let mut table = self.table.lock().unwrap();
            let pte = table
                .get_mut(&(cur - offset))
                .ok_or(MockFault::NotPresent(cur))?;
            if !pte.writable {
                return Err(MockFault::ReadOnly(cur));
            }
            pte.accessed = true;
            pte.dirty = true;
            // SAFETY: 同 user_read
            unsafe {
                ptr::copy_nonoverlapping(
                    data[done..].as_ptr(),
                    (pte.kva + offset) as *mut u8,
                    chunk,
                )
            };
            done += chunk;
        }
        Ok(())
    }
}
