//! 未初始化页：首次缺页时才装载内容并转为目标类型

use alloc::sync::Arc;
use core::fmt;

use super::anon::AnonPage;
use super::file::{FilePage, FileSpan};
use super::{PageKind, PageType};
use crate::error::VmResult;

/// 自定义装载函数，参数是整页缓冲区（已清零）
pub type LoadFn = dyn Fn(&mut [u8]) -> VmResult<()> + Send + Sync;

/// 惰性装载描述
#[derive(Clone)]
pub enum LazyLoad {
    /// 从文件区段装载（可执行文件的段）
    File(FileSpan),
    /// 任意初始化函数
    Custom(Arc<LoadFn>),
}

impl LazyLoad {
    /// 由闭包构造自定义装载
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut [u8]) -> VmResult<()> + Send + Sync + 'static,
    {
        LazyLoad::Custom(Arc::new(f))
    }

    fn run(&self, buf: &mut [u8]) -> VmResult<()> {
        match self {
            LazyLoad::File(span) => span.read_into(buf),
            LazyLoad::Custom(f) => {
                buf.fill(0);
                f(buf)
            }
        }
    }
}

impl fmt::Debug for LazyLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LazyLoad::File(span) => f.debug_tuple("File").field(span).finish(),
            LazyLoad::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

#[derive(Debug, Clone)]
enum Pending {
    Anon(Option<LazyLoad>),
    File(FileSpan),
}

/// 未初始化页的状态
///
/// 克隆得到的是一份独立的描述：文件句柄与自定义函数通过引用计数共享，
/// 每个副本在自己的页上各执行一次。
#[derive(Debug, Clone)]
pub struct UninitPage {
    pending: Pending,
}

impl UninitPage {
    pub(crate) fn anon(loader: Option<LazyLoad>) -> Self {
        Self {
            pending: Pending::Anon(loader),
        }
    }

    pub(crate) fn file(span: FileSpan) -> Self {
        Self {
            pending: Pending::File(span),
        }
    }

    /// 首次装载后将成为的类型
    pub fn target(&self) -> PageType {
        match self.pending {
            Pending::Anon(_) => PageType::Anon,
            Pending::File(_) => PageType::File,
        }
    }

    /// 把内容装入刚绑定的帧
    pub(crate) fn load(&self, buf: &mut [u8]) -> VmResult<()> {
        match &self.pending {
            Pending::Anon(None) => {
                buf.fill(0);
                Ok(())
            }
            Pending::Anon(Some(loader)) => loader.run(buf),
            Pending::File(span) => span.read_into(buf),
        }
    }

    /// 消耗描述，得到目标类型的页状态
    pub(crate) fn into_initialized(self) -> PageKind {
        match self.pending {
            Pending::Anon(_) => PageKind::Anon(AnonPage::new()),
            Pending::File(span) => PageKind::File(FilePage::new(span)),
        }
    }
}
