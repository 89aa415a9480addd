use std::io;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// 名字为空、含有分隔符或`\0`
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// 同一目录下已有同名项
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// 路径中间段是文件
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// 所有分级空闲链表都无法满足请求
    #[error("out of space: cannot allocate {requested} bytes")]
    OutOfSpace { requested: u64 },

    /// 魔数不符
    #[error("not a virtual disk")]
    NotAVirtualDisk,

    /// 未知的目录项类型、边界标记不一致等
    #[error("corrupt format: {0}")]
    Corrupt(String),

    /// 读写越过了数据块已用的载荷
    #[error("range {start}..{end} is outside of payload 0..{len}")]
    InvalidRange { start: u64, end: u64, len: u64 },

    /// 块已释放，或目录项已删除
    #[error("use after free: {0}")]
    UseAfterFree(String),

    #[error("operation not permitted on the root directory")]
    Root,

    #[error("cannot move a directory into its own subtree")]
    IntoDescendant,

    /// 句柄属于另一个虚拟磁盘
    #[error("entry belongs to another disk")]
    ForeignEntry,

    /// 小于 [`MIN_DISK_SIZE`](crate::MIN_DISK_SIZE)
    #[error("disk size {0} is too small")]
    TooSmall(u64),

    #[error("disk is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub(crate) fn range(start: u64, len: u64, payload: u64) -> Self {
        Self::InvalidRange {
            start,
            end: start.saturating_add(len),
            len: payload,
        }
    }
}
