//! # 目录项层
//!
//! 目录与文件都是 [`Entry`]。句柄只记住目录项的位置与序号，
//! 每次操作都先锁住整个虚拟磁盘，再到 [`Tree`] 中找到对应的节点；
//! 目录项被删除后，旧句柄上的任何操作都报 [`Error::UseAfterFree`]。

mod dir;
mod file;
mod record;
mod tree;

use std::fmt;
use std::sync::Arc;

use spin::Mutex;

pub use self::{dir::Directory, file::File, record::EntryKind};
pub(crate) use self::tree::{EntryId, Tree, ROOT_POS};

use crate::{Error, Result};

pub(crate) type Shared = Arc<Mutex<Option<Tree>>>;

/// 目录项的概况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    /// 文件为数据长度，目录为成员个数
    pub size: u64,
    /// 记录与数据在磁盘上占用的总字节数
    pub footprint: u64,
    /// 自 Unix 纪元起的毫秒数
    pub timestamp: u64,
}

#[derive(Clone)]
pub(crate) struct Handle {
    disk: Shared,
    id: EntryId,
}

impl Handle {
    pub(crate) fn new(disk: Shared, id: EntryId) -> Self {
        Self { disk, id }
    }

    /// 锁住磁盘，确认目录项仍然存在后再操作
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Tree, u64) -> Result<R>) -> Result<R> {
        let mut disk = self.disk.lock();
        let tree = disk.as_mut().ok_or(Error::Closed)?;
        tree.validate(self.id)?;
        f(tree, self.id.pos)
    }

    pub(crate) fn entry(&self, id: EntryId) -> Entry {
        Entry::new(self.disk.clone(), id)
    }

    pub(crate) fn same_disk(&self, other: &Handle) -> Result<()> {
        if Arc::ptr_eq(&self.disk, &other.disk) {
            Ok(())
        } else {
            Err(Error::ForeignEntry)
        }
    }

    fn name(&self) -> Result<String> {
        self.with(|tree, pos| Ok(tree.name(pos)?.to_owned()))
    }

    fn timestamp(&self) -> Result<u64> {
        self.with(|tree, pos| tree.timestamp(pos))
    }

    fn set_timestamp(&self, timestamp: u64) -> Result<()> {
        self.with(|tree, pos| tree.set_timestamp(pos, timestamp))
    }

    fn rename(&self, name: &str) -> Result<()> {
        self.with(|tree, pos| tree.rename(pos, name))
    }

    fn exists(&self) -> bool {
        self.with(|_, _| Ok(())).is_ok()
    }

    fn parent(&self) -> Result<Option<Directory>> {
        let parent = self.with(|tree, pos| tree.parent(pos))?;
        Ok(parent.map(|id| Directory::new(self.disk.clone(), id)))
    }

    fn delete(&self) -> Result<()> {
        self.with(|tree, pos| tree.delete(pos))
    }

    fn move_to(&self, dir: &Directory, name: &str) -> Result<()> {
        let target = dir.handle();
        self.same_disk(target)?;
        self.with(|tree, pos| {
            tree.validate(target.id)?;
            tree.move_to(pos, target.id.pos, name)
        })
    }

    fn stat(&self) -> Result<Stat> {
        self.with(|tree, pos| tree.stat(pos))
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.disk, &other.disk) && self.id == other.id
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("pos", &self.id.pos)
            .field("kind", &self.id.kind)
            .finish()
    }
}

/// 目录或文件
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Directory(Directory),
    File(File),
}

impl Entry {
    pub(crate) fn new(disk: Shared, id: EntryId) -> Self {
        match id.kind {
            EntryKind::Directory => Self::Directory(Directory::new(disk, id)),
            EntryKind::File => Self::File(File::new(disk, id)),
        }
    }

    pub(crate) fn handle(&self) -> &Handle {
        match self {
            Self::Directory(dir) => dir.handle(),
            Self::File(file) => file.handle(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.handle().id.kind
    }

    pub fn name(&self) -> Result<String> {
        self.handle().name()
    }

    pub fn timestamp(&self) -> Result<u64> {
        self.handle().timestamp()
    }

    pub fn set_timestamp(&self, timestamp: u64) -> Result<()> {
        self.handle().set_timestamp(timestamp)
    }

    /// 同一目录下不能重名
    pub fn rename(&self, name: &str) -> Result<()> {
        self.handle().rename(name)
    }

    /// 是否仍未被删除，磁盘关闭后一律为假
    pub fn exists(&self) -> bool {
        self.handle().exists()
    }

    /// 根目录以及被摘下的目录项没有父目录
    pub fn parent(&self) -> Result<Option<Directory>> {
        self.handle().parent()
    }

    /// 目录连同其中的一切一起删除
    pub fn delete(&self) -> Result<()> {
        self.handle().delete()
    }

    /// 移动到`dir`下并改名为`name`，失败时留在原处
    pub fn move_to(&self, dir: &Directory, name: &str) -> Result<()> {
        self.handle().move_to(dir, name)
    }

    pub fn stat(&self) -> Result<Stat> {
        self.handle().stat()
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }

    pub fn into_directory(self) -> Option<Directory> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<File> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }
}

impl From<Directory> for Entry {
    fn from(dir: Directory) -> Self {
        Self::Directory(dir)
    }
}

impl From<File> for Entry {
    fn from(file: File) -> Self {
        Self::File(file)
    }
}
