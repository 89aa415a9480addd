//! # 虚拟磁盘层
//!
//! 宿主文件、分配器与整棵目录树的所有者，对外的入口。
//! 所有状态都在同一把锁之后，句柄与 [`VirtualDisk`] 共享这把锁。

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use spin::Mutex;

use crate::allocator::Usage;
use crate::device::{Device, HostFile};
use crate::entry::{Directory, Entry, File, Shared, Tree, ROOT_POS};
use crate::layout::{FIRST_BLOCK, MIN_BLOCK_SIZE};
use crate::{path, Error, Result};

/// 未指定大小时新建的磁盘容量
pub const DEFAULT_DISK_SIZE: u64 = 1024 * 1024;

/// 超级块之后至少要能放下几十个最小的块
pub const MIN_DISK_SIZE: u64 = FIRST_BLOCK + 64 * MIN_BLOCK_SIZE;

#[derive(Debug, Clone)]
pub struct VirtualDisk {
    inner: Shared,
}

impl VirtualDisk {
    /// 在`path`新建默认大小的虚拟磁盘，文件已存在时失败
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_size(path, DEFAULT_DISK_SIZE)
    }

    pub fn create_with_size(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let path = path.as_ref();
        if size < MIN_DISK_SIZE {
            return Err(Error::TooSmall(size));
        }

        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.display().to_string()),
                _ => Error::Io(e),
            })?;
        let disk = Self::format_at(path, HostFile::new(fd), size)?;
        log::info!("created {} ({size} bytes)", path.display());

        Ok(disk)
    }

    /// 格式化刚建立的宿主文件，失败时删掉写了一半的文件
    fn format_at(path: &Path, dev: impl Device + 'static, size: u64) -> Result<Self> {
        Self::format(dev, size).inspect_err(|e| {
            log::warn!("formatting {} failed: {e}", path.display());
            if let Err(e) = fs::remove_file(path) {
                log::warn!("cannot remove {}: {e}", path.display());
            }
        })
    }

    /// 打开已有的虚拟磁盘，校验魔数
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
                _ => Error::Io(e),
            })?;
        let disk = Self::open(HostFile::new(fd))?;
        log::info!("loaded {}", path.display());

        Ok(disk)
    }

    /// 在任意设备上建立新的虚拟磁盘
    pub fn format(dev: impl Device + 'static, size: u64) -> Result<Self> {
        let tree = Tree::format(Box::new(dev), size)?;
        Ok(Self::from_tree(tree))
    }

    pub fn open(dev: impl Device + 'static) -> Result<Self> {
        let tree = Tree::open(Box::new(dev))?;
        Ok(Self::from_tree(tree))
    }

    fn from_tree(tree: Tree) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(tree))),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Tree) -> Result<R>) -> Result<R> {
        let mut inner = self.inner.lock();
        let tree = inner.as_mut().ok_or(Error::Closed)?;
        f(tree)
    }

    pub fn root(&self) -> Result<Directory> {
        let id = self.with(|tree| tree.id_of(ROOT_POS))?;
        Ok(Directory::new(self.inner.clone(), id))
    }

    /// 从根目录开始按路径查找，开头的分隔符可以省略
    pub fn lookup(&self, path: &str) -> Result<Entry> {
        self.root()?.resolve(path)
    }

    pub fn create_file(&self, parent: &Directory, name: &str, size: u64) -> Result<File> {
        self.owns(parent)?;
        parent.create_file(name, size)
    }

    pub fn create_directory(&self, parent: &Directory, name: &str) -> Result<Directory> {
        self.owns(parent)?;
        parent.create_directory(name)
    }

    /// 父目录必须已经存在
    pub fn create_file_at(&self, path: &str, size: u64) -> Result<File> {
        let (parent, name) = self.parent_of(path)?;
        parent.create_file(name, size)
    }

    pub fn create_directory_at(&self, path: &str) -> Result<Directory> {
        let (parent, name) = self.parent_of(path)?;
        parent.create_directory(name)
    }

    /// 所有空闲块的总字节数
    pub fn free_space(&self) -> Result<u64> {
        self.with(Tree::free_space)
    }

    /// 超级块与全部数据块
    pub fn occupied_space(&self) -> Result<u64> {
        self.with(|tree| Ok(tree.size() - tree.free_space()?))
    }

    /// 宿主文件的总字节数
    pub fn size(&self) -> Result<u64> {
        self.with(|tree| Ok(tree.size()))
    }

    /// 逐块校验整个磁盘
    pub fn check(&self) -> Result<Usage> {
        self.with(Tree::check)
    }

    pub fn sync(&self) -> Result<()> {
        self.with(Tree::sync)
    }

    /// 落盘并释放宿主文件；重复关闭没有效果
    pub fn close(&self) -> Result<()> {
        let tree = self.inner.lock().take();
        match tree {
            Some(mut tree) => {
                tree.sync()?;
                log::info!("closed disk of {} bytes", tree.size());
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl VirtualDisk {
    fn owns(&self, dir: &Directory) -> Result<()> {
        let root = self.root()?;
        root.handle().same_disk(dir.handle())
    }

    fn parent_of<'a>(&self, path: &'a str) -> Result<(Directory, &'a str)> {
        let (parent, name) =
            path::split_parent(path).ok_or_else(|| Error::InvalidName(path.to_owned()))?;
        let dir = self
            .lookup(parent)?
            .into_directory()
            .ok_or_else(|| Error::NotADirectory(parent.to_owned()))?;
        Ok((dir, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntryKind, MemDevice};

    /// 写到一定字节数之后一律失败
    #[derive(Debug)]
    struct Failing {
        inner: MemDevice,
        budget: usize,
    }

    impl Device for Failing {
        fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
            self.inner.read_at(pos, buf)
        }

        fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
            if buf.len() > self.budget {
                return Err(io::Error::other("device full"));
            }
            self.budget -= buf.len();
            self.inner.write_at(pos, buf)
        }

        fn size(&mut self) -> io::Result<u64> {
            self.inner.size()
        }

        fn set_size(&mut self, size: u64) -> io::Result<()> {
            self.inner.set_size(size)
        }
    }

    fn disk() -> VirtualDisk {
        VirtualDisk::format(MemDevice::new(), 64 * 1024).unwrap()
    }

    #[test]
    fn too_small() {
        assert!(matches!(
            VirtualDisk::format(MemDevice::new(), MIN_DISK_SIZE - 1),
            Err(Error::TooSmall(_))
        ));
        VirtualDisk::format(MemDevice::new(), MIN_DISK_SIZE).unwrap();
    }

    #[test]
    fn failed_format_removes_image() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("disk.img");
        fs::write(&path, b"").unwrap();

        let dev = Failing {
            inner: MemDevice::new(),
            budget: 400,
        };
        assert!(matches!(
            VirtualDisk::format_at(&path, dev, 64 * 1024),
            Err(Error::Io(_))
        ));
        assert!(!path.exists());

        VirtualDisk::create_with_size(&path, 64 * 1024).unwrap();
    }

    #[test]
    fn space_accounting() {
        let disk = disk();
        let size = disk.size().unwrap();
        let free = disk.free_space().unwrap();
        assert_eq!(size, free + disk.occupied_space().unwrap());

        disk.create_file_at("/f", 1000).unwrap();
        assert!(disk.free_space().unwrap() < free);
        assert_eq!(size, disk.free_space().unwrap() + disk.occupied_space().unwrap());
    }

    #[test]
    fn paths() {
        let disk = disk();
        let a = disk.create_directory_at("/a").unwrap();
        let b = disk.create_directory(&a, "b").unwrap();
        let f = disk.create_file_at("/a/b/f", 3).unwrap();

        assert_eq!(Entry::Directory(a.clone()), disk.lookup("/a").unwrap());
        assert_eq!(Entry::File(f.clone()), disk.lookup("a/b/f").unwrap());
        assert_eq!(Entry::File(f), b.resolve("f").unwrap());
        assert_eq!(
            Entry::Directory(disk.root().unwrap()),
            disk.lookup("/").unwrap()
        );
        assert_eq!(EntryKind::Directory, disk.lookup("/a/b").unwrap().kind());

        assert!(matches!(disk.lookup("/a/x"), Err(Error::NotFound(_))));
        assert!(matches!(disk.lookup("/a/b/f/g"), Err(Error::NotADirectory(_))));
        assert!(matches!(
            disk.create_file_at("/a/b/f/g", 0),
            Err(Error::NotADirectory(_))
        ));
        assert!(matches!(disk.create_file_at("/", 0), Err(Error::InvalidName(_))));
    }

    #[test]
    fn foreign_parent() {
        let one = disk();
        let other = disk();
        let dir = other.create_directory_at("/d").unwrap();
        assert!(matches!(
            one.create_file(&dir, "f", 0),
            Err(Error::ForeignEntry)
        ));

        let f: Entry = one.create_file_at("/f", 0).unwrap().into();
        assert!(matches!(dir.add_member(&f), Err(Error::ForeignEntry)));
        assert!(matches!(f.move_to(&dir, "f"), Err(Error::ForeignEntry)));
        assert_eq!(Some(one.root().unwrap()), f.parent().unwrap());
    }

    #[test]
    fn closed() {
        let disk = disk();
        let root = disk.root().unwrap();
        disk.close().unwrap();
        disk.close().unwrap();

        assert!(disk.is_closed());
        assert!(!root.exists());
        assert!(matches!(root.members(), Err(Error::Closed)));
        assert!(matches!(disk.free_space(), Err(Error::Closed)));
    }
}
