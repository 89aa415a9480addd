//! 目录树在内存中的镜像。
//!
//! 目录项按记录所在位置缓存在 [`Tree`] 中，首次访问时从磁盘载入。
//! 父目录与前一个兄弟只存在于内存中，遍历成员链表时顺带设置；
//! 磁盘上只有单向的“下一个兄弟”与“首个成员”指针。

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::allocator::{Allocator, Usage};
use crate::device::Device;
use crate::entry::record::{self, EntryKind};
use crate::entry::Stat;
use crate::layout::{ptr, raw, FIRST_BLOCK, MIN_BLOCK_SIZE};
use crate::path;
use crate::space::DiskSpace;
use crate::{Error, Result};

/// 格式化后的第一次分配必然落在第一个块上
pub const ROOT_POS: u64 = FIRST_BLOCK;

/// 自 Unix 纪元起的毫秒数
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// 目录项句柄的身份：位置可能在删除后被复用，序号不会
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    pub pos: u64,
    pub serial: u64,
    pub kind: EntryKind,
}

/// 尚未载入，或已载入的值
#[derive(Debug)]
struct Lazy<T>(Option<T>);

impl<T> Lazy<T> {
    const fn new() -> Self {
        Self(None)
    }

    const fn loaded(value: T) -> Self {
        Self(Some(value))
    }

    fn get_or_load(&mut self, load: impl FnOnce() -> Result<T>) -> Result<&mut T> {
        let value = match self.0.take() {
            Some(value) => value,
            None => load()?,
        };
        Ok(self.0.insert(value))
    }

    fn set(&mut self, value: T) {
        self.0 = Some(value);
    }

    fn take(&mut self) -> Option<T> {
        self.0.take()
    }
}

#[derive(Debug)]
struct Node {
    serial: u64,
    kind: EntryKind,
    name: String,
    timestamp: u64,
    /// 存放记录的磁盘空间，首块位置即目录项位置
    meta: DiskSpace,
    parent: Option<u64>,
    prev: Option<u64>,
    next: Lazy<Option<u64>>,
    body: Body,
}

#[derive(Debug)]
enum Body {
    Directory { first: Lazy<Option<u64>> },
    File { data: Lazy<DiskSpace> },
}

#[derive(Debug)]
pub struct Tree {
    al: Allocator,
    nodes: HashMap<u64, Node>,
    serial: u64,
}

fn gone(pos: u64) -> Error {
    Error::UseAfterFree(format!("entry at {pos} was deleted"))
}

fn node_mut(nodes: &mut HashMap<u64, Node>, pos: u64) -> Result<&mut Node> {
    nodes.get_mut(&pos).ok_or_else(|| gone(pos))
}

impl Tree {
    /// 格式化设备并建立根目录
    pub fn format(dev: Box<dyn Device>, size: u64) -> Result<Self> {
        let al = Allocator::format(dev, size)?;
        let mut tree = Self {
            al,
            nodes: HashMap::new(),
            serial: 0,
        };

        let timestamp = now();
        let meta = tree.create_record(EntryKind::Directory, timestamp, None, "")?;
        if meta.pos() != ROOT_POS {
            return Err(Error::corrupt(format!(
                "root directory landed at {} instead of {ROOT_POS}",
                meta.pos()
            )));
        }
        tree.insert(Node {
            serial: 0,
            kind: EntryKind::Directory,
            name: String::new(),
            timestamp,
            meta,
            parent: None,
            prev: None,
            next: Lazy::loaded(None),
            body: Body::Directory {
                first: Lazy::loaded(None),
            },
        });

        Ok(tree)
    }

    pub fn open(dev: Box<dyn Device>) -> Result<Self> {
        let al = Allocator::open(dev)?;
        let mut tree = Self {
            al,
            nodes: HashMap::new(),
            serial: 0,
        };

        let root = tree.load_node(ROOT_POS)?;
        if root.kind != EntryKind::Directory {
            return Err(Error::corrupt("root entry is not a directory"));
        }
        Ok(tree)
    }

    pub fn free_space(&mut self) -> Result<u64> {
        self.al.free_space()
    }

    pub fn size(&self) -> u64 {
        self.al.size()
    }

    pub fn check(&mut self) -> Result<Usage> {
        self.al.check()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.al.dev().sync()?;
        Ok(())
    }

    /// 句柄仍指向同一个目录项
    pub fn validate(&self, id: EntryId) -> Result<()> {
        match self.nodes.get(&id.pos) {
            Some(node) if node.serial == id.serial => Ok(()),
            _ => Err(gone(id.pos)),
        }
    }

    pub fn id_of(&self, pos: u64) -> Result<EntryId> {
        let node = self.node(pos)?;
        Ok(EntryId {
            pos,
            serial: node.serial,
            kind: node.kind,
        })
    }

    pub fn kind(&self, pos: u64) -> Result<EntryKind> {
        Ok(self.node(pos)?.kind)
    }

    pub fn name(&self, pos: u64) -> Result<&str> {
        Ok(&self.node(pos)?.name)
    }

    pub fn timestamp(&self, pos: u64) -> Result<u64> {
        Ok(self.node(pos)?.timestamp)
    }

    pub fn parent(&self, pos: u64) -> Result<Option<EntryId>> {
        self.node(pos)?.parent.map(|p| self.id_of(p)).transpose()
    }

    pub fn set_timestamp(&mut self, pos: u64, timestamp: u64) -> Result<()> {
        let node = node_mut(&mut self.nodes, pos)?;
        node.meta
            .write_u64_at(&mut self.al, record::TIMESTAMP, timestamp)?;
        node.timestamp = timestamp;
        Ok(())
    }

    /// 刷新修改时间
    pub fn touch(&mut self, pos: u64) -> Result<()> {
        self.set_timestamp(pos, now())
    }

    /// 目录的成员，按链表顺序，即最近加入的在前
    pub fn members(&mut self, dir: u64) -> Result<Vec<u64>> {
        let limit = self.al.size() / MIN_BLOCK_SIZE;
        let mut members = Vec::new();
        let mut prev = None;
        let mut cursor = self.first_member(dir)?;
        while let Some(pos) = cursor {
            if members.len() as u64 >= limit {
                return Err(Error::corrupt(format!("member list of {dir} is cyclic")));
            }
            self.load_node(pos)?;
            let node = node_mut(&mut self.nodes, pos)?;
            node.parent = Some(dir);
            node.prev = prev;

            members.push(pos);
            prev = cursor;
            cursor = self.next_of(pos)?;
        }
        Ok(members)
    }

    pub fn find_member(&mut self, dir: u64, name: &str) -> Result<Option<u64>> {
        let members = self.members(dir)?;
        Ok(members
            .into_iter()
            .find(|pos| self.nodes.get(pos).is_some_and(|node| node.name == name)))
    }

    /// 按相对路径逐段查找
    pub fn resolve(&mut self, dir: u64, relative: &str) -> Result<EntryId> {
        let mut current = dir;
        for name in path::components(relative) {
            self.ensure_directory(current)?;
            current = self
                .find_member(current, name)?
                .ok_or_else(|| Error::NotFound(relative.to_owned()))?;
        }
        self.id_of(current)
    }

    /// 在`parent`下新建目录项，作为成员链表的新表头
    pub fn create(
        &mut self,
        parent: u64,
        name: &str,
        kind: EntryKind,
        size: u64,
    ) -> Result<EntryId> {
        path::validate_name(name)?;
        self.ensure_directory(parent)?;
        self.check_vacant(parent, name, None)?;

        let data = match kind {
            EntryKind::File => Some(DiskSpace::create(&mut self.al, size)?),
            EntryKind::Directory => None,
        };
        let timestamp = now();
        let link = data.as_ref().map(DiskSpace::pos);
        let meta = match self.create_record(kind, timestamp, link, name) {
            Ok(meta) => meta,
            Err(e) => {
                if let Some(data) = data {
                    data.free(&mut self.al)?;
                }
                return Err(e);
            }
        };

        let body = match data {
            Some(data) => Body::File {
                data: Lazy::loaded(data),
            },
            None => Body::Directory {
                first: Lazy::loaded(None),
            },
        };
        let id = self.insert(Node {
            serial: 0,
            kind,
            name: name.to_owned(),
            timestamp,
            meta,
            parent: None,
            prev: None,
            next: Lazy::loaded(None),
            body,
        });

        if let Err(e) = self.link(parent, id.pos) {
            self.destroy(id.pos)?;
            return Err(e);
        }
        log::debug!("created {kind:?} {name:?} at {} under {parent}", id.pos);

        Ok(id)
    }

    /// 把`entry`从原父目录摘下，作为`dir`的首个成员
    pub fn add_member(&mut self, dir: u64, entry: u64) -> Result<()> {
        if entry == ROOT_POS {
            return Err(Error::Root);
        }
        self.ensure_directory(dir)?;
        self.check_descendant(dir, entry)?;
        let name = self.node(entry)?.name.clone();
        self.check_vacant(dir, &name, Some(entry))?;

        let old_parent = self.node(entry)?.parent;
        if let Some(old_parent) = old_parent {
            self.unlink(old_parent, entry)?;
        }
        if let Err(e) = self.link(dir, entry) {
            self.restore(entry, old_parent, &name, &e)?;
            return Err(e);
        }
        Ok(())
    }

    pub fn remove_member(&mut self, dir: u64, entry: u64) -> Result<()> {
        let node = self.node(entry)?;
        if node.parent != Some(dir) {
            return Err(Error::NotFound(node.name.clone()));
        }
        self.unlink(dir, entry)
    }

    pub fn rename(&mut self, entry: u64, name: &str) -> Result<()> {
        if entry == ROOT_POS {
            return Err(Error::Root);
        }
        path::validate_name(name)?;
        if let Some(parent) = self.node(entry)?.parent {
            self.check_vacant(parent, name, Some(entry))?;
        }
        self.write_name(entry, name)
    }

    /// 移动到`dir`下并改名为`name`，失败时恢复到原来的父目录与名字
    pub fn move_to(&mut self, entry: u64, dir: u64, name: &str) -> Result<()> {
        if entry == ROOT_POS {
            return Err(Error::Root);
        }
        path::validate_name(name)?;
        self.ensure_directory(dir)?;
        self.check_descendant(dir, entry)?;
        self.check_vacant(dir, name, Some(entry))?;

        let node = self.node(entry)?;
        let old_parent = node.parent;
        let old_name = node.name.clone();
        if let Some(old_parent) = old_parent {
            self.unlink(old_parent, entry)?;
        }

        let moved = self
            .write_name(entry, name)
            .and_then(|()| self.link(dir, entry));
        if let Err(e) = moved {
            self.restore(entry, old_parent, &old_name, &e)?;
            return Err(e);
        }
        log::debug!("moved {old_name:?} at {entry} to {name:?} under {dir}");
        Ok(())
    }

    /// 删除目录项；目录连同整棵子树一起删除。
    ///
    /// 用显式的栈代替递归，成员总是先于所在目录销毁。
    pub fn delete(&mut self, entry: u64) -> Result<()> {
        if entry == ROOT_POS {
            return Err(Error::Root);
        }

        let mut stack = vec![(entry, false)];
        while let Some((pos, expanded)) = stack.pop() {
            if !expanded && self.kind(pos)? == EntryKind::Directory {
                stack.push((pos, true));
                // 逆序入栈，出栈时从表头开始，每次摘链都是常数时间
                let members = self.members(pos)?;
                stack.extend(members.into_iter().rev().map(|m| (m, false)));
                continue;
            }
            self.destroy(pos)?;
        }
        Ok(())
    }

    /// 在文件的数据空间上操作，首次访问时载入
    pub fn with_data<R>(
        &mut self,
        file: u64,
        f: impl FnOnce(&mut DiskSpace, &mut Allocator) -> Result<R>,
    ) -> Result<R> {
        let node = node_mut(&mut self.nodes, file)?;
        let Body::File { data } = &mut node.body else {
            return Err(Error::corrupt(format!("entry at {file} is not a file")));
        };

        let meta = &node.meta;
        let al = &mut self.al;
        let space = data.get_or_load(|| {
            let link = meta.read_u64_at(al, record::LINK)?;
            let pos = ptr(link)
                .ok_or_else(|| Error::corrupt(format!("file at {file} has no data space")))?;
            DiskSpace::load(al, pos)
        })?;
        f(space, &mut self.al)
    }

    pub fn stat(&mut self, pos: u64) -> Result<Stat> {
        let node = self.node(pos)?;
        let (kind, timestamp, meta) = (node.kind, node.timestamp, node.meta.footprint());
        let (size, data) = match kind {
            EntryKind::File => {
                self.with_data(pos, |data, _| Ok((data.size(), data.footprint())))?
            }
            EntryKind::Directory => (self.members(pos)?.len() as u64, 0),
        };
        Ok(Stat {
            kind,
            size,
            footprint: meta + data,
            timestamp,
        })
    }
}

impl Tree {
    fn node(&self, pos: u64) -> Result<&Node> {
        self.nodes.get(&pos).ok_or_else(|| gone(pos))
    }

    fn insert(&mut self, mut node: Node) -> EntryId {
        self.serial += 1;
        node.serial = self.serial;
        let id = EntryId {
            pos: node.meta.pos(),
            serial: node.serial,
            kind: node.kind,
        };
        self.nodes.insert(id.pos, node);
        id
    }

    /// 已缓存则直接返回，否则读出记录的定长部分与名字
    fn load_node(&mut self, pos: u64) -> Result<EntryId> {
        if self.nodes.contains_key(&pos) {
            return self.id_of(pos);
        }

        let meta = DiskSpace::load(&mut self.al, pos)?;
        let mut bytes = vec![0; meta.size() as usize];
        meta.read_at(&mut self.al, 0, &mut bytes)?;
        let (kind, timestamp, name) = record::decode(&bytes)?;
        let body = match kind {
            EntryKind::Directory => Body::Directory { first: Lazy::new() },
            EntryKind::File => Body::File { data: Lazy::new() },
        };

        Ok(self.insert(Node {
            serial: 0,
            kind,
            name,
            timestamp,
            meta,
            parent: None,
            prev: None,
            next: Lazy::new(),
            body,
        }))
    }

    fn create_record(
        &mut self,
        kind: EntryKind,
        timestamp: u64,
        link: Option<u64>,
        name: &str,
    ) -> Result<DiskSpace> {
        let mut meta = DiskSpace::create(&mut self.al, record::len(name))?;
        let bytes = record::encode(kind, timestamp, None, link, name);
        if let Err(e) = meta.write_at(&mut self.al, 0, &bytes) {
            meta.free(&mut self.al)?;
            return Err(e);
        }
        Ok(meta)
    }

    fn ensure_directory(&self, pos: u64) -> Result<()> {
        let node = self.node(pos)?;
        match node.kind {
            EntryKind::Directory => Ok(()),
            EntryKind::File => Err(Error::NotADirectory(node.name.clone())),
        }
    }

    /// `dir`下没有名为`name`的成员，`except`自身除外
    fn check_vacant(&mut self, dir: u64, name: &str, except: Option<u64>) -> Result<()> {
        match self.find_member(dir, name)? {
            Some(pos) if Some(pos) != except => Err(Error::AlreadyExists(name.to_owned())),
            _ => Ok(()),
        }
    }

    /// 目录不能放进自己的子树
    fn check_descendant(&self, dir: u64, entry: u64) -> Result<()> {
        if self.node(entry)?.kind != EntryKind::Directory {
            return Ok(());
        }
        let mut cursor = Some(dir);
        while let Some(pos) = cursor {
            if pos == entry {
                return Err(Error::IntoDescendant);
            }
            cursor = self.node(pos)?.parent;
        }
        Ok(())
    }

    fn next_of(&mut self, pos: u64) -> Result<Option<u64>> {
        let node = node_mut(&mut self.nodes, pos)?;
        let meta = &node.meta;
        let al = &mut self.al;
        let next = node
            .next
            .get_or_load(|| Ok(ptr(meta.read_u64_at(al, record::NEXT)?)))?;
        Ok(*next)
    }

    fn set_next(&mut self, pos: u64, next: Option<u64>) -> Result<()> {
        let node = node_mut(&mut self.nodes, pos)?;
        node.meta
            .write_u64_at(&mut self.al, record::NEXT, raw(next))?;
        node.next.set(next);
        Ok(())
    }

    fn first_member(&mut self, dir: u64) -> Result<Option<u64>> {
        let node = node_mut(&mut self.nodes, dir)?;
        let Body::Directory { first } = &mut node.body else {
            return Err(Error::NotADirectory(node.name.clone()));
        };
        let meta = &node.meta;
        let al = &mut self.al;
        let first = first.get_or_load(|| Ok(ptr(meta.read_u64_at(al, record::LINK)?)))?;
        Ok(*first)
    }

    fn set_first(&mut self, dir: u64, first: Option<u64>) -> Result<()> {
        let node = node_mut(&mut self.nodes, dir)?;
        let Body::Directory { first: cell } = &mut node.body else {
            return Err(Error::NotADirectory(node.name.clone()));
        };
        node.meta
            .write_u64_at(&mut self.al, record::LINK, raw(first))?;
        cell.set(first);
        Ok(())
    }

    /// 找到`entry`的前一个兄弟。缓存的前驱与磁盘不符时重新遍历一次
    fn prev_of(&mut self, dir: u64, entry: u64) -> Result<Option<u64>> {
        let cached = self.node(entry)?.prev;
        let confirmed = match cached {
            Some(prev) => self.nodes.contains_key(&prev) && self.next_of(prev)? == Some(entry),
            None => self.first_member(dir)? == Some(entry),
        };
        if confirmed {
            return Ok(cached);
        }

        if !self.members(dir)?.contains(&entry) {
            return Err(Error::NotFound(self.node(entry)?.name.clone()));
        }
        Ok(self.node(entry)?.prev)
    }

    fn link(&mut self, dir: u64, entry: u64) -> Result<()> {
        let old = self.first_member(dir)?;
        self.set_next(entry, old)?;
        self.set_first(dir, Some(entry))?;

        if let Some(old) = old {
            if let Some(node) = self.nodes.get_mut(&old) {
                node.prev = Some(entry);
            }
        }
        let node = node_mut(&mut self.nodes, entry)?;
        node.parent = Some(dir);
        node.prev = None;
        Ok(())
    }

    fn unlink(&mut self, dir: u64, entry: u64) -> Result<()> {
        let prev = self.prev_of(dir, entry)?;
        let next = self.next_of(entry)?;
        match prev {
            Some(prev) => self.set_next(prev, next)?,
            None => self.set_first(dir, next)?,
        }
        if let Some(next) = next {
            if let Some(node) = self.nodes.get_mut(&next) {
                node.prev = prev;
            }
        }
        self.set_next(entry, None)?;

        let node = node_mut(&mut self.nodes, entry)?;
        node.parent = None;
        node.prev = None;
        Ok(())
    }

    fn write_name(&mut self, entry: u64, name: &str) -> Result<()> {
        let node = node_mut(&mut self.nodes, entry)?;
        node.meta.set_size(&mut self.al, record::len(name))?;
        node.meta
            .write_at(&mut self.al, record::NAME, &record::encode_name(name))?;
        node.name = name.to_owned();
        Ok(())
    }

    /// 移动失败后放回原处；放不回去时目录项已经游离，只能报告损坏
    fn restore(&mut self, entry: u64, parent: Option<u64>, name: &str, cause: &Error) -> Result<()> {
        log::warn!("restoring entry at {entry} after a failed move: {cause}");
        let restored = self.write_name(entry, name).and_then(|()| match parent {
            Some(parent) if self.node(entry)?.parent != Some(parent) => self.link(parent, entry),
            _ => Ok(()),
        });
        restored.map_err(|e| {
            Error::corrupt(format!(
                "entry at {entry} is detached: {cause}, and restoring it failed: {e}"
            ))
        })
    }

    /// 从父目录摘下，归还数据空间与记录空间
    fn destroy(&mut self, pos: u64) -> Result<()> {
        if let Some(parent) = self.node(pos)?.parent {
            self.unlink(parent, pos)?;
        }
        if self.kind(pos)? == EntryKind::File {
            // 数据空间可能还没载入
            self.with_data(pos, |_, _| Ok(()))?;
        }

        let mut node = self.nodes.remove(&pos).ok_or_else(|| gone(pos))?;
        log::debug!("deleting {:?} {:?} at {pos}", node.kind, node.name);
        if let Body::File { data } = &mut node.body {
            if let Some(data) = data.take() {
                data.free(&mut self.al)?;
            }
        }
        node.meta.free(&mut self.al)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDevice;

    const DISK: u64 = 64 * 1024;

    fn tree() -> Tree {
        Tree::format(Box::new(MemDevice::new()), DISK).unwrap()
    }

    fn names(tree: &mut Tree, dir: u64) -> Vec<String> {
        tree.members(dir)
            .unwrap()
            .into_iter()
            .map(|pos| tree.name(pos).unwrap().to_owned())
            .collect()
    }

    #[test]
    fn lazy_cell() {
        let mut cell = Lazy::new();
        assert_eq!(&mut 1, cell.get_or_load(|| Ok(1)).unwrap());
        assert_eq!(&mut 1, cell.get_or_load(|| Ok(2)).unwrap());
        cell.set(3);
        assert_eq!(Some(3), cell.take());
        assert!(cell.get_or_load(|| Err(Error::Closed)).is_err());
        assert_eq!(None, cell.take());
    }

    #[test]
    fn head_insertion_and_unlink() {
        let mut tree = tree();
        let a = tree.create(ROOT_POS, "a", EntryKind::File, 0).unwrap();
        let b = tree.create(ROOT_POS, "b", EntryKind::File, 0).unwrap();
        let c = tree.create(ROOT_POS, "c", EntryKind::File, 0).unwrap();
        assert_eq!(vec!["c", "b", "a"], names(&mut tree, ROOT_POS));

        // 摘下中间的成员
        tree.remove_member(ROOT_POS, b.pos).unwrap();
        assert_eq!(vec!["c", "a"], names(&mut tree, ROOT_POS));
        assert_eq!(None, tree.parent(b.pos).unwrap());
        assert!(matches!(
            tree.remove_member(ROOT_POS, b.pos),
            Err(Error::NotFound(_))
        ));

        tree.remove_member(ROOT_POS, c.pos).unwrap();
        tree.remove_member(ROOT_POS, a.pos).unwrap();
        assert!(names(&mut tree, ROOT_POS).is_empty());
    }

    #[test]
    fn reopen_follows_links() {
        let mut tree = tree();
        let dir = tree.create(ROOT_POS, "dir", EntryKind::Directory, 0).unwrap();
        let file = tree.create(dir.pos, "file", EntryKind::File, 5).unwrap();
        tree.with_data(file.pos, |data, al| data.write_at(al, 0, b"hello"))
            .unwrap();

        let mut bytes = vec![0; tree.size() as usize];
        tree.al.dev().read_at(0, &mut bytes).unwrap();
        let mut dev = MemDevice::new();
        dev.write_at(0, &bytes).unwrap();

        let mut reopened = Tree::open(Box::new(dev)).unwrap();
        let found = reopened.resolve(ROOT_POS, "dir/file").unwrap();
        assert_eq!(file.pos, found.pos);
        assert_eq!(Some(dir.pos), reopened.parent(found.pos).unwrap().map(|p| p.pos));
        let mut buf = [0; 5];
        reopened
            .with_data(found.pos, |data, al| data.read_at(al, 0, &mut buf))
            .unwrap();
        assert_eq!(b"hello", &buf);
    }

    #[test]
    fn delete_reclaims_subtree() {
        let mut tree = tree();
        let free = tree.free_space().unwrap();

        let top = tree.create(ROOT_POS, "top", EntryKind::Directory, 0).unwrap();
        let mut dir = top.pos;
        for depth in 0..20 {
            tree.create(dir, "leaf", EntryKind::File, 100).unwrap();
            dir = tree
                .create(dir, &format!("d{depth}"), EntryKind::Directory, 0)
                .unwrap()
                .pos;
        }

        tree.delete(top.pos).unwrap();
        assert!(tree.validate(top).is_err());
        assert!(names(&mut tree, ROOT_POS).is_empty());
        assert_eq!(free, tree.free_space().unwrap());
        assert_eq!(1, tree.nodes.len());
        tree.check().unwrap();
    }

    #[test]
    fn reused_position_is_a_new_entry() {
        let mut tree = tree();
        let _keep = tree.create(ROOT_POS, "keep", EntryKind::File, 0).unwrap();
        let x = tree.create(ROOT_POS, "x", EntryKind::File, 0).unwrap();
        tree.delete(x.pos).unwrap();
        let z = tree.create(ROOT_POS, "z", EntryKind::File, 0).unwrap();

        assert_ne!(x, z);
        assert!(matches!(tree.validate(x), Err(Error::UseAfterFree(_))));
        tree.validate(z).unwrap();
    }
}
