use crate::entry::{Entry, EntryId, EntryKind, File, Handle, Shared, Stat};
use crate::Result;

/// 目录句柄
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    handle: Handle,
}

impl Directory {
    pub(crate) fn new(disk: Shared, id: EntryId) -> Self {
        debug_assert_eq!(id.kind, EntryKind::Directory);
        Self {
            handle: Handle::new(disk, id),
        }
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    /// 根目录的名字为空
    pub fn name(&self) -> Result<String> {
        self.handle.name()
    }

    pub fn timestamp(&self) -> Result<u64> {
        self.handle.timestamp()
    }

    pub fn set_timestamp(&self, timestamp: u64) -> Result<()> {
        self.handle.set_timestamp(timestamp)
    }

    pub fn rename(&self, name: &str) -> Result<()> {
        self.handle.rename(name)
    }

    pub fn exists(&self) -> bool {
        self.handle.exists()
    }

    pub fn parent(&self) -> Result<Option<Directory>> {
        self.handle.parent()
    }

    /// 先删除全部成员，再删除自身
    pub fn delete(&self) -> Result<()> {
        self.handle.delete()
    }

    pub fn move_to(&self, dir: &Directory, name: &str) -> Result<()> {
        self.handle.move_to(dir, name)
    }

    pub fn stat(&self) -> Result<Stat> {
        self.handle.stat()
    }

    pub fn member(&self, name: &str) -> Result<Option<Entry>> {
        let id = self.handle.with(|tree, pos| {
            tree.find_member(pos, name)?
                .map(|member| tree.id_of(member))
                .transpose()
        })?;
        Ok(id.map(|id| self.handle.entry(id)))
    }

    /// 最近加入的成员在前
    pub fn members(&self) -> Result<Vec<Entry>> {
        let ids = self.handle.with(|tree, pos| {
            tree.members(pos)?
                .into_iter()
                .map(|member| tree.id_of(member))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(ids.into_iter().map(|id| self.handle.entry(id)).collect())
    }

    /// 新建`size`字节的文件，内容全为零
    pub fn create_file(&self, name: &str, size: u64) -> Result<File> {
        let id = self
            .handle
            .with(|tree, pos| tree.create(pos, name, EntryKind::File, size))?;
        Ok(File::new(self.handle.disk.clone(), id))
    }

    pub fn create_directory(&self, name: &str) -> Result<Directory> {
        let id = self
            .handle
            .with(|tree, pos| tree.create(pos, name, EntryKind::Directory, 0))?;
        Ok(Directory::new(self.handle.disk.clone(), id))
    }

    /// 把`entry`从它原来的目录移到这里，名字不变
    pub fn add_member(&self, entry: &Entry) -> Result<()> {
        let member = entry.handle();
        self.handle.same_disk(member)?;
        self.handle.with(|tree, pos| {
            tree.validate(member.id)?;
            tree.add_member(pos, member.id.pos)
        })
    }

    /// 把`entry`从成员链表中摘下，它不再属于任何目录
    pub fn remove_member(&self, entry: &Entry) -> Result<()> {
        let member = entry.handle();
        self.handle.same_disk(member)?;
        self.handle.with(|tree, pos| {
            tree.validate(member.id)?;
            tree.remove_member(pos, member.id.pos)
        })
    }

    /// 相对于本目录的路径，空路径即本目录
    pub fn resolve(&self, path: &str) -> Result<Entry> {
        let id = self.handle.with(|tree, pos| tree.resolve(pos, path))?;
        Ok(self.handle.entry(id))
    }
}
