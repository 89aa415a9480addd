use crate::entry::{Directory, EntryId, EntryKind, Handle, Shared, Stat};
use crate::Result;

/// 文件句柄
///
/// 读写游标属于文件本身，同一文件的所有句柄共享一个游标。
/// 写入与改变大小都会刷新修改时间。
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    handle: Handle,
}

impl File {
    pub(crate) fn new(disk: Shared, id: EntryId) -> Self {
        debug_assert_eq!(id.kind, EntryKind::File);
        Self {
            handle: Handle::new(disk, id),
        }
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

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

    pub fn delete(&self) -> Result<()> {
        self.handle.delete()
    }

    pub fn move_to(&self, dir: &Directory, name: &str) -> Result<()> {
        self.handle.move_to(dir, name)
    }

    pub fn stat(&self) -> Result<Stat> {
        self.handle.stat()
    }

    pub fn size(&self) -> Result<u64> {
        self.handle
            .with(|tree, pos| tree.with_data(pos, |data, _| Ok(data.size())))
    }

    /// 增长的部分为零
    pub fn set_size(&self, size: u64) -> Result<()> {
        self.handle.with(|tree, pos| {
            tree.with_data(pos, |data, al| data.set_size(al, size))?;
            tree.touch(pos)
        })
    }

    /// 游标可以越过末尾，下一次写入时才增长
    pub fn seek(&self, pos: u64) -> Result<()> {
        self.handle.with(|tree, file| {
            tree.with_data(file, |data, _| {
                data.seek(pos);
                Ok(())
            })
        })
    }

    pub fn position(&self) -> Result<u64> {
        self.handle
            .with(|tree, pos| tree.with_data(pos, |data, _| Ok(data.position())))
    }

    /// 从游标处读取，返回读到的字节数，到达末尾时为0
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.handle
            .with(|tree, pos| tree.with_data(pos, |data, al| data.read(al, buf)))
    }

    pub fn write(&self, buf: &[u8]) -> Result<()> {
        self.handle.with(|tree, pos| {
            tree.with_data(pos, |data, al| data.write(al, buf))?;
            tree.touch(pos)
        })
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.handle
            .with(|tree, pos| tree.with_data(pos, |data, al| data.read_at(al, offset, buf)))
    }

    /// 越过末尾的写入先把文件增长到足够大
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.handle.with(|tree, pos| {
            tree.with_data(pos, |data, al| data.write_at(al, offset, buf))?;
            tree.touch(pos)
        })
    }

    /// 从游标处读取小端序的`u64`，不足8字节时报错
    pub fn read_u64(&self) -> Result<u64> {
        self.handle
            .with(|tree, pos| tree.with_data(pos, |data, al| data.read_u64(al)))
    }

    pub fn write_u64(&self, value: u64) -> Result<()> {
        self.handle.with(|tree, pos| {
            tree.with_data(pos, |data, al| data.write_u64(al, value))?;
            tree.touch(pos)
        })
    }

    /// 读出全部内容，不移动游标
    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.handle.with(|tree, pos| {
            tree.with_data(pos, |data, al| {
                let mut buf = vec![0; data.size() as usize];
                data.read_at(al, 0, &mut buf)?;
                Ok(buf)
            })
        })
    }
}
