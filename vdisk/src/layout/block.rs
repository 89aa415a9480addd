//! 块的打包与解包。
//!
//! 空闲块：
//! 大小 | 前一个空闲块 | 后一个空闲块 | ... | 大小
//!
//! 数据块：
//! 大小|已分配 | 下一个数据块 | 已用字节数 | 载荷 ... | 大小|已分配
//!
//! 分配标志只在本模块内出现，其余部分只见到 [`Block`] 的两种变体。

use core::ops::Range;

use crate::device::Device;
use crate::layout::{ptr, raw, MIN_BLOCK_SIZE, TAG_SIZE};
use crate::{Error, Result};

const ALLOCATED: u64 = 1 << 63;

/// 边界标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tag {
    size: u64,
    allocated: bool,
}

impl Tag {
    fn from_raw(raw: u64) -> Self {
        Self {
            size: raw & !ALLOCATED,
            allocated: raw & ALLOCATED != 0,
        }
    }

    fn into_raw(self) -> u64 {
        if self.allocated {
            self.size | ALLOCATED
        } else {
            self.size
        }
    }

    /// 首尾两端都写上标记
    fn store(self, dev: &mut dyn Device, pos: u64) -> Result<()> {
        dev.write_u64(pos, self.into_raw())?;
        dev.write_u64(pos + self.size - TAG_SIZE, self.into_raw())?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Free(FreeBlock),
    Data(DataBlock),
}

impl Block {
    /// 读取`pos`处的块，并校验首尾标记是否一致
    pub fn load(dev: &mut dyn Device, pos: u64) -> Result<Self> {
        let head = dev.read_u64(pos)?;
        let tag = Tag::from_raw(head);
        if tag.size < MIN_BLOCK_SIZE || tag.size % MIN_BLOCK_SIZE != 0 {
            return Err(Error::corrupt(format!(
                "block at {pos} has a bad size {}",
                tag.size
            )));
        }

        let tail = dev.read_u64(pos + tag.size - TAG_SIZE)?;
        if head != tail {
            return Err(Error::corrupt(format!(
                "boundary tags of block at {pos} disagree: {head:#x} != {tail:#x}"
            )));
        }

        let block = if tag.allocated {
            Self::Data(DataBlock {
                pos,
                size: tag.size,
                next: ptr(dev.read_u64(pos + DataBlock::NEXT)?),
                used: dev.read_u64(pos + DataBlock::USED)?,
            })
        } else {
            Self::Free(FreeBlock {
                pos,
                size: tag.size,
                prev: ptr(dev.read_u64(pos + FreeBlock::PREV)?),
                next: ptr(dev.read_u64(pos + FreeBlock::NEXT)?),
            })
        };
        Ok(block)
    }

    /// 借助前一个块的尾标记找到它；`pos`为区域起点时没有前驱
    pub fn load_prev(dev: &mut dyn Device, pos: u64, region: &Range<u64>) -> Result<Option<Self>> {
        if pos <= region.start {
            return Ok(None);
        }

        let size = Tag::from_raw(dev.read_u64(pos - TAG_SIZE)?).size;
        if size < MIN_BLOCK_SIZE || pos - region.start < size {
            return Err(Error::corrupt(format!(
                "trailing tag before {pos} points outside of the disk"
            )));
        }
        Self::load(dev, pos - size).map(Some)
    }

    /// `end`为当前块的末尾，即后一个块的起点；区域末尾之后没有后继
    pub fn load_next(dev: &mut dyn Device, end: u64, region: &Range<u64>) -> Result<Option<Self>> {
        if end >= region.end {
            return Ok(None);
        }
        Self::load(dev, end).map(Some)
    }

    pub fn pos(&self) -> u64 {
        match self {
            Self::Free(block) => block.pos,
            Self::Data(block) => block.pos,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Free(block) => block.size,
            Self::Data(block) => block.size,
        }
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.pos() + self.size()
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self, Self::Free(_))
    }
}

/// 空闲块，按大小挂在某一级的双向链表上
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub pos: u64,
    pub size: u64,
    pub prev: Option<u64>,
    pub next: Option<u64>,
}

impl FreeBlock {
    const PREV: u64 = TAG_SIZE;
    const NEXT: u64 = TAG_SIZE * 2;

    pub fn store(&self, dev: &mut dyn Device) -> Result<()> {
        Tag {
            size: self.size,
            allocated: false,
        }
        .store(dev, self.pos)?;
        dev.write_u64(self.pos + Self::PREV, raw(self.prev))?;
        dev.write_u64(self.pos + Self::NEXT, raw(self.next))?;
        Ok(())
    }

    /// 只改写`at`处空闲块的前驱指针
    pub fn link_prev(dev: &mut dyn Device, at: u64, prev: Option<u64>) -> Result<()> {
        dev.write_u64(at + Self::PREV, raw(prev))?;
        Ok(())
    }

    /// 只改写`at`处空闲块的后继指针
    pub fn link_next(dev: &mut dyn Device, at: u64, next: Option<u64>) -> Result<()> {
        dev.write_u64(at + Self::NEXT, raw(next))?;
        Ok(())
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.pos + self.size
    }
}

/// 已分配的数据块
///
/// 头部字段只能通过带设备参数的方法修改，保证内存与磁盘同步。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pos: u64,
    size: u64,
    next: Option<u64>,
    /// 载荷中已用的字节数，不超过容量
    used: u64,
}

impl DataBlock {
    const NEXT: u64 = TAG_SIZE;
    const USED: u64 = TAG_SIZE * 2;

    /// 载荷之前的头部
    pub const HEADER: u64 = TAG_SIZE * 3;

    /// 头部加尾标记
    pub const OVERHEAD: u64 = Self::HEADER + TAG_SIZE;

    /// 新块只存在于内存中，需要 [`DataBlock::store`] 落盘
    pub fn new(pos: u64, size: u64, used: u64) -> Self {
        debug_assert!(used <= size - Self::OVERHEAD);
        Self {
            pos,
            size,
            next: None,
            used,
        }
    }

    pub fn load(dev: &mut dyn Device, pos: u64) -> Result<Self> {
        match Block::load(dev, pos)? {
            Block::Data(block) => Ok(block),
            Block::Free(_) => Err(Error::UseAfterFree(format!("block at {pos} is free"))),
        }
    }

    pub fn store(&self, dev: &mut dyn Device) -> Result<()> {
        Tag {
            size: self.size,
            allocated: true,
        }
        .store(dev, self.pos)?;
        dev.write_u64(self.pos + Self::NEXT, raw(self.next))?;
        dev.write_u64(self.pos + Self::USED, self.used)?;
        Ok(())
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.pos + self.size
    }

    #[inline]
    pub fn next(&self) -> Option<u64> {
        self.next
    }

    #[inline]
    pub fn used(&self) -> u64 {
        self.used
    }

    /// 载荷容量
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.size - Self::OVERHEAD
    }

    /// 还能就地增长的字节数
    #[inline]
    pub fn spare(&self) -> u64 {
        self.capacity() - self.used
    }

    pub fn set_next(&mut self, dev: &mut dyn Device, next: Option<u64>) -> Result<()> {
        dev.write_u64(self.pos + Self::NEXT, raw(next))?;
        self.next = next;
        Ok(())
    }

    pub fn set_used(&mut self, dev: &mut dyn Device, used: u64) -> Result<()> {
        if used > self.capacity() {
            return Err(Error::range(0, used, self.capacity()));
        }
        dev.write_u64(self.pos + Self::USED, used)?;
        self.used = used;
        Ok(())
    }

    pub fn read(&self, dev: &mut dyn Device, offset: u64, buf: &mut [u8]) -> Result<()> {
        let at = self.payload(offset, buf.len() as u64)?;
        dev.read_at(at, buf)?;
        Ok(())
    }

    pub fn write(&self, dev: &mut dyn Device, offset: u64, buf: &[u8]) -> Result<()> {
        let at = self.payload(offset, buf.len() as u64)?;
        dev.write_at(at, buf)?;
        Ok(())
    }

    pub fn read_u8(&self, dev: &mut dyn Device, offset: u64) -> Result<u8> {
        let mut byte = [0];
        self.read(dev, offset, &mut byte)?;
        Ok(byte[0])
    }

    pub fn write_u8(&self, dev: &mut dyn Device, offset: u64, value: u8) -> Result<()> {
        self.write(dev, offset, &[value])
    }

    pub fn read_u64(&self, dev: &mut dyn Device, offset: u64) -> Result<u64> {
        let mut bytes = [0; 8];
        self.read(dev, offset, &mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn write_u64(&self, dev: &mut dyn Device, offset: u64, value: u64) -> Result<()> {
        self.write(dev, offset, &value.to_le_bytes())
    }

    /// 载荷内`offset..offset+len`对应的磁盘位置，越过已用部分则报错
    fn payload(&self, offset: u64, len: u64) -> Result<u64> {
        match offset.checked_add(len) {
            Some(end) if end <= self.used => Ok(self.pos + Self::HEADER + offset),
            _ => Err(Error::range(offset, len, self.used)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDevice;

    fn device() -> MemDevice {
        let mut dev = MemDevice::new();
        dev.set_size(4096).unwrap();
        dev
    }

    #[test]
    fn tags_on_both_ends() {
        let mut dev = device();
        let block = DataBlock::new(256, 128, 10);
        block.store(&mut dev).unwrap();

        let head = dev.read_u64(256).unwrap();
        let tail = dev.read_u64(256 + 128 - TAG_SIZE).unwrap();
        assert_eq!(head, tail);
        assert_eq!(128 | ALLOCATED, head);

        let free = FreeBlock {
            pos: 384,
            size: 64,
            prev: None,
            next: Some(1024),
        };
        free.store(&mut dev).unwrap();
        assert_eq!(64, dev.read_u64(384).unwrap());
        assert_eq!(64, dev.read_u64(384 + 64 - TAG_SIZE).unwrap());
        assert_eq!(Block::Free(free), Block::load(&mut dev, 384).unwrap());
    }

    #[test]
    fn neighbours() {
        let mut dev = device();
        let region = 256..512;
        let first = DataBlock::new(256, 64, 0);
        let second = FreeBlock {
            pos: 320,
            size: 128,
            prev: None,
            next: None,
        };
        let third = DataBlock::new(448, 64, 32);
        first.store(&mut dev).unwrap();
        second.store(&mut dev).unwrap();
        third.store(&mut dev).unwrap();

        assert_eq!(None, Block::load_prev(&mut dev, 256, &region).unwrap());
        assert_eq!(
            Some(Block::Data(first.clone())),
            Block::load_prev(&mut dev, 320, &region).unwrap()
        );
        assert_eq!(
            Some(Block::Free(second)),
            Block::load_prev(&mut dev, 448, &region).unwrap()
        );
        assert_eq!(
            Some(Block::Data(third.clone())),
            Block::load_next(&mut dev, second.end(), &region).unwrap()
        );
        assert_eq!(None, Block::load_next(&mut dev, third.end(), &region).unwrap());
    }

    #[test]
    fn mismatched_tags() {
        let mut dev = device();
        DataBlock::new(256, 128, 0).store(&mut dev).unwrap();
        dev.write_u64(256 + 128 - TAG_SIZE, 64).unwrap();
        assert!(matches!(
            Block::load(&mut dev, 256),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn payload_bounds() {
        let mut dev = device();
        let mut block = DataBlock::new(256, 128, 4);
        block.store(&mut dev).unwrap();

        block.write(&mut dev, 0, &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            block.write(&mut dev, 2, &[0; 3]),
            Err(Error::InvalidRange { start: 2, end: 5, len: 4 })
        ));
        assert!(block.read_u64(&mut dev, 0).is_err());

        block.set_used(&mut dev, 16).unwrap();
        block.write_u64(&mut dev, 8, u64::MAX).unwrap();
        assert_eq!(u64::MAX, block.read_u64(&mut dev, 8).unwrap());
        assert_eq!(3, block.read_u8(&mut dev, 2).unwrap());
        assert!(block.set_used(&mut dev, block.capacity() + 1).is_err());

        assert_eq!(
            Block::Data(block.clone()),
            Block::load(&mut dev, 256).unwrap()
        );
    }
}
