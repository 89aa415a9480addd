//! # 磁盘空间层
//!
//! 一段磁盘空间是一条数据块链构成的逻辑字节流，
//! 逻辑大小为各块已用字节数之和，用法类似随机访问文件。
//!
//! 逻辑偏移到块的映射每次读写时都沿块链累加重新计算，
//! 除了块链本身之外不缓存任何索引。

use crate::allocator::Allocator;
use crate::layout::{DataBlock, MIN_BLOCK_SIZE};
use crate::{Error, Result};

/// 补零时每次写入的字节数上限
const ZERO_CHUNK: usize = 4096;

#[derive(Debug)]
pub struct DiskSpace {
    /// 非空，顺序即块链顺序
    blocks: Vec<DataBlock>,
    /// 游标，可以越过末尾，下一次写入时才增长
    cursor: u64,
}

impl DiskSpace {
    /// 分配能容纳`size`字节的新空间，内容全为零
    pub fn create(al: &mut Allocator, size: u64) -> Result<Self> {
        let blocks = al.allocate(size)?;
        let space = Self { blocks, cursor: 0 };
        space.zero(al, 0, size)?;
        Ok(space)
    }

    /// 从首块开始沿后继指针收集整条块链
    pub fn load(al: &mut Allocator, pos: u64) -> Result<Self> {
        let limit = al.size() / MIN_BLOCK_SIZE;
        let mut blocks = Vec::new();
        let mut next = Some(pos);
        while let Some(pos) = next {
            if blocks.len() as u64 >= limit {
                return Err(Error::corrupt(format!("block chain through {pos} is cyclic")));
            }
            let block = DataBlock::load(al.dev(), pos)
                .map_err(|e| match e {
                    Error::UseAfterFree(msg) => Error::Corrupt(msg),
                    e => e,
                })?;
            next = block.next();
            blocks.push(block);
        }

        Ok(Self { blocks, cursor: 0 })
    }

    /// 首块的位置，也是这段空间的标识
    #[inline]
    pub fn pos(&self) -> u64 {
        self.blocks[0].pos()
    }

    /// 逻辑大小
    pub fn size(&self) -> u64 {
        self.blocks.iter().map(DataBlock::used).sum()
    }

    /// 在磁盘上实际占用的字节数
    pub fn footprint(&self) -> u64 {
        self.blocks.iter().map(DataBlock::size).sum()
    }

    #[cfg(test)]
    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    #[inline]
    pub fn seek(&mut self, pos: u64) {
        self.cursor = pos;
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// 从游标处读取，返回读到的字节数，到达末尾时为0
    pub fn read(&mut self, al: &mut Allocator, buf: &mut [u8]) -> Result<usize> {
        let n = self.read_at(al, self.cursor, buf)?;
        self.cursor += n as u64;
        Ok(n)
    }

    /// 在游标处写入，必要时先增长
    pub fn write(&mut self, al: &mut Allocator, buf: &[u8]) -> Result<()> {
        self.write_at(al, self.cursor, buf)?;
        self.cursor += buf.len() as u64;
        Ok(())
    }

    pub fn read_u64(&mut self, al: &mut Allocator) -> Result<u64> {
        let value = self.read_u64_at(al, self.cursor)?;
        self.cursor += 8;
        Ok(value)
    }

    pub fn write_u64(&mut self, al: &mut Allocator, value: u64) -> Result<()> {
        self.write(al, &value.to_le_bytes())
    }

    pub fn read_at(&self, al: &mut Allocator, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let size = self.size();
        if pos >= size {
            return Ok(0);
        }

        let n = (buf.len() as u64).min(size - pos) as usize;
        self.read_within(al, pos, &mut buf[..n])?;
        Ok(n)
    }

    /// 写入越过末尾时，先增长不足的部分，再重新定位写入
    pub fn write_at(&mut self, al: &mut Allocator, pos: u64, buf: &[u8]) -> Result<()> {
        let end = pos
            .checked_add(buf.len() as u64)
            .ok_or_else(|| Error::range(pos, buf.len() as u64, self.size()))?;
        let size = self.size();
        if end > size {
            self.extend(al, end - size)?;
        }
        self.write_within(al, pos, buf)
    }

    /// 必须完整读到8字节
    pub fn read_u64_at(&self, al: &mut Allocator, pos: u64) -> Result<u64> {
        let mut bytes = [0; 8];
        if self.read_at(al, pos, &mut bytes)? != bytes.len() {
            return Err(Error::range(pos, 8, self.size()));
        }
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn write_u64_at(&mut self, al: &mut Allocator, pos: u64, value: u64) -> Result<()> {
        self.write_at(al, pos, &value.to_le_bytes())
    }

    /// 增长`amount`字节，新增部分为零。
    ///
    /// 先在末块的剩余容量内就地增长，其余部分向分配器申请新块并接在末块之后。
    /// 申请失败时空间保持原样。
    pub fn extend(&mut self, al: &mut Allocator, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        let old_size = self.size();
        let last = self.blocks.len() - 1;
        let grow = self.blocks[last].spare().min(amount);
        let fresh = if amount > grow {
            al.allocate(amount - grow)?
        } else {
            Vec::new()
        };

        let tail = &mut self.blocks[last];
        if grow > 0 {
            tail.set_used(al.dev(), tail.used() + grow)?;
        }
        if let Some(first) = fresh.first() {
            tail.set_next(al.dev(), Some(first.pos()))?;
        }
        log::trace!(
            "space {}: extended by {amount} ({grow} in place, {} new blocks)",
            self.pos(),
            fresh.len()
        );
        self.blocks.extend(fresh);

        self.zero(al, old_size, old_size + amount)
    }

    /// 从尾部收缩`amount`字节。
    ///
    /// 已用字节不超过剩余待收缩量的尾块整块归还分配器，
    /// 最后一个受影响的块只减少已用字节数。首块永远保留。
    pub fn truncate(&mut self, al: &mut Allocator, amount: u64) -> Result<()> {
        let size = self.size();
        if amount > size {
            return Err(Error::range(size - amount.min(size), amount, size));
        }

        let mut rest = amount;
        let mut released = None;
        while self.blocks.len() > 1 {
            let used = self.blocks[self.blocks.len() - 1].used();
            if used > rest {
                break;
            }
            rest -= used;
            released = self.blocks.pop();
        }

        let tail = self.blocks.len() - 1;
        if let Some(first) = released {
            self.blocks[tail].set_next(al.dev(), None)?;
            // 被摘下的块仍然首尾相连，从最前面的一块开始释放整条链
            al.free(first)?;
        }
        if rest > 0 {
            let block = &mut self.blocks[tail];
            block.set_used(al.dev(), block.used() - rest)?;
        }

        Ok(())
    }

    pub fn set_size(&mut self, al: &mut Allocator, size: u64) -> Result<()> {
        let current = self.size();
        if size > current {
            self.extend(al, size - current)
        } else {
            self.truncate(al, current - size)
        }
    }

    /// 整条块链归还分配器
    pub fn free(self, al: &mut Allocator) -> Result<()> {
        match self.blocks.into_iter().next() {
            Some(first) => al.free(first),
            None => Ok(()),
        }
    }
}

impl DiskSpace {
    /// 逻辑偏移所在的块与块内偏移；`pos`等于大小时落在末块末尾
    fn locate(&self, pos: u64) -> (usize, u64) {
        let mut base = 0;
        for (i, block) in self.blocks.iter().enumerate() {
            if pos < base + block.used() {
                return (i, pos - base);
            }
            base += block.used();
        }
        let last = self.blocks.len() - 1;
        (last, self.blocks[last].used())
    }

    fn read_within(&self, al: &mut Allocator, pos: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let (mut i, mut offset) = self.locate(pos);
        let mut done = 0;
        while done < buf.len() {
            let block = &self.blocks[i];
            let n = ((block.used() - offset) as usize).min(buf.len() - done);
            block.read(al.dev(), offset, &mut buf[done..done + n])?;
            done += n;
            i += 1;
            offset = 0;
        }
        Ok(())
    }

    /// 跨越块边界的写入按各块的已用部分拆开
    fn write_within(&self, al: &mut Allocator, pos: u64, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let (mut i, mut offset) = self.locate(pos);
        let mut done = 0;
        while done < buf.len() {
            let block = &self.blocks[i];
            let n = ((block.used() - offset) as usize).min(buf.len() - done);
            block.write(al.dev(), offset, &buf[done..done + n])?;
            done += n;
            i += 1;
            offset = 0;
        }
        Ok(())
    }

    fn zero(&self, al: &mut Allocator, from: u64, to: u64) -> Result<()> {
        let zeros = [0; ZERO_CHUNK];
        let mut pos = from;
        while pos < to {
            let n = (to - pos).min(ZERO_CHUNK as u64);
            self.write_within(al, pos, &zeros[..n as usize])?;
            pos += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDevice;

    fn allocator() -> Allocator {
        Allocator::format(Box::new(MemDevice::new()), 256 * 1024).unwrap()
    }

    #[test]
    fn write_past_end_grows() {
        let mut al = allocator();
        let mut space = DiskSpace::create(&mut al, 10).unwrap();
        assert_eq!(10, space.size());

        space.write_at(&mut al, 50, &[1, 2, 3]).unwrap();
        assert_eq!(53, space.size());

        let mut buf = [0xFF; 53];
        assert_eq!(53, space.read_at(&mut al, 0, &mut buf).unwrap());
        assert!(buf[..50].iter().all(|&b| b == 0));
        assert_eq!(&buf[50..], &[1, 2, 3]);
    }

    #[test]
    fn cursor() {
        let mut al = allocator();
        let mut space = DiskSpace::create(&mut al, 0).unwrap();
        space.write(&mut al, b"hello").unwrap();
        space.write_u64(&mut al, 42).unwrap();
        assert_eq!(13, space.position());

        space.seek(0);
        let mut word = [0; 5];
        assert_eq!(5, space.read(&mut al, &mut word).unwrap());
        assert_eq!(b"hello", &word);
        assert_eq!(42, space.read_u64(&mut al).unwrap());
        assert_eq!(0, space.read(&mut al, &mut word).unwrap());
        assert!(matches!(
            space.read_u64(&mut al),
            Err(Error::InvalidRange { .. })
        ));

        // 越过末尾的游标只在写入时增长
        space.seek(100);
        assert_eq!(13, space.size());
        space.write(&mut al, &[9]).unwrap();
        assert_eq!(101, space.size());
    }

    #[test]
    fn straddles_blocks() {
        let mut al = allocator();
        let mut space = DiskSpace::create(&mut al, 10).unwrap();
        // 紧随其后分配一块，迫使增长时另起新块
        let _neighbour = DiskSpace::create(&mut al, 10).unwrap();

        let data: Vec<u8> = (0..=255).cycle().take(5000).collect();
        space.write_at(&mut al, 0, &data).unwrap();
        assert!(space.blocks().len() > 1);
        assert_eq!(5000, space.size());

        let mut back = vec![0; 5000];
        space.read_at(&mut al, 0, &mut back).unwrap();
        assert_eq!(data, back);

        let reloaded = DiskSpace::load(&mut al, space.pos()).unwrap();
        assert_eq!(space.blocks(), reloaded.blocks());
        let mut back = vec![0; 100];
        reloaded.read_at(&mut al, 4000, &mut back).unwrap();
        assert_eq!(&data[4000..4100], &back[..]);
        al.check().unwrap();
    }

    #[test]
    fn shrink_frees_tail_blocks() {
        let mut al = allocator();
        let free = al.free_space().unwrap();

        let mut space = DiskSpace::create(&mut al, 10).unwrap();
        let neighbour = DiskSpace::create(&mut al, 10).unwrap();
        space.set_size(&mut al, 3000).unwrap();
        space.write_at(&mut al, 0, b"keep").unwrap();
        assert!(space.blocks().len() > 1);

        space.set_size(&mut al, 4).unwrap();
        assert_eq!(1, space.blocks().len());
        assert_eq!(4, space.size());
        assert_eq!(None, space.blocks()[0].next());

        let mut buf = [0; 8];
        assert_eq!(4, space.read_at(&mut al, 0, &mut buf).unwrap());
        assert_eq!(b"keep", &buf[..4]);

        space.set_size(&mut al, 0).unwrap();
        assert_eq!(0, space.size());
        assert!(space.truncate(&mut al, 1).is_err());

        space.free(&mut al).unwrap();
        neighbour.free(&mut al).unwrap();
        assert_eq!(free, al.free_space().unwrap());
        assert_eq!(1, al.check().unwrap().blocks);
    }

    #[test]
    fn regrowth_reads_zero() {
        let mut al = allocator();
        let mut space = DiskSpace::create(&mut al, 0).unwrap();
        space.write_at(&mut al, 0, &[0xAA; 20]).unwrap();
        space.set_size(&mut al, 5).unwrap();
        space.set_size(&mut al, 20).unwrap();

        let mut buf = [0xFF; 20];
        space.read_at(&mut al, 0, &mut buf).unwrap();
        assert_eq!(&buf[..5], &[0xAA; 5]);
        assert_eq!(&buf[5..], &[0; 15]);
    }

    #[test]
    fn out_of_space_keeps_space_intact() {
        let mut al = allocator();
        let mut space = DiskSpace::create(&mut al, 100).unwrap();
        let before = al.free_space().unwrap();

        let err = space.extend(&mut al, 1024 * 1024).unwrap_err();
        assert!(matches!(err, Error::OutOfSpace { .. }));
        assert_eq!(100, space.size());
        assert_eq!(before, al.free_space().unwrap());
        al.check().unwrap();
    }
}
