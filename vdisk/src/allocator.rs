//! # 块分配器层
//!
//! 分级空闲链表：第`k`级挂着大小位于`[MIN_BLOCK_SIZE << k, MIN_BLOCK_SIZE << (k+1))`
//! 的空闲块（最后一级不设上限），表头记录在超级块中。
//!
//! - 分配：从所需大小的级别起向上逐级首次适配，剩余部分足够大时分裂出新的空闲块；
//! - 释放：借助边界标记检查物理上的前后邻居，空闲则摘链合并，
//!   合并后的块作为新表头插入对应级别。
//!
//! 不变式：任何时刻磁盘上都不存在两个相邻的空闲块。

use core::ops::Range;

use crate::device::Device;
use crate::layout::{
    Block, DataBlock, FreeBlock, SuperBlock, FIRST_BLOCK, MIN_BLOCK_SIZE, NUM_CLASSES,
};
use crate::{Error, Result, MIN_DISK_SIZE};

/// 块大小所属的级别
pub fn class_of(size: u64) -> usize {
    let ratio = size / MIN_BLOCK_SIZE;
    if ratio == 0 {
        0
    } else {
        (ratio.ilog2() as usize).min(NUM_CLASSES - 1)
    }
}

/// 容纳`n`字节载荷所需的块大小
fn block_size_for(n: u64) -> Option<u64> {
    n.checked_add(DataBlock::OVERHEAD)?
        .checked_next_multiple_of(MIN_BLOCK_SIZE)
}

/// [`Allocator::check`] 的统计结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// 块总数
    pub blocks: u64,
    pub free_blocks: u64,
    /// 空闲块的总字节数
    pub free_bytes: u64,
    /// 数据块的总字节数（含元数据）
    pub data_bytes: u64,
}

#[derive(Debug)]
pub struct Allocator {
    dev: Box<dyn Device>,
    super_block: SuperBlock,
    /// 块所在区域，从超级块之后到宿主文件末尾
    region: Range<u64>,
}

impl Allocator {
    /// 在设备上建立新的虚拟磁盘：超级块之后的全部空间是一个大空闲块
    pub fn format(mut dev: Box<dyn Device>, size: u64) -> Result<Self> {
        if size < MIN_DISK_SIZE {
            return Err(Error::TooSmall(size));
        }
        let blocks = (size - FIRST_BLOCK) / MIN_BLOCK_SIZE * MIN_BLOCK_SIZE;
        let region = FIRST_BLOCK..FIRST_BLOCK + blocks;
        dev.set_size(region.end)?;
        let super_block = SuperBlock::init(dev.as_mut())?;

        let mut allocator = Self {
            dev,
            super_block,
            region,
        };
        allocator.push_free(FIRST_BLOCK, blocks)?;
        log::info!(
            "formatted {} bytes, {} bytes of blocks",
            allocator.region.end,
            blocks
        );

        Ok(allocator)
    }

    pub fn open(mut dev: Box<dyn Device>) -> Result<Self> {
        let super_block = SuperBlock::load(dev.as_mut())?;
        let end = dev.size()?;
        if (end - FIRST_BLOCK) % MIN_BLOCK_SIZE != 0 {
            return Err(Error::corrupt(format!(
                "disk length {end} is not a whole number of blocks"
            )));
        }

        Ok(Self {
            dev,
            super_block,
            region: FIRST_BLOCK..end,
        })
    }

    #[inline]
    pub fn dev(&mut self) -> &mut dyn Device {
        self.dev.as_mut()
    }

    /// 宿主文件的总字节数
    #[inline]
    pub fn size(&self) -> u64 {
        self.region.end
    }

    /// 分配载荷总容量至少为`n`的数据块链，各块已按顺序链接，
    /// 已用字节数之和恰为`n`。
    ///
    /// 优先分配单个块；没有足够大的空闲块时，依次取最大的空闲块拼成链。
    /// 空间不足时已取得的块全部归还，不留下部分分配。
    pub fn allocate(&mut self, n: u64) -> Result<Vec<DataBlock>> {
        if let Some(block) = self.allocate_one(n)? {
            return Ok(vec![block]);
        }

        let mut chain = Vec::new();
        let mut remaining = n;
        while remaining > 0 {
            let Some(largest) = self.largest_free()? else {
                break;
            };
            let take = remaining.min(largest - DataBlock::OVERHEAD);
            let Some(block) = self.allocate_one(take)? else {
                break;
            };
            remaining -= take;
            chain.push(block);
        }

        if remaining > 0 {
            log::debug!("allocate({n}): out of space, returning {} blocks", chain.len());
            for block in chain {
                self.release(block)?;
            }
            return Err(Error::OutOfSpace { requested: n });
        }

        for i in 1..chain.len() {
            let next = chain[i].pos();
            chain[i - 1].set_next(self.dev.as_mut(), Some(next))?;
        }
        log::debug!("allocate({n}): fragmented into {} blocks", chain.len());

        Ok(chain)
    }

    /// 释放数据块，以及沿着它的后继指针链接的所有块
    pub fn free(&mut self, first: DataBlock) -> Result<()> {
        let mut block = first;
        loop {
            let next = block.next();
            self.release(block)?;
            match next {
                Some(pos) => block = DataBlock::load(self.dev.as_mut(), pos)?,
                None => return Ok(()),
            }
        }
    }

    /// 所有空闲块的总字节数
    pub fn free_space(&mut self) -> Result<u64> {
        let mut total = 0;
        for class in 0..NUM_CLASSES {
            let mut cursor = self.super_block.head(class);
            while let Some(pos) = cursor {
                let block = self.load_free(pos)?;
                total += block.size;
                cursor = block.next;
            }
        }
        Ok(total)
    }

    /// 逐块扫描整个磁盘，校验边界标记、相邻空闲块以及空闲链表的完整性
    pub fn check(&mut self) -> Result<Usage> {
        let mut usage = Usage::default();
        let mut pos = self.region.start;
        let mut prev_free = false;
        while pos < self.region.end {
            let block = Block::load(self.dev.as_mut(), pos)?;
            if block.end() > self.region.end {
                return Err(Error::corrupt(format!("block at {pos} overruns the disk")));
            }
            if block.is_free() && prev_free {
                return Err(Error::corrupt(format!("adjacent free blocks before {pos}")));
            }

            usage.blocks += 1;
            if block.is_free() {
                usage.free_blocks += 1;
                usage.free_bytes += block.size();
            } else {
                usage.data_bytes += block.size();
            }
            prev_free = block.is_free();
            pos = block.end();
        }

        let mut listed = 0;
        for class in 0..NUM_CLASSES {
            let mut prev = None;
            let mut cursor = self.super_block.head(class);
            while let Some(pos) = cursor {
                let block = self.load_free(pos)?;
                if block.prev != prev || class_of(block.size) != class {
                    return Err(Error::corrupt(format!(
                        "free block at {pos} is misplaced in class {class}"
                    )));
                }
                listed += 1;
                if listed > usage.free_blocks {
                    return Err(Error::corrupt("free lists contain a cycle"));
                }
                prev = cursor;
                cursor = block.next;
            }
        }
        if listed != usage.free_blocks {
            return Err(Error::corrupt(format!(
                "{} free blocks on disk but {listed} on free lists",
                usage.free_blocks
            )));
        }

        Ok(usage)
    }
}

impl Allocator {
    /// 单块首次适配，找不到足够大的空闲块时返回空
    fn allocate_one(&mut self, n: u64) -> Result<Option<DataBlock>> {
        let Some(needed) = block_size_for(n) else {
            return Ok(None);
        };

        for class in class_of(needed)..NUM_CLASSES {
            let mut cursor = self.super_block.head(class);
            while let Some(pos) = cursor {
                let free = self.load_free(pos)?;
                if free.size >= needed {
                    return self.carve(free, needed, n).map(Some);
                }
                cursor = free.next;
            }
        }

        Ok(None)
    }

    /// 从空闲块前部切出`needed`字节作为数据块，剩余部分够大就重新挂回链表
    fn carve(&mut self, free: FreeBlock, needed: u64, used: u64) -> Result<DataBlock> {
        self.unlink(&free)?;

        let remainder = free.size - needed;
        let size = if remainder >= MIN_BLOCK_SIZE {
            self.push_free(free.pos + needed, remainder)?;
            needed
        } else {
            free.size
        };

        let block = DataBlock::new(free.pos, size, used);
        block.store(self.dev.as_mut())?;
        log::trace!(
            "carved {size} bytes at {} from a free block of {}",
            free.pos,
            free.size
        );

        Ok(block)
    }

    /// 释放单个块，并与空闲的物理邻居合并
    fn release(&mut self, block: DataBlock) -> Result<()> {
        // 以磁盘上的标记为准，防止重复释放
        match Block::load(self.dev.as_mut(), block.pos())? {
            Block::Data(on_disk) if on_disk.size() == block.size() => {}
            _ => {
                return Err(Error::UseAfterFree(format!(
                    "block at {} was already freed",
                    block.pos()
                )))
            }
        }

        let mut pos = block.pos();
        let mut size = block.size();

        if let Some(Block::Free(prev)) = Block::load_prev(self.dev.as_mut(), pos, &self.region)? {
            self.unlink(&prev)?;
            pos = prev.pos;
            size += prev.size;
        }
        if let Some(Block::Free(next)) =
            Block::load_next(self.dev.as_mut(), block.end(), &self.region)?
        {
            self.unlink(&next)?;
            size += next.size;
        }

        log::trace!(
            "freed {} bytes at {}, coalesced into {size} bytes at {pos}",
            block.size(),
            block.pos()
        );
        self.push_free(pos, size)
    }

    /// 最大空闲块的大小：它一定在最高的非空级别中
    fn largest_free(&mut self) -> Result<Option<u64>> {
        for class in (0..NUM_CLASSES).rev() {
            let mut largest = None;
            let mut cursor = self.super_block.head(class);
            while let Some(pos) = cursor {
                let free = self.load_free(pos)?;
                largest = largest.max(Some(free.size));
                cursor = free.next;
            }
            if largest.is_some() {
                return Ok(largest);
            }
        }
        Ok(None)
    }

    /// 作为新表头插入所属级别
    fn push_free(&mut self, pos: u64, size: u64) -> Result<()> {
        let class = class_of(size);
        let head = self.super_block.head(class);
        FreeBlock {
            pos,
            size,
            prev: None,
            next: head,
        }
        .store(self.dev.as_mut())?;
        if let Some(head) = head {
            FreeBlock::link_prev(self.dev.as_mut(), head, Some(pos))?;
        }
        self.super_block
            .set_head(self.dev.as_mut(), class, Some(pos))
    }

    /// 从所属级别的链表中摘下
    fn unlink(&mut self, block: &FreeBlock) -> Result<()> {
        match block.prev {
            Some(prev) => FreeBlock::link_next(self.dev.as_mut(), prev, block.next)?,
            None => {
                self.super_block
                    .set_head(self.dev.as_mut(), class_of(block.size), block.next)?
            }
        }
        if let Some(next) = block.next {
            FreeBlock::link_prev(self.dev.as_mut(), next, block.prev)?;
        }
        Ok(())
    }

    fn load_free(&mut self, pos: u64) -> Result<FreeBlock> {
        match Block::load(self.dev.as_mut(), pos)? {
            Block::Free(block) => Ok(block),
            Block::Data(_) => Err(Error::corrupt(format!(
                "allocated block at {pos} is on a free list"
            ))),
        }
    }
}
