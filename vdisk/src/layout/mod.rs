//! # 磁盘数据结构层
//!
//! 虚拟磁盘的布局：
//! 超级块 | 块 | 块 | ... | 块
//!
//! 块紧密相接，每个块的首尾8字节都存放其总大小（边界标记），
//! 大小的最高位表示块是否已分配。凭借边界标记，
//! 任何块都能在常数时间内找到物理上的前后邻居。
//!
//! 位置`0`是超级块，不可能是块，所以磁盘上的空指针用`0`表示。

mod block;
mod super_block;

pub use self::{
    block::{Block, DataBlock, FreeBlock},
    super_block::SuperBlock,
};

/// 标识合法虚拟磁盘的魔数
pub const MAGIC: [u8; 8] = *b"VDISK\0\x01\0";

/// 边界标记的大小
pub const TAG_SIZE: u64 = 8;

/// 块大小的粒度，也是最小的块
pub const MIN_BLOCK_SIZE: u64 = 64;

/// 分级空闲链表的级数
pub const NUM_CLASSES: usize = 32;

/// 魔数 | 保留 | 空闲链表头表 | 填充
///
/// 补齐到 [`MIN_BLOCK_SIZE`] 的整数倍，块区域才能用满按块对齐的磁盘容量
pub const SUPERBLOCK_SIZE: u64 = (16 + NUM_CLASSES as u64 * 8).next_multiple_of(MIN_BLOCK_SIZE);

/// 第一个块紧随超级块
pub const FIRST_BLOCK: u64 = SUPERBLOCK_SIZE;

#[inline]
pub(crate) fn ptr(raw: u64) -> Option<u64> {
    (raw != 0).then_some(raw)
}

#[inline]
pub(crate) fn raw(ptr: Option<u64>) -> u64 {
    ptr.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_block_is_aligned() {
        assert_eq!(320, SUPERBLOCK_SIZE);
        assert_eq!(0, FIRST_BLOCK % MIN_BLOCK_SIZE);
        assert!(SUPERBLOCK_SIZE >= 16 + NUM_CLASSES as u64 * 8);
    }
}
