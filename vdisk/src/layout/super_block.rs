use crate::device::Device;
use crate::layout::{ptr, raw, MAGIC, NUM_CLASSES, SUPERBLOCK_SIZE};
use crate::{Error, Result};

/// 超级块：
/// - 提供虚拟磁盘合法性校验；
/// - 记录每一级空闲链表的表头
///
/// 内存中的表头是磁盘上的镜像，修改时先写磁盘再改镜像。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    heads: [Option<u64>; NUM_CLASSES],
}

impl SuperBlock {
    /// 空闲链表头表的偏移，之前是魔数与8字节保留区，之后填零到块边界
    const HEADS: u64 = 16;

    pub fn init(dev: &mut dyn Device) -> Result<Self> {
        let mut bytes = [0; SUPERBLOCK_SIZE as usize];
        bytes[..MAGIC.len()].copy_from_slice(&MAGIC);
        dev.write_at(0, &bytes)?;

        Ok(Self {
            heads: [None; NUM_CLASSES],
        })
    }

    pub fn load(dev: &mut dyn Device) -> Result<Self> {
        if dev.size()? < SUPERBLOCK_SIZE {
            return Err(Error::NotAVirtualDisk);
        }

        let mut bytes = [0; SUPERBLOCK_SIZE as usize];
        dev.read_at(0, &mut bytes)?;
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(Error::NotAVirtualDisk);
        }

        let mut heads = [None; NUM_CLASSES];
        for (class, head) in heads.iter_mut().enumerate() {
            let at = Self::HEADS as usize + class * 8;
            let mut word = [0; 8];
            word.copy_from_slice(&bytes[at..at + 8]);
            *head = ptr(u64::from_le_bytes(word));
        }

        Ok(Self { heads })
    }

    #[inline]
    pub fn head(&self, class: usize) -> Option<u64> {
        self.heads[class]
    }

    pub fn set_head(&mut self, dev: &mut dyn Device, class: usize, head: Option<u64>) -> Result<()> {
        dev.write_u64(Self::HEADS + class as u64 * 8, raw(head))?;
        self.heads[class] = head;
        Ok(())
    }

    /// 非空链表的（级别, 表头）
    pub fn heads(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.heads
            .iter()
            .enumerate()
            .filter_map(|(class, head)| head.map(|head| (class, head)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDevice;

    #[test]
    fn heads_persist() {
        let mut dev = MemDevice::new();
        let mut sb = SuperBlock::init(&mut dev).unwrap();
        sb.set_head(&mut dev, 3, Some(4096)).unwrap();
        sb.set_head(&mut dev, NUM_CLASSES - 1, Some(8192)).unwrap();

        let loaded = SuperBlock::load(&mut dev).unwrap();
        assert_eq!(sb, loaded);
        assert_eq!(
            vec![(3, 4096), (NUM_CLASSES - 1, 8192)],
            loaded.heads().collect::<Vec<_>>()
        );
    }

    #[test]
    fn bad_magic() {
        let mut dev = MemDevice::new();
        dev.write_at(0, &[0xAB; SUPERBLOCK_SIZE as usize]).unwrap();
        assert!(matches!(
            SuperBlock::load(&mut dev),
            Err(Error::NotAVirtualDisk)
        ));

        let mut short = MemDevice::new();
        short.write_at(0, &MAGIC).unwrap();
        assert!(matches!(
            SuperBlock::load(&mut short),
            Err(Error::NotAVirtualDisk)
        ));
    }
}
