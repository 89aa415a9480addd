//! # 宿主设备接口层
//!
//! 虚拟磁盘建立在一个宿主文件之上，引擎只关心**字节偏移**；
//! [`Device`] 就是对按偏移读写的宿主存储的抽象。

use std::fmt::Debug;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;

/// 宿主设备特质
pub trait Device: Send + Debug {
    /// 读满`buf`，不足时报`UnexpectedEof`
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()>;

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()>;

    /// 设备的总字节数
    fn size(&mut self) -> io::Result<u64>;

    fn set_size(&mut self, size: u64) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_u64(&mut self, pos: u64) -> io::Result<u64> {
        let mut bytes = [0; 8];
        self.read_at(pos, &mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn write_u64(&mut self, pos: u64, value: u64) -> io::Result<()> {
        self.write_at(pos, &value.to_le_bytes())
    }
}

/// 宿主文件
#[derive(Debug)]
pub struct HostFile {
    inner: File,
}

impl HostFile {
    pub fn new(fd: File) -> Self {
        Self { inner: fd }
    }
}

impl Device for HostFile {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.read_exact(buf)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.write_all(buf)
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.inner.metadata()?.len())
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        self.inner.set_len(size)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.sync_all()
    }
}

/// 内存盘
#[derive(Debug, Default)]
pub struct MemDevice {
    data: Vec<u8>,
}

impl MemDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl MemDevice {
    /// 偏移换算成`Vec`下标，溢出时报错而不是越界
    fn span(pos: u64, len: usize) -> io::Result<Range<usize>> {
        usize::try_from(pos)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?))
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))
    }
}

impl Device for MemDevice {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        let span = Self::span(pos, buf.len())?;
        let src = self
            .data
            .get(span)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        let span = Self::span(pos, buf.len())?;
        if span.end > self.data.len() {
            self.data.resize(span.end, 0);
        }
        self.data[span].copy_from_slice(buf);
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        let size =
            usize::try_from(size).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        self.data.resize(size, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_short_read() {
        let mut dev = MemDevice::new();
        dev.write_u64(8, 0xdead_beef).unwrap();
        assert_eq!(16, dev.size().unwrap());
        assert_eq!(0xdead_beef, dev.read_u64(8).unwrap());

        let err = dev.read_u64(12).unwrap_err();
        assert_eq!(io::ErrorKind::UnexpectedEof, err.kind());
    }

    #[test]
    fn mem_device_offset_overflow() {
        let mut dev = MemDevice::new();
        dev.write_u64(0, 1).unwrap();

        let err = dev.read_u64(u64::MAX - 3).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidInput, err.kind());
        let err = dev.write_u64(u64::MAX - 3, 1).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidInput, err.kind());
        assert_eq!(8, dev.size().unwrap());
    }
}
