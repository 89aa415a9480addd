//! 目录项记录：
//! 类型 | 时间戳 | 下一个兄弟 | 首个成员或数据空间 | 名字 ... | `\0`
//!
//! 记录存放在目录项自己的磁盘空间里，名字变长时空间随之伸缩。

use crate::layout::raw;
use crate::{Error, Result};

pub const KIND: u64 = 0;
pub const TIMESTAMP: u64 = 1;
pub const NEXT: u64 = 9;
/// 目录指向首个成员，文件指向数据空间
pub const LINK: u64 = 17;
pub const NAME: u64 = 25;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory = 1,
    File = 2,
}

impl TryFrom<u8> for EntryKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::Directory),
            2 => Ok(Self::File),
            tag => Err(Error::corrupt(format!("unknown entry kind {tag}"))),
        }
    }
}

/// 记录的总长度
#[inline]
pub fn len(name: &str) -> u64 {
    NAME + name.len() as u64 + 1
}

pub fn encode(
    kind: EntryKind,
    timestamp: u64,
    next: Option<u64>,
    link: Option<u64>,
    name: &str,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(len(name) as usize);
    bytes.push(kind as u8);
    bytes.extend_from_slice(&timestamp.to_le_bytes());
    bytes.extend_from_slice(&raw(next).to_le_bytes());
    bytes.extend_from_slice(&raw(link).to_le_bytes());
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
    bytes
}

/// 名字部分连同结尾的`\0`
pub fn encode_name(name: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
    bytes
}

/// 解出类型、时间戳与名字；两个指针字段按需读取
pub fn decode(bytes: &[u8]) -> Result<(EntryKind, u64, String)> {
    if (bytes.len() as u64) < NAME + 1 {
        return Err(Error::corrupt(format!(
            "entry record of {} bytes is truncated",
            bytes.len()
        )));
    }

    let kind = EntryKind::try_from(bytes[KIND as usize])?;
    let mut word = [0; 8];
    word.copy_from_slice(&bytes[TIMESTAMP as usize..NEXT as usize]);
    let timestamp = u64::from_le_bytes(word);

    let name = &bytes[NAME as usize..];
    let Some(end) = name.iter().position(|&b| b == 0) else {
        return Err(Error::corrupt("entry name is not nul-terminated"));
    };
    let name = String::from_utf8(name[..end].to_vec())
        .map_err(|_| Error::corrupt("entry name is not valid UTF-8"))?;

    Ok((kind, timestamp, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let bytes = encode(EntryKind::File, 7, Some(0x1234), None, "ab");
        assert_eq!(len("ab") as usize, bytes.len());
        assert_eq!(2, bytes[0]);
        assert_eq!(7u64.to_le_bytes(), bytes[1..9]);
        assert_eq!(0x1234u64.to_le_bytes(), bytes[9..17]);
        assert_eq!([0; 8], bytes[17..25]);
        assert_eq!(b"ab\0", &bytes[25..]);

        let (kind, timestamp, name) = decode(&bytes).unwrap();
        assert_eq!(EntryKind::File, kind);
        assert_eq!(7, timestamp);
        assert_eq!("ab", name);
    }

    #[test]
    fn unknown_kind() {
        let mut bytes = encode(EntryKind::Directory, 0, None, None, "d");
        bytes[0] = 9;
        assert!(matches!(decode(&bytes), Err(Error::Corrupt(_))));
        assert!(matches!(EntryKind::try_from(0), Err(Error::Corrupt(_))));
    }

    #[test]
    fn missing_terminator() {
        let mut bytes = encode(EntryKind::Directory, 0, None, None, "d");
        bytes.pop();
        assert!(matches!(decode(&bytes), Err(Error::Corrupt(_))));
    }
}
