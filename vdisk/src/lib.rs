/* vdisk 的整体架构，自上而下 */

// 虚拟磁盘层：宿主文件、超级块与根目录的所有者，对外的入口
mod disk;

// 目录项层：目录与文件的元信息记录，以及兄弟链表
mod entry;

// 磁盘空间层：由数据块链组成的逻辑字节流
mod space;

// 块分配器层：分级空闲链表，负责分配、释放、分裂与合并
mod allocator;

// 磁盘数据结构层：超级块与带边界标记的块
pub mod layout;

// 宿主设备接口层：按字节偏移读写宿主文件的接口
mod device;

mod error;
mod path;

pub use self::{
    allocator::Usage,
    device::{Device, HostFile, MemDevice},
    disk::{VirtualDisk, DEFAULT_DISK_SIZE, MIN_DISK_SIZE},
    entry::{Directory, Entry, EntryKind, File, Stat},
    error::{Error, Result},
    path::{is_absolute, validate_name, SEPARATOR},
};
