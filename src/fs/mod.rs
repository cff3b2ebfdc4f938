//! Access to the backing filesystem of the device being scanned.

pub mod local;
pub mod mem;

use std::collections::HashSet;

use tracing::debug;

use crate::common::Result;
use crate::core::fid::Fid;
use crate::core::layout::MdtAttrs;

pub use local::LocalFs;
pub use mem::MemFs;

pub type Ino = u64;

pub const XATTR_LOV: &str = "trusted.lov";
pub const XATTR_LMA: &str = "trusted.lma";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Other,
}

#[derive(Debug, Clone)]
pub struct DirEntryRef {
    pub ino: Ino,
    pub name: String,
    pub file_type: FileType,
}

impl DirEntryRef {
    pub fn is_pseudo(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InodeStat {
    pub ino: Ino,
    pub file_type: FileType,
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InodeUsage {
    pub total: u64,
    pub free: u64,
}

impl InodeUsage {
    pub fn in_use(&self) -> u64 {
        self.total.saturating_sub(self.free)
    }
}

pub trait FsAccess {
    fn root(&self) -> Ino;

    fn lookup(&self, dir: Ino, name: &str) -> Result<Option<Ino>>;

    /// Entries of `dir`, in directory order. May include `.` and `..`.
    fn read_dir(&self, dir: Ino) -> Result<Vec<DirEntryRef>>;

    fn stat(&self, ino: Ino) -> Result<InodeStat>;

    fn get_xattr(&self, ino: Ino, name: &str) -> Result<Option<Vec<u8>>>;

    fn read_file(&self, ino: Ino) -> Result<Vec<u8>>;

    /// Overwrite the leading bytes of a regular file.
    fn write_file(&self, ino: Ino, data: &[u8]) -> Result<()>;

    fn inode_usage(&self) -> Result<InodeUsage>;

    /// Visit every inode reachable from the root once, root included.
    fn for_each_inode(&self, visit: &mut dyn FnMut(&InodeStat) -> Result<()>) -> Result<()> {
        let root = self.root();
        let mut seen = HashSet::from([root]);
        let mut pending = vec![root];
        visit(&self.stat(root)?)?;
        while let Some(dir) = pending.pop() {
            for entry in self.read_dir(dir)? {
                if entry.is_pseudo() || !seen.insert(entry.ino) {
                    continue;
                }
                let stat = self.stat(entry.ino)?;
                visit(&stat)?;
                if stat.file_type == FileType::Directory {
                    pending.push(entry.ino);
                }
            }
        }
        debug!(inodes = seen.len(), "inode iteration complete");
        Ok(())
    }

    /// Cluster identity of an inode: the self FID from `trusted.lma` when
    /// present, otherwise the identity derived from inode and generation.
    fn resolve_fid(&self, stat: &InodeStat) -> Result<Fid> {
        match self.get_xattr(stat.ino, XATTR_LMA)? {
            Some(raw) => Ok(MdtAttrs::from_wire_prefix(&raw)?.self_fid),
            None => Ok(Fid::igif(stat.ino, stat.generation)),
        }
    }
}
