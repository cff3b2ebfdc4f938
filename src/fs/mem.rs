//! In-memory filesystem for tests and dry runs.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::common::{Error, Result};
use crate::fs::{DirEntryRef, FileType, FsAccess, Ino, InodeStat, InodeUsage};

/// Inode number of the root directory, as on ext-family filesystems.
pub const MEM_ROOT_INO: Ino = 2;

#[derive(Debug, Clone)]
struct MemNode {
    file_type: FileType,
    size: u64,
    blocks: u64,
    generation: u32,
    data: Vec<u8>,
    xattrs: BTreeMap<String, Vec<u8>>,
    entries: Vec<(String, Ino)>,
}

impl MemNode {
    fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            size: 0,
            blocks: 0,
            generation: 0,
            data: Vec::new(),
            xattrs: BTreeMap::new(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct MemInner {
    nodes: BTreeMap<Ino, MemNode>,
    next_ino: Ino,
    total_inodes: u64,
}

/// A tree held in memory. Builder methods panic on misuse (unknown inode,
/// non-directory parent); the `FsAccess` side returns errors.
#[derive(Debug)]
pub struct MemFs {
    inner: RefCell<MemInner>,
}

impl MemFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        let mut root = MemNode::new(FileType::Directory);
        root.entries.push((".".to_string(), MEM_ROOT_INO));
        root.entries.push(("..".to_string(), MEM_ROOT_INO));
        nodes.insert(MEM_ROOT_INO, root);
        Self {
            inner: RefCell::new(MemInner {
                nodes,
                next_ino: 12,
                total_inodes: 1024,
            }),
        }
    }

    fn insert(&self, parent: Ino, name: &str, mut node: MemNode) -> Ino {
        let mut inner = self.inner.borrow_mut();
        let ino = inner.next_ino;
        inner.next_ino += 1;
        if node.file_type == FileType::Directory {
            node.entries.push((".".to_string(), ino));
            node.entries.push(("..".to_string(), parent));
        }
        inner.nodes.insert(ino, node);
        Self::dir_mut(&mut inner, parent).entries.push((name.to_string(), ino));
        ino
    }

    fn dir_mut(inner: &mut MemInner, dir: Ino) -> &mut MemNode {
        let node = inner.nodes.get_mut(&dir).unwrap_or_else(|| panic!("no inode {}", dir));
        assert_eq!(node.file_type, FileType::Directory, "inode {} is not a directory", dir);
        node
    }

    fn with_node(&self, ino: Ino, f: impl FnOnce(&mut MemNode)) {
        let mut inner = self.inner.borrow_mut();
        let node = inner.nodes.get_mut(&ino).unwrap_or_else(|| panic!("no inode {}", ino));
        f(node);
    }

    pub fn mkdir(&self, parent: Ino, name: &str) -> Ino {
        self.insert(parent, name, MemNode::new(FileType::Directory))
    }

    /// Create a regular file holding `data`; size and blocks follow it.
    pub fn add_file(&self, parent: Ino, name: &str, data: &[u8]) -> Ino {
        let mut node = MemNode::new(FileType::Regular);
        node.data = data.to_vec();
        node.size = data.len() as u64;
        node.blocks = (data.len() as u64).div_ceil(4096) * 8;
        self.insert(parent, name, node)
    }

    pub fn add_symlink(&self, parent: Ino, name: &str) -> Ino {
        self.insert(parent, name, MemNode::new(FileType::Symlink))
    }

    /// Add another name for an existing inode.
    pub fn link(&self, parent: Ino, name: &str, ino: Ino) {
        let mut inner = self.inner.borrow_mut();
        assert!(inner.nodes.contains_key(&ino), "no inode {}", ino);
        Self::dir_mut(&mut inner, parent).entries.push((name.to_string(), ino));
    }

    /// Look a path up from the root, `/`-separated.
    pub fn path_ino(&self, path: &str) -> Option<Ino> {
        let mut ino = MEM_ROOT_INO;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            ino = self.lookup(ino, part).ok()??;
        }
        Some(ino)
    }

    pub fn set_generation(&self, ino: Ino, generation: u32) {
        self.with_node(ino, |n| n.generation = generation);
    }

    pub fn set_xattr(&self, ino: Ino, name: &str, value: &[u8]) {
        self.with_node(ino, |n| {
            n.xattrs.insert(name.to_string(), value.to_vec());
        });
    }

    pub fn set_inode_total(&self, total: u64) {
        self.inner.borrow_mut().total_inodes = total;
    }

    pub fn contents(&self, ino: Ino) -> Vec<u8> {
        self.inner
            .borrow()
            .nodes
            .get(&ino)
            .map(|n| n.data.clone())
            .unwrap_or_default()
    }

    fn not_found(ino: Ino) -> Error {
        Error::PathNotFound(format!("inode {}", ino))
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FsAccess for MemFs {
    fn root(&self) -> Ino {
        MEM_ROOT_INO
    }

    fn lookup(&self, dir: Ino, name: &str) -> Result<Option<Ino>> {
        let inner = self.inner.borrow();
        let node = inner.nodes.get(&dir).ok_or_else(|| Self::not_found(dir))?;
        if node.file_type != FileType::Directory {
            return Err(Error::NotADirectory(format!("inode {}", dir)));
        }
        Ok(node.entries.iter().find(|(n, _)| n == name).map(|(_, ino)| *ino))
    }

    fn read_dir(&self, dir: Ino) -> Result<Vec<DirEntryRef>> {
        let inner = self.inner.borrow();
        let node = inner.nodes.get(&dir).ok_or_else(|| Self::not_found(dir))?;
        if node.file_type != FileType::Directory {
            return Err(Error::NotADirectory(format!("inode {}", dir)));
        }
        node.entries
            .iter()
            .map(|(name, ino)| {
                let child = inner.nodes.get(ino).ok_or_else(|| Self::not_found(*ino))?;
                Ok(DirEntryRef {
                    ino: *ino,
                    name: name.clone(),
                    file_type: child.file_type,
                })
            })
            .collect()
    }

    fn stat(&self, ino: Ino) -> Result<InodeStat> {
        let inner = self.inner.borrow();
        let node = inner.nodes.get(&ino).ok_or_else(|| Self::not_found(ino))?;
        Ok(InodeStat {
            ino,
            file_type: node.file_type,
            size: node.size,
            blocks: node.blocks,
            generation: node.generation,
        })
    }

    fn get_xattr(&self, ino: Ino, name: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.borrow();
        let node = inner.nodes.get(&ino).ok_or_else(|| Self::not_found(ino))?;
        Ok(node.xattrs.get(name).cloned())
    }

    fn read_file(&self, ino: Ino) -> Result<Vec<u8>> {
        let inner = self.inner.borrow();
        let node = inner.nodes.get(&ino).ok_or_else(|| Self::not_found(ino))?;
        if node.file_type != FileType::Regular {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("inode {} is not a regular file", ino),
            )));
        }
        Ok(node.data.clone())
    }

    fn write_file(&self, ino: Ino, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let node = inner.nodes.get_mut(&ino).ok_or_else(|| Self::not_found(ino))?;
        if node.data.len() < data.len() {
            node.data.resize(data.len(), 0);
            node.size = data.len() as u64;
        }
        node.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn inode_usage(&self) -> Result<InodeUsage> {
        let inner = self.inner.borrow();
        let used = inner.nodes.len() as u64;
        Ok(InodeUsage {
            total: inner.total_inodes.max(used),
            free: inner.total_inodes.saturating_sub(used),
        })
    }
}
