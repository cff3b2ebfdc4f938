//! A backing filesystem mounted on the host.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirEntryExt, MetadataExt};
use std::path::{Path, PathBuf};

use nix::sys::statvfs::statvfs;
use tracing::debug;

use crate::common::{Error, Result};
use crate::fs::{DirEntryRef, FileType, FsAccess, Ino, InodeStat, InodeUsage};

/// Inode numbers are only meaningful for paths this instance has already
/// seen through `root`, `lookup` or `read_dir`.
pub struct LocalFs {
    root: PathBuf,
    root_ino: Ino,
    paths: RefCell<HashMap<Ino, PathBuf>>,
}

impl LocalFs {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let meta = fs::metadata(&root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::PathNotFound(root.display().to_string()),
            _ => Error::Io(e),
        })?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory(root.display().to_string()));
        }
        let root_ino = meta.ino();
        let paths = RefCell::new(HashMap::from([(root_ino, root.clone())]));
        debug!(root = %root.display(), root_ino, "local filesystem opened");
        Ok(Self { root, root_ino, paths })
    }

    fn path_of(&self, ino: Ino) -> Result<PathBuf> {
        self.paths
            .borrow()
            .get(&ino)
            .cloned()
            .ok_or_else(|| Error::PathNotFound(format!("inode {} not reached from {}", ino, self.root.display())))
    }

    fn remember(&self, ino: Ino, path: PathBuf) {
        self.paths.borrow_mut().entry(ino).or_insert(path);
    }
}

fn file_type_of(ft: fs::FileType) -> FileType {
    if ft.is_file() {
        FileType::Regular
    } else if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else {
        FileType::Other
    }
}

#[cfg(target_os = "linux")]
fn c_path(path: &Path) -> Result<std::ffi::CString> {
    use std::os::unix::ffi::OsStrExt;

    std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::PathNotFound(format!("path with interior NUL: {}", path.display())))
}

#[cfg(target_os = "linux")]
fn lgetxattr(path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let c_path = c_path(path)?;
    let c_name = std::ffi::CString::new(name).map_err(|_| Error::Config(format!("bad xattr name {:?}", name)))?;
    let absent = |err: io::Error| match err.raw_os_error() {
        Some(libc::ENODATA) | Some(libc::ENOTSUP) => Ok(None),
        _ => Err(Error::Io(err)),
    };

    let size = unsafe { libc::lgetxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0) };
    if size < 0 {
        return absent(io::Error::last_os_error());
    }
    let mut buf = vec![0u8; size as usize];
    let got = unsafe {
        libc::lgetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    if got < 0 {
        return absent(io::Error::last_os_error());
    }
    buf.truncate(got as usize);
    Ok(Some(buf))
}

#[cfg(not(target_os = "linux"))]
fn lgetxattr(_path: &Path, _name: &str) -> Result<Option<Vec<u8>>> {
    Ok(None)
}

/// Errnos meaning the backing filesystem has no inode generation to report.
#[cfg(target_os = "linux")]
fn generation_unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOTTY) | Some(libc::EOPNOTSUPP) | Some(libc::EINVAL)
    )
}

#[cfg(target_os = "linux")]
fn inode_generation(path: &Path, file_type: FileType) -> Result<u32> {
    use std::os::unix::io::AsRawFd;

    const FS_IOC_GETVERSION: libc::c_ulong = 0x8008_7601;

    if !matches!(file_type, FileType::Regular | FileType::Directory) {
        return Ok(0);
    }
    let file = fs::File::open(path)?;
    let mut generation: libc::c_int = 0;
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_GETVERSION as _, &mut generation as *mut libc::c_int) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if generation_unsupported(&err) {
            debug!(path = %path.display(), error = %err, "no inode generation");
            return Ok(0);
        }
        return Err(Error::Io(err));
    }
    Ok(generation as u32)
}

#[cfg(not(target_os = "linux"))]
fn inode_generation(_path: &Path, _file_type: FileType) -> Result<u32> {
    Ok(0)
}

impl FsAccess for LocalFs {
    fn root(&self) -> Ino {
        self.root_ino
    }

    fn lookup(&self, dir: Ino, name: &str) -> Result<Option<Ino>> {
        let dir_path = self.path_of(dir)?;
        let path = dir_path.join(name);
        match fs::symlink_metadata(&path) {
            Ok(meta) => {
                self.remember(meta.ino(), path);
                Ok(Some(meta.ino()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::ENOTDIR) => {
                Err(Error::NotADirectory(dir_path.display().to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn read_dir(&self, dir: Ino) -> Result<Vec<DirEntryRef>> {
        let dir_path = self.path_of(dir)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let ino = entry.ino();
            let file_type = file_type_of(entry.file_type()?);
            self.remember(ino, entry.path());
            entries.push(DirEntryRef { ino, name, file_type });
        }
        Ok(entries)
    }

    fn stat(&self, ino: Ino) -> Result<InodeStat> {
        let path = self.path_of(ino)?;
        let meta = fs::symlink_metadata(&path)?;
        let file_type = file_type_of(meta.file_type());
        Ok(InodeStat {
            ino,
            file_type,
            size: meta.size(),
            blocks: meta.blocks(),
            generation: inode_generation(&path, file_type)?,
        })
    }

    fn get_xattr(&self, ino: Ino, name: &str) -> Result<Option<Vec<u8>>> {
        lgetxattr(&self.path_of(ino)?, name)
    }

    fn read_file(&self, ino: Ino) -> Result<Vec<u8>> {
        Ok(fs::read(self.path_of(ino)?)?)
    }

    fn write_file(&self, ino: Ino, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(self.path_of(ino)?)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    fn inode_usage(&self) -> Result<InodeUsage> {
        let stats = statvfs(&self.root).map_err(|e| Error::Io(io::Error::from(e)))?;
        Ok(InodeUsage {
            total: stats.files() as u64,
            free: stats.files_free() as u64,
        })
    }
}
