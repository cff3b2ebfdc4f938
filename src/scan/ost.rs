//! Storage-role scanner: every object under the object directory, plus the
//! target's own `LAST_ID` counter.

use tracing::{debug, info};

use crate::common::{Error, Result};
use crate::core::codec::{WireCodec, u64_key};
use crate::core::fid::ObjectId;
use crate::core::records::StorageObjEnt;
use crate::fs::{FileType, FsAccess, Ino};
use crate::store::{PutOutcome, Table};

pub const OBJECT_DIR: &str = "O";
/// Object subdirectory names, in the order they are tried.
pub const OBJECT_SUBDIRS: [&str; 2] = ["R", "0"];
pub const LAST_ID: &str = "LAST_ID";

/// What one walk of the object directory found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectScan {
    pub objects: u64,
    pub max_id: u64,
}

fn expect_dir<F: FsAccess + ?Sized>(fs: &F, ino: Ino, what: &str) -> Result<Ino> {
    if fs.stat(ino)?.file_type != FileType::Directory {
        return Err(Error::NotADirectory(what.to_string()));
    }
    Ok(ino)
}

/// Locate the directory holding the object buckets: `/O/R`, or `/O/0` when
/// the first is absent.
pub fn object_dir<F: FsAccess + ?Sized>(fs: &F) -> Result<Ino> {
    let parent = fs
        .lookup(fs.root(), OBJECT_DIR)?
        .ok_or_else(|| Error::PathNotFound(format!("/{}", OBJECT_DIR)))?;
    expect_dir(fs, parent, &format!("/{}", OBJECT_DIR))?;

    for name in OBJECT_SUBDIRS {
        if let Some(ino) = fs.lookup(parent, name)? {
            let path = format!("/{}/{}", OBJECT_DIR, name);
            debug!(path = %path, ino, "OST: object directory");
            return expect_dir(fs, ino, &path);
        }
    }
    Err(Error::PathNotFound(format!(
        "/{}/{{{}}}",
        OBJECT_DIR,
        OBJECT_SUBDIRS.join(",")
    )))
}

fn parse_object_name(name: &str, bucket: &str) -> Result<u64> {
    name.parse::<u64>().map_err(|_| Error::BadObjectName {
        name: name.to_string(),
        dir: bucket.to_string(),
    })
}

/// Record one StorageObjEnt per object in every `d*` bucket of `objdir`.
pub fn scan_objects<F: FsAccess + ?Sized>(fs: &F, objdir: Ino, table: &Table) -> Result<ObjectScan> {
    let mut scan = ObjectScan::default();
    for bucket in fs.read_dir(objdir)? {
        if bucket.file_type != FileType::Directory || !bucket.name.starts_with('d') {
            continue;
        }
        let mut in_bucket = 0u64;
        for entry in fs.read_dir(bucket.ino)? {
            if entry.is_pseudo() || entry.file_type == FileType::Directory {
                continue;
            }
            let objid = parse_object_name(&entry.name, &bucket.name)?;
            let stat = fs.stat(entry.ino)?;
            let ent = StorageObjEnt {
                oi: ObjectId::new(objid, 0),
                size: stat.size,
                flag: 0,
                bytes: stat.blocks * 512,
            };
            if table.put(&u64_key(objid), &ent.encode())? == PutOutcome::Kept {
                debug!(objid, bucket = %bucket.name, "OST: object listed twice");
            }
            scan.max_id = scan.max_id.max(objid);
            scan.objects += 1;
            in_bucket += 1;
        }
        debug!(bucket = %bucket.name, objects = in_bucket, "OST: bucket scanned");
    }
    info!(objects = scan.objects, max_id = scan.max_id, "OST: object scan complete");
    Ok(scan)
}

fn last_id_ino<F: FsAccess + ?Sized>(fs: &F, objdir: Ino) -> Result<Ino> {
    fs.lookup(objdir, LAST_ID)?
        .ok_or_else(|| Error::LastId(format!("{} not found in object directory", LAST_ID)))
}

/// The target's own next-allocation counter.
pub fn read_last_id<F: FsAccess + ?Sized>(fs: &F, objdir: Ino) -> Result<u64> {
    let raw = fs
        .read_file(last_id_ino(fs, objdir)?)
        .map_err(|e| Error::LastId(format!("read failed: {}", e)))?;
    let bytes: [u8; 8] = raw
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::LastId(format!("short read: {} of 8 bytes", raw.len())))?;
    Ok(u64::from_le_bytes(bytes))
}

pub fn write_last_id<F: FsAccess + ?Sized>(fs: &F, objdir: Ino, last_id: u64) -> Result<()> {
    fs.write_file(last_id_ino(fs, objdir)?, &last_id.to_le_bytes())
        .map_err(|e| Error::LastId(format!("failed to update {}: {}", LAST_ID, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::store::{StoreEnv, TableOptions};

    #[test]
    fn test_object_dir_prefers_r() {
        let fs = MemFs::new();
        let o = fs.mkdir(fs.root(), "O");
        let zero = fs.mkdir(o, "0");
        assert_eq!(object_dir(&fs).unwrap(), zero);
        let r = fs.mkdir(o, "R");
        assert_eq!(object_dir(&fs).unwrap(), r);
    }

    #[test]
    fn test_object_dir_missing() {
        let fs = MemFs::new();
        assert!(matches!(object_dir(&fs), Err(Error::PathNotFound(_))));
        fs.mkdir(fs.root(), "O");
        assert!(matches!(object_dir(&fs), Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_non_numeric_object_is_fatal() {
        let fs = MemFs::new();
        let o = fs.mkdir(fs.root(), "O");
        let zero = fs.mkdir(o, "0");
        let d0 = fs.mkdir(zero, "d0");
        fs.add_file(d0, "12", b"");
        fs.add_file(d0, "junk", b"");

        let dir = tempfile::tempdir().unwrap();
        let table = StoreEnv::with_cache_size(16 << 20)
            .open(&dir.path().join("ostdb"), "ost_db", TableOptions::default())
            .unwrap();
        let err = scan_objects(&fs, zero, &table).unwrap_err();
        assert!(matches!(err, Error::BadObjectName { ref name, .. } if name == "junk"));
    }

    #[test]
    fn test_non_bucket_entries_are_ignored() {
        let fs = MemFs::new();
        let o = fs.mkdir(fs.root(), "O");
        let zero = fs.mkdir(o, "0");
        fs.add_file(zero, LAST_ID, &9u64.to_le_bytes());
        let other = fs.mkdir(zero, "xattrs");
        fs.add_file(other, "not-an-object", b"");
        let d1 = fs.mkdir(zero, "d1");
        fs.add_file(d1, "9", &[0u8; 5000]);
        fs.mkdir(d1, "nested");

        let dir = tempfile::tempdir().unwrap();
        let table = StoreEnv::with_cache_size(16 << 20)
            .open(&dir.path().join("ostdb"), "ost_db", TableOptions::default())
            .unwrap();
        let scan = scan_objects(&fs, zero, &table).unwrap();
        assert_eq!(scan, ObjectScan { objects: 1, max_id: 9 });
        let ent = StorageObjEnt::decode(&table.get(&u64_key(9)).unwrap().unwrap()).unwrap();
        assert_eq!(ent.size, 5000);
        assert_eq!(ent.bytes, 16 * 512);
    }

    #[test]
    fn test_non_regular_objects_are_recorded() {
        let fs = MemFs::new();
        let o = fs.mkdir(fs.root(), "O");
        let zero = fs.mkdir(o, "0");
        let d0 = fs.mkdir(zero, "d0");
        fs.add_file(d0, "12", b"abc");
        fs.add_symlink(d0, "300");

        let dir = tempfile::tempdir().unwrap();
        let table = StoreEnv::with_cache_size(16 << 20)
            .open(&dir.path().join("ostdb"), "ost_db", TableOptions::default())
            .unwrap();
        let scan = scan_objects(&fs, zero, &table).unwrap();
        assert_eq!(scan, ObjectScan { objects: 2, max_id: 300 });
        let ent = StorageObjEnt::decode(&table.get(&u64_key(300)).unwrap().unwrap()).unwrap();
        assert_eq!(ent.oi.id, 300);
    }

    #[test]
    fn test_non_numeric_symlink_is_fatal() {
        let fs = MemFs::new();
        let o = fs.mkdir(fs.root(), "O");
        let zero = fs.mkdir(o, "0");
        let d0 = fs.mkdir(zero, "d0");
        fs.add_symlink(d0, "junk");

        let dir = tempfile::tempdir().unwrap();
        let table = StoreEnv::with_cache_size(16 << 20)
            .open(&dir.path().join("ostdb"), "ost_db", TableOptions::default())
            .unwrap();
        let err = scan_objects(&fs, zero, &table).unwrap_err();
        assert!(matches!(err, Error::BadObjectName { ref name, .. } if name == "junk"));
    }

    #[test]
    fn test_last_id_round_trip() {
        let fs = MemFs::new();
        let o = fs.mkdir(fs.root(), "O");
        let zero = fs.mkdir(o, "0");
        fs.add_file(zero, LAST_ID, &300u64.to_le_bytes());
        assert_eq!(read_last_id(&fs, zero).unwrap(), 300);
        write_last_id(&fs, zero, 501).unwrap();
        assert_eq!(read_last_id(&fs, zero).unwrap(), 501);
    }

    #[test]
    fn test_short_last_id_is_fatal() {
        let fs = MemFs::new();
        let o = fs.mkdir(fs.root(), "O");
        let zero = fs.mkdir(o, "0");
        assert!(matches!(read_last_id(&fs, zero), Err(Error::LastId(_))));
        fs.add_file(zero, LAST_ID, &[1, 2, 3]);
        assert!(matches!(read_last_id(&fs, zero), Err(Error::LastId(_))));
    }
}
