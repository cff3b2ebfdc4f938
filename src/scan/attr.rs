//! Attribute-scan driver: finds every regular file carrying a layout
//! attribute and hands it to a sink.

use tracing::debug;

use crate::common::Result;
use crate::core::fid::Fid;
use crate::fs::{FileType, FsAccess, InodeStat, XATTR_LOV};

/// Receives layout attributes as the driver finds them. An error stops the
/// driver and is returned from `scan_layouts` unchanged.
pub trait LayoutSink {
    fn found_layout(&mut self, stat: &InodeStat, fid: Fid, raw: &[u8]) -> Result<()>;
}

/// Visit every inode once and report each regular file with a layout
/// attribute. Returns the number of attributes reported.
pub fn scan_layouts<F, S>(fs: &F, sink: &mut S) -> Result<u64>
where
    F: FsAccess + ?Sized,
    S: LayoutSink + ?Sized,
{
    let mut found = 0u64;
    fs.for_each_inode(&mut |stat| {
        if stat.file_type != FileType::Regular {
            return Ok(());
        }
        let Some(raw) = fs.get_xattr(stat.ino, XATTR_LOV)? else {
            return Ok(());
        };
        let fid = fs.resolve_fid(stat)?;
        sink.found_layout(stat, fid, &raw)?;
        found += 1;
        Ok(())
    })?;
    debug!(found, "layout attribute scan complete");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::fs::MemFs;

    #[derive(Default)]
    struct Collect {
        seen: Vec<(u64, Fid, usize)>,
        fail_after: Option<usize>,
    }

    impl LayoutSink for Collect {
        fn found_layout(&mut self, stat: &InodeStat, fid: Fid, raw: &[u8]) -> Result<()> {
            if self.fail_after == Some(self.seen.len()) {
                return Err(Error::UnsupportedGroup(1));
            }
            self.seen.push((stat.ino, fid, raw.len()));
            Ok(())
        }
    }

    #[test]
    fn test_only_regular_files_with_layout() {
        let fs = MemFs::new();
        let dir = fs.mkdir(fs.root(), "dir");
        fs.set_xattr(dir, XATTR_LOV, b"ignored on directories");
        let plain = fs.add_file(dir, "plain", b"");
        let striped = fs.add_file(dir, "striped", b"");
        fs.set_xattr(striped, XATTR_LOV, &[0u8; 56]);

        let mut sink = Collect::default();
        assert_eq!(scan_layouts(&fs, &mut sink).unwrap(), 1);
        assert_eq!(sink.seen, vec![(striped, Fid::igif(striped, 0), 56)]);
        assert!(sink.seen.iter().all(|(ino, _, _)| *ino != plain));
    }

    #[test]
    fn test_sink_error_stops_the_driver() {
        let fs = MemFs::new();
        for name in ["a", "b", "c"] {
            let f = fs.add_file(fs.root(), name, b"");
            fs.set_xattr(f, XATTR_LOV, &[0u8; 32]);
        }
        let mut sink = Collect {
            fail_after: Some(1),
            ..Default::default()
        };
        assert!(matches!(scan_layouts(&fs, &mut sink), Err(Error::UnsupportedGroup(1))));
        assert_eq!(sink.seen.len(), 1);
    }
}
