//! Metadata-role scanner: namespace linkage, stripe placement and the
//! per-target high-water marks that go into the MDS header.

use std::collections::HashSet;
use std::mem::size_of;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::common::{Error, Result};
use crate::core::codec::{WireCodec, u64_key};
use crate::core::fid::{Fid, ObjectId};
use crate::core::layout::{LOV_USER_MAGIC_V1, LOV_USER_MAGIC_V3, LayoutAttr};
use crate::core::records::{
    DirEntry, EntryType, HDR_FLAG_READONLY, LOV_MAX_OSTS, LayoutObjEnt, MdsHeader, SizeInfo, Uuid,
};
use crate::fs::{FileType, FsAccess, Ino, InodeStat};
use crate::scan::RunSummary;
use crate::scan::attr::LayoutSink;
use crate::store::{MDS_DIRINFO, MDS_SIZEINFO, PutOutcome, RunContext, Table, TableOptions, ost_table_name};

/// Per-target allocation hints kept by the metadata target, one LE u64
/// per target index.
pub const LOV_OBJID: &str = "lov_objid";

#[derive(Debug, Clone, Copy, Default)]
struct TargetSlot {
    max_id: u64,
    /// `max_id` came from `lov_objid` and bounds the ids accepted.
    have_max_id: bool,
}

/// Reject layouts this pass does not understand.
pub fn check_layout(lmm: &LayoutAttr) -> Result<()> {
    match lmm.header.magic {
        LOV_USER_MAGIC_V1 | LOV_USER_MAGIC_V3 => {}
        magic => {
            return Err(Error::UnsupportedLayout(format!(
                "only v1/v3 layouts are handled, not {:#010x}",
                magic
            )));
        }
    }
    if lmm.group() != 0 {
        return Err(Error::UnsupportedGroup(lmm.group()));
    }
    Ok(())
}

struct PendingDir {
    ino: Ino,
    fid: Fid,
    parent: Ino,
    depth: usize,
}

pub struct MdsScanner<'a> {
    ctx: &'a mut RunContext,
    base: PathBuf,
    expected_entries: u64,
    slots: Vec<TargetSlot>,
    target_count: u32,
    /// The target count came from `lov_objid` and may not grow.
    have_target_count: bool,
    dir_entries: u64,
    layouts: u64,
    stripes: u64,
    skipped_stripes: u64,
}

impl<'a> MdsScanner<'a> {
    pub fn new(ctx: &'a mut RunContext, base: impl Into<PathBuf>, expected_entries: u64) -> Self {
        Self {
            ctx,
            base: base.into(),
            expected_entries,
            slots: vec![TargetSlot::default(); LOV_MAX_OSTS],
            target_count: 0,
            have_target_count: false,
            dir_entries: 0,
            layouts: 0,
            stripes: 0,
            skipped_stripes: 0,
        }
    }

    /// Create the namespace and size tables, truncating any previous run.
    pub fn open_tables(&mut self) -> Result<()> {
        let dirinfo = TableOptions::sized(size_of::<Fid>() + size_of::<DirEntry>(), self.expected_entries);
        self.ctx.open(&self.base, MDS_DIRINFO, dirinfo)?;
        let sizeinfo = TableOptions::sized(size_of::<Fid>() + size_of::<SizeInfo>(), self.expected_entries);
        self.ctx.open(&self.base, MDS_SIZEINFO, sizeinfo)?;
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.ctx
            .get(&self.base, name)
            .ok_or_else(|| Error::Storage(format!("table {} is not open", name)))
    }

    fn target_table(&mut self, ost_idx: u32) -> Result<&Table> {
        let name = ost_table_name(ost_idx);
        if !self.ctx.is_open(&self.base, &name) {
            let opts = TableOptions::sized(size_of::<u64>() + size_of::<LayoutObjEnt>(), self.expected_entries);
            self.ctx.open(&self.base, &name, opts)?;
            debug!(ost_idx, table = %name, "target table created");
        }
        self.table(&name)
    }

    /// Seed per-target bounds from `lov_objid` at the namespace root.
    /// Returns false when the file does not exist.
    pub fn load_prior_bounds<F: FsAccess + ?Sized>(&mut self, fs: &F) -> Result<bool> {
        let Some(ino) = fs.lookup(fs.root(), LOV_OBJID)? else {
            info!("MDS: no {} file, object ids are unbounded", LOV_OBJID);
            return Ok(false);
        };
        let raw = fs.read_file(ino)?;
        let ids: Vec<u64> = raw
            .chunks_exact(size_of::<u64>())
            .take(LOV_MAX_OSTS)
            .map(|chunk| {
                let mut le = [0u8; 8];
                le.copy_from_slice(chunk);
                u64::from_le_bytes(le)
            })
            .collect();
        for (idx, &max_id) in ids.iter().enumerate() {
            debug!(ost_idx = idx, max_id, "MDS: prior bound");
            self.slots[idx] = TargetSlot {
                max_id,
                have_max_id: true,
            };
        }
        if !ids.is_empty() {
            self.target_count = ids.len() as u32;
            self.have_target_count = true;
        }
        info!(bytes = raw.len(), targets = ids.len(), "MDS: read {}", LOV_OBJID);
        Ok(true)
    }

    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    /// Highest object id seen (or allowed) for a target.
    pub fn max_id(&self, ost_idx: u32) -> Option<u64> {
        (ost_idx < self.target_count).then(|| self.slots[ost_idx as usize].max_id)
    }

    pub fn has_prior_bound(&self, ost_idx: u32) -> bool {
        self.slots
            .get(ost_idx as usize)
            .map(|slot| slot.have_max_id)
            .unwrap_or(false)
    }

    /// Record one DirEntry per namespace entry below the root, with its
    /// parent's identity. Only directories and regular files are recorded;
    /// only directories are descended into.
    pub fn walk_namespace<F: FsAccess + ?Sized>(&mut self, fs: &F, max_depth: usize) -> Result<u64> {
        let root = fs.root();
        let root_fid = fs.resolve_fid(&fs.stat(root)?)?;
        let table = self.table(MDS_DIRINFO)?;

        let mut visited = HashSet::from([root]);
        let mut pending = vec![PendingDir {
            ino: root,
            fid: root_fid,
            parent: root,
            depth: 0,
        }];
        let mut recorded = 0u64;

        while let Some(dir) = pending.pop() {
            for entry in fs.read_dir(dir.ino)? {
                if entry.is_pseudo() || entry.ino == dir.ino || entry.ino == dir.parent {
                    continue;
                }
                let filetype = match entry.file_type {
                    FileType::Directory => EntryType::Directory,
                    FileType::Regular => EntryType::Regular,
                    _ => continue,
                };
                let stat = fs.stat(entry.ino)?;
                let fid = fs.resolve_fid(&stat)?;
                let rec = DirEntry::new(fid, dir.fid, filetype);
                match table.put(&fid.key(), &rec.encode())? {
                    PutOutcome::Inserted => recorded += 1,
                    PutOutcome::Kept => debug!(name = %entry.name, %fid, "MDS: entry already recorded"),
                }

                if filetype != EntryType::Directory {
                    continue;
                }
                if !visited.insert(entry.ino) {
                    warn!(name = %entry.name, ino = entry.ino, "MDS: directory reached twice, not descending");
                    continue;
                }
                if dir.depth + 1 >= max_depth {
                    return Err(Error::Aborted(format!(
                        "namespace deeper than {} levels at {} (inode {})",
                        max_depth, entry.name, entry.ino
                    )));
                }
                pending.push(PendingDir {
                    ino: entry.ino,
                    fid,
                    parent: dir.ino,
                    depth: dir.depth + 1,
                });
            }
        }

        self.dir_entries += recorded;
        info!(entries = recorded, "MDS: namespace walk complete");
        Ok(recorded)
    }

    /// Header describing this run.
    ///
    /// `ost_uuid` slots stay empty: the namespace scan never learns target
    /// uuids, and `reconcile` treats an empty slot as matching any target.
    pub fn header(&self, max_files: u64, mds_uuid: Uuid, read_only: bool) -> Box<MdsHeader> {
        let mut hdr = MdsHeader::new();
        hdr.flags = if read_only { HDR_FLAG_READONLY } else { 0 };
        hdr.max_files = max_files;
        hdr.num_osts = self.target_count;
        hdr.mds_uuid = mds_uuid;
        let count = hdr.target_count();
        for (dst, slot) in hdr.max_ost_id[..count].iter_mut().zip(&self.slots) {
            *dst = slot.max_id;
        }
        hdr
    }

    pub fn fill_summary(&self, summary: &mut RunSummary) {
        summary.dir_entries = self.dir_entries;
        summary.layouts = self.layouts;
        summary.stripes = self.stripes;
        summary.skipped_stripes = self.skipped_stripes;
        summary.targets = self.target_count;
    }
}

impl LayoutSink for MdsScanner<'_> {
    fn found_layout(&mut self, stat: &InodeStat, fid: Fid, raw: &[u8]) -> Result<()> {
        let lmm = LayoutAttr::from_wire(raw)?;
        check_layout(&lmm)?;

        let info = SizeInfo {
            fid,
            group: lmm.group(),
            size: 0,
            calc_size: 0,
            stripe_size: lmm.header.stripe_size,
            stripe_pattern: lmm.header.pattern,
            stripe_count: lmm.header.stripe_count,
            stripe_start: lmm.stripe_start() as u16,
            unused: 0,
        };
        self.table(MDS_SIZEINFO)?.put(&fid.key(), &info.encode())?;

        for (offset, stripe) in lmm.objects.iter().enumerate() {
            let ost_idx = stripe.ost_idx;
            if ost_idx as usize >= LOV_MAX_OSTS {
                warn!(ost_idx, ino = stat.ino, stripe = offset, "MDS: invalid OST index");
                self.skipped_stripes += 1;
                continue;
            }
            if ost_idx + 1 > self.target_count {
                if self.have_target_count {
                    warn!(ost_idx, ino = stat.ino, stripe = offset, "MDS: bad OST index");
                    self.skipped_stripes += 1;
                    continue;
                }
                self.target_count = ost_idx + 1;
            }

            self.target_table(ost_idx)?;

            let slot = &mut self.slots[ost_idx as usize];
            if stripe.object_id > slot.max_id {
                if slot.have_max_id {
                    debug!(ost_idx, objid = stripe.object_id, max = slot.max_id, "MDS: skip object above bound");
                    self.skipped_stripes += 1;
                    continue;
                }
                slot.max_id = stripe.object_id;
            }

            let ent = LayoutObjEnt {
                fid,
                generation: stat.generation,
                flag: 0,
                oi: ObjectId::new(stripe.object_id, stripe.object_seq),
                ost_idx,
                ost_offset: offset as u32,
            };
            let outcome = self.target_table(ost_idx)?.put(&u64_key(stripe.object_id), &ent.encode())?;
            if outcome == PutOutcome::Kept {
                debug!(ost_idx, objid = stripe.object_id, %fid, "MDS: object already referenced");
            }
            self.stripes += 1;
        }

        self.layouts += 1;
        debug!(%fid, stripes = lmm.objects.len(), "MDS: layout recorded");
        Ok(())
    }
}
