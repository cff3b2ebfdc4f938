//! One gathering pass per role, from the role record to the header write.
//!
//! Both passes own a `RunContext` for their tables and close every table on
//! the way out, whether the pass completes or aborts.

use std::mem::size_of;
use std::path::Path;

use tracing::{debug, error, info};

use crate::common::{Error, GatherConfig, PassOptions, Result, Role};
use crate::core::records::{HDR_FLAG_READONLY, LOV_MAX_OSTS, OstHeader, StorageObjEnt, uuid_str};
use crate::core::server_data::{LAST_RCVD, ServerData};
use crate::fs::{FsAccess, LocalFs};
use crate::scan::attr::scan_layouts;
use crate::scan::mds::MdsScanner;
use crate::scan::ost::{object_dir, read_last_id, scan_objects, write_last_id};
use crate::scan::reconcile::{read_mds_header, reconcile, write_mds_header, write_ost_header};
use crate::scan::{Run, RunState, RunSummary};
use crate::store::{
    MDS_DIRINFO, MDS_HDR, MDS_SIZEINFO, OST_HDR, OST_OSTDB, RunContext, StoreEnv, TableOptions, ost_table_name,
};

/// Open the device named by `cfg` and run the pass for its role.
pub fn run(cfg: &GatherConfig) -> Result<RunSummary> {
    cfg.validate()?;
    let fs = LocalFs::open(&cfg.device_root)?;
    let opts = cfg.pass_options();
    info!(role = %cfg.role, device = %cfg.device_root.display(), read_only = opts.read_only, "starting gathering pass");
    match cfg.role {
        Role::Mds => run_mds_pass(&fs, &opts, StoreEnv::new()),
        Role::Ost => run_ost_pass(&fs, &opts, StoreEnv::new()),
    }
}

/// Read `last_rcvd` at the device root and make sure it does not belong to
/// the other role.
pub fn read_role_record<F: FsAccess + ?Sized>(fs: &F, role: Role) -> Result<ServerData> {
    let ino = fs
        .lookup(fs.root(), LAST_RCVD)?
        .ok_or_else(|| Error::RoleRecord(format!("{} not found at the device root", LAST_RCVD)))?;
    let lsd = ServerData::from_file_bytes(&fs.read_file(ino)?)?;
    debug!(
        uuid = %uuid_str(&lsd.uuid),
        index = ?lsd.index(),
        compat = lsd.feature_compat,
        rocompat = lsd.feature_rocompat,
        incompat = lsd.feature_incompat,
        "{}: role record",
        role
    );
    lsd.check_role(role)?;
    Ok(lsd)
}

/// Drive `body` through the run state machine. On failure the pass is
/// marked aborted and every table is closed before the error is returned.
fn drive<T>(
    role: Role,
    ctx: &mut RunContext,
    body: impl FnOnce(&mut Run, &mut RunContext) -> Result<T>,
) -> Result<(T, RunState)> {
    let mut run = Run::new(role);
    let outcome = body(&mut run, ctx).and_then(|value| {
        ctx.close_all()?;
        run.advance(RunState::Done)?;
        Ok(value)
    });
    match outcome {
        Ok(value) => Ok((value, run.state())),
        Err(e) => {
            run.abort(&e);
            if let Err(cleanup) = ctx.close_all() {
                error!(role = %role, error = %cleanup, "cleanup after abort failed");
            }
            Err(e)
        }
    }
}

fn purge_mds_tables(env: &StoreEnv, base: &Path) -> Result<()> {
    let mut purged = 0usize;
    for name in [MDS_HDR, MDS_DIRINFO, MDS_SIZEINFO] {
        purged += env.purge(base, name)? as usize;
    }
    for idx in 0..LOV_MAX_OSTS as u32 {
        purged += env.purge(base, &ost_table_name(idx))? as usize;
    }
    debug!(base = %base.display(), purged, "MDS: stale tables removed");
    Ok(())
}

/// Gather the metadata role's tables and write `mdshdr`.
pub fn run_mds_pass<F: FsAccess + ?Sized>(fs: &F, opts: &PassOptions, env: StoreEnv) -> Result<RunSummary> {
    let mut summary = RunSummary::new(Role::Mds, opts.read_only);
    let mut ctx = RunContext::new(env);
    let base = opts.mds_db.as_path();

    let (_, state) = drive(Role::Mds, &mut ctx, |run, ctx| {
        let lsd = read_role_record(fs, Role::Mds)?;
        let usage = fs.inode_usage()?;
        purge_mds_tables(ctx.env(), base)?;

        run.advance(RunState::Scanning)?;
        let mut scanner = MdsScanner::new(ctx, base, usage.in_use());
        scanner.open_tables()?;
        if opts.read_only {
            scanner.load_prior_bounds(fs)?;
        }
        scan_layouts(fs, &mut scanner)?;
        scanner.walk_namespace(fs, opts.max_depth)?;
        if scanner.target_count() == 0 {
            scanner.load_prior_bounds(fs)?;
        }

        run.advance(RunState::Reconciling)?;
        let hdr = scanner.header(usage.in_use(), lsd.uuid, opts.read_only);
        debug!(max_files = hdr.max_files, num_osts = hdr.num_osts, "MDS: header");
        scanner.fill_summary(&mut summary);
        let table = ctx.open(base, MDS_HDR, TableOptions::default())?;
        write_mds_header(table, &hdr)?;
        info!(path = %table.path().display(), "mds info db file written");
        Ok(())
    })?;

    summary.state = state;
    info!(
        entries = summary.dir_entries,
        layouts = summary.layouts,
        stripes = summary.stripes,
        skipped = summary.skipped_stripes,
        targets = summary.targets,
        "MDS: pass complete"
    );
    Ok(summary)
}

/// Gather one storage target's objects, reconcile its `LAST_ID` against
/// the metadata role's header and write `osthdr`.
pub fn run_ost_pass<F: FsAccess + ?Sized>(fs: &F, opts: &PassOptions, env: StoreEnv) -> Result<RunSummary> {
    let ost_base = opts
        .ost_db
        .as_deref()
        .ok_or_else(|| Error::Config("ost_db is required for the OST role".to_string()))?;
    let mds_base = opts.mds_db.as_path();
    let mut summary = RunSummary::new(Role::Ost, opts.read_only);
    let mut ctx = RunContext::new(env);

    let (_, state) = drive(Role::Ost, &mut ctx, |run, ctx| {
        let lsd = read_role_record(fs, Role::Ost)?;
        let mds_hdr = read_mds_header(ctx.open_existing(mds_base, MDS_HDR)?)?;
        debug!(
            mds = %uuid_str(&mds_hdr.mds_uuid),
            num_osts = mds_hdr.num_osts,
            read_only = mds_hdr.is_read_only(),
            "OST: MDS header"
        );

        let in_use = fs.inode_usage()?.in_use();
        for name in [OST_HDR, OST_OSTDB] {
            ctx.env().purge(ost_base, name)?;
        }
        ctx.open(ost_base, OST_HDR, TableOptions::default())?;
        let objects = TableOptions::sized(size_of::<u64>() + size_of::<StorageObjEnt>(), in_use);
        ctx.open(ost_base, OST_OSTDB, objects)?;

        run.advance(RunState::Scanning)?;
        let objdir = object_dir(fs)?;
        let table = ctx
            .get(ost_base, OST_OSTDB)
            .ok_or_else(|| Error::Storage(format!("table {} is not open", OST_OSTDB)))?;
        let scan = scan_objects(fs, objdir, table)?;
        let last_id = read_last_id(fs, objdir)?;
        debug!(last_id, "OST: LAST_ID");
        summary.objects = scan.objects;
        summary.max_object_id = scan.max_id;
        summary.last_id = Some(last_id);

        run.advance(RunState::Reconciling)?;
        let rec = reconcile(&mds_hdr, &lsd, scan.max_id, opts.read_only);
        summary.targets = mds_hdr.num_osts;
        summary.next_id = Some(rec.next_id);
        if rec.write_back {
            write_last_id(fs, objdir, rec.next_id)?;
            summary.last_id_written = true;
            info!(old = last_id, new = rec.next_id, "OST: LAST_ID updated");
        } else {
            info!(next_id = rec.next_id, "OST: read-only, LAST_ID left as is");
        }

        let mut hdr = OstHeader::new();
        hdr.flags = if opts.read_only { HDR_FLAG_READONLY } else { 0 };
        hdr.num_files = scan.objects;
        hdr.last_id = rec.next_id;
        hdr.ost_index = rec.ost_index;
        hdr.mds_uuid = lsd.peer_uuid;
        hdr.ost_uuid = lsd.uuid;
        let table = ctx
            .get(ost_base, OST_HDR)
            .ok_or_else(|| Error::Storage(format!("table {} is not open", OST_HDR)))?;
        write_ost_header(table, &hdr)?;
        info!(path = %table.path().display(), ost_index = rec.ost_index, "ost info db file written");
        Ok(())
    })?;

    summary.state = state;
    info!(
        objects = summary.objects,
        max_id = summary.max_object_id,
        next_id = ?summary.next_id,
        "OST: pass complete"
    );
    Ok(summary)
}
