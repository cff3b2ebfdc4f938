use std::path::Path;

use lfsck_gather::common::{Error, PassOptions};
use lfsck_gather::core::records::{
    DirEntry, EntryType, HDR_FLAG_READONLY, LayoutObjEnt, StorageObjEnt, uuid_from_str, uuid_str,
};
use lfsck_gather::core::server_data::{LAST_RCVD, OBD_INCOMPAT_MDT, OBD_INCOMPAT_OST, ServerData};
use lfsck_gather::core::{Fid, LayoutAttr, LovOstData, WireCodec, u64_key};
use lfsck_gather::fs::{FsAccess, Ino, MemFs, XATTR_LOV};
use lfsck_gather::scan::reconcile::{read_mds_header, read_ost_header};
use lfsck_gather::scan::{MdsScanner, RunState, run_mds_pass, run_ost_pass};
use lfsck_gather::store::{MDS_DIRINFO, MDS_HDR, OST_HDR, OST_OSTDB, RunContext, StoreEnv, Table};
use zerocopy::FromZeros;

fn env() -> StoreEnv {
    StoreEnv::with_cache_size(16 << 20)
}

fn add_role_record(fs: &MemFs, incompat: u32, uuid: &str, peer: &str, ost_index: u32) {
    let mut lsd = ServerData::new_zeroed();
    lsd.uuid = uuid_from_str(uuid);
    lsd.peer_uuid = uuid_from_str(peer);
    lsd.feature_incompat = incompat;
    lsd.ost_index = ost_index;
    fs.add_file(fs.root(), LAST_RCVD, &lsd.encode());
}

fn mds_device() -> MemFs {
    let fs = MemFs::new();
    add_role_record(&fs, OBD_INCOMPAT_MDT, "lustre-MDT0000_UUID", "", 0);
    fs
}

fn add_striped(fs: &MemFs, parent: Ino, name: &str, stripes: &[(u32, u64)]) -> Ino {
    let ino = fs.add_file(parent, name, b"");
    let objects = stripes.iter().map(|&(idx, id)| LovOstData::new(idx, id)).collect();
    fs.set_xattr(ino, XATTR_LOV, &LayoutAttr::v1(1 << 20, objects).to_wire());
    ino
}

/// Storage target with `objects` spread over buckets d0..d3.
fn ost_device(objects: &[u64], last_id: u64) -> (MemFs, Ino) {
    let fs = MemFs::new();
    add_role_record(&fs, OBD_INCOMPAT_OST, "lustre-OST0000_UUID", "lustre-MDT0000_UUID", 0);
    let o = fs.mkdir(fs.root(), "O");
    let objdir = fs.mkdir(o, "0");
    let buckets: Vec<Ino> = (0..4).map(|i| fs.mkdir(objdir, &format!("d{}", i))).collect();
    for (n, id) in objects.iter().enumerate() {
        fs.add_file(buckets[n % buckets.len()], &id.to_string(), &[0u8; 100]);
    }
    fs.add_file(objdir, "LAST_ID", &last_id.to_le_bytes());
    (fs, objdir)
}

fn last_id_on(fs: &MemFs, objdir: Ino) -> u64 {
    let ino = fs.lookup(objdir, "LAST_ID").unwrap().unwrap();
    u64::from_le_bytes(fs.contents(ino)[..8].try_into().unwrap())
}

fn existing(base: &Path, name: &str) -> Table {
    env().open_existing(base, name).unwrap()
}

#[test]
fn test_namespace_tree_links_parents() {
    let fs = MemFs::new();
    let plain = fs.add_file(fs.root(), "plain", b"abc");
    let sub = fs.mkdir(fs.root(), "sub");
    let nested = fs.add_file(sub, "nested", b"");

    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("mdsdb");
    let mut ctx = RunContext::new(env());
    {
        let mut scanner = MdsScanner::new(&mut ctx, &base, 16);
        scanner.open_tables().unwrap();
        assert_eq!(scanner.walk_namespace(&fs, 64).unwrap(), 3);
    }
    let table = ctx.get(&base, MDS_DIRINFO).unwrap();
    assert_eq!(table.len().unwrap(), 3);

    let parent_of = |ino: Ino| {
        let raw = table.get(&Fid::igif(ino, 0).key()).unwrap().unwrap();
        let rec = DirEntry::decode(&raw).unwrap();
        (rec.dirfid, rec.filetype)
    };
    let root = Fid::igif(fs.root(), 0);
    assert_eq!(parent_of(plain), (root, EntryType::Regular as u32));
    assert_eq!(parent_of(sub), (root, EntryType::Directory as u32));
    assert_eq!(parent_of(nested), (Fid::igif(sub, 0), EntryType::Regular as u32));
}

#[test]
fn test_storage_buckets_yield_objects() {
    let (fs, _) = ost_device(&[100, 205, 7], 205);
    let mds = mds_device();
    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb")).with_ost_db(dir.path().join("ostdb"));
    run_mds_pass(&mds, &opts, env()).unwrap();

    let summary = run_ost_pass(&fs, &opts.clone().read_only(true), env()).unwrap();
    assert_eq!(summary.objects, 3);
    assert_eq!(summary.max_object_id, 205);

    let table = existing(&dir.path().join("ostdb"), OST_OSTDB);
    assert_eq!(table.len().unwrap(), 3);
    for id in [100u64, 205, 7] {
        let ent = StorageObjEnt::decode(&table.get(&u64_key(id)).unwrap().unwrap()).unwrap();
        assert_eq!(ent.oi.id, id);
        assert_eq!(ent.size, 100);
    }
}

#[test]
fn test_reconcile_advances_last_id() {
    let mds = mds_device();
    add_striped(&mds, mds.root(), "big", &[(0, 500)]);
    let (ost, objdir) = ost_device(&[300, 12], 300);

    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb")).with_ost_db(dir.path().join("ostdb"));
    let mds_summary = run_mds_pass(&mds, &opts, env()).unwrap();
    assert_eq!(mds_summary.state, RunState::Done);
    assert_eq!(mds_summary.targets, 1);

    let summary = run_ost_pass(&ost, &opts, env()).unwrap();
    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.last_id, Some(300));
    assert_eq!(summary.next_id, Some(501));
    assert!(summary.last_id_written);
    assert_eq!(last_id_on(&ost, objdir), 501);

    let hdr = read_ost_header(&existing(&dir.path().join("ostdb"), OST_HDR)).unwrap();
    assert_eq!(hdr.last_id, 501);
    assert_eq!(hdr.num_files, 2);
    assert_eq!(uuid_str(&hdr.ost_uuid), "lustre-OST0000_UUID");
    assert_eq!(uuid_str(&hdr.mds_uuid), "lustre-MDT0000_UUID");
}

#[test]
fn test_read_only_reconcile_leaves_last_id() {
    let mds = mds_device();
    add_striped(&mds, mds.root(), "big", &[(0, 500)]);
    let (ost, objdir) = ost_device(&[300], 300);

    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb")).with_ost_db(dir.path().join("ostdb"));
    run_mds_pass(&mds, &opts, env()).unwrap();

    let summary = run_ost_pass(&ost, &opts.clone().read_only(true), env()).unwrap();
    assert_eq!(summary.next_id, Some(501));
    assert!(!summary.last_id_written);
    assert_eq!(last_id_on(&ost, objdir), 300);

    let hdr = read_ost_header(&existing(&dir.path().join("ostdb"), OST_HDR)).unwrap();
    assert_eq!(hdr.last_id, 501);
    assert_eq!(hdr.flags, HDR_FLAG_READONLY);
}

#[test]
fn test_read_only_mds_blocks_write_back() {
    let mds = mds_device();
    add_striped(&mds, mds.root(), "big", &[(0, 500)]);
    let (ost, objdir) = ost_device(&[300], 300);

    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb")).with_ost_db(dir.path().join("ostdb"));
    run_mds_pass(&mds, &opts.clone().read_only(true), env()).unwrap();
    let summary = run_ost_pass(&ost, &opts, env()).unwrap();
    assert!(!summary.last_id_written);
    assert_eq!(last_id_on(&ost, objdir), 300);
}

#[test]
fn test_rerun_keeps_one_header() {
    let mds = mds_device();
    add_striped(&mds, mds.root(), "f", &[(1, 40)]);
    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb"));
    run_mds_pass(&mds, &opts, env()).unwrap();
    run_mds_pass(&mds, &opts, env()).unwrap();

    let table = existing(&opts.mds_db, MDS_HDR);
    assert_eq!(table.len().unwrap(), 1);
    let hdr = read_mds_header(&table).unwrap();
    assert_eq!(hdr.num_osts, 2);
    assert_eq!(hdr.max_ost_id[..2], [0u64, 40]);
    assert_eq!(uuid_str(&hdr.mds_uuid), "lustre-MDT0000_UUID");
}

#[test]
fn test_each_stripe_gets_one_record() {
    let mds = mds_device();
    let f = add_striped(&mds, mds.root(), "wide", &[(0, 11), (1, 12), (2, 13), (3, 14)]);
    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb"));
    let summary = run_mds_pass(&mds, &opts, env()).unwrap();
    assert_eq!(summary.stripes, 4);
    assert_eq!(summary.layouts, 1);

    for (offset, idx) in (0u32..4).enumerate() {
        let table = existing(&opts.mds_db, &format!("mds_ostdb.{}", idx));
        assert_eq!(table.len().unwrap(), 1);
        let id = 11 + idx as u64;
        let ent = LayoutObjEnt::decode(&table.get(&u64_key(id)).unwrap().unwrap()).unwrap();
        assert_eq!(ent.fid, Fid::igif(f, 0));
        assert_eq!(ent.ost_idx, idx);
        assert_eq!(ent.ost_offset, offset as u32);
    }
}

#[test]
fn test_read_only_run_honours_lov_objid() {
    let mds = mds_device();
    mds.add_file(mds.root(), "lov_objid", &[100u64.to_le_bytes(), 100u64.to_le_bytes()].concat());
    add_striped(&mds, mds.root(), "ok", &[(0, 90), (1, 95)]);
    add_striped(&mds, mds.root(), "late", &[(1, 150), (2, 3)]);

    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb")).read_only(true);
    let summary = run_mds_pass(&mds, &opts, env()).unwrap();
    assert_eq!(summary.stripes, 2);
    assert_eq!(summary.skipped_stripes, 2);
    assert_eq!(summary.targets, 2);

    let hdr = read_mds_header(&existing(&opts.mds_db, MDS_HDR)).unwrap();
    assert!(hdr.is_read_only());
    assert_eq!(hdr.max_ost_id[..2], [100u64, 100]);
}

#[test]
fn test_layoutless_run_takes_bounds_from_lov_objid() {
    let mds = mds_device();
    let ids = [40u64, 75, 12];
    mds.add_file(mds.root(), "lov_objid", &ids.map(u64::to_le_bytes).concat());
    let sub = mds.mkdir(mds.root(), "sub");
    mds.add_file(sub, "plain", b"");

    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb"));
    let summary = run_mds_pass(&mds, &opts, env()).unwrap();
    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.stripes, 0);
    assert_eq!(summary.targets, 3);

    let hdr = read_mds_header(&existing(&opts.mds_db, MDS_HDR)).unwrap();
    assert!(!hdr.is_read_only());
    assert_eq!(hdr.num_osts, 3);
    assert_eq!(hdr.max_ost_id[..3], ids);
    assert_eq!(hdr.max_ost_id[3], 0);
}

#[test]
fn test_role_mismatch_aborts() {
    let (ost, _) = ost_device(&[1], 1);
    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb"));
    let err = run_mds_pass(&ost, &opts, env()).unwrap_err();
    assert!(matches!(err, Error::RoleMismatch(_)));
    assert!(!dir.path().join("mdsdb.mdshdr").exists());
}

#[test]
fn test_abort_mid_scan_releases_tables() {
    let mds = mds_device();
    add_striped(&mds, mds.root(), "f", &[(0, 1)]);
    let (ost, objdir) = ost_device(&[5], 5);
    let d0 = ost.lookup(objdir, "d0").unwrap().unwrap();
    ost.add_file(d0, "not-a-number", b"");

    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb")).with_ost_db(dir.path().join("ostdb"));
    run_mds_pass(&mds, &opts, env()).unwrap();
    let err = run_ost_pass(&ost, &opts, env()).unwrap_err();
    assert!(matches!(err, Error::BadObjectName { .. }));
    assert_eq!(last_id_on(&ost, objdir), 5);

    // every table was closed, so a writer can take them over
    let ostdb = dir.path().join("ostdb");
    let env = env();
    for name in [OST_HDR, OST_OSTDB] {
        env.open(&ostdb, name, Default::default()).unwrap().close().unwrap();
    }
    env.open(&opts.mds_db, MDS_HDR, Default::default()).unwrap().close().unwrap();
}

#[test]
fn test_nonzero_group_aborts_mds_pass() {
    let mds = mds_device();
    let f = mds.add_file(mds.root(), "grouped", b"");
    let mut lmm = LayoutAttr::v1(1 << 20, vec![LovOstData::new(0, 9)]);
    lmm.header.object_seq = 2;
    mds.set_xattr(f, XATTR_LOV, &lmm.to_wire());

    let dir = tempfile::tempdir().unwrap();
    let opts = PassOptions::new(dir.path().join("mdsdb"));
    let err = run_mds_pass(&mds, &opts, env()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedGroup(2)));
}
