//! Keyed tables backing the gathered data, one RocksDB instance per table.

pub mod context;
pub mod env;
pub mod table;

pub use context::RunContext;
pub use env::{StoreEnv, TableOptions, table_path};
pub use table::{PutOutcome, Table};

pub const MDS_HDR: &str = "mdshdr";
pub const MDS_DIRINFO: &str = "mds_dirinfo";
pub const MDS_SIZEINFO: &str = "mds_sizeinfo";
pub const MDS_OSTDB: &str = "mds_ostdb";
pub const OST_HDR: &str = "osthdr";
pub const OST_OSTDB: &str = "ost_db";

/// Name of the per-target table holding the stripes placed on `ost_idx`.
pub fn ost_table_name(ost_idx: u32) -> String {
    format!("{}.{}", MDS_OSTDB, ost_idx)
}
