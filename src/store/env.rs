use std::path::{Path, PathBuf};

use rocksdb::{
    BlockBasedIndexType, BlockBasedOptions, Cache, DBWithThreadMode, MemtableFactory, MultiThreaded, Options,
    SliceTransform,
};
use tracing::debug;

use crate::common::error::map_rocks_err;
use crate::common::Result;
use crate::store::table::Table;

const MIN_CACHE_BYTES: usize = 10 * 1024 * 1024;
const MAX_CACHE_BYTES: usize = 500 * 1024 * 1024;

/// Page size the bucket fan-out is computed against.
const BUCKET_PAGE_SIZE: usize = 512;
/// Per-bucket overhead subtracted from the page before dividing.
const BUCKET_PAGE_OVERHEAD: usize = 32;
const MAX_BUCKETS: usize = 1 << 22;

/// Every key starts with at least eight bytes (an object id or a FID
/// sequence), which the hash index is built over.
pub const KEY_PREFIX_LEN: usize = 8;

/// Tuning inputs for one table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    pub allow_duplicates: bool,
    /// Size of one key plus its value; 0 when unknown.
    pub kv_size_hint: usize,
    /// Expected number of entries; 0 when unknown.
    pub expected_entries: u64,
}

impl TableOptions {
    pub fn sized(kv_size_hint: usize, expected_entries: u64) -> Self {
        Self {
            allow_duplicates: false,
            kv_size_hint,
            expected_entries,
        }
    }

    pub fn with_duplicates(mut self) -> Self {
        self.allow_duplicates = true;
        self
    }

    /// Entries per hash bucket, keeping bucket chains short as records grow.
    pub fn fill_factor(&self) -> Option<usize> {
        if self.kv_size_hint == 0 || self.expected_entries == 0 {
            return None;
        }
        Some(((BUCKET_PAGE_SIZE - BUCKET_PAGE_OVERHEAD) / (self.kv_size_hint + 8)).max(1))
    }

    pub fn bucket_count(&self) -> Option<usize> {
        let ffactor = self.fill_factor()?;
        let buckets = (self.expected_entries as usize / ffactor).clamp(16, MAX_BUCKETS);
        Some(buckets)
    }
}

/// On-disk location of `table` under `base`.
pub fn table_path(base: &Path, table: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(table);
    PathBuf::from(name)
}

/// Cache budget: three quarters of the available physical memory, bounded.
pub fn cache_budget(page_size: usize, avail_pages: usize) -> usize {
    ((page_size * 3) / 4)
        .saturating_mul(avail_pages)
        .clamp(MIN_CACHE_BYTES, MAX_CACHE_BYTES)
}

#[cfg(target_os = "linux")]
fn physical_memory() -> (usize, usize) {
    let (page_size, pages) = unsafe { (libc::sysconf(libc::_SC_PAGESIZE), libc::sysconf(libc::_SC_AVPHYS_PAGES)) };
    (page_size.max(4096) as usize, pages.max(0) as usize)
}

#[cfg(not(target_os = "linux"))]
fn physical_memory() -> (usize, usize) {
    (4096, 0)
}

/// Store environment for one run: the block cache every table shares and
/// the option set each table is opened with.
pub struct StoreEnv {
    cache: Cache,
    cache_bytes: usize,
    block_size: usize,
}

impl StoreEnv {
    pub fn new() -> Self {
        let (page_size, pages) = physical_memory();
        let env = Self::with_cache_size(cache_budget(page_size, pages));
        debug!(cache_bytes = env.cache_bytes, page_size, "store environment created");
        Self { block_size: page_size, ..env }
    }

    pub fn with_cache_size(cache_bytes: usize) -> Self {
        Self {
            cache: Cache::new_lru_cache(cache_bytes),
            cache_bytes,
            block_size: 4096,
        }
    }

    pub fn cache_bytes(&self) -> usize {
        self.cache_bytes
    }

    fn options(&self, table: &TableOptions) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        // Hash memtables do not support concurrent inserts.
        opts.set_allow_concurrent_memtable_write(false);
        opts.set_prefix_extractor(SliceTransform::create_fixed_prefix(KEY_PREFIX_LEN));

        let mut block = BlockBasedOptions::default();
        block.set_block_cache(&self.cache);
        block.set_block_size(self.block_size);
        block.set_index_type(BlockBasedIndexType::HashSearch);
        opts.set_block_based_table_factory(&block);

        if let Some(bucket_count) = table.bucket_count() {
            opts.set_memtable_factory(MemtableFactory::HashSkipList {
                bucket_count,
                height: 4,
                branching_factor: 4,
            });
        }
        opts
    }

    /// Create `table` under `base`, truncating whatever a previous run left.
    pub fn open(&self, base: &Path, table: &str, table_opts: TableOptions) -> Result<Table> {
        let path = table_path(base, table);
        let opts = self.options(&table_opts);
        if path.exists() {
            DBWithThreadMode::<MultiThreaded>::destroy(&opts, &path).map_err(map_rocks_err)?;
        }
        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, &path).map_err(map_rocks_err)?;
        debug!(
            table,
            path = %path.display(),
            buckets = ?table_opts.bucket_count(),
            dup = table_opts.allow_duplicates,
            "table opened"
        );
        Ok(Table::new(table, path, db, table_opts.allow_duplicates, false))
    }

    /// Open a table written by an earlier pass, without modifying it.
    pub fn open_existing(&self, base: &Path, table: &str) -> Result<Table> {
        let path = table_path(base, table);
        let opts = self.options(&TableOptions::default());
        let db =
            DBWithThreadMode::<MultiThreaded>::open_for_read_only(&opts, &path, false).map_err(map_rocks_err)?;
        Ok(Table::new(table, path, db, false, true))
    }

    /// Remove `table` under `base` if it exists.
    pub fn purge(&self, base: &Path, table: &str) -> Result<bool> {
        let path = table_path(base, table);
        if !path.exists() {
            return Ok(false);
        }
        let opts = self.options(&TableOptions::default());
        DBWithThreadMode::<MultiThreaded>::destroy(&opts, &path).map_err(map_rocks_err)?;
        Ok(true)
    }
}

impl Default for StoreEnv {
    fn default() -> Self {
        Self::new()
    }
}
