use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, ReadOptions};

use crate::common::error::map_rocks_err;
use crate::common::{Error, Result};

/// Width of the sequence suffix appended to keys of duplicate tables.
const DUP_SUFFIX_LEN: usize = 4;

/// What a `put` did with the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// The key already held a value; the first one written is kept.
    Kept,
}

/// One named, persistent table of a run.
pub struct Table {
    name: String,
    path: PathBuf,
    db: DBWithThreadMode<MultiThreaded>,
    allow_duplicates: bool,
    read_only: bool,
    next_dup: AtomicU32,
}

impl Table {
    pub(crate) fn new(
        name: &str,
        path: PathBuf,
        db: DBWithThreadMode<MultiThreaded>,
        allow_duplicates: bool,
        read_only: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            path,
            db,
            allow_duplicates,
            read_only,
            next_dup: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::Storage(format!("table {} is open read-only", self.name)));
        }
        Ok(())
    }

    /// Store `value` under `key`.
    ///
    /// Duplicate tables keep every value written. Other tables keep the
    /// first value written under a key and report later writes as `Kept`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<PutOutcome> {
        self.check_writable()?;
        if self.allow_duplicates {
            let seq = self.next_dup.fetch_add(1, Ordering::Relaxed);
            let mut dup_key = Vec::with_capacity(key.len() + DUP_SUFFIX_LEN);
            dup_key.extend_from_slice(key);
            dup_key.extend_from_slice(&seq.to_be_bytes());
            self.db.put(dup_key, value).map_err(map_rocks_err)?;
            return Ok(PutOutcome::Inserted);
        }
        if self.db.get_pinned(key).map_err(map_rocks_err)?.is_some() {
            return Ok(PutOutcome::Kept);
        }
        self.db.put(key, value).map_err(map_rocks_err)?;
        Ok(PutOutcome::Inserted)
    }

    /// Store `value` under `key`, overwriting any previous value.
    pub fn replace(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;
        if self.allow_duplicates {
            return Err(Error::Storage(format!(
                "replace on duplicate table {} is not supported",
                self.name
            )));
        }
        self.db.put(key, value).map_err(map_rocks_err)
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.allow_duplicates {
            return self.db.get(key).map_err(map_rocks_err);
        }
        Ok(self.get_all(key)?.into_iter().next())
    }

    /// Every value stored under `key`, in write order.
    pub fn get_all(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        if !self.allow_duplicates {
            return Ok(self.get(key)?.into_iter().collect());
        }
        let mut values = Vec::new();
        let iter = self
            .db
            .iterator_opt(IteratorMode::From(key, Direction::Forward), total_order());
        for kv in iter {
            let (raw_key, raw_val) = kv.map_err(map_rocks_err)?;
            if !raw_key.starts_with(key) {
                break;
            }
            if raw_key.len() == key.len() + DUP_SUFFIX_LEN {
                values.push(raw_val.into_vec());
            }
        }
        Ok(values)
    }

    /// All records, keys stripped of any duplicate suffix.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for kv in self.db.iterator_opt(IteratorMode::Start, total_order()) {
            let (raw_key, raw_val) = kv.map_err(map_rocks_err)?;
            let mut key = raw_key.into_vec();
            if self.allow_duplicates {
                key.truncate(key.len().saturating_sub(DUP_SUFFIX_LEN));
            }
            out.push((key, raw_val.into_vec()));
        }
        Ok(out)
    }

    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        for kv in self.db.iterator_opt(IteratorMode::Start, total_order()) {
            kv.map_err(map_rocks_err)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Make everything written so far durable.
    pub fn flush(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.db.flush().map_err(map_rocks_err)
    }

    /// Flush and release the table.
    pub fn close(self) -> Result<()> {
        self.flush()
    }
}

fn total_order() -> ReadOptions {
    let mut opts = ReadOptions::default();
    opts.set_total_order_seek(true);
    opts
}
