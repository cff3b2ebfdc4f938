use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::common::{Error, Result};
use crate::store::env::{StoreEnv, TableOptions, table_path};
use crate::store::table::Table;

/// Owns the store environment and every table a run has opened, so the
/// whole set can be released together on either exit path.
pub struct RunContext {
    env: StoreEnv,
    tables: BTreeMap<PathBuf, Table>,
}

impl RunContext {
    pub fn new(env: StoreEnv) -> Self {
        Self {
            env,
            tables: BTreeMap::new(),
        }
    }

    pub fn env(&self) -> &StoreEnv {
        &self.env
    }

    /// Create (or truncate) a table and keep it open for the run.
    pub fn open(&mut self, base: &Path, name: &str, opts: TableOptions) -> Result<&Table> {
        let path = table_path(base, name);
        if let Some(stale) = self.tables.remove(&path) {
            stale.close()?;
        }
        let table = self.env.open(base, name, opts)?;
        Ok(self.tables.entry(path).or_insert(table))
    }

    /// Open a table written by an earlier pass, read-only.
    pub fn open_existing(&mut self, base: &Path, name: &str) -> Result<&Table> {
        let path = table_path(base, name);
        if !self.tables.contains_key(&path) {
            let table = self.env.open_existing(base, name)?;
            self.tables.insert(path.clone(), table);
        }
        self.tables
            .get(&path)
            .ok_or_else(|| Error::Storage(format!("table {} vanished", path.display())))
    }

    pub fn get(&self, base: &Path, name: &str) -> Option<&Table> {
        self.tables.get(&table_path(base, name))
    }

    pub fn is_open(&self, base: &Path, name: &str) -> bool {
        self.tables.contains_key(&table_path(base, name))
    }

    pub fn open_count(&self) -> usize {
        self.tables.len()
    }

    /// Close one table, making its contents durable.
    pub fn close(&mut self, base: &Path, name: &str) -> Result<()> {
        match self.tables.remove(&table_path(base, name)) {
            Some(table) => table.close(),
            None => Ok(()),
        }
    }

    /// Close every open table. All tables are attempted; failures are
    /// collected rather than stopping at the first.
    pub fn close_all(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for (path, table) in std::mem::take(&mut self.tables) {
            match table.close() {
                Ok(()) => debug!(path = %path.display(), "table closed"),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to close table");
                    failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup(failures))
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if !self.tables.is_empty() {
            if let Err(e) = self.close_all() {
                warn!(error = %e, "run context dropped with tables that failed to close");
            }
        }
    }
}
