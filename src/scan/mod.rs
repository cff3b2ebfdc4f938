//! The gathering passes: scanners for each role, reconciliation of object
//! counters and the per-run state machine tying them together.

pub mod attr;
pub mod mds;
pub mod ost;
pub mod pass;
pub mod reconcile;

use std::fmt;

use tracing::{debug, error};

use crate::common::{Error, Result, Role};

pub use attr::{LayoutSink, scan_layouts};
pub use mds::MdsScanner;
pub use ost::{ObjectScan, scan_objects};
pub use pass::{run, run_mds_pass, run_ost_pass};
pub use reconcile::{Reconciliation, next_object_id, reconcile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scanning,
    Reconciling,
    Done,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }

    fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Done | Aborted, _) => false,
            (_, Aborted) => true,
            (Idle, Scanning) | (Scanning, Reconciling) | (Reconciling, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Scanning => "scanning",
            RunState::Reconciling => "reconciling",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Tracks where one pass is in its lifecycle.
#[derive(Debug)]
pub struct Run {
    role: Role,
    state: RunState,
}

impl Run {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::Aborted(format!(
                "{} pass cannot move from {} to {}",
                self.role, self.state, next
            )));
        }
        debug!(role = %self.role, from = %self.state, to = %next, "pass state change");
        self.state = next;
        Ok(())
    }

    pub fn abort(&mut self, cause: &Error) {
        if self.state.is_terminal() {
            return;
        }
        error!(role = %self.role, state = %self.state, error = %cause, "pass aborted");
        self.state = RunState::Aborted;
    }
}

/// What a completed pass gathered.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub role: Role,
    pub state: RunState,
    pub read_only: bool,
    /// Namespace entries recorded (MDS).
    pub dir_entries: u64,
    /// Files whose layout attribute was recorded (MDS).
    pub layouts: u64,
    /// Stripes recorded in the per-target tables (MDS).
    pub stripes: u64,
    /// Stripes skipped for a bad target index or an id above a prior bound.
    pub skipped_stripes: u64,
    /// Number of target slots in the MDS header.
    pub targets: u32,
    /// Objects recorded (OST).
    pub objects: u64,
    /// Highest object id found on disk (OST).
    pub max_object_id: u64,
    /// Value of `LAST_ID` before reconciliation (OST).
    pub last_id: Option<u64>,
    /// Reconciled next object id (OST).
    pub next_id: Option<u64>,
    pub last_id_written: bool,
}

impl RunSummary {
    pub fn new(role: Role, read_only: bool) -> Self {
        Self {
            role,
            state: RunState::Idle,
            read_only,
            dir_entries: 0,
            layouts: 0,
            stripes: 0,
            skipped_stripes: 0,
            targets: 0,
            objects: 0,
            max_object_id: 0,
            last_id: None,
            next_id: None,
            last_id_written: false,
        }
    }
}
