//! Cross-checks the metadata role's recorded maxima against what a storage
//! target actually holds, and writes the per-role headers.

use tracing::{debug, warn};

use crate::common::{Error, Result};
use crate::core::codec::{WireCodec, u64_key};
use crate::core::records::{MDS_MAGIC, MdsHeader, OST_MAGIC, OstHeader, uuid_str};
use crate::core::server_data::ServerData;
use crate::store::Table;

/// Next id a target may hand out without reissuing one already in use.
pub fn next_object_id(recorded_max: u64, observed_max: u64) -> u64 {
    recorded_max.max(observed_max).saturating_add(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub ost_index: u32,
    pub observed_max: u64,
    /// Maximum the MDS recorded for this target, when its slot applies.
    pub recorded_max: Option<u64>,
    pub next_id: u64,
    /// Whether `LAST_ID` may be rewritten; false when either role ran
    /// read-only.
    pub write_back: bool,
}

/// Reconcile one storage target against the MDS header.
pub fn reconcile(mds_hdr: &MdsHeader, ost: &ServerData, observed_max: u64, ost_read_only: bool) -> Reconciliation {
    let ost_index = ost.ost_index;
    let recorded_max = if (ost_index as usize) < mds_hdr.target_count() {
        let slot_uuid = &mds_hdr.ost_uuid[ost_index as usize];
        if slot_uuid[0] != 0 && uuid_str(slot_uuid) != uuid_str(&ost.uuid) {
            warn!(
                ost_index,
                recorded = %uuid_str(slot_uuid),
                found = %uuid_str(&ost.uuid),
                "OST: MDS slot belongs to another target, ignoring it"
            );
            None
        } else {
            Some(mds_hdr.max_ost_id[ost_index as usize])
        }
    } else {
        debug!(ost_index, num_osts = mds_hdr.num_osts, "OST: target not referenced by MDS");
        None
    };

    let next_id = next_object_id(recorded_max.unwrap_or(0), observed_max);
    Reconciliation {
        ost_index,
        observed_max,
        recorded_max,
        next_id,
        write_back: !ost_read_only && !mds_hdr.is_read_only(),
    }
}

/// Read the MDS header written by the metadata pass.
pub fn read_mds_header(table: &Table) -> Result<Box<MdsHeader>> {
    let raw = table
        .get(&u64_key(MDS_MAGIC))?
        .ok_or_else(|| Error::Storage(format!("no MDS header in {}", table.path().display())))?;
    let hdr = Box::new(MdsHeader::decode(&raw)?);
    if hdr.magic != MDS_MAGIC {
        return Err(Error::Codec(format!("bad MDS header magic {:#x}", hdr.magic)));
    }
    Ok(hdr)
}

/// Write `hdr`, replacing any header already in the table.
pub fn write_mds_header(table: &Table, hdr: &MdsHeader) -> Result<()> {
    table.replace(&u64_key(MDS_MAGIC), &hdr.encode())
}

pub fn write_ost_header(table: &Table, hdr: &OstHeader) -> Result<()> {
    table.replace(&u64_key(OST_MAGIC), &hdr.encode())
}

pub fn read_ost_header(table: &Table) -> Result<OstHeader> {
    let raw = table
        .get(&u64_key(OST_MAGIC))?
        .ok_or_else(|| Error::Storage(format!("no OST header in {}", table.path().display())))?;
    let hdr = OstHeader::decode(&raw)?;
    if hdr.magic != OST_MAGIC {
        return Err(Error::Codec(format!("bad OST header magic {:#x}", hdr.magic)));
    }
    Ok(hdr)
}
