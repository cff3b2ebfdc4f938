//! File identifiers and storage object ids.

use std::fmt;
use std::hash::{Hash, Hasher};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::core::codec::WireCodec;

pub const FID_SEQ_IGIF: u64 = 12;
pub const FID_SEQ_IGIF_MAX: u64 = 0xffff_ffff;

/// Cluster-wide identity of a namespace entry.
///
/// Targets without sequence allocation carry an IGIF identity instead:
/// `(inode, generation, 0)`. Two IGIFs are the same entity when sequence
/// and oid match; the version only participates for real FIDs.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Fid {
    pub seq: u64,
    pub oid: u32,
    pub ver: u32,
}

impl Fid {
    pub fn new(seq: u64, oid: u32, ver: u32) -> Self {
        Self { seq, oid, ver }
    }

    /// Identity derived from a local inode and its generation.
    pub fn igif(ino: u64, generation: u32) -> Self {
        Self {
            seq: ino,
            oid: generation,
            ver: 0,
        }
    }

    pub fn is_igif(&self) -> bool {
        (FID_SEQ_IGIF..=FID_SEQ_IGIF_MAX).contains(&self.seq)
    }

    /// Table key for records addressed by this identity.
    pub fn key(&self) -> Vec<u8> {
        self.encode()
    }
}

impl PartialEq for Fid {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_igif(), other.is_igif()) {
            (true, true) => self.seq == other.seq && self.oid == other.oid,
            (false, false) => self.seq == other.seq && self.oid == other.oid && self.ver == other.ver,
            _ => false,
        }
    }
}

impl Eq for Fid {}

impl Hash for Fid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.seq.hash(state);
        self.oid.hash(state);
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}:{:#x}:{:#x}]", self.seq, self.oid, self.ver)
    }
}

impl WireCodec for Fid {
    fn to_wire(&mut self) {
        self.seq = self.seq.to_le();
        self.oid = self.oid.to_le();
        self.ver = self.ver.to_le();
    }

    fn from_wire(&mut self) {
        self.seq = u64::from_le(self.seq);
        self.oid = u32::from_le(self.oid);
        self.ver = u32::from_le(self.ver);
    }
}

/// Object id on a storage target, scoped to a group (sequence).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ObjectId {
    pub id: u64,
    pub seq: u64,
}

impl ObjectId {
    pub fn new(id: u64, seq: u64) -> Self {
        Self { id, seq }
    }
}

impl WireCodec for ObjectId {
    fn to_wire(&mut self) {
        self.id = self.id.to_le();
        self.seq = self.seq.to_le();
    }

    fn from_wire(&mut self) {
        self.id = u64::from_le(self.id);
        self.seq = u64::from_le(self.seq);
    }
}
