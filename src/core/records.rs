//! Records written to the cross-reference tables.
//!
//! All layouts are `#[repr(C)]` without implicit padding so the wire image
//! is exactly the field sequence. Nested identities delegate to their own
//! codec.

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::core::codec::WireCodec;
use crate::core::fid::{Fid, ObjectId};

pub const MDS_MAGIC: u64 = 0xDBAB_CD01;
pub const OST_MAGIC: u64 = 0xDB12_3402;

/// Hard fan-out bound on target indices.
pub const LOV_MAX_OSTS: usize = 2048;

pub const UUID_LEN: usize = 40;

/// Header flag: the scan ran without write access to the device.
pub const HDR_FLAG_READONLY: u64 = 0x1;

pub type Uuid = [u8; UUID_LEN];

/// Printable form of a NUL-padded uuid field.
pub fn uuid_str(uuid: &Uuid) -> String {
    let end = uuid.iter().position(|&b| b == 0).unwrap_or(UUID_LEN);
    String::from_utf8_lossy(&uuid[..end]).into_owned()
}

pub fn uuid_from_str(s: &str) -> Uuid {
    let mut uuid = [0u8; UUID_LEN];
    let len = s.len().min(UUID_LEN - 1);
    uuid[..len].copy_from_slice(&s.as_bytes()[..len]);
    uuid
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EntryType {
    Regular = 1,
    Directory = 2,
}

/// Namespace linkage: one per entry, keyed by the child identity.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DirEntry {
    pub dirfid: Fid,
    pub fid: Fid,
    pub filetype: u32,
    pub unused: u32,
}

impl DirEntry {
    pub fn new(fid: Fid, dirfid: Fid, filetype: EntryType) -> Self {
        Self {
            dirfid,
            fid,
            filetype: filetype as u32,
            unused: 0,
        }
    }
}

impl WireCodec for DirEntry {
    fn to_wire(&mut self) {
        self.dirfid.to_wire();
        self.fid.to_wire();
        self.filetype = self.filetype.to_le();
    }

    fn from_wire(&mut self) {
        self.dirfid.from_wire();
        self.fid.from_wire();
        self.filetype = u32::from_le(self.filetype);
    }
}

/// Stripe geometry of one file. `size` and `calc_size` are reserved for
/// the checker and always written as zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SizeInfo {
    pub fid: Fid,
    pub group: u64,
    pub size: u64,
    pub calc_size: u64,
    pub stripe_size: u32,
    pub stripe_pattern: u32,
    pub stripe_count: u16,
    pub stripe_start: u16,
    pub unused: u32,
}

impl WireCodec for SizeInfo {
    fn to_wire(&mut self) {
        self.fid.to_wire();
        self.group = self.group.to_le();
        self.size = self.size.to_le();
        self.calc_size = self.calc_size.to_le();
        self.stripe_size = self.stripe_size.to_le();
        self.stripe_pattern = self.stripe_pattern.to_le();
        self.stripe_count = self.stripe_count.to_le();
        self.stripe_start = self.stripe_start.to_le();
    }

    fn from_wire(&mut self) {
        self.fid.from_wire();
        self.group = u64::from_le(self.group);
        self.size = u64::from_le(self.size);
        self.calc_size = u64::from_le(self.calc_size);
        self.stripe_size = u32::from_le(self.stripe_size);
        self.stripe_pattern = u32::from_le(self.stripe_pattern);
        self.stripe_count = u16::from_le(self.stripe_count);
        self.stripe_start = u16::from_le(self.stripe_start);
    }
}

/// One stripe of one file as the MDS sees it, keyed by object id in the
/// table of its target.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LayoutObjEnt {
    pub fid: Fid,
    pub generation: u32,
    pub flag: u32,
    pub oi: ObjectId,
    pub ost_idx: u32,
    pub ost_offset: u32,
}

impl WireCodec for LayoutObjEnt {
    fn to_wire(&mut self) {
        self.fid.to_wire();
        self.generation = self.generation.to_le();
        self.flag = self.flag.to_le();
        self.oi.to_wire();
        self.ost_idx = self.ost_idx.to_le();
        self.ost_offset = self.ost_offset.to_le();
    }

    fn from_wire(&mut self) {
        self.fid.from_wire();
        self.generation = u32::from_le(self.generation);
        self.flag = u32::from_le(self.flag);
        self.oi.from_wire();
        self.ost_idx = u32::from_le(self.ost_idx);
        self.ost_offset = u32::from_le(self.ost_offset);
    }
}

/// One object found on a storage target.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct StorageObjEnt {
    pub oi: ObjectId,
    pub size: u64,
    pub flag: u64,
    pub bytes: u64,
}

impl WireCodec for StorageObjEnt {
    fn to_wire(&mut self) {
        self.oi.to_wire();
        self.size = self.size.to_le();
        self.flag = self.flag.to_le();
        self.bytes = self.bytes.to_le();
    }

    fn from_wire(&mut self) {
        self.oi.from_wire();
        self.size = u64::from_le(self.size);
        self.flag = u64::from_le(self.flag);
        self.bytes = u64::from_le(self.bytes);
    }
}

/// Per-run summary of the metadata target.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MdsHeader {
    pub magic: u64,
    pub flags: u64,
    pub max_files: u64,
    pub num_osts: u32,
    pub unused: u32,
    pub max_ost_id: [u64; LOV_MAX_OSTS],
    pub mds_uuid: Uuid,
    pub ost_uuid: [Uuid; LOV_MAX_OSTS],
}

impl MdsHeader {
    pub fn new() -> Box<Self> {
        let mut hdr = Box::new(Self::new_zeroed());
        hdr.magic = MDS_MAGIC;
        hdr
    }

    /// Slots of `max_ost_id` that carry data, clamped to the fan-out bound.
    pub fn target_count(&self) -> usize {
        (self.num_osts as usize).min(LOV_MAX_OSTS)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags & HDR_FLAG_READONLY != 0
    }
}

impl WireCodec for MdsHeader {
    fn to_wire(&mut self) {
        // Bound the loop while num_osts is still in host order.
        let count = self.target_count();
        self.magic = self.magic.to_le();
        self.flags = self.flags.to_le();
        self.max_files = self.max_files.to_le();
        self.num_osts = self.num_osts.to_le();
        for id in &mut self.max_ost_id[..count] {
            *id = id.to_le();
        }
    }

    fn from_wire(&mut self) {
        self.magic = u64::from_le(self.magic);
        self.flags = u64::from_le(self.flags);
        self.max_files = u64::from_le(self.max_files);
        self.num_osts = u32::from_le(self.num_osts);
        let count = self.target_count();
        for id in &mut self.max_ost_id[..count] {
            *id = u64::from_le(*id);
        }
    }
}

/// Per-run summary of one storage target.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct OstHeader {
    pub magic: u64,
    pub flags: u64,
    pub num_files: u64,
    pub last_id: u64,
    pub ost_index: u32,
    pub unused: u32,
    pub mds_uuid: Uuid,
    pub ost_uuid: Uuid,
}

impl OstHeader {
    pub fn new() -> Self {
        let mut hdr = Self::new_zeroed();
        hdr.magic = OST_MAGIC;
        hdr
    }
}

impl WireCodec for OstHeader {
    fn to_wire(&mut self) {
        self.magic = self.magic.to_le();
        self.flags = self.flags.to_le();
        self.num_files = self.num_files.to_le();
        self.last_id = self.last_id.to_le();
        self.ost_index = self.ost_index.to_le();
    }

    fn from_wire(&mut self) {
        self.magic = u64::from_le(self.magic);
        self.flags = u64::from_le(self.flags);
        self.num_files = u64::from_le(self.num_files);
        self.last_id = u64::from_le(self.last_id);
        self.ost_index = u32::from_le(self.ost_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_record_sizes() {
        assert_eq!(size_of::<Fid>(), 16);
        assert_eq!(size_of::<ObjectId>(), 16);
        assert_eq!(size_of::<DirEntry>(), 40);
        assert_eq!(size_of::<SizeInfo>(), 56);
        assert_eq!(size_of::<LayoutObjEnt>(), 48);
        assert_eq!(size_of::<StorageObjEnt>(), 40);
        assert_eq!(size_of::<OstHeader>(), 120);
        assert_eq!(size_of::<MdsHeader>(), 32 + 8 * LOV_MAX_OSTS + UUID_LEN * (LOV_MAX_OSTS + 1));
    }

    #[test]
    fn test_dir_entry_round_trip() {
        let ent = DirEntry::new(Fid::igif(40, 3), Fid::igif(2, 0), EntryType::Directory);
        let back = DirEntry::decode(&ent.encode()).unwrap();
        assert_eq!(back.as_bytes(), ent.as_bytes());
    }

    #[test]
    fn test_size_info_round_trip() {
        let info = SizeInfo {
            fid: Fid::new(0x2_0000_0401, 9, 0),
            group: 0,
            size: 0,
            calc_size: 0,
            stripe_size: 1 << 20,
            stripe_pattern: 1,
            stripe_count: 4,
            stripe_start: 2,
            unused: 0,
        };
        let wire = info.encode();
        assert_eq!(&wire[40..44], &(1u32 << 20).to_le_bytes());
        assert_eq!(&wire[48..50], &4u16.to_le_bytes());
        assert_eq!(SizeInfo::decode(&wire).unwrap().as_bytes(), info.as_bytes());
    }

    #[test]
    fn test_layout_obj_ent_round_trip() {
        let ent = LayoutObjEnt {
            fid: Fid::igif(77, 1),
            generation: 1,
            flag: 0,
            oi: ObjectId::new(0xdead_beef_0001, 0),
            ost_idx: 3,
            ost_offset: 1,
        };
        let wire = ent.encode();
        assert_eq!(&wire[24..32], &0xdead_beef_0001u64.to_le_bytes());
        assert_eq!(LayoutObjEnt::decode(&wire).unwrap().as_bytes(), ent.as_bytes());
    }

    #[test]
    fn test_storage_obj_ent_round_trip() {
        let ent = StorageObjEnt {
            oi: ObjectId::new(205, 0),
            size: 4096,
            flag: 0,
            bytes: 8 * 512,
        };
        assert_eq!(StorageObjEnt::decode(&ent.encode()).unwrap().as_bytes(), ent.as_bytes());
    }

    #[test]
    fn test_ost_header_round_trip() {
        let mut hdr = OstHeader::new();
        hdr.num_files = 3;
        hdr.last_id = 206;
        hdr.ost_index = 5;
        hdr.ost_uuid = uuid_from_str("lustre-OST0005_UUID");
        let wire = hdr.encode();
        assert_eq!(&wire[..8], &OST_MAGIC.to_le_bytes());
        let back = OstHeader::decode(&wire).unwrap();
        assert_eq!(back.as_bytes(), hdr.as_bytes());
        assert_eq!(uuid_str(&back.ost_uuid), "lustre-OST0005_UUID");
    }

    #[test]
    fn test_mds_header_round_trip_converts_counted_slots() {
        let mut hdr = MdsHeader::new();
        hdr.num_osts = 3;
        hdr.max_files = 1000;
        hdr.max_ost_id[0] = 500;
        hdr.max_ost_id[1] = 0x0102_0304;
        hdr.max_ost_id[2] = 7;
        let wire = hdr.encode();
        assert_eq!(&wire[24..28], &3u32.to_le_bytes());
        assert_eq!(&wire[32..40], &500u64.to_le_bytes());
        assert_eq!(&wire[40..48], &0x0102_0304u64.to_le_bytes());
        let back = MdsHeader::decode(&wire).unwrap();
        assert_eq!(back.target_count(), 3);
        assert_eq!(back.as_bytes(), hdr.as_bytes());
    }

    #[test]
    fn test_mds_header_count_is_clamped() {
        let mut hdr = MdsHeader::new();
        hdr.num_osts = u32::MAX;
        assert_eq!(hdr.target_count(), LOV_MAX_OSTS);
        let back = MdsHeader::decode(&hdr.encode()).unwrap();
        assert_eq!(back.num_osts, u32::MAX);
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert!(StorageObjEnt::decode(&[0u8; 39]).is_err());
    }

    #[test]
    fn test_uuid_str_stops_at_nul() {
        let uuid = uuid_from_str("mdt0");
        assert_eq!(uuid_str(&uuid), "mdt0");
        assert_eq!(uuid_str(&[b'x'; UUID_LEN]).len(), UUID_LEN);
    }
}
