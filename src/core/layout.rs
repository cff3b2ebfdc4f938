//! The striping attribute stored on MDS regular files (`trusted.lov`), and
//! the `trusted.lma` attribute carrying a file's own identity.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::common::{Error, Result};
use crate::core::codec::WireCodec;
use crate::core::fid::Fid;

pub const LOV_USER_MAGIC_V1: u32 = 0x0BD1_0BD0;
pub const LOV_USER_MAGIC_V3: u32 = 0x0BD3_0BD0;
pub const LOV_MAXPOOLNAME: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LovMdHeader {
    pub magic: u32,
    pub pattern: u32,
    pub object_id: u64,
    pub object_seq: u64,
    pub stripe_size: u32,
    pub stripe_count: u16,
    pub stripe_offset: u16,
}

impl WireCodec for LovMdHeader {
    fn to_wire(&mut self) {
        self.magic = self.magic.to_le();
        self.pattern = self.pattern.to_le();
        self.object_id = self.object_id.to_le();
        self.object_seq = self.object_seq.to_le();
        self.stripe_size = self.stripe_size.to_le();
        self.stripe_count = self.stripe_count.to_le();
        self.stripe_offset = self.stripe_offset.to_le();
    }

    fn from_wire(&mut self) {
        self.magic = u32::from_le(self.magic);
        self.pattern = u32::from_le(self.pattern);
        self.object_id = u64::from_le(self.object_id);
        self.object_seq = u64::from_le(self.object_seq);
        self.stripe_size = u32::from_le(self.stripe_size);
        self.stripe_count = u16::from_le(self.stripe_count);
        self.stripe_offset = u16::from_le(self.stripe_offset);
    }
}

/// Where one stripe lives.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LovOstData {
    pub object_id: u64,
    pub object_seq: u64,
    pub ost_gen: u32,
    pub ost_idx: u32,
}

impl LovOstData {
    pub fn new(ost_idx: u32, object_id: u64) -> Self {
        Self {
            object_id,
            object_seq: 0,
            ost_gen: 0,
            ost_idx,
        }
    }
}

impl WireCodec for LovOstData {
    fn to_wire(&mut self) {
        self.object_id = self.object_id.to_le();
        self.object_seq = self.object_seq.to_le();
        self.ost_gen = self.ost_gen.to_le();
        self.ost_idx = self.ost_idx.to_le();
    }

    fn from_wire(&mut self) {
        self.object_id = u64::from_le(self.object_id);
        self.object_seq = u64::from_le(self.object_seq);
        self.ost_gen = u32::from_le(self.ost_gen);
        self.ost_idx = u32::from_le(self.ost_idx);
    }
}

/// Decoded striping attribute, fields in host order.
#[derive(Debug, Clone)]
pub struct LayoutAttr {
    pub header: LovMdHeader,
    pub pool_name: Option<[u8; LOV_MAXPOOLNAME]>,
    pub objects: Vec<LovOstData>,
}

impl LayoutAttr {
    pub fn v1(stripe_size: u32, objects: Vec<LovOstData>) -> Self {
        Self {
            header: LovMdHeader {
                magic: LOV_USER_MAGIC_V1,
                pattern: 1,
                object_id: 0,
                object_seq: 0,
                stripe_size,
                stripe_count: objects.len() as u16,
                stripe_offset: 0,
            },
            pool_name: None,
            objects,
        }
    }

    /// Decode a raw attribute value.
    ///
    /// The header, including `stripe_count`, is converted before the count
    /// is used to size the stripe array. The magic selects whether a pool
    /// name precedes the stripes but is not otherwise checked here.
    pub fn from_wire(buf: &[u8]) -> Result<Self> {
        let (mut header, mut rest) = LovMdHeader::read_from_prefix(buf)
            .map_err(|_| Error::Codec(format!("layout attribute too short: {} bytes", buf.len())))?;
        header.from_wire();

        let pool_name = if header.magic == LOV_USER_MAGIC_V3 {
            let (pool, tail) = <[u8; LOV_MAXPOOLNAME]>::read_from_prefix(rest)
                .map_err(|_| Error::Codec("layout attribute truncated in pool name".to_string()))?;
            rest = tail;
            Some(pool)
        } else {
            None
        };

        let count = header.stripe_count as usize;
        let mut objects = Vec::with_capacity(count);
        for i in 0..count {
            let (mut obj, tail) = LovOstData::read_from_prefix(rest).map_err(|_| {
                Error::Codec(format!(
                    "layout attribute holds {} of {} stripes",
                    i, header.stripe_count
                ))
            })?;
            obj.from_wire();
            objects.push(obj);
            rest = tail;
        }

        Ok(Self {
            header,
            pool_name,
            objects,
        })
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        if let Some(pool) = &self.pool_name {
            out.extend_from_slice(pool);
        }
        for obj in &self.objects {
            out.extend_from_slice(&obj.encode());
        }
        out
    }

    /// Object group shared by every stripe of the file.
    pub fn group(&self) -> u64 {
        self.header.object_seq
    }

    /// Target of the first stripe, or 0 for an empty layout.
    pub fn stripe_start(&self) -> u32 {
        self.objects.first().map(|o| o.ost_idx).unwrap_or(0)
    }
}

/// Leading part of `trusted.lma`; the trailing fields are not needed.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MdtAttrs {
    pub compat: u32,
    pub incompat: u32,
    pub self_fid: Fid,
}

impl MdtAttrs {
    pub fn new(self_fid: Fid) -> Self {
        Self {
            compat: 0,
            incompat: 0,
            self_fid,
        }
    }

    /// Decode from an attribute value that may carry trailing fields.
    pub fn from_wire_prefix(buf: &[u8]) -> Result<Self> {
        let (mut lma, _) = Self::read_from_prefix(buf)
            .map_err(|_| Error::Codec(format!("lma attribute too short: {} bytes", buf.len())))?;
        lma.from_wire();
        Ok(lma)
    }
}

impl WireCodec for MdtAttrs {
    fn to_wire(&mut self) {
        self.compat = self.compat.to_le();
        self.incompat = self.incompat.to_le();
        self.self_fid.to_wire();
    }

    fn from_wire(&mut self) {
        self.compat = u32::from_le(self.compat);
        self.incompat = u32::from_le(self.incompat);
        self.self_fid.from_wire();
    }
}
