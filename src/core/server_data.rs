//! The server role record (`last_rcvd`), read-only from this crate.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::common::{Error, Result, Role};
use crate::core::codec::WireCodec;
use crate::core::records::{Uuid, uuid_str};

pub const LAST_RCVD: &str = "last_rcvd";

pub const OBD_COMPAT_OST: u32 = 0x0000_0002;
pub const OBD_COMPAT_MDT: u32 = 0x0000_0004;
pub const OBD_INCOMPAT_OST: u32 = 0x0000_0002;
pub const OBD_INCOMPAT_MDT: u32 = 0x0000_0004;

#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ServerData {
    pub uuid: Uuid,
    pub last_transno: u64,
    pub compat14: u64,
    pub mount_count: u64,
    pub feature_compat: u32,
    pub feature_rocompat: u32,
    pub feature_incompat: u32,
    pub server_size: u32,
    pub client_start: u32,
    pub client_size: u16,
    pub subdir_count: u16,
    pub catalog_oid: u64,
    pub catalog_ogen: u32,
    pub peer_uuid: Uuid,
    pub ost_index: u32,
    pub mdt_index: u32,
    pub padding: u32,
}

impl ServerData {
    /// Decode the leading record of a `last_rcvd` file. The file carries
    /// per-client slots after it; a file shorter than one record is fatal.
    pub fn from_file_bytes(bytes: &[u8]) -> Result<Self> {
        let (mut lsd, _) = Self::read_from_prefix(bytes).map_err(|_| {
            Error::RoleRecord(format!(
                "short read: {} of {} bytes",
                bytes.len(),
                std::mem::size_of::<Self>()
            ))
        })?;
        lsd.from_wire();
        Ok(lsd)
    }

    pub fn is_ost(&self) -> bool {
        self.feature_compat & OBD_COMPAT_OST != 0 || self.feature_incompat & OBD_INCOMPAT_OST != 0
    }

    pub fn is_mdt(&self) -> bool {
        self.feature_compat & OBD_COMPAT_MDT != 0 || self.feature_incompat & OBD_INCOMPAT_MDT != 0
    }

    /// Target index for the role the record claims, if it claims one.
    pub fn index(&self) -> Option<u32> {
        if self.is_ost() {
            Some(self.ost_index)
        } else if self.is_mdt() {
            Some(self.mdt_index)
        } else {
            None
        }
    }

    /// Fail when the record proves the device belongs to the other role.
    pub fn check_role(&self, scanning_as: Role) -> Result<()> {
        let other = match scanning_as {
            Role::Mds if self.is_ost() => Role::Ost,
            Role::Ost if self.is_mdt() => Role::Mds,
            _ => return Ok(()),
        };
        Err(Error::RoleMismatch(format!(
            "found {} last_rcvd file ({}) doing {} check",
            other,
            uuid_str(&self.uuid),
            scanning_as
        )))
    }
}

impl WireCodec for ServerData {
    fn to_wire(&mut self) {
        self.last_transno = self.last_transno.to_le();
        self.compat14 = self.compat14.to_le();
        self.mount_count = self.mount_count.to_le();
        self.feature_compat = self.feature_compat.to_le();
        self.feature_rocompat = self.feature_rocompat.to_le();
        self.feature_incompat = self.feature_incompat.to_le();
        self.server_size = self.server_size.to_le();
        self.client_start = self.client_start.to_le();
        self.client_size = self.client_size.to_le();
        self.subdir_count = self.subdir_count.to_le();
        self.catalog_oid = self.catalog_oid.to_le();
        self.catalog_ogen = self.catalog_ogen.to_le();
        self.ost_index = self.ost_index.to_le();
        self.mdt_index = self.mdt_index.to_le();
    }

    fn from_wire(&mut self) {
        self.last_transno = u64::from_le(self.last_transno);
        self.compat14 = u64::from_le(self.compat14);
        self.mount_count = u64::from_le(self.mount_count);
        self.feature_compat = u32::from_le(self.feature_compat);
        self.feature_rocompat = u32::from_le(self.feature_rocompat);
        self.feature_incompat = u32::from_le(self.feature_incompat);
        self.server_size = u32::from_le(self.server_size);
        self.client_start = u32::from_le(self.client_start);
        self.client_size = u16::from_le(self.client_size);
        self.subdir_count = u16::from_le(self.subdir_count);
        self.catalog_oid = u64::from_le(self.catalog_oid);
        self.catalog_ogen = u32::from_le(self.catalog_ogen);
        self.ost_index = u32::from_le(self.ost_index);
        self.mdt_index = u32::from_le(self.mdt_index);
    }
}
