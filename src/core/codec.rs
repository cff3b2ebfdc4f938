//! Host/wire conversion for the fixed-layout records.
//!
//! Every record is stored little-endian. The conversions below run in
//! place, one field at a time, and never validate anything: magic and
//! version checks belong to whoever decoded the record.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::common::{Error, Result};

pub trait WireCodec: FromBytes + IntoBytes + KnownLayout + Immutable + Clone + Sized {
    /// Convert every multi-byte field from host order to little-endian.
    fn to_wire(&mut self);

    /// Convert every multi-byte field from little-endian to host order.
    fn from_wire(&mut self);

    /// Wire bytes of a host-order record.
    fn encode(&self) -> Vec<u8> {
        let mut wire = self.clone();
        wire.to_wire();
        wire.as_bytes().to_vec()
    }

    /// Host-order record from exactly `size_of::<Self>()` wire bytes.
    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut record = Self::read_from_bytes(bytes).map_err(|_| {
            Error::Codec(format!(
                "expected {} bytes for {}, got {}",
                std::mem::size_of::<Self>(),
                std::any::type_name::<Self>(),
                bytes.len()
            ))
        })?;
        record.from_wire();
        Ok(record)
    }
}

/// Store key for records addressed by a 64-bit id (object ids, magics).
pub fn u64_key(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}
