pub mod codec;
pub mod fid;
pub mod layout;
pub mod records;
pub mod server_data;

pub use codec::{WireCodec, u64_key};
pub use fid::{Fid, ObjectId};
pub use layout::{LayoutAttr, LovOstData, MdtAttrs};
pub use records::*;
pub use server_data::ServerData;
