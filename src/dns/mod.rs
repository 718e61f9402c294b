pub mod enums;
pub mod name;
pub mod rdata;
pub mod record;
pub mod wire;

pub use enums::{RecordClass, RecordType};
pub use name::{DomainName, NameError};
pub use rdata::{DnsKey, Ds, KeyRole, Nsec, Nsec3, RdataError, Rrsig};
pub use record::{Record, RrSet, SignedRrSet};
pub use wire::{Message, WireError};
