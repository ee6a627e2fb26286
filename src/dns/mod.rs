//! DNS wire codec: packet buffers, names, decoding and encoding.

pub mod consts;
pub mod decoder;
pub mod encoder;
pub mod name;
pub mod packet;

pub use consts::{
    RecordType, RrSection, MAX_NAME_LEN, MAX_PACKET_SIZE, MDNS_PORT, MDNS_V4_GROUP, MDNS_V6_GROUP,
    PACKAGE,
};
pub use decoder::DnsState;
pub use name::{DnsName, MatchName};
pub use packet::Packet;
