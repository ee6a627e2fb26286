//! Constants and enums for DNS wire operations.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Package name.
pub const PACKAGE: &str = "mdns-bridge";

/// mDNS IPv4 multicast group.
pub const MDNS_V4_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// mDNS IPv6 multicast group.
pub const MDNS_V6_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// mDNS port.
pub const MDNS_PORT: u16 = 5353;

/// Maximum packet size for mDNS per RFC 6762, section 18. Note that this
/// size includes the IP/UDP headers, so actual payloads will be smaller.
pub const MAX_PACKET_SIZE: usize = 9000;

/// Fixed DNS message header length.
pub const DNS_HEADER_LEN: usize = 12;

/// Fixed query header length (type + class), following the owner name.
pub const QUERY_HEADER_LEN: usize = 4;

/// Fixed resource record header length (type + class + TTL + RDATA
/// length), following the owner name.
pub const RR_HEADER_LEN: usize = 10;

/// Fixed SRV RDATA prefix (priority + weight + port), preceding the
/// target name.
pub const SRV_DATA_LEN: usize = 6;

/// Maximum decoded name length, including the terminating zero byte.
pub const MAX_NAME_LEN: usize = 256;

/// Maximum label length, excluding the leading length byte.
pub const MAX_LABEL_LEN: usize = 63;

/// Size of the per-label offset table; a decoded name carries fewer
/// labels than this, terminator included.
pub const MAX_NAME_LABELS: usize = 128;

/// Initial query scratch capacity.
pub const INITIAL_QUERY_COUNT: usize = 25;

/// Initial resource record scratch capacity.
pub const INITIAL_RR_COUNT: usize = 50;

/// Hard cap on queries in a single packet.
pub const MAX_QUERY_COUNT: usize = 1498;

/// Hard cap on resource records in a single packet.
pub const MAX_RR_COUNT: usize = 749;

/// DNS record types handled on the bridge hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    A,
    CNAME,
    PTR,
    HINFO,
    TXT,
    AAAA,
    SRV,
    DNAME,
    OPT,
    NSEC,
    SVCB,
    HTTPS,
    ANY,
    /// Unknown record type with raw value.
    Unknown(u16),
}

impl RecordType {
    /// Convert from a raw u16 value.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            5 => RecordType::CNAME,
            12 => RecordType::PTR,
            13 => RecordType::HINFO,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            39 => RecordType::DNAME,
            41 => RecordType::OPT,
            47 => RecordType::NSEC,
            64 => RecordType::SVCB,
            65 => RecordType::HTTPS,
            255 => RecordType::ANY,
            _ => RecordType::Unknown(value),
        }
    }

    /// Convert to raw u16 value.
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::CNAME => 5,
            RecordType::PTR => 12,
            RecordType::HINFO => 13,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::DNAME => 39,
            RecordType::OPT => 41,
            RecordType::NSEC => 47,
            RecordType::SVCB => 64,
            RecordType::HTTPS => 65,
            RecordType::ANY => 255,
            RecordType::Unknown(v) => v,
        }
    }

    /// Get human-readable name for the record type.
    pub fn name(&self) -> String {
        match self {
            RecordType::A => "A".to_string(),
            RecordType::CNAME => "CNAME".to_string(),
            RecordType::PTR => "PTR".to_string(),
            RecordType::HINFO => "HINFO".to_string(),
            RecordType::TXT => "TXT".to_string(),
            RecordType::AAAA => "AAAA".to_string(),
            RecordType::SRV => "SRV".to_string(),
            RecordType::DNAME => "DNAME".to_string(),
            RecordType::OPT => "OPT".to_string(),
            RecordType::NSEC => "NSEC".to_string(),
            RecordType::SVCB => "SVCB".to_string(),
            RecordType::HTTPS => "HTTPS".to_string(),
            RecordType::ANY => "ANY".to_string(),
            RecordType::Unknown(v) => format!("TYPE{}", v),
        }
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        value.to_u16()
    }
}

/// Resource record section of a DNS message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrSection {
    Answer,
    Authority,
    Additional,
}

impl RrSection {
    /// All sections, in wire order.
    pub const ALL: [RrSection; 3] = [RrSection::Answer, RrSection::Authority, RrSection::Additional];

    /// Index into per-section scratch arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable section name for log messages.
    pub fn name(self) -> &'static str {
        match self {
            RrSection::Answer => "answer",
            RrSection::Authority => "authority",
            RrSection::Additional => "additional",
        }
    }
}

/// Which name a record is filtered on, shared by the decoder (inbound
/// lists) and the encoder (outbound lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    /// Filter on the owner name.
    Owner,
    /// Filter on the name embedded in the RDATA section.
    Rdata,
    /// Forward without filtering.
    Unfiltered,
    /// Drop the record; not handled on the hot path.
    Unsupported,
}

/// Filter target for a query of the given type.
pub fn query_filter_target(rtype: RecordType) -> FilterTarget {
    match rtype {
        RecordType::SRV
        | RecordType::TXT
        | RecordType::SVCB
        | RecordType::HTTPS
        | RecordType::ANY => FilterTarget::Owner,
        RecordType::A | RecordType::AAAA | RecordType::PTR | RecordType::OPT => {
            FilterTarget::Unfiltered
        }
        _ => FilterTarget::Unsupported,
    }
}

/// Filter target for a resource record of the given type.
pub fn rr_filter_target(rtype: RecordType) -> FilterTarget {
    match rtype {
        RecordType::SRV
        | RecordType::TXT
        | RecordType::HINFO
        | RecordType::SVCB
        | RecordType::HTTPS => FilterTarget::Owner,
        RecordType::PTR | RecordType::CNAME | RecordType::DNAME => FilterTarget::Rdata,
        RecordType::A | RecordType::AAAA | RecordType::OPT | RecordType::NSEC => {
            FilterTarget::Unfiltered
        }
        _ => FilterTarget::Unsupported,
    }
}
