//! Error types for mdns-bridge.

use thiserror::Error;

/// Errors that can occur during bridge setup and operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid DNS name in a filter definition.
    #[error("invalid DNS name \"{0}\"")]
    InvalidName(String),

    /// Interface not found on this host.
    #[error("interface \"{0}\" does not exist")]
    InterfaceNotFound(String),

    /// Network I/O error.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for mdns-bridge operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Per-packet decode failures. These drop the offending packet and are
/// logged once; the worker continues.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Packet smaller than the fixed DNS header.
    #[error("packet too small for DNS header")]
    TooShort,

    /// Compression pointer into the header or at/after its own position.
    #[error("bad label pointer in a name (target {target}, label at {at})")]
    BadPointer { target: usize, at: usize },

    /// Label length byte with a reserved top-two-bit combination.
    #[error("reserved label type {0:#04x} in a name")]
    ReservedLabel(u8),

    /// More labels than a legal name can carry.
    #[error("too many labels in a name")]
    TooManyLabels,

    /// Label copy would overrun the packet or the name buffer.
    #[error("name overrun")]
    NameOverrun,

    /// Advertised query count above the hard cap.
    #[error("too many queries ({0})")]
    TooManyQueries(u16),

    /// Advertised resource record count above the hard cap.
    #[error("too many resource records ({0})")]
    TooManyRecords(u16),

    /// Query header extends past the end of the packet.
    #[error("malformed query")]
    TruncatedQuery,

    /// Resource record header extends past the end of the packet.
    #[error("malformed {0} record")]
    TruncatedRecord(&'static str),

    /// RDATA length of zero or extending past the end of the packet.
    #[error("invalid rdata length in {0} record")]
    RdataLength(&'static str),

    /// Embedded RDATA name does not fill its declared length.
    #[error("rdata name corruption in {0} record")]
    RdataName(&'static str),

    /// Decoded length differs from the received length.
    #[error("decoded length ({decoded}) != packet length ({received})")]
    TrailingBytes { decoded: usize, received: usize },

    /// Scratch array growth failed.
    #[error("cannot allocate memory for packet scratch")]
    OutOfMemory,
}

/// Per-variant encode failures. The outbound datagram for the affected
/// filter variant is dropped; other variants and packets are unaffected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Re-encoded packet would exceed the maximum mDNS packet size.
    #[error("encoded packet exceeds maximum packet size")]
    Oversize,

    /// Compression dictionary growth failed.
    #[error("cannot allocate memory for compression dictionary")]
    OutOfMemory,
}
