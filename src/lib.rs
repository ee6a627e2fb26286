//! mdns-bridge - a filtering mDNS bridge between network segments.
//!
//! This library provides the per-packet pipeline of an mDNS bridging
//! daemon: decoding with pointer-compressed name parsing, filter
//! evaluation by domain-name fragments, re-encoding with a fresh name
//! compression dictionary, and the per-family bridge workers that fan
//! packets out to peer interfaces.

pub mod bridge;
pub mod config;
pub mod dns;
pub mod error;
pub mod filter;
pub mod net;

#[cfg(test)]
pub mod testutil;

pub use bridge::{MdnsBridge, SharedState};
pub use config::{Config, ResolvedConfig};
pub use dns::{DnsName, DnsState, MatchName, Packet, RecordType, MDNS_PORT, PACKAGE};
pub use error::{DecodeError, EncodeError, Error, Result};
pub use filter::{FilterAction, FilterList};
pub use net::{Interface, IpFamily};
