//! Network interface and socket handling.

pub mod interface;
pub mod socket;

pub use interface::{Interface, IpFamily};
pub use socket::{create_ipv4_socket, create_ipv6_socket};
