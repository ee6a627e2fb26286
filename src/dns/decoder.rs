//! mDNS packet decoding with inbound filtering.
//!
//! The decoder populates worker-local scratch state: parsed queries and
//! resource records referencing the received buffer, with their owner
//! names (and RDATA names where applicable) decompressed into fixed
//! buffers. Records rejected by the inbound filters are simply not kept.

use tracing::warn;

use crate::dns::consts::{
    query_filter_target, rr_filter_target, FilterTarget, RecordType, RrSection, DNS_HEADER_LEN,
    INITIAL_QUERY_COUNT, INITIAL_RR_COUNT, MAX_QUERY_COUNT, MAX_RR_COUNT, QUERY_HEADER_LEN,
    RR_HEADER_LEN, SRV_DATA_LEN,
};
use crate::dns::encoder::CompressionDict;
use crate::dns::name::DnsName;
use crate::dns::packet::Packet;
use crate::error::DecodeError;
use crate::filter::InboundFilters;

/// A parsed query: owner name, type, and the offset of the fixed query
/// header in the source buffer.
#[derive(Clone)]
pub struct QueryRecord {
    pub name: DnsName,
    pub qtype: RecordType,
    pub header: usize,
}

impl Default for QueryRecord {
    fn default() -> Self {
        Self {
            name: DnsName::default(),
            qtype: RecordType::A,
            header: 0,
        }
    }
}

/// A parsed resource record: owner name, type, offset of the fixed RR
/// header in the source buffer, RDATA length, secondary-data length for
/// types carrying both a name and adjacent bytes, and the decoded RDATA
/// name where applicable.
#[derive(Clone)]
pub struct ResourceRecord {
    pub name: DnsName,
    pub rtype: RecordType,
    pub header: usize,
    pub rdata_len: usize,
    pub secondary_len: usize,
    pub rdata_name: DnsName,
}

impl Default for ResourceRecord {
    fn default() -> Self {
        Self {
            name: DnsName::default(),
            rtype: RecordType::A,
            header: 0,
            rdata_len: 0,
            secondary_len: 0,
            rdata_name: DnsName::default(),
        }
    }
}

/// Worker-local decode/encode scratch state.
///
/// The query and record arrays and the compression dictionary grow
/// monotonically up to the hard caps and are reset (not shrunk) at the
/// start of each incoming packet.
pub struct DnsState {
    pub(crate) queries: Vec<QueryRecord>,
    pub(crate) query_count: usize,
    pub(crate) rrs: Vec<ResourceRecord>,
    pub(crate) rr_index: [usize; 3],
    pub(crate) rr_count: [usize; 3],
    pub(crate) total_rr_count: usize,
    recv_query_count: usize,
    recv_rr_count: [usize; 3],
    pub(crate) dict: CompressionDict,
}

impl DnsState {
    /// Create the scratch state with its initial capacities.
    pub fn new() -> Self {
        let mut queries = Vec::with_capacity(INITIAL_QUERY_COUNT);
        queries.resize_with(INITIAL_QUERY_COUNT, QueryRecord::default);
        let mut rrs = Vec::with_capacity(INITIAL_RR_COUNT);
        rrs.resize_with(INITIAL_RR_COUNT, ResourceRecord::default);

        Self {
            queries,
            query_count: 0,
            rrs,
            rr_index: [0; 3],
            rr_count: [0; 3],
            total_rr_count: 0,
            recv_query_count: 0,
            recv_rr_count: [0; 3],
            dict: CompressionDict::new(),
        }
    }

    /// True when every query and record was filtered out (or none were
    /// present).
    pub fn is_empty(&self) -> bool {
        self.query_count == 0 && self.total_rr_count == 0
    }

    /// True when inbound filtering rejected at least one query or record,
    /// so the received bytes no longer represent the kept set.
    pub fn any_filtered(&self) -> bool {
        self.query_count != self.recv_query_count
            || self.total_rr_count != self.recv_rr_count.iter().sum::<usize>()
    }

    /// Number of kept queries.
    pub fn kept_queries(&self) -> usize {
        self.query_count
    }

    /// Number of kept records in `section`.
    pub fn kept_records(&self, section: RrSection) -> usize {
        self.rr_count[section.index()]
    }

    /// Decode `packet` and apply inbound filtering.
    ///
    /// On success the scratch state holds the kept queries and records;
    /// use [`DnsState::is_empty`] to detect a fully filtered packet. Any
    /// error drops the whole packet.
    pub fn decode(
        &mut self,
        packet: &Packet,
        inbound: InboundFilters<'_>,
        warn_unsupported: bool,
    ) -> Result<(), DecodeError> {
        self.query_count = 0;
        self.rr_index = [0; 3];
        self.rr_count = [0; 3];
        self.total_rr_count = 0;

        let mut offset = self.decode_header(packet)?;

        if self.recv_query_count > 0 {
            offset = self.decode_queries(packet, offset, inbound, warn_unsupported)?;
        }

        for section in RrSection::ALL {
            if self.recv_rr_count[section.index()] > 0 {
                offset = self.decode_rrs(packet, offset, section, inbound, warn_unsupported)?;
            }
        }

        if offset != packet.len() {
            return Err(DecodeError::TrailingBytes {
                decoded: offset,
                received: packet.len(),
            });
        }

        Ok(())
    }

    /// Decode the fixed header and size the scratch arrays for the
    /// advertised counts.
    fn decode_header(&mut self, packet: &Packet) -> Result<usize, DecodeError> {
        let data = packet.data();
        if data.len() < DNS_HEADER_LEN {
            return Err(DecodeError::TooShort);
        }

        self.recv_query_count = read_u16(data, 4) as usize;
        self.recv_rr_count[RrSection::Answer.index()] = read_u16(data, 6) as usize;
        self.recv_rr_count[RrSection::Authority.index()] = read_u16(data, 8) as usize;
        self.recv_rr_count[RrSection::Additional.index()] = read_u16(data, 10) as usize;

        if self.recv_query_count > MAX_QUERY_COUNT {
            return Err(DecodeError::TooManyQueries(self.recv_query_count as u16));
        }
        let total_rr_count: usize = self.recv_rr_count.iter().sum();
        if total_rr_count > MAX_RR_COUNT {
            return Err(DecodeError::TooManyRecords(total_rr_count as u16));
        }

        if self.recv_query_count > self.queries.len() {
            let grow = self.recv_query_count - self.queries.len();
            self.queries
                .try_reserve(grow)
                .map_err(|_| DecodeError::OutOfMemory)?;
            self.queries
                .resize_with(self.recv_query_count, QueryRecord::default);
        }
        if total_rr_count > self.rrs.len() {
            let grow = total_rr_count - self.rrs.len();
            self.rrs
                .try_reserve(grow)
                .map_err(|_| DecodeError::OutOfMemory)?;
            self.rrs.resize_with(total_rr_count, ResourceRecord::default);
        }

        Ok(DNS_HEADER_LEN)
    }

    /// Decode the query section, applying inbound filtering.
    fn decode_queries(
        &mut self,
        packet: &Packet,
        mut offset: usize,
        inbound: InboundFilters<'_>,
        warn_unsupported: bool,
    ) -> Result<usize, DecodeError> {
        let data = packet.data();

        for _ in 0..self.recv_query_count {
            let query = &mut self.queries[self.query_count];

            offset = query.name.read(data, offset)?;
            if offset + QUERY_HEADER_LEN > data.len() {
                return Err(DecodeError::TruncatedQuery);
            }
            query.header = offset;
            query.qtype = RecordType::from_u16(read_u16(data, offset));
            offset += QUERY_HEADER_LEN;

            let allowed = match query_filter_target(query.qtype) {
                FilterTarget::Owner => inbound.admits(&query.name),
                FilterTarget::Unfiltered | FilterTarget::Rdata => true,
                FilterTarget::Unsupported => {
                    if warn_unsupported {
                        warn!(
                            "host {}: unsupported query type {} (dropped) (name {})",
                            packet.src_display(),
                            query.qtype.to_u16(),
                            query.name
                        );
                    }
                    false
                }
            };

            if allowed {
                self.query_count += 1;
            }
        }

        Ok(offset)
    }

    /// Decode one resource record section, applying inbound filtering.
    fn decode_rrs(
        &mut self,
        packet: &Packet,
        mut offset: usize,
        section: RrSection,
        inbound: InboundFilters<'_>,
        warn_unsupported: bool,
    ) -> Result<usize, DecodeError> {
        let data = packet.data();

        self.rr_index[section.index()] = self.total_rr_count;

        for _ in 0..self.recv_rr_count[section.index()] {
            let rr = &mut self.rrs[self.total_rr_count];

            offset = rr.name.read(data, offset)?;
            if offset + RR_HEADER_LEN > data.len() {
                return Err(DecodeError::TruncatedRecord(section.name()));
            }
            rr.header = offset;
            rr.rtype = RecordType::from_u16(read_u16(data, offset));
            let rdata_len = read_u16(data, offset + 8) as usize;
            offset += RR_HEADER_LEN;

            if rdata_len == 0 || offset + rdata_len > data.len() {
                return Err(DecodeError::RdataLength(section.name()));
            }
            rr.rdata_len = rdata_len;
            rr.secondary_len = 0;

            let allowed = match rr_filter_target(rr.rtype) {
                FilterTarget::Owner => inbound.admits(&rr.name),
                FilterTarget::Rdata => {
                    let end = rr.rdata_name.read(data, offset)?;
                    if end != offset + rdata_len {
                        return Err(DecodeError::RdataName(section.name()));
                    }
                    inbound.admits(&rr.rdata_name)
                }
                FilterTarget::Unfiltered => true,
                FilterTarget::Unsupported => {
                    if warn_unsupported {
                        warn!(
                            "host {}: unsupported type {} in {} record (dropped) (name {}, data len {})",
                            packet.src_display(),
                            rr.rtype.to_u16(),
                            section.name(),
                            rr.name,
                            rdata_len
                        );
                    }
                    false
                }
            };

            // Types carrying both a name and adjacent bytes in RDATA.
            if allowed {
                match rr.rtype {
                    RecordType::SRV => {
                        rr.secondary_len = SRV_DATA_LEN;
                        let end = rr.rdata_name.read(data, offset + SRV_DATA_LEN)?;
                        if end != offset + rdata_len {
                            return Err(DecodeError::RdataName(section.name()));
                        }
                    }
                    RecordType::NSEC => {
                        let end = rr.rdata_name.read(data, offset)?;
                        if end > offset + rdata_len {
                            return Err(DecodeError::RdataName(section.name()));
                        }
                        rr.secondary_len = rdata_len - (end - offset);
                    }
                    _ => {}
                }
            }

            offset += rdata_len;

            if allowed {
                self.rr_count[section.index()] += 1;
                self.total_rr_count += 1;
            }
        }

        Ok(offset)
    }
}

impl Default for DnsState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a big-endian u16 at `offset`.
pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterAction, FilterList};
    use crate::testutil::PacketBuilder;

    fn decode(state: &mut DnsState, bytes: &[u8]) -> Result<(), DecodeError> {
        let packet = Packet::from_slice(bytes);
        state.decode(&packet, InboundFilters::default(), false)
    }

    #[test]
    fn test_decode_query_packet() {
        let bytes = PacketBuilder::query()
            .question("_googlecast._tcp.local", RecordType::PTR)
            .build();

        let mut state = DnsState::new();
        decode(&mut state, &bytes).unwrap();

        assert_eq!(state.kept_queries(), 1);
        assert_eq!(state.queries[0].qtype, RecordType::PTR);
        assert_eq!(state.queries[0].name.to_string(), "_googlecast._tcp.local");
        assert!(!state.is_empty());
        assert!(!state.any_filtered());
    }

    #[test]
    fn test_decode_response_with_ptr() {
        let bytes = PacketBuilder::response()
            .ptr("_ipp._tcp.local", 4500, "Office._ipp._tcp.local")
            .build();

        let mut state = DnsState::new();
        decode(&mut state, &bytes).unwrap();

        assert_eq!(state.kept_records(RrSection::Answer), 1);
        let rr = &state.rrs[0];
        assert_eq!(rr.rtype, RecordType::PTR);
        assert_eq!(rr.name.to_string(), "_ipp._tcp.local");
        assert_eq!(rr.rdata_name.to_string(), "Office._ipp._tcp.local");
    }

    #[test]
    fn test_decode_srv_record() {
        let bytes = PacketBuilder::response()
            .srv("Office._ipp._tcp.local", 120, 0, 0, 631, "host.local")
            .build();

        let mut state = DnsState::new();
        decode(&mut state, &bytes).unwrap();

        let rr = &state.rrs[0];
        assert_eq!(rr.rtype, RecordType::SRV);
        assert_eq!(rr.secondary_len, SRV_DATA_LEN);
        assert_eq!(rr.rdata_name.to_string(), "host.local");
    }

    #[test]
    fn test_decode_nsec_records_secondary_len() {
        let bytes = PacketBuilder::response()
            .nsec("host.local", 120, "host.local", &[0x00, 0x01, 0x40, 0x00])
            .build();

        let mut state = DnsState::new();
        decode(&mut state, &bytes).unwrap();

        let rr = &state.rrs[0];
        assert_eq!(rr.rtype, RecordType::NSEC);
        assert_eq!(rr.secondary_len, 4);
        assert_eq!(rr.rdata_name.to_string(), "host.local");
    }

    #[test]
    fn test_too_short_packet() {
        let mut state = DnsState::new();
        assert_eq!(
            decode(&mut state, &[0x00, 0x00, 0x00]),
            Err(DecodeError::TooShort)
        );
    }

    #[test]
    fn test_oversized_counts_rejected() {
        let mut bytes = PacketBuilder::query().build();
        bytes[4] = 0x06; // 1536 queries
        bytes[5] = 0x00;
        let mut state = DnsState::new();
        assert_eq!(
            decode(&mut state, &bytes),
            Err(DecodeError::TooManyQueries(1536))
        );

        let mut bytes = PacketBuilder::query().build();
        bytes[6] = 0x03; // 768 answers
        bytes[7] = 0x00;
        assert_eq!(
            decode(&mut state, &bytes),
            Err(DecodeError::TooManyRecords(768))
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = PacketBuilder::query()
            .question("host.local", RecordType::A)
            .build();
        bytes.push(0x00);

        let mut state = DnsState::new();
        assert!(matches!(
            decode(&mut state, &bytes),
            Err(DecodeError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn test_bad_pointer_drops_packet() {
        // An answer whose RDATA name points at offset 5, inside the header.
        let bytes = PacketBuilder::response()
            .raw_rr("printer.local", RecordType::PTR, 4500, &[0xc0, 0x05])
            .build();

        let mut state = DnsState::new();
        assert_eq!(
            decode(&mut state, &bytes),
            Err(DecodeError::BadPointer { target: 5, at: 37 })
        );
    }

    #[test]
    fn test_rdata_name_must_fill_rdata() {
        // PTR RDATA declares 12 bytes but the name only uses 11.
        let mut builder = PacketBuilder::response();
        let mut rdata = Vec::new();
        for label in ["host", "local"] {
            rdata.push(label.len() as u8);
            rdata.extend_from_slice(label.as_bytes());
        }
        rdata.push(0);
        rdata.push(0xff); // trailing junk inside RDATA
        builder = builder.raw_rr("x.local", RecordType::PTR, 120, &rdata);
        let bytes = builder.build();

        let mut state = DnsState::new();
        assert_eq!(
            decode(&mut state, &bytes),
            Err(DecodeError::RdataName("answer"))
        );
    }

    #[test]
    fn test_zero_rdata_len_rejected() {
        let bytes = PacketBuilder::response()
            .raw_rr("host.local", RecordType::TXT, 120, &[])
            .build();

        let mut state = DnsState::new();
        assert_eq!(
            decode(&mut state, &bytes),
            Err(DecodeError::RdataLength("answer"))
        );
    }

    #[test]
    fn test_rdata_overrun_rejected() {
        let mut bytes = PacketBuilder::response()
            .raw_rr("host.local", RecordType::TXT, 120, &[0x04, b'a', b'b', b'c'])
            .build();
        let len = bytes.len();
        bytes.truncate(len - 2);

        let mut state = DnsState::new();
        assert_eq!(
            decode(&mut state, &bytes),
            Err(DecodeError::RdataLength("answer"))
        );
    }

    #[test]
    fn test_unsupported_rr_dropped_record_not_packet() {
        // One A record and one MX record: the MX is dropped, the A kept.
        let bytes = PacketBuilder::response()
            .a("host.local", 120, [192, 168, 1, 1])
            .raw_rr(
                "host.local",
                RecordType::Unknown(15),
                120,
                &[0x00, 0x0a, 0x04, b'm', b'a', b'i', b'l', 0x00],
            )
            .build();

        let mut state = DnsState::new();
        decode(&mut state, &bytes).unwrap();

        assert_eq!(state.kept_records(RrSection::Answer), 1);
        assert_eq!(state.rrs[0].rtype, RecordType::A);
        assert!(state.any_filtered());
    }

    #[test]
    fn test_unsupported_query_dropped() {
        let bytes = PacketBuilder::query()
            .question("host.local", RecordType::Unknown(15))
            .question("host.local", RecordType::A)
            .build();

        let mut state = DnsState::new();
        decode(&mut state, &bytes).unwrap();

        assert_eq!(state.kept_queries(), 1);
        assert_eq!(state.queries[0].qtype, RecordType::A);
    }

    #[test]
    fn test_inbound_filter_on_owner_name() {
        let bytes = PacketBuilder::response()
            .srv("Office._ipp._tcp.local", 120, 0, 0, 631, "host.local")
            .srv("Laptop._ssh._tcp.local", 120, 0, 0, 22, "host.local")
            .build();

        let global = FilterList::new(FilterAction::Allow, &["_ipp".to_string()]).unwrap();
        let inbound = InboundFilters {
            global: Some(&global),
            interface: None,
        };

        let mut state = DnsState::new();
        let packet = Packet::from_slice(&bytes);
        state.decode(&packet, inbound, false).unwrap();

        assert_eq!(state.kept_records(RrSection::Answer), 1);
        assert_eq!(state.rrs[0].name.to_string(), "Office._ipp._tcp.local");
        assert!(state.any_filtered());
    }

    #[test]
    fn test_inbound_filter_on_rdata_name() {
        let bytes = PacketBuilder::response()
            .ptr("_services._dns-sd._udp.local", 120, "Den._airplay._tcp.local")
            .ptr("_services._dns-sd._udp.local", 120, "NAS._smb._tcp.local")
            .build();

        let global = FilterList::new(FilterAction::Deny, &["_smb".to_string()]).unwrap();
        let inbound = InboundFilters {
            global: Some(&global),
            interface: None,
        };

        let mut state = DnsState::new();
        let packet = Packet::from_slice(&bytes);
        state.decode(&packet, inbound, false).unwrap();

        assert_eq!(state.kept_records(RrSection::Answer), 1);
        assert_eq!(
            state.rrs[0].rdata_name.to_string(),
            "Den._airplay._tcp.local"
        );
    }

    #[test]
    fn test_a_records_not_filtered() {
        let bytes = PacketBuilder::response()
            .a("host.local", 120, [192, 168, 1, 1])
            .build();

        // A DENY list that would match the owner name; A records are
        // not subject to filtering.
        let global = FilterList::new(FilterAction::Deny, &["host".to_string()]).unwrap();
        let inbound = InboundFilters {
            global: Some(&global),
            interface: None,
        };

        let mut state = DnsState::new();
        let packet = Packet::from_slice(&bytes);
        state.decode(&packet, inbound, false).unwrap();

        assert_eq!(state.kept_records(RrSection::Answer), 1);
    }

    #[test]
    fn test_all_filtered_is_empty() {
        let bytes = PacketBuilder::response()
            .srv("Laptop._ssh._tcp.local", 120, 0, 0, 22, "host.local")
            .build();

        let global = FilterList::new(FilterAction::Allow, &["_ipp".to_string()]).unwrap();
        let inbound = InboundFilters {
            global: Some(&global),
            interface: None,
        };

        let mut state = DnsState::new();
        let packet = Packet::from_slice(&bytes);
        state.decode(&packet, inbound, false).unwrap();

        assert!(state.is_empty());
        assert!(state.any_filtered());
    }

    #[test]
    fn test_scratch_reused_across_packets() {
        let mut state = DnsState::new();

        let first = PacketBuilder::response()
            .a("host.local", 120, [10, 0, 0, 1])
            .a("other.local", 120, [10, 0, 0, 2])
            .build();
        decode(&mut state, &first).unwrap();
        assert_eq!(state.kept_records(RrSection::Answer), 2);

        let second = PacketBuilder::response()
            .a("third.local", 120, [10, 0, 0, 3])
            .build();
        decode(&mut state, &second).unwrap();
        assert_eq!(state.kept_records(RrSection::Answer), 1);
        assert_eq!(state.rrs[0].name.to_string(), "third.local");
    }

    #[test]
    fn test_sections_indexed_independently() {
        let bytes = PacketBuilder::response()
            .a("a.local", 120, [10, 0, 0, 1])
            .authority_ptr("_x._tcp.local", 120, "A._x._tcp.local")
            .additional_a("b.local", 120, [10, 0, 0, 2])
            .build();

        let mut state = DnsState::new();
        decode(&mut state, &bytes).unwrap();

        assert_eq!(state.kept_records(RrSection::Answer), 1);
        assert_eq!(state.kept_records(RrSection::Authority), 1);
        assert_eq!(state.kept_records(RrSection::Additional), 1);
        assert_eq!(state.rr_index, [0, 1, 2]);
        assert_eq!(state.rrs[1].rtype, RecordType::PTR);
        assert_eq!(state.rrs[2].name.to_string(), "b.local");
    }
}
