//! Test helpers: hand-assembled wire packets.

use crate::dns::consts::RecordType;

/// Encode a dotted name as uncompressed wire labels.
pub fn wire_name(dotted: &str) -> Vec<u8> {
    let mut wire = Vec::new();
    for label in dotted.split('.') {
        wire.push(label.len() as u8);
        wire.extend_from_slice(label.as_bytes());
    }
    wire.push(0);
    wire
}

/// Builder for test mDNS packets with uncompressed names.
pub struct PacketBuilder {
    id: u16,
    flags: u16,
    questions: Vec<Vec<u8>>,
    answers: Vec<Vec<u8>>,
    authorities: Vec<Vec<u8>>,
    additionals: Vec<Vec<u8>>,
}

impl PacketBuilder {
    /// Start a query packet (flags 0x0000).
    pub fn query() -> Self {
        Self::with_flags(0x0000)
    }

    /// Start an authoritative response packet (flags 0x8400).
    pub fn response() -> Self {
        Self::with_flags(0x8400)
    }

    fn with_flags(flags: u16) -> Self {
        Self {
            id: 0,
            flags,
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    pub fn id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn question(mut self, name: &str, qtype: RecordType) -> Self {
        let mut bytes = wire_name(name);
        bytes.extend_from_slice(&qtype.to_u16().to_be_bytes());
        bytes.extend_from_slice(&0x0001u16.to_be_bytes());
        self.questions.push(bytes);
        self
    }

    fn rr(name: &str, rtype: RecordType, ttl: u32, rdata: &[u8]) -> Vec<u8> {
        let mut bytes = wire_name(name);
        bytes.extend_from_slice(&rtype.to_u16().to_be_bytes());
        bytes.extend_from_slice(&0x0001u16.to_be_bytes());
        bytes.extend_from_slice(&ttl.to_be_bytes());
        bytes.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        bytes.extend_from_slice(rdata);
        bytes
    }

    /// Add an answer record with raw RDATA bytes.
    pub fn raw_rr(mut self, name: &str, rtype: RecordType, ttl: u32, rdata: &[u8]) -> Self {
        self.answers.push(Self::rr(name, rtype, ttl, rdata));
        self
    }

    /// Add an answer A record.
    pub fn a(self, name: &str, ttl: u32, addr: [u8; 4]) -> Self {
        self.raw_rr(name, RecordType::A, ttl, &addr)
    }

    /// Add an answer PTR record with an uncompressed target name.
    pub fn ptr(self, name: &str, ttl: u32, target: &str) -> Self {
        let rdata = wire_name(target);
        self.raw_rr(name, RecordType::PTR, ttl, &rdata)
    }

    /// Add an answer SRV record.
    pub fn srv(
        self,
        name: &str,
        ttl: u32,
        priority: u16,
        weight: u16,
        port: u16,
        target: &str,
    ) -> Self {
        let mut rdata = Vec::new();
        rdata.extend_from_slice(&priority.to_be_bytes());
        rdata.extend_from_slice(&weight.to_be_bytes());
        rdata.extend_from_slice(&port.to_be_bytes());
        rdata.extend_from_slice(&wire_name(target));
        self.raw_rr(name, RecordType::SRV, ttl, &rdata)
    }

    /// Add an answer NSEC record: next name followed by a type bitmap.
    pub fn nsec(self, name: &str, ttl: u32, next: &str, bitmap: &[u8]) -> Self {
        let mut rdata = wire_name(next);
        rdata.extend_from_slice(bitmap);
        self.raw_rr(name, RecordType::NSEC, ttl, &rdata)
    }

    /// Add an authority PTR record.
    pub fn authority_ptr(mut self, name: &str, ttl: u32, target: &str) -> Self {
        let rdata = wire_name(target);
        self.authorities.push(Self::rr(name, RecordType::PTR, ttl, &rdata));
        self
    }

    /// Add an additional A record.
    pub fn additional_a(mut self, name: &str, ttl: u32, addr: [u8; 4]) -> Self {
        self.additionals.push(Self::rr(name, RecordType::A, ttl, &addr));
        self
    }

    /// Assemble the packet bytes.
    pub fn build(self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.id.to_be_bytes());
        bytes.extend_from_slice(&self.flags.to_be_bytes());
        bytes.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&(self.authorities.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&(self.additionals.len() as u16).to_be_bytes());
        for section in [self.questions, self.answers, self.authorities, self.additionals] {
            for record in section {
                bytes.extend_from_slice(&record);
            }
        }
        bytes
    }
}
