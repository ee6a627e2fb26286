//! mDNS packet encoding with name compression and outbound filtering.
//!
//! The compression dictionary is an arena of entries indexed by
//! parent-to-children ranges rather than a pointer-linked tree, so it
//! survives reallocation and resets with a single copy of the seed.

use crate::dns::consts::{
    query_filter_target, rr_filter_target, FilterTarget, RecordType, RrSection, DNS_HEADER_LEN,
    QUERY_HEADER_LEN, RR_HEADER_LEN, SRV_DATA_LEN,
};
use crate::dns::decoder::DnsState;
use crate::dns::name::DnsName;
use crate::dns::packet::Packet;
use crate::error::EncodeError;
use crate::filter::{allowed_outbound, FilterList};

/// Length-prefixed label storage in a dictionary entry: one length byte
/// plus up to 63 label bytes.
const LABEL_STORE: usize = 64;

/// One compression dictionary entry: a label, its range of children in
/// the arena, and the wire back-pointer value once the label has been
/// emitted into the current outbound packet.
#[derive(Clone, Copy)]
struct Entry {
    label: [u8; LABEL_STORE],
    child_index: u16,
    child_allocated: u16,
    child_used: u16,
    pointer: u16,
}

impl Entry {
    const EMPTY: Entry = Entry {
        label: [0; LABEL_STORE],
        child_index: 0,
        child_allocated: 0,
        child_used: 0,
        pointer: 0,
    };

    fn label_bytes(&self) -> &[u8] {
        let len = self.label[0] as usize;
        &self.label[..len + 1]
    }

    fn set_label(&mut self, label: &[u8]) {
        self.label[..label.len()].copy_from_slice(label);
    }
}

const fn seed_entry(label: &[u8], child_index: u16, child_allocated: u16, child_used: u16) -> Entry {
    let mut stored = [0u8; LABEL_STORE];
    let mut i = 0;
    while i < label.len() {
        stored[i] = label[i];
        i += 1;
    }
    Entry {
        label: stored,
        child_index,
        child_allocated,
        child_used,
        pointer: 0,
    }
}

// Every mDNS message shares the `local` and `_tcp` suffix labels, so the
// dictionary starts with them already in the tree. They carry no emitted
// pointer until the current packet actually writes them.
const DICT_SEED: [Entry; 8] = [
    // 0: (root)
    seed_entry(b"", 1, 1, 1),
    // 1: local
    seed_entry(b"\x05local", 2, 2, 1),
    // 2: local's children
    seed_entry(b"\x04_tcp", 4, 4, 0),
    Entry::EMPTY,
    // 4: _tcp's children
    Entry::EMPTY,
    Entry::EMPTY,
    Entry::EMPTY,
    Entry::EMPTY,
];

/// Per-packet name compression dictionary.
pub(crate) struct CompressionDict {
    entries: Vec<Entry>,
}

impl CompressionDict {
    pub(crate) fn new() -> Self {
        let mut entries = Vec::with_capacity(DICT_SEED.len() * 16);
        entries.extend_from_slice(&DICT_SEED);
        Self { entries }
    }

    /// Restore the seed state for a new outbound packet.
    fn reset(&mut self) {
        self.entries.clear();
        self.entries.extend_from_slice(&DICT_SEED);
    }

    /// Open a gap of `count` empty entries at `index`, fixing up every
    /// stored child range that starts at or after the gap.
    fn open(&mut self, index: usize, count: usize) -> Result<usize, EncodeError> {
        self.entries
            .try_reserve(count)
            .map_err(|_| EncodeError::OutOfMemory)?;

        let old_len = self.entries.len();
        self.entries.resize(old_len + count, Entry::EMPTY);

        if index < old_len {
            for entry in &mut self.entries {
                if entry.child_index as usize >= index {
                    entry.child_index += count as u16;
                }
            }
            self.entries[index..].rotate_right(count);
            for entry in &mut self.entries[index..index + count] {
                *entry = Entry::EMPTY;
            }
        }

        Ok(index)
    }

    /// Find `label` among `parent`'s children, adding it if absent.
    fn get_child(&mut self, parent: usize, label: &[u8]) -> Result<usize, EncodeError> {
        let start = self.entries[parent].child_index as usize;
        let used = self.entries[parent].child_used as usize;
        for index in start..start + used {
            if self.entries[index].label_bytes() == label {
                return Ok(index);
            }
        }

        // First child of a parent with no range yet goes at the end.
        if self.entries[parent].child_allocated == 0 {
            self.entries[parent].child_index = self.entries.len() as u16;
        }

        let mut index =
            (self.entries[parent].child_index + self.entries[parent].child_used) as usize;

        if self.entries[parent].child_used >= self.entries[parent].child_allocated {
            // Double the range to limit the number of gap openings.
            let grow = self.entries[parent].child_allocated.max(1);
            index = self.open(index, grow as usize)?;
            self.entries[parent].child_allocated += grow;
        }

        self.entries[parent].child_used += 1;
        self.entries[index].set_label(label);
        Ok(index)
    }

    /// Encode `name` into `send` at `offset` with compression, returning
    /// the offset just past the encoding.
    fn encode_name(
        &mut self,
        send: &mut Packet,
        mut offset: usize,
        name: &DnsName,
    ) -> Result<usize, EncodeError> {
        // A root-only name cannot be compressed.
        if name.label_count() <= 1 {
            return send.put(offset, &[0]);
        }

        let mut parent = 0usize;
        let mut remaining = name.label_count() - 1;
        let mut name_index;
        let mut child;

        // Walk from the root end inward until a label that has not been
        // emitted into this packet.
        loop {
            remaining -= 1;
            name_index = remaining;
            child = self.get_child(parent, name.label(name_index))?;

            if self.entries[child].pointer == 0 {
                break;
            }

            if remaining == 0 {
                // The whole name is a duplicate of one already in the
                // packet: a single back-pointer suffices.
                let pointer = self.entries[child].pointer;
                return send.put(offset, &pointer.to_be_bytes());
            }

            parent = child;
        }

        let ancestor = parent;

        self.entries
            .try_reserve(remaining)
            .map_err(|_| EncodeError::OutOfMemory)?;

        // All labels from the most specific through the current one are
        // new to the packet: write them verbatim.
        let label_len = name.label(name_index).len();
        let copy_len = name.label_offset(name_index) + label_len;
        let base = offset;
        offset = send.put(offset, &name.wire()[..copy_len])?;

        self.entries[child].pointer = wire_pointer(base + name.label_offset(name_index));

        // Record the wire offset of each newly written inner label.
        while remaining > 0 {
            remaining -= 1;
            parent = child;
            name_index = remaining;
            child = self.get_child(parent, name.label(name_index))?;
            self.entries[child].pointer = wire_pointer(base + name.label_offset(name_index));
        }

        // Close with a back-pointer to the first ancestor already in the
        // packet, or the root label if there is none.
        let ancestor_pointer = self.entries[ancestor].pointer;
        if ancestor_pointer != 0 {
            offset = send.put(offset, &ancestor_pointer.to_be_bytes())?;
        } else {
            offset = send.put(offset, &[0])?;
        }

        Ok(offset)
    }
}

/// The wire back-pointer value for a label at `offset`: top two bits set,
/// low 14 bits the absolute offset. Nonzero for any legal offset.
fn wire_pointer(offset: usize) -> u16 {
    0xC000 | (offset as u16 & 0x3FFF)
}

impl DnsState {
    /// Encode the decoded state into `send`, applying `filter` to each
    /// query and record.
    ///
    /// Returns the assembled length, or `Ok(0)` when everything was
    /// filtered out and no datagram should be sent. Opaque RDATA bytes
    /// are copied from `recv`, the originally received packet.
    pub fn encode(
        &mut self,
        recv: &Packet,
        send: &mut Packet,
        filter: Option<&FilterList>,
    ) -> Result<usize, EncodeError> {
        self.dict.reset();
        send.set_len(0);

        // The header is filled in last.
        let mut offset = DNS_HEADER_LEN;

        let mut query_count = 0usize;
        let mut rr_count = [0usize; 3];

        for index in 0..self.query_count {
            let query = &self.queries[index];

            let allowed = match query_filter_target(query.qtype) {
                FilterTarget::Owner => allowed_outbound(filter, &query.name),
                _ => true,
            };
            if !allowed {
                continue;
            }

            offset = self.dict.encode_name(send, offset, &query.name)?;
            offset = send.put(
                offset,
                &recv.data()[query.header..query.header + QUERY_HEADER_LEN],
            )?;
            query_count += 1;
        }

        for section in RrSection::ALL {
            let start = self.rr_index[section.index()];
            for index in start..start + self.rr_count[section.index()] {
                let rr = &self.rrs[index];

                let allowed = match rr_filter_target(rr.rtype) {
                    FilterTarget::Owner => allowed_outbound(filter, &rr.name),
                    FilterTarget::Rdata => allowed_outbound(filter, &rr.rdata_name),
                    _ => true,
                };
                if !allowed {
                    continue;
                }

                offset = self.dict.encode_name(send, offset, &rr.name)?;

                // Type, class and TTL are carried over byte-for-byte; the
                // RDATA length is rewritten below once it is known.
                let header_offset = offset;
                offset = send.put(offset, &recv.data()[rr.header..rr.header + 8])?;
                offset = send.put(offset, &[0, 0])?;

                let rdata_offset = offset;
                let rdata = rr.header + RR_HEADER_LEN;
                match rr.rtype {
                    RecordType::PTR | RecordType::CNAME | RecordType::DNAME => {
                        offset = self.dict.encode_name(send, offset, &rr.rdata_name)?;
                    }
                    RecordType::SRV => {
                        offset =
                            send.put(offset, &recv.data()[rdata..rdata + SRV_DATA_LEN])?;
                        offset = self.dict.encode_name(send, offset, &rr.rdata_name)?;
                    }
                    RecordType::NSEC => {
                        offset = self.dict.encode_name(send, offset, &rr.rdata_name)?;
                        let bitmap = rdata + rr.rdata_len - rr.secondary_len;
                        offset =
                            send.put(offset, &recv.data()[bitmap..bitmap + rr.secondary_len])?;
                    }
                    _ => {
                        offset = send.put(offset, &recv.data()[rdata..rdata + rr.rdata_len])?;
                    }
                }

                let emitted = (offset - rdata_offset) as u16;
                send.put(header_offset + 8, &emitted.to_be_bytes())?;

                rr_count[section.index()] += 1;
            }
        }

        if query_count == 0 && rr_count.iter().all(|&count| count == 0) {
            return Ok(0);
        }

        // Transaction id and flags are preserved; the section counts are
        // what actually got emitted.
        send.put(0, &recv.data()[0..4])?;
        send.put(4, &(query_count as u16).to_be_bytes())?;
        send.put(6, &(rr_count[0] as u16).to_be_bytes())?;
        send.put(8, &(rr_count[1] as u16).to_be_bytes())?;
        send.put(10, &(rr_count[2] as u16).to_be_bytes())?;

        send.set_len(offset);
        Ok(offset)
    }
}
