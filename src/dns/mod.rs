//! DNS message model, wire codec and record data.

mod codec;
mod name;
pub mod rdata;
mod text;

pub use codec::{MAX_MESSAGE_SIZE, MAX_POINTER_HOPS};
pub use name::{Labels, MAX_LABEL_LEN, MAX_NAME_LEN, Name};
pub use rdata::RData;
pub use text::{DEFAULT_TTL, parse_records};

use std::fmt;

/// Well-known record types.
pub mod rtype {
    pub const A: u16 = 1;
    pub const NS: u16 = 2;
    pub const CNAME: u16 = 5;
    pub const SOA: u16 = 6;
    pub const PTR: u16 = 12;
    pub const MX: u16 = 15;
    pub const TXT: u16 = 16;
    pub const AAAA: u16 = 28;
    pub const SRV: u16 = 33;
    pub const OPT: u16 = 41;
    pub const DS: u16 = 43;
    pub const RRSIG: u16 = 46;
    pub const NSEC: u16 = 47;
    pub const DNSKEY: u16 = 48;
    pub const NSEC3: u16 = 50;
    pub const NSEC3PARAM: u16 = 51;
    pub const ANY: u16 = 255;

    const NAMES: &[(u16, &str)] = &[
        (A, "A"),
        (NS, "NS"),
        (CNAME, "CNAME"),
        (SOA, "SOA"),
        (PTR, "PTR"),
        (MX, "MX"),
        (TXT, "TXT"),
        (AAAA, "AAAA"),
        (SRV, "SRV"),
        (OPT, "OPT"),
        (DS, "DS"),
        (RRSIG, "RRSIG"),
        (NSEC, "NSEC"),
        (DNSKEY, "DNSKEY"),
        (NSEC3, "NSEC3"),
        (NSEC3PARAM, "NSEC3PARAM"),
        (ANY, "ANY"),
    ];

    pub fn to_string(rtype: u16) -> String {
        match NAMES.iter().find(|(t, _)| *t == rtype) {
            Some((_, name)) => (*name).to_string(),
            None => format!("TYPE{rtype}"),
        }
    }

    /// Parse a mnemonic or `TYPEnnn` (case-insensitive).
    pub fn from_str(s: &str) -> Option<u16> {
        let upper = s.to_ascii_uppercase();
        if let Some((t, _)) = NAMES.iter().find(|(_, name)| *name == upper) {
            return Some(*t);
        }
        upper.strip_prefix("TYPE")?.parse().ok()
    }

    /// Types whose RDATA embeds domain names that are lower-cased in
    /// canonical form (RFC 4034 section 6.2 as amended by RFC 6840).
    pub fn has_canonical_names(rtype: u16) -> bool {
        matches!(rtype, NS | CNAME | SOA | PTR | MX | SRV | RRSIG)
    }
}

/// Record classes.
pub mod class {
    pub const IN: u16 = 1;
    pub const CH: u16 = 3;
    pub const HS: u16 = 4;
    pub const ANY: u16 = 255;

    pub fn to_string(class: u16) -> String {
        match class {
            IN => "IN".to_string(),
            CH => "CH".to_string(),
            HS => "HS".to_string(),
            ANY => "ANY".to_string(),
            other => format!("CLASS{other}"),
        }
    }

    pub fn from_str(s: &str) -> Option<u16> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Some(IN),
            "CH" => Some(CH),
            "HS" => Some(HS),
            "ANY" => Some(ANY),
            other => other.strip_prefix("CLASS")?.parse().ok(),
        }
    }
}

/// Response codes.
pub mod rcode {
    pub const NOERROR: u8 = 0;
    pub const FORMERR: u8 = 1;
    pub const SERVFAIL: u8 = 2;
    pub const NXDOMAIN: u8 = 3;
    pub const NOTIMP: u8 = 4;
    pub const REFUSED: u8 = 5;

    pub fn to_str(rcode: u8) -> &'static str {
        match rcode {
            NOERROR => "NOERROR",
            FORMERR => "FORMERR",
            SERVFAIL => "SERVFAIL",
            NXDOMAIN => "NXDOMAIN",
            NOTIMP => "NOTIMP",
            REFUSED => "REFUSED",
            _ => "RESERVED",
        }
    }
}

/// The fixed 12-octet message header, minus the section counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: bool,
    pub ad: bool,
    pub cd: bool,
    pub rcode: u8,
}

impl Header {
    pub fn flags(&self) -> u16 {
        let mut flags = 0u16;
        flags |= (self.qr as u16) << 15;
        flags |= ((self.opcode & 0x0f) as u16) << 11;
        flags |= (self.aa as u16) << 10;
        flags |= (self.tc as u16) << 9;
        flags |= (self.rd as u16) << 8;
        flags |= (self.ra as u16) << 7;
        flags |= (self.z as u16) << 6;
        flags |= (self.ad as u16) << 5;
        flags |= (self.cd as u16) << 4;
        flags |= (self.rcode & 0x0f) as u16;
        flags
    }

    pub fn from_flags(id: u16, flags: u16) -> Self {
        Header {
            id,
            qr: flags & 0x8000 != 0,
            opcode: ((flags >> 11) & 0x0f) as u8,
            aa: flags & 0x0400 != 0,
            tc: flags & 0x0200 != 0,
            rd: flags & 0x0100 != 0,
            ra: flags & 0x0080 != 0,
            z: flags & 0x0040 != 0,
            ad: flags & 0x0020 != 0,
            cd: flags & 0x0010 != 0,
            rcode: (flags & 0x000f) as u8,
        }
    }
}

/// A question section entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: Name,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    pub fn new(name: Name, qtype: u16, qclass: u16) -> Self {
        Self { name, qtype, qclass }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.name,
            class::to_string(self.qclass),
            rtype::to_string(self.qtype)
        )
    }
}

/// A resource record. RDATA is kept uncompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: Name,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl Record {
    pub fn new(name: Name, rtype: u16, class: u16, ttl: u32, rdata: Vec<u8>) -> Self {
        Self {
            name,
            rtype,
            class,
            ttl,
            rdata,
        }
    }

    pub fn from_data(name: Name, class: u16, ttl: u32, data: &RData) -> Self {
        Self::new(name, data.rtype(), class, ttl, data.to_wire())
    }

    pub fn data(&self) -> Result<RData, crate::error::WireError> {
        RData::from_wire(self.rtype, &self.rdata)
    }

    /// For RRSIG records, the type the signature covers.
    pub fn covered_type(&self) -> Option<u16> {
        if self.rtype != rtype::RRSIG || self.rdata.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.rdata[0], self.rdata[1]]))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ",
            self.name,
            self.ttl,
            class::to_string(self.class),
            rtype::to_string(self.rtype)
        )?;
        match self.data() {
            Ok(data) => write!(f, "{data}"),
            Err(_) => write!(f, "\\# {} {}", self.rdata.len(), hex::encode(&self.rdata)),
        }
    }
}

/// Records sharing owner, type and class, together with the RRSIGs that
/// cover them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordSet {
    pub records: Vec<Record>,
    pub signatures: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>, signatures: Vec<Record>) -> Self {
        Self {
            records,
            signatures,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn name(&self) -> Option<&Name> {
        self.records.first().map(|r| &r.name)
    }

    pub fn rtype(&self) -> Option<u16> {
        self.records.first().map(|r| r.rtype)
    }

    pub fn min_ttl(&self) -> u32 {
        self.records.iter().map(|r| r.ttl).min().unwrap_or(0)
    }

    /// Group a section into record sets, attaching RRSIGs to the set they
    /// cover. Orphan signatures are dropped.
    pub fn group(section: &[Record]) -> Vec<RecordSet> {
        let mut sets: Vec<RecordSet> = Vec::new();
        for record in section.iter().filter(|r| r.rtype != rtype::RRSIG) {
            match sets.iter_mut().find(|s| {
                s.records[0].name == record.name
                    && s.records[0].rtype == record.rtype
                    && s.records[0].class == record.class
            }) {
                Some(set) => {
                    if !set.records.iter().any(|r| r.rdata == record.rdata) {
                        set.records.push(record.clone());
                    }
                }
                None => sets.push(RecordSet::new(vec![record.clone()], Vec::new())),
            }
        }
        for sig in section.iter().filter(|r| r.rtype == rtype::RRSIG) {
            if let Some(set) = sets.iter_mut().find(|s| {
                s.records[0].name == sig.name
                    && Some(s.records[0].rtype) == sig.covered_type()
                    && s.records[0].class == sig.class
            }) {
                set.signatures.push(sig.clone());
            }
        }
        sets
    }

    /// Flatten back into a section: records followed by signatures.
    pub fn to_records(&self) -> Vec<Record> {
        let mut out = self.records.clone();
        out.extend(self.signatures.iter().cloned());
        out
    }
}

/// EDNS(0) parameters carried in an OPT pseudo-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edns {
    pub udp_size: u16,
    pub dnssec_ok: bool,
}

/// A DNS message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl Message {
    /// A standard query for a single question.
    pub fn query(id: u16, question: Question, recursion_desired: bool) -> Self {
        Self {
            header: Header {
                id,
                rd: recursion_desired,
                ..Header::default()
            },
            questions: vec![question],
            ..Self::default()
        }
    }

    /// An empty response to `query`, echoing its id and question.
    pub fn response_to(query: &Message) -> Self {
        Self {
            header: Header {
                id: query.header.id,
                qr: true,
                opcode: query.header.opcode,
                rd: query.header.rd,
                cd: query.header.cd,
                ..Header::default()
            },
            questions: query.questions.clone(),
            ..Self::default()
        }
    }

    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    pub fn is_truncated(&self) -> bool {
        self.header.tc
    }

    /// Add (or replace) the OPT record.
    pub fn set_edns(&mut self, udp_size: u16, dnssec_ok: bool) {
        self.additional.retain(|r| r.rtype != rtype::OPT);
        let ttl = if dnssec_ok { 0x0000_8000 } else { 0 };
        self.additional
            .push(Record::new(Name::root(), rtype::OPT, udp_size, ttl, Vec::new()));
    }

    pub fn edns(&self) -> Option<Edns> {
        self.additional
            .iter()
            .find(|r| r.rtype == rtype::OPT)
            .map(|opt| Edns {
                udp_size: opt.class,
                dnssec_ok: opt.ttl & 0x0000_8000 != 0,
            })
    }

    /// Whether `self` answers `query`: same id and same question.
    pub fn answers_query(&self, query: &Message) -> bool {
        self.header.id == query.header.id && self.header.qr && self.questions == query.questions
    }
}
