//! Wire-format encoding and decoding of DNS messages.
//!
//! Numeric fields are network byte order. Decoding is pure; name
//! compression pointers may only point backwards, and each successive
//! pointer must land strictly before the previous one, so pointer chains
//! always terminate.

use rustc_hash::FxHashMap;

use super::name::MAX_NAME_LEN;
use super::{Header, Message, Name, Question, Record, rtype};
use crate::error::WireError;

const HEADER_LEN: usize = 12;

/// Largest message accepted by [`Message::decode`].
pub const MAX_MESSAGE_SIZE: usize = 65535;

/// Upper bound on compression pointers followed while reading one name.
pub const MAX_POINTER_HOPS: usize = 64;

impl Message {
    /// Encode to wire format, compressing owner and question names.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();

        enc.u16(self.header.id);
        enc.u16(self.header.flags());
        enc.u16(self.questions.len() as u16);
        enc.u16(self.answers.len() as u16);
        enc.u16(self.authority.len() as u16);
        enc.u16(self.additional.len() as u16);

        for q in &self.questions {
            enc.name(&q.name);
            enc.u16(q.qtype);
            enc.u16(q.qclass);
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            enc.record(record);
        }

        enc.buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        Self::decode_with_limit(data, MAX_MESSAGE_SIZE)
    }

    /// Decode, rejecting anything longer than `max_size` octets.
    pub fn decode_with_limit(data: &[u8], max_size: usize) -> Result<Self, WireError> {
        if data.len() > max_size {
            return Err(WireError::TooLarge(max_size));
        }
        if data.len() < HEADER_LEN {
            return Err(WireError::Truncated);
        }

        let mut dec = Decoder { data, pos: 0 };
        let id = dec.u16()?;
        let flags = dec.u16()?;
        let qdcount = dec.u16()? as usize;
        let ancount = dec.u16()? as usize;
        let nscount = dec.u16()? as usize;
        let arcount = dec.u16()? as usize;

        let mut questions = Vec::with_capacity(qdcount.min(4));
        for _ in 0..qdcount {
            let name = dec.name()?;
            let qtype = dec.u16()?;
            let qclass = dec.u16()?;
            questions.push(Question::new(name, qtype, qclass));
        }

        let answers = dec.section(ancount)?;
        let authority = dec.section(nscount)?;
        let additional = dec.section(arcount)?;

        Ok(Message {
            header: Header::from_flags(id, flags),
            questions,
            answers,
            authority,
            additional,
        })
    }
}

struct Encoder {
    buf: Vec<u8>,
    names: FxHashMap<Vec<u8>, u16>,
}

impl Encoder {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(512),
            names: FxHashMap::default(),
        }
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn name(&mut self, name: &Name) {
        let wire = name.as_wire();
        let mut pos = 0;
        while wire[pos] != 0 {
            let suffix = &wire[pos..];
            if let Some(&offset) = self.names.get(suffix) {
                self.u16(0xC000 | offset);
                return;
            }
            let here = self.buf.len();
            if here <= 0x3FFF {
                self.names.insert(suffix.to_vec(), here as u16);
            }
            let len = wire[pos] as usize;
            self.buf.extend_from_slice(&wire[pos..pos + 1 + len]);
            pos += 1 + len;
        }
        self.buf.push(0);
    }

    fn record(&mut self, record: &Record) {
        self.name(&record.name);
        self.u16(record.rtype);
        self.u16(record.class);
        self.u32(record.ttl);
        self.u16(record.rdata.len() as u16);
        self.buf.extend_from_slice(&record.rdata);
    }
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(len).ok_or(WireError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(WireError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn name(&mut self) -> Result<Name, WireError> {
        let wire = self.name_wire()?;
        Name::from_wire(&wire)
    }

    /// Read a possibly compressed name, returning it uncompressed with its
    /// original case.
    fn name_wire(&mut self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(32);
        let mut pos = self.pos;
        let mut last_target = usize::MAX;
        let mut hops = 0;
        let mut resume = None;

        loop {
            let len = *self.data.get(pos).ok_or(WireError::Truncated)?;
            match len & 0xC0 {
                0x00 if len == 0 => {
                    out.push(0);
                    pos += 1;
                    break;
                }
                0x00 => {
                    let end = pos + 1 + len as usize;
                    let label = self.data.get(pos..end).ok_or(WireError::Truncated)?;
                    out.extend_from_slice(label);
                    if out.len() + 1 > MAX_NAME_LEN {
                        return Err(WireError::NameTooLong);
                    }
                    pos = end;
                }
                0xC0 => {
                    let low = *self.data.get(pos + 1).ok_or(WireError::Truncated)?;
                    let target = (((len & 0x3F) as usize) << 8) | low as usize;
                    if target >= pos {
                        return Err(WireError::ForwardPointer);
                    }
                    if target >= last_target {
                        return Err(WireError::PointerLoop);
                    }
                    hops += 1;
                    if hops > MAX_POINTER_HOPS {
                        return Err(WireError::PointerLoop);
                    }
                    if resume.is_none() {
                        resume = Some(pos + 2);
                    }
                    last_target = target;
                    pos = target;
                }
                _ => return Err(WireError::BadLabelType(len)),
            }
        }

        self.pos = resume.unwrap_or(pos);
        Ok(out)
    }

    fn section(&mut self, count: usize) -> Result<Vec<Record>, WireError> {
        let mut records = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            records.push(self.record()?);
        }
        Ok(records)
    }

    fn record(&mut self) -> Result<Record, WireError> {
        let name = self.name()?;
        let rtype = self.u16()?;
        let class = self.u16()?;
        let ttl = self.u32()?;
        let rdlen = self.u16()? as usize;
        let end = self.pos + rdlen;
        if end > self.data.len() {
            return Err(WireError::Truncated);
        }
        let rdata = self.rdata(rtype, rdlen)?;
        if self.pos != end {
            return Err(WireError::RdataLength);
        }
        Ok(Record::new(name, rtype, class, ttl, rdata))
    }

    /// Read RDATA, expanding compressed names in the RFC 1035 types that
    /// are allowed to carry them.
    fn rdata(&mut self, rtype: u16, rdlen: usize) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(rdlen);
        match rtype {
            rtype::NS | rtype::CNAME | rtype::PTR => {
                out.extend(self.name_wire()?);
            }
            rtype::MX => {
                out.extend_from_slice(self.bytes(2)?);
                out.extend(self.name_wire()?);
            }
            rtype::SOA => {
                out.extend(self.name_wire()?);
                out.extend(self.name_wire()?);
                out.extend_from_slice(self.bytes(20)?);
            }
            _ => out.extend_from_slice(self.bytes(rdlen)?),
        }
        Ok(out)
    }
}
