//! Typed views of record data.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::name::{MAX_NAME_LEN, Name};
use super::rtype;
use crate::clock;
use crate::error::WireError;

/// Parsed record data for the types the resolver understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Mx { preference: u16, exchange: Name },
    Txt(Vec<Vec<u8>>),
    Soa(Soa),
    Srv(Srv),
    Ds(Ds),
    Dnskey(Dnskey),
    Rrsig(Rrsig),
    Nsec(Nsec),
    Nsec3(Nsec3),
    Unknown { rtype: u16, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ds {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dnskey {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

impl Dnskey {
    pub const ZONE_KEY: u16 = 0x0100;
    pub const REVOKE: u16 = 0x0080;
    pub const SEP: u16 = 0x0001;

    pub fn is_zone_key(&self) -> bool {
        self.flags & Self::ZONE_KEY != 0
    }

    pub fn is_revoked(&self) -> bool {
        self.flags & Self::REVOKE != 0
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.public_key.len());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.push(self.protocol);
        out.push(self.algorithm);
        out.extend_from_slice(&self.public_key);
        out
    }

    /// Key tag per RFC 4034, appendix B.
    pub fn key_tag(&self) -> u16 {
        let rdata = self.to_rdata();
        let mut acc: u32 = 0;
        for (i, b) in rdata.iter().enumerate() {
            if i & 1 == 0 {
                acc += (*b as u32) << 8;
            } else {
                acc += *b as u32;
            }
        }
        acc += (acc >> 16) & 0xFFFF;
        (acc & 0xFFFF) as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rrsig {
    pub type_covered: u16,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer: Name,
    pub signature: Vec<u8>,
}

impl Rrsig {
    /// RDATA minus the signature field, signer name in canonical form; the
    /// prefix of the data a signature covers (RFC 4034, section 3.1.8.1).
    pub fn signed_prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18 + self.signer.wire_len());
        out.extend_from_slice(&self.type_covered.to_be_bytes());
        out.push(self.algorithm);
        out.push(self.labels);
        out.extend_from_slice(&self.original_ttl.to_be_bytes());
        out.extend_from_slice(&self.expiration.to_be_bytes());
        out.extend_from_slice(&self.inception.to_be_bytes());
        out.extend_from_slice(&self.key_tag.to_be_bytes());
        out.extend_from_slice(self.signer.as_wire());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec {
    pub next: Name,
    pub types: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec3 {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
    pub next_hashed: Vec<u8>,
    pub types: Vec<u16>,
}

impl Nsec3 {
    pub fn opt_out(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

impl RData {
    pub fn rtype(&self) -> u16 {
        match self {
            RData::A(_) => rtype::A,
            RData::Aaaa(_) => rtype::AAAA,
            RData::Ns(_) => rtype::NS,
            RData::Cname(_) => rtype::CNAME,
            RData::Ptr(_) => rtype::PTR,
            RData::Mx { .. } => rtype::MX,
            RData::Txt(_) => rtype::TXT,
            RData::Soa(_) => rtype::SOA,
            RData::Srv(_) => rtype::SRV,
            RData::Ds(_) => rtype::DS,
            RData::Dnskey(_) => rtype::DNSKEY,
            RData::Rrsig(_) => rtype::RRSIG,
            RData::Nsec(_) => rtype::NSEC,
            RData::Nsec3(_) => rtype::NSEC3,
            RData::Unknown { rtype, .. } => *rtype,
        }
    }

    pub fn from_wire(rtype: u16, data: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader { data, pos: 0 };
        let parsed = match rtype {
            rtype::A => {
                let b = r.bytes(4)?;
                RData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            rtype::AAAA => {
                let b: [u8; 16] = r
                    .bytes(16)?
                    .try_into()
                    .map_err(|_| WireError::BadRdata("AAAA"))?;
                RData::Aaaa(Ipv6Addr::from(b))
            }
            rtype::NS => RData::Ns(r.name()?),
            rtype::CNAME => RData::Cname(r.name()?),
            rtype::PTR => RData::Ptr(r.name()?),
            rtype::MX => RData::Mx {
                preference: r.u16()?,
                exchange: r.name()?,
            },
            rtype::TXT => {
                let mut strings = Vec::new();
                while !r.is_empty() {
                    let len = r.u8()? as usize;
                    strings.push(r.bytes(len)?.to_vec());
                }
                RData::Txt(strings)
            }
            rtype::SOA => RData::Soa(Soa {
                mname: r.name()?,
                rname: r.name()?,
                serial: r.u32()?,
                refresh: r.u32()?,
                retry: r.u32()?,
                expire: r.u32()?,
                minimum: r.u32()?,
            }),
            rtype::SRV => RData::Srv(Srv {
                priority: r.u16()?,
                weight: r.u16()?,
                port: r.u16()?,
                target: r.name()?,
            }),
            rtype::DS => RData::Ds(Ds {
                key_tag: r.u16()?,
                algorithm: r.u8()?,
                digest_type: r.u8()?,
                digest: r.rest().to_vec(),
            }),
            rtype::DNSKEY => RData::Dnskey(Dnskey {
                flags: r.u16()?,
                protocol: r.u8()?,
                algorithm: r.u8()?,
                public_key: r.rest().to_vec(),
            }),
            rtype::RRSIG => RData::Rrsig(Rrsig {
                type_covered: r.u16()?,
                algorithm: r.u8()?,
                labels: r.u8()?,
                original_ttl: r.u32()?,
                expiration: r.u32()?,
                inception: r.u32()?,
                key_tag: r.u16()?,
                signer: r.name()?,
                signature: r.rest().to_vec(),
            }),
            rtype::NSEC => RData::Nsec(Nsec {
                next: r.name()?,
                types: decode_type_bitmap(r.rest())?,
            }),
            rtype::NSEC3 => {
                let hash_algorithm = r.u8()?;
                let flags = r.u8()?;
                let iterations = r.u16()?;
                let salt_len = r.u8()? as usize;
                let salt = r.bytes(salt_len)?.to_vec();
                let hash_len = r.u8()? as usize;
                let next_hashed = r.bytes(hash_len)?.to_vec();
                RData::Nsec3(Nsec3 {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                    next_hashed,
                    types: decode_type_bitmap(r.rest())?,
                })
            }
            other => RData::Unknown {
                rtype: other,
                data: r.rest().to_vec(),
            },
        };
        if !r.is_empty() {
            return Err(WireError::RdataLength);
        }
        Ok(parsed)
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            RData::A(addr) => out.extend_from_slice(&addr.octets()),
            RData::Aaaa(addr) => out.extend_from_slice(&addr.octets()),
            RData::Ns(name) | RData::Cname(name) | RData::Ptr(name) => {
                out.extend_from_slice(name.as_wire())
            }
            RData::Mx {
                preference,
                exchange,
            } => {
                out.extend_from_slice(&preference.to_be_bytes());
                out.extend_from_slice(exchange.as_wire());
            }
            RData::Txt(strings) => {
                for s in strings {
                    out.push(s.len() as u8);
                    out.extend_from_slice(s);
                }
            }
            RData::Soa(soa) => {
                out.extend_from_slice(soa.mname.as_wire());
                out.extend_from_slice(soa.rname.as_wire());
                for v in [soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum] {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            RData::Srv(srv) => {
                out.extend_from_slice(&srv.priority.to_be_bytes());
                out.extend_from_slice(&srv.weight.to_be_bytes());
                out.extend_from_slice(&srv.port.to_be_bytes());
                out.extend_from_slice(srv.target.as_wire());
            }
            RData::Ds(ds) => {
                out.extend_from_slice(&ds.key_tag.to_be_bytes());
                out.push(ds.algorithm);
                out.push(ds.digest_type);
                out.extend_from_slice(&ds.digest);
            }
            RData::Dnskey(key) => out = key.to_rdata(),
            RData::Rrsig(sig) => {
                out = sig.signed_prefix();
                out.extend_from_slice(&sig.signature);
            }
            RData::Nsec(nsec) => {
                out.extend_from_slice(nsec.next.as_wire());
                out.extend(encode_type_bitmap(&nsec.types));
            }
            RData::Nsec3(nsec3) => {
                out.push(nsec3.hash_algorithm);
                out.push(nsec3.flags);
                out.extend_from_slice(&nsec3.iterations.to_be_bytes());
                out.push(nsec3.salt.len() as u8);
                out.extend_from_slice(&nsec3.salt);
                out.push(nsec3.next_hashed.len() as u8);
                out.extend_from_slice(&nsec3.next_hashed);
                out.extend(encode_type_bitmap(&nsec3.types));
            }
            RData::Unknown { data, .. } => out.extend_from_slice(data),
        }
        out
    }
}

/// Canonical form of raw RDATA (RFC 4034, section 6.2): embedded names
/// lower-cased for the types that require it.
pub fn canonical_rdata(rtype: u16, rdata: &[u8]) -> Vec<u8> {
    if !rtype::has_canonical_names(rtype) {
        return rdata.to_vec();
    }
    match RData::from_wire(rtype, rdata) {
        // Parsed names are already lower-case, so re-encoding canonicalises.
        Ok(data) => data.to_wire(),
        Err(_) => rdata.to_vec(),
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(addr) => write!(f, "{addr}"),
            RData::Aaaa(addr) => write!(f, "{addr}"),
            RData::Ns(name) | RData::Cname(name) | RData::Ptr(name) => write!(f, "{name}"),
            RData::Mx {
                preference,
                exchange,
            } => write!(f, "{preference} {exchange}"),
            RData::Txt(strings) => {
                for (i, s) in strings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    f.write_str("\"")?;
                    for &c in s {
                        match c {
                            b'"' | b'\\' => write!(f, "\\{}", c as char)?,
                            0x20..=0x7e => write!(f, "{}", c as char)?,
                            _ => write!(f, "\\{c:03}")?,
                        }
                    }
                    f.write_str("\"")?;
                }
                Ok(())
            }
            RData::Soa(soa) => write!(
                f,
                "{} {} {} {} {} {} {}",
                soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum
            ),
            RData::Srv(srv) => write!(
                f,
                "{} {} {} {}",
                srv.priority, srv.weight, srv.port, srv.target
            ),
            RData::Ds(ds) => write!(
                f,
                "{} {} {} {}",
                ds.key_tag,
                ds.algorithm,
                ds.digest_type,
                hex::encode_upper(&ds.digest)
            ),
            RData::Dnskey(key) => write!(
                f,
                "{} {} {} {}",
                key.flags,
                key.protocol,
                key.algorithm,
                BASE64.encode(&key.public_key)
            ),
            RData::Rrsig(sig) => write!(
                f,
                "{} {} {} {} {} {} {} {} {}",
                rtype::to_string(sig.type_covered),
                sig.algorithm,
                sig.labels,
                sig.original_ttl,
                clock::format_timestamp(sig.expiration as u64),
                clock::format_timestamp(sig.inception as u64),
                sig.key_tag,
                sig.signer,
                BASE64.encode(&sig.signature)
            ),
            RData::Nsec(nsec) => {
                write!(f, "{}", nsec.next)?;
                for t in &nsec.types {
                    write!(f, " {}", rtype::to_string(*t))?;
                }
                Ok(())
            }
            RData::Nsec3(nsec3) => {
                let salt = if nsec3.salt.is_empty() {
                    "-".to_string()
                } else {
                    hex::encode_upper(&nsec3.salt)
                };
                write!(
                    f,
                    "{} {} {} {} {}",
                    nsec3.hash_algorithm,
                    nsec3.flags,
                    nsec3.iterations,
                    salt,
                    base32hex_encode(&nsec3.next_hashed)
                )?;
                for t in &nsec3.types {
                    write!(f, " {}", rtype::to_string(*t))?;
                }
                Ok(())
            }
            RData::Unknown { data, .. } => write!(f, "\\# {} {}", data.len(), hex::encode(data)),
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let slice = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or(WireError::Truncated)?;
        self.pos += len;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        slice
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// An uncompressed name; RDATA held by [`super::Record`] never carries
    /// compression pointers.
    fn name(&mut self) -> Result<Name, WireError> {
        let start = self.pos;
        loop {
            let len = self.u8()? as usize;
            if len == 0 {
                break;
            }
            if len > 63 {
                return Err(WireError::BadRdata("compressed or reserved label in record data"));
            }
            self.bytes(len)?;
            if self.pos - start > MAX_NAME_LEN {
                return Err(WireError::NameTooLong);
            }
        }
        Name::from_wire(&self.data[start..self.pos])
    }
}

/// Encode a type list as NSEC/NSEC3 window blocks.
pub fn encode_type_bitmap(types: &[u16]) -> Vec<u8> {
    let mut sorted = types.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let window = (sorted[i] >> 8) as u8;
        let mut bitmap = [0u8; 32];
        let mut used = 0;
        while i < sorted.len() && (sorted[i] >> 8) as u8 == window {
            let low = (sorted[i] & 0xFF) as usize;
            bitmap[low / 8] |= 0x80 >> (low % 8);
            used = low / 8 + 1;
            i += 1;
        }
        out.push(window);
        out.push(used as u8);
        out.extend_from_slice(&bitmap[..used]);
    }
    out
}

pub fn decode_type_bitmap(data: &[u8]) -> Result<Vec<u16>, WireError> {
    let mut types = Vec::new();
    let mut pos = 0;
    let mut last_window: Option<u8> = None;
    while pos < data.len() {
        let window = data[pos];
        let len = *data.get(pos + 1).ok_or(WireError::Truncated)? as usize;
        if len == 0 || len > 32 {
            return Err(WireError::BadRdata("type bitmap length"));
        }
        if last_window.is_some_and(|w| w >= window) {
            return Err(WireError::BadRdata("type bitmap windows out of order"));
        }
        let bitmap = data
            .get(pos + 2..pos + 2 + len)
            .ok_or(WireError::Truncated)?;
        for (octet, bits) in bitmap.iter().enumerate() {
            for bit in 0..8 {
                if bits & (0x80 >> bit) != 0 {
                    types.push(((window as u16) << 8) | (octet * 8 + bit) as u16);
                }
            }
        }
        last_window = Some(window);
        pos += 2 + len;
    }
    Ok(types)
}

const BASE32HEX: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Unpadded lower-case base32hex, as used for NSEC3 owner labels.
pub fn base32hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &b in data {
        buffer = (buffer << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32HEX[((buffer >> bits) & 0x1F) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32HEX[((buffer << (5 - bits)) & 0x1F) as usize] as char);
    }
    out
}

pub fn base32hex_decode(s: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &c in s {
        let value = match c.to_ascii_lowercase() {
            c @ b'0'..=b'9' => c - b'0',
            c @ b'a'..=b'v' => c - b'a' + 10,
            _ => return None,
        };
        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}
