//! Presentation format: `owner [ttl] [class] type rdata`.
//!
//! Supports quoted strings, parenthesised continuation lines, `;` comments,
//! the `$TTL` directive and the RFC 3597 `\#` generic encoding. All names are
//! absolute.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::rdata::{Ds, Dnskey, Nsec, Nsec3, Rrsig, Soa, Srv, base32hex_decode};
use super::{Name, RData, Record, class, rtype};
use crate::clock;
use crate::error::WireError;

/// TTL given to records that do not carry one.
pub const DEFAULT_TTL: u32 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn bare(&self) -> Result<&str, WireError> {
        if self.quoted {
            return Err(bad(format!("unexpected quoted string {:?}", self.text)));
        }
        Ok(&self.text)
    }
}

fn bad(reason: impl Into<String>) -> WireError {
    WireError::BadText(reason.into())
}

/// Split text into entries of tokens. Newlines end an entry unless inside
/// parentheses.
fn entries(text: &str) -> Result<Vec<Vec<Token>>, WireError> {
    let mut out = Vec::new();
    let mut entry: Vec<Token> = Vec::new();
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
                if depth == 0 && !entry.is_empty() {
                    out.push(std::mem::take(&mut entry));
                }
            }
            '\n' => {
                if depth == 0 && !entry.is_empty() {
                    out.push(std::mem::take(&mut entry));
                }
            }
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| bad("unbalanced parenthesis"))?;
            }
            '"' => {
                let mut s = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            s.push('\\');
                            if let Some(next) = chars.next() {
                                s.push(next);
                            }
                        }
                        c => s.push(c),
                    }
                }
                if !closed {
                    return Err(bad("unterminated quoted string"));
                }
                entry.push(Token {
                    text: s,
                    quoted: true,
                });
            }
            c if c.is_whitespace() => {}
            c => {
                let mut s = String::new();
                s.push(c);
                let mut escaped = c == '\\';
                while let Some(&next) = chars.peek() {
                    if !escaped && (next.is_whitespace() || "();\"".contains(next)) {
                        break;
                    }
                    escaped = !escaped && next == '\\';
                    s.push(next);
                    chars.next();
                }
                entry.push(Token {
                    text: s,
                    quoted: false,
                });
            }
        }
    }
    if depth != 0 {
        return Err(bad("unbalanced parenthesis"));
    }
    if !entry.is_empty() {
        out.push(entry);
    }
    Ok(out)
}

/// Parse every record in a block of presentation-format text.
pub fn parse_records(text: &str) -> Result<Vec<Record>, WireError> {
    let mut default_ttl = DEFAULT_TTL;
    let mut records = Vec::new();
    for entry in entries(text)? {
        if let Some(directive) = entry[0].text.strip_prefix('$') {
            match (directive.to_ascii_uppercase().as_str(), entry.get(1)) {
                ("TTL", Some(ttl)) => {
                    default_ttl = ttl
                        .text
                        .parse()
                        .map_err(|_| bad(format!("bad $TTL {:?}", ttl.text)))?;
                }
                _ => return Err(bad(format!("unsupported directive ${directive}"))),
            }
            continue;
        }
        records.push(parse_entry(&entry, default_ttl)?);
    }
    Ok(records)
}

impl FromStr for Record {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = entries(s)?;
        match entries.len() {
            1 => parse_entry(&entries.remove(0), DEFAULT_TTL),
            0 => Err(bad("empty record")),
            _ => Err(bad("more than one record")),
        }
    }
}

fn parse_entry(tokens: &[Token], default_ttl: u32) -> Result<Record, WireError> {
    let mut iter = tokens.iter();
    let owner: Name = iter
        .next()
        .ok_or_else(|| bad("missing owner"))?
        .bare()?
        .parse()?;

    let mut ttl = None;
    let mut rclass = None;
    let rtype = loop {
        let token = iter.next().ok_or_else(|| bad("missing type"))?.bare()?;
        if ttl.is_none() && token.bytes().all(|b| b.is_ascii_digit()) {
            ttl = Some(
                token
                    .parse::<u32>()
                    .map_err(|_| bad(format!("bad TTL {token:?}")))?,
            );
        } else if rclass.is_none() && class::from_str(token).is_some() {
            rclass = class::from_str(token);
        } else {
            break rtype::from_str(token).ok_or_else(|| bad(format!("unknown type {token:?}")))?;
        }
    };

    let rest: Vec<&Token> = iter.collect();
    let rdata = if rest.first().is_some_and(|t| !t.quoted && t.text == "\\#") {
        generic_rdata(&rest[1..])?
    } else {
        rdata_from_tokens(rtype, &rest)?.to_wire()
    };

    Ok(Record::new(
        owner,
        rtype,
        rclass.unwrap_or(class::IN),
        ttl.unwrap_or(default_ttl),
        rdata,
    ))
}

fn generic_rdata(tokens: &[&Token]) -> Result<Vec<u8>, WireError> {
    let (len, hex_tokens) = tokens
        .split_first()
        .ok_or_else(|| bad("missing \\# length"))?;
    let len: usize = len
        .bare()?
        .parse()
        .map_err(|_| bad("bad \\# length"))?;
    let data = decode_hex(hex_tokens)?;
    if data.len() != len {
        return Err(WireError::RdataLength);
    }
    Ok(data)
}

struct Fields<'a, 'b> {
    tokens: &'b [&'a Token],
    pos: usize,
}

impl<'a, 'b> Fields<'a, 'b> {
    fn next(&mut self, what: &str) -> Result<&'a Token, WireError> {
        let token = self
            .tokens
            .get(self.pos)
            .copied()
            .ok_or_else(|| bad(format!("missing {what}")))?;
        self.pos += 1;
        Ok(token)
    }

    fn num<T: FromStr>(&mut self, what: &str) -> Result<T, WireError> {
        let token = self.next(what)?.bare()?;
        token
            .parse()
            .map_err(|_| bad(format!("bad {what} {token:?}")))
    }

    fn name(&mut self, what: &str) -> Result<Name, WireError> {
        self.next(what)?.bare()?.parse()
    }

    fn rest(&mut self) -> &'b [&'a Token] {
        let rest = &self.tokens[self.pos.min(self.tokens.len())..];
        self.pos = self.tokens.len();
        rest
    }

    fn finish(&self) -> Result<(), WireError> {
        match self.tokens.get(self.pos) {
            Some(extra) => Err(bad(format!("unexpected {:?}", extra.text))),
            None => Ok(()),
        }
    }
}

fn rdata_from_tokens(rt: u16, tokens: &[&Token]) -> Result<RData, WireError> {
    let mut f = Fields { tokens, pos: 0 };
    let data = match rt {
        rtype::A => RData::A(f.num::<Ipv4Addr>("IPv4 address")?),
        rtype::AAAA => RData::Aaaa(f.num::<Ipv6Addr>("IPv6 address")?),
        rtype::NS => RData::Ns(f.name("name server")?),
        rtype::CNAME => RData::Cname(f.name("canonical name")?),
        rtype::PTR => RData::Ptr(f.name("pointer")?),
        rtype::MX => RData::Mx {
            preference: f.num("preference")?,
            exchange: f.name("exchange")?,
        },
        rtype::TXT => {
            let strings = f
                .rest()
                .iter()
                .map(|t| unescape(&t.text))
                .collect::<Result<Vec<_>, _>>()?;
            if strings.is_empty() || strings.iter().any(|s| s.len() > 255) {
                return Err(WireError::BadRdata("TXT"));
            }
            RData::Txt(strings)
        }
        rtype::SOA => RData::Soa(Soa {
            mname: f.name("primary server")?,
            rname: f.name("responsible mailbox")?,
            serial: f.num("serial")?,
            refresh: f.num("refresh")?,
            retry: f.num("retry")?,
            expire: f.num("expire")?,
            minimum: f.num("minimum")?,
        }),
        rtype::SRV => RData::Srv(Srv {
            priority: f.num("priority")?,
            weight: f.num("weight")?,
            port: f.num("port")?,
            target: f.name("target")?,
        }),
        rtype::DS => RData::Ds(Ds {
            key_tag: f.num("key tag")?,
            algorithm: f.num("algorithm")?,
            digest_type: f.num("digest type")?,
            digest: decode_hex(f.rest())?,
        }),
        rtype::DNSKEY => RData::Dnskey(Dnskey {
            flags: f.num("flags")?,
            protocol: f.num("protocol")?,
            algorithm: f.num("algorithm")?,
            public_key: decode_base64(f.rest())?,
        }),
        rtype::RRSIG => {
            let covered = f.next("type covered")?.bare()?;
            RData::Rrsig(Rrsig {
                type_covered: rtype::from_str(covered)
                    .ok_or_else(|| bad(format!("unknown type {covered:?}")))?,
                algorithm: f.num("algorithm")?,
                labels: f.num("labels")?,
                original_ttl: f.num("original TTL")?,
                expiration: timestamp(f.next("expiration")?)?,
                inception: timestamp(f.next("inception")?)?,
                key_tag: f.num("key tag")?,
                signer: f.name("signer")?,
                signature: decode_base64(f.rest())?,
            })
        }
        rtype::NSEC => RData::Nsec(Nsec {
            next: f.name("next name")?,
            types: type_list(f.rest())?,
        }),
        rtype::NSEC3 => {
            let hash_algorithm = f.num("hash algorithm")?;
            let flags = f.num("flags")?;
            let iterations = f.num("iterations")?;
            let salt = match f.next("salt")?.bare()? {
                "-" => Vec::new(),
                s => hex::decode(s).map_err(|_| bad(format!("bad salt {s:?}")))?,
            };
            let next = f.next("next hashed owner")?.bare()?;
            let next_hashed = base32hex_decode(next.as_bytes())
                .ok_or_else(|| bad(format!("bad hashed owner {next:?}")))?;
            RData::Nsec3(Nsec3 {
                hash_algorithm,
                flags,
                iterations,
                salt,
                next_hashed,
                types: type_list(f.rest())?,
            })
        }
        other => {
            return Err(bad(format!(
                "{} must use the \\# generic encoding",
                rtype::to_string(other)
            )));
        }
    };
    f.finish()?;
    Ok(data)
}

fn timestamp(token: &Token) -> Result<u32, WireError> {
    let text = token.bare()?;
    clock::parse_timestamp(text)
        .map(|secs| secs as u32)
        .ok_or_else(|| bad(format!("bad timestamp {text:?}")))
}

fn type_list(tokens: &[&Token]) -> Result<Vec<u16>, WireError> {
    tokens
        .iter()
        .map(|t| {
            let text = t.bare()?;
            rtype::from_str(text).ok_or_else(|| bad(format!("unknown type {text:?}")))
        })
        .collect()
}

fn decode_hex(tokens: &[&Token]) -> Result<Vec<u8>, WireError> {
    let joined: String = tokens.iter().map(|t| t.text.as_str()).collect();
    hex::decode(&joined).map_err(|_| bad("bad hex data"))
}

fn decode_base64(tokens: &[&Token]) -> Result<Vec<u8>, WireError> {
    let joined: String = tokens.iter().map(|t| t.text.as_str()).collect();
    if joined.is_empty() {
        return Err(bad("missing base64 data"));
    }
    BASE64.decode(joined.as_bytes()).map_err(|_| bad("bad base64 data"))
}

/// Resolve `\X` and `\DDD` escapes in a character string.
fn unescape(s: &str) -> Result<Vec<u8>, WireError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let rest = &bytes[i + 1..];
        if rest.len() >= 3 && rest[..3].iter().all(u8::is_ascii_digit) {
            let value = (rest[0] - b'0') as u16 * 100
                + (rest[1] - b'0') as u16 * 10
                + (rest[2] - b'0') as u16;
            if value > 255 {
                return Err(bad(format!("bad escape in {s:?}")));
            }
            out.push(value as u8);
            i += 4;
        } else if let Some(&c) = rest.first() {
            out.push(c);
            i += 2;
        } else {
            return Err(bad(format!("dangling escape in {s:?}")));
        }
    }
    Ok(out)
}
