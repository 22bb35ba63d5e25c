//! Trust anchors and the file formats they are loaded from.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::crypto::{alg, digest_type, ds_matches};
use crate::dns::rdata::{Dnskey, Ds};
use crate::dns::{Name, RData, Record, parse_records, rtype};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorKey {
    Ds(Ds),
    Dnskey(Dnskey),
}

/// A configured point of trust: a DS digest or a DNSKEY for a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    pub zone: Name,
    pub key: AnchorKey,
    /// Loaded from a file that is kept up to date on key rollover.
    pub auto_update: bool,
}

impl TrustAnchor {
    pub fn from_record(record: &Record) -> Result<Self, ConfigError> {
        let key = match record.data()? {
            RData::Ds(ds) => AnchorKey::Ds(ds),
            RData::Dnskey(key) if key.is_zone_key() && !key.is_revoked() => AnchorKey::Dnskey(key),
            RData::Dnskey(_) => {
                return Err(ConfigError::InvalidAnchor(format!(
                    "{} DNSKEY is not a usable zone key",
                    record.name
                )));
            }
            other => {
                return Err(ConfigError::InvalidAnchor(format!(
                    "{} {} is neither DS nor DNSKEY",
                    record.name,
                    rtype::to_string(other.rtype())
                )));
            }
        };
        Ok(Self {
            zone: record.name.clone(),
            key,
            auto_update: false,
        })
    }

    pub fn key_tag(&self) -> u16 {
        match &self.key {
            AnchorKey::Ds(ds) => ds.key_tag,
            AnchorKey::Dnskey(key) => key.key_tag(),
        }
    }

    pub fn algorithm(&self) -> u8 {
        match &self.key {
            AnchorKey::Ds(ds) => ds.algorithm,
            AnchorKey::Dnskey(key) => key.algorithm,
        }
    }

    /// Whether this anchor can be checked with the algorithms we implement.
    pub fn is_supported(&self) -> bool {
        match &self.key {
            AnchorKey::Ds(ds) => {
                alg::is_supported(ds.algorithm) && digest_type::is_supported(ds.digest_type)
            }
            AnchorKey::Dnskey(key) => alg::is_supported(key.algorithm),
        }
    }

    /// Whether `key`, published at this anchor's zone, is the anchored key.
    pub fn matches(&self, key: &Dnskey) -> bool {
        match &self.key {
            AnchorKey::Ds(ds) => ds_matches(ds, &self.zone, key),
            AnchorKey::Dnskey(anchored) => {
                anchored.algorithm == key.algorithm
                    && anchored.protocol == key.protocol
                    && anchored.public_key == key.public_key
            }
        }
    }
}

/// Anchors keyed by zone.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    zones: FxHashMap<Name, Vec<TrustAnchor>>,
}

impl TrustAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, anchor: TrustAnchor) {
        let anchors = self.zones.entry(anchor.zone.clone()).or_default();
        if !anchors.contains(&anchor) {
            debug!(zone = %anchor.zone, key_tag = anchor.key_tag(), "trust anchor added");
            anchors.push(anchor);
        }
    }

    /// Add DS or DNSKEY records in presentation format.
    pub fn add_text(&mut self, text: &str) -> Result<usize, ConfigError> {
        self.add_records(text, false)
    }

    fn add_records(&mut self, text: &str, auto_update: bool) -> Result<usize, ConfigError> {
        let records = parse_records(text)?;
        if records.is_empty() {
            return Err(ConfigError::InvalidAnchor("no records found".to_string()));
        }
        for record in &records {
            let mut anchor = TrustAnchor::from_record(record)?;
            anchor.auto_update = auto_update;
            self.add(anchor);
        }
        Ok(records.len())
    }

    /// Load a zone-file style anchor file. With `autr` the file is in the
    /// auto-trust format, where only keys in the VALID or MISSING state are
    /// trusted.
    pub fn add_file(&mut self, path: &Path, autr: bool) -> Result<usize, ConfigError> {
        let text = read(path)?;
        if !autr {
            return self.add_records(&text, false);
        }
        let trusted: String = text
            .lines()
            .filter(|line| autotrust_state(line).is_none_or(|state| matches!(state, 2 | 3)))
            .flat_map(|line| [line, "\n"])
            .collect();
        self.add_records(&trusted, true)
    }

    /// Load a BIND-style `trusted-keys`, `managed-keys` or `trust-anchors`
    /// file.
    pub fn add_trusted_keys_file(&mut self, path: &Path) -> Result<usize, ConfigError> {
        let text = read(path)?;
        self.add_trusted_keys(&text)
    }

    pub fn add_trusted_keys(&mut self, text: &str) -> Result<usize, ConfigError> {
        let mut count = 0;
        for (record, auto_update) in parse_bind_keys(text)? {
            let record: Record = record.parse()?;
            let mut anchor = TrustAnchor::from_record(&record)?;
            anchor.auto_update = auto_update;
            self.add(anchor);
            count += 1;
        }
        if count == 0 {
            warn!("no keys found in trusted-keys input");
        }
        Ok(count)
    }

    pub fn get(&self, zone: &Name) -> Option<&[TrustAnchor]> {
        self.zones.get(zone).map(Vec::as_slice)
    }

    /// The deepest anchored zone at or above `name`.
    pub fn closest(&self, name: &Name) -> Option<&Name> {
        let mut current = Some(name.clone());
        while let Some(zone) = current {
            if let Some((anchored, _)) = self.zones.get_key_value(&zone) {
                return Some(anchored);
            }
            current = zone.parent();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.zones.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustAnchor> {
        self.zones.values().flatten()
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The `;;state=N` annotation on an auto-trust key line.
fn autotrust_state(line: &str) -> Option<u8> {
    let rest = &line[line.find(";;state=")? + ";;state=".len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[derive(Debug, PartialEq, Eq)]
enum BindToken {
    Word(String),
    Quoted(String),
    Open,
    Close,
    Semicolon,
}

fn bind_tokens(text: &str) -> Result<Vec<BindToken>, ConfigError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '#' => skip_line(&mut chars, &mut line),
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars, &mut line),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err(ConfigError::Parse {
                        line,
                        reason: "unterminated comment".to_string(),
                    });
                }
            }
            '{' => tokens.push(BindToken::Open),
            '}' => tokens.push(BindToken::Close),
            ';' => tokens.push(BindToken::Semicolon),
            '"' => {
                let mut s = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    if c == '\n' {
                        line += 1;
                    }
                    s.push(c);
                }
                if !closed {
                    return Err(ConfigError::Parse {
                        line,
                        reason: "unterminated string".to_string(),
                    });
                }
                tokens.push(BindToken::Quoted(s));
            }
            c => {
                let mut s = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || "{};\"".contains(next) {
                        break;
                    }
                    s.push(next);
                    chars.next();
                }
                tokens.push(BindToken::Word(s));
            }
        }
    }
    Ok(tokens)
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, line: &mut usize) {
    for c in chars.by_ref() {
        if c == '\n' {
            *line += 1;
            break;
        }
    }
}

/// Turn BIND key clauses into presentation-format records, each flagged
/// with whether the key is managed (RFC 5011).
fn parse_bind_keys(text: &str) -> Result<Vec<(String, bool)>, ConfigError> {
    let bad = |reason: &str| ConfigError::InvalidAnchor(reason.to_string());
    let tokens = bind_tokens(text)?;
    let mut out = Vec::new();
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        let clause = match token {
            BindToken::Word(w) => w.to_ascii_lowercase(),
            BindToken::Semicolon => continue,
            _ => return Err(bad("expected a key clause")),
        };
        if !matches!(clause.as_str(), "trusted-keys" | "managed-keys" | "trust-anchors") {
            return Err(ConfigError::InvalidAnchor(format!("unknown clause {clause}")));
        }
        if iter.next() != Some(BindToken::Open) {
            return Err(bad("expected '{'"));
        }

        loop {
            let mut fields = Vec::new();
            loop {
                match iter.next() {
                    Some(BindToken::Semicolon) => break,
                    Some(BindToken::Close) if fields.is_empty() => break,
                    Some(BindToken::Word(w)) | Some(BindToken::Quoted(w)) => fields.push(w),
                    _ => return Err(bad("unterminated key clause")),
                }
            }
            if fields.is_empty() {
                break;
            }
            out.push(bind_entry(&clause, fields)?);
        }
    }
    Ok(out)
}

fn bind_entry(clause: &str, mut fields: Vec<String>) -> Result<(String, bool), ConfigError> {
    if fields.len() < 2 {
        return Err(ConfigError::InvalidAnchor(format!(
            "short key entry: {}",
            fields.join(" ")
        )));
    }
    let zone = fields.remove(0);
    let kind = match fields[0].to_ascii_lowercase().as_str() {
        "initial-key" => Some(("DNSKEY", true)),
        "static-key" => Some(("DNSKEY", false)),
        "initial-ds" => Some(("DS", true)),
        "static-ds" => Some(("DS", false)),
        _ => None,
    };
    let (rtype, managed) = match kind {
        Some(kind) => {
            fields.remove(0);
            kind
        }
        None => ("DNSKEY", clause == "managed-keys"),
    };
    Ok((format!("{zone} IN {rtype} {}", fields.join(" ")), managed))
}
