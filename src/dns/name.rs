//! Absolute domain names.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::WireError;

/// Maximum length of a name in wire form, including the root label.
pub const MAX_NAME_LEN: usize = 255;
/// Maximum length of a single label.
pub const MAX_LABEL_LEN: usize = 63;

/// An absolute domain name.
///
/// Stored lower-cased in uncompressed wire form, so equality and hashing are
/// the case-insensitive comparisons DNS requires.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Name(Vec<u8>);

impl Name {
    pub fn root() -> Self {
        Name(vec![0])
    }

    /// Build a name from uncompressed wire bytes, which must hold exactly one
    /// name.
    pub fn from_wire(wire: &[u8]) -> Result<Self, WireError> {
        let mut pos = 0;
        loop {
            let len = *wire.get(pos).ok_or(WireError::Truncated)? as usize;
            if len == 0 {
                pos += 1;
                break;
            }
            if len > MAX_LABEL_LEN {
                return Err(WireError::BadLabelType(len as u8));
            }
            pos += 1 + len;
            if pos >= MAX_NAME_LEN {
                return Err(WireError::NameTooLong);
            }
        }
        if pos != wire.len() {
            return Err(WireError::TrailingData);
        }
        Ok(Name(wire.to_ascii_lowercase()))
    }

    /// Build a name from raw labels, leftmost first.
    pub fn from_labels<'a, I>(labels: I) -> Result<Self, WireError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut wire = Vec::with_capacity(32);
        for label in labels {
            if label.is_empty() {
                return Err(WireError::BadText("empty label".to_string()));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(WireError::LabelTooLong);
            }
            wire.push(label.len() as u8);
            wire.extend(label.iter().map(u8::to_ascii_lowercase));
        }
        wire.push(0);
        if wire.len() > MAX_NAME_LEN {
            return Err(WireError::NameTooLong);
        }
        Ok(Name(wire))
    }

    pub fn as_wire(&self) -> &[u8] {
        &self.0
    }

    pub fn wire_len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Labels from leftmost to rightmost, excluding the root label.
    pub fn labels(&self) -> Labels<'_> {
        Labels {
            wire: &self.0,
            pos: 0,
        }
    }

    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    pub fn first_label(&self) -> Option<&[u8]> {
        self.labels().next()
    }

    pub fn is_wildcard(&self) -> bool {
        self.first_label() == Some(b"*")
    }

    /// The name with its leftmost label removed; `None` for the root.
    pub fn parent(&self) -> Option<Name> {
        if self.is_root() {
            return None;
        }
        let skip = 1 + self.0[0] as usize;
        Some(Name(self.0[skip..].to_vec()))
    }

    /// The rightmost `count` labels of this name.
    pub fn suffix(&self, count: usize) -> Name {
        let total = self.label_count();
        let mut name = self.clone();
        for _ in count..total {
            name = match name.parent() {
                Some(parent) => parent,
                None => break,
            };
        }
        name
    }

    /// Whether `self` equals `other` or lies beneath it.
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        if other.0.len() > self.0.len() {
            return false;
        }
        let offset = self.0.len() - other.0.len();
        if self.0[offset..] != other.0[..] {
            return false;
        }
        // The match must start on a label boundary.
        let mut pos = 0;
        while pos < offset {
            pos += 1 + self.0[pos] as usize;
        }
        pos == offset
    }

    pub fn prepend(&self, label: &[u8]) -> Result<Name, WireError> {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(WireError::LabelTooLong);
        }
        if self.0.len() + 1 + label.len() > MAX_NAME_LEN {
            return Err(WireError::NameTooLong);
        }
        let mut wire = Vec::with_capacity(self.0.len() + 1 + label.len());
        wire.push(label.len() as u8);
        wire.extend(label.iter().map(u8::to_ascii_lowercase));
        wire.extend_from_slice(&self.0);
        Ok(Name(wire))
    }

    /// Ancestors from the root down to (and including) `self`.
    pub fn ancestors_top_down(&self) -> Vec<Name> {
        let mut chain = Vec::with_capacity(self.label_count() + 1);
        let mut current = Some(self.clone());
        while let Some(name) = current {
            current = name.parent();
            chain.push(name);
        }
        chain.reverse();
        chain
    }

    /// Canonical DNS name order (RFC 4034, section 6.1).
    pub fn canonical_cmp(&self, other: &Name) -> Ordering {
        let mut left: Vec<&[u8]> = self.labels().collect();
        let mut right: Vec<&[u8]> = other.labels().collect();
        left.reverse();
        right.reverse();
        for (a, b) in left.iter().zip(right.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        left.len().cmp(&right.len())
    }
}

/// Iterator over the labels of a [`Name`].
pub struct Labels<'a> {
    wire: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.wire.get(self.pos)? as usize;
        if len == 0 {
            return None;
        }
        let label = &self.wire[self.pos + 1..self.pos + 1 + len];
        self.pos += 1 + len;
        Some(label)
    }
}

impl FromStr for Name {
    type Err = WireError;

    /// Parse presentation format. Every name is taken as absolute, so the
    /// trailing dot is optional; `""` and `"."` are the root.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "." {
            return Ok(Name::root());
        }
        let bytes = s.as_bytes();
        let mut labels: Vec<Vec<u8>> = Vec::new();
        let mut current = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'.' => {
                    if current.is_empty() {
                        return Err(WireError::BadText(format!("empty label in {s:?}")));
                    }
                    labels.push(std::mem::take(&mut current));
                    i += 1;
                }
                b'\\' => {
                    let rest = &bytes[i + 1..];
                    if rest.len() >= 3 && rest[..3].iter().all(u8::is_ascii_digit) {
                        let value = (rest[0] - b'0') as u16 * 100
                            + (rest[1] - b'0') as u16 * 10
                            + (rest[2] - b'0') as u16;
                        if value > 255 {
                            return Err(WireError::BadText(format!("bad escape in {s:?}")));
                        }
                        current.push(value as u8);
                        i += 4;
                    } else if let Some(&c) = rest.first() {
                        current.push(c);
                        i += 2;
                    } else {
                        return Err(WireError::BadText(format!("dangling escape in {s:?}")));
                    }
                }
                c => {
                    current.push(c);
                    i += 1;
                }
            }
        }
        if !current.is_empty() {
            labels.push(current);
        }
        Name::from_labels(labels.iter().map(Vec::as_slice))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            for &c in label {
                match c {
                    b'.' | b'\\' | b'"' | b'(' | b')' | b';' | b'@' | b'$' => {
                        write!(f, "\\{}", c as char)?
                    }
                    0x21..=0x7e => write!(f, "{}", c as char)?,
                    _ => write!(f, "\\{:03}", c)?,
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}
