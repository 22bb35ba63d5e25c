//! Local zones and local data.
//!
//! Queries that fall inside a configured local zone are answered (or
//! refused) here before the cache or the network is consulted. Each zone
//! type decides what happens when the name has no local data.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dns::{Name, Question, RData, Record, parse_records, rcode, rtype};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneType {
    /// Drop queries without local data; answered here as SERVFAIL.
    Deny,
    /// REFUSED for queries without local data.
    Refuse,
    /// Only local data exists; everything else is NXDOMAIN or NODATA.
    Static,
    /// Local data where present, normal resolution otherwise.
    Transparent,
    /// Like transparent, but a name with local data of another type is
    /// still resolved.
    TypeTransparent,
    /// The apex data answers for every name in the zone.
    Redirect,
    /// Switches off a built-in zone.
    NoDefault,
    AlwaysNxdomain,
    AlwaysRefuse,
    AlwaysTransparent,
}

impl ZoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneType::Deny => "deny",
            ZoneType::Refuse => "refuse",
            ZoneType::Static => "static",
            ZoneType::Transparent => "transparent",
            ZoneType::TypeTransparent => "typetransparent",
            ZoneType::Redirect => "redirect",
            ZoneType::NoDefault => "nodefault",
            ZoneType::AlwaysNxdomain => "always_nxdomain",
            ZoneType::AlwaysRefuse => "always_refuse",
            ZoneType::AlwaysTransparent => "always_transparent",
        }
    }
}

impl FromStr for ZoneType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "deny" => ZoneType::Deny,
            "refuse" => ZoneType::Refuse,
            "static" => ZoneType::Static,
            "transparent" => ZoneType::Transparent,
            "typetransparent" => ZoneType::TypeTransparent,
            "redirect" => ZoneType::Redirect,
            "nodefault" => ZoneType::NoDefault,
            "always_nxdomain" => ZoneType::AlwaysNxdomain,
            "always_refuse" => ZoneType::AlwaysRefuse,
            "always_transparent" => ZoneType::AlwaysTransparent,
            _ => return Err(ConfigError::InvalidZoneType(s.to_string())),
        })
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A synthesized response from local configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAnswer {
    pub rcode: u8,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
}

impl LocalAnswer {
    fn rcode(rcode: u8) -> Self {
        Self {
            rcode,
            answers: Vec::new(),
            authority: Vec::new(),
        }
    }
}

const DEFAULT_ZONES: &str = "
localhost. 10800 IN NS localhost.
localhost. 10800 IN SOA localhost. nobody.invalid. 1 3600 1200 604800 10800
localhost. 10800 IN A 127.0.0.1
localhost. 10800 IN AAAA ::1
127.in-addr.arpa. 10800 IN NS localhost.
127.in-addr.arpa. 10800 IN SOA localhost. nobody.invalid. 1 3600 1200 604800 10800
1.0.0.127.in-addr.arpa. 10800 IN PTR localhost.
1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.ip6.arpa. 10800 IN NS localhost.
1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.ip6.arpa. 10800 IN SOA localhost. nobody.invalid. 1 3600 1200 604800 10800
1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.ip6.arpa. 10800 IN PTR localhost.
";

const DEFAULT_ZONE_NAMES: [&str; 3] = [
    "localhost.",
    "127.in-addr.arpa.",
    "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.ip6.arpa.",
];

#[derive(Debug, Clone, Default)]
pub struct LocalZones {
    zones: FxHashMap<Name, ZoneType>,
    data: FxHashMap<Name, Vec<Record>>,
}

impl LocalZones {
    /// No zones at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in static zones for localhost and its reverse names.
    pub fn with_defaults() -> Self {
        let mut zones = Self::new();
        for zone in DEFAULT_ZONE_NAMES {
            if let Ok(name) = zone.parse() {
                zones.zones.insert(name, ZoneType::Static);
            }
        }
        if let Ok(records) = parse_records(DEFAULT_ZONES) {
            for record in records {
                zones.insert_data(record);
            }
        }
        zones
    }

    pub fn add_zone(&mut self, name: Name, kind: ZoneType) {
        if kind == ZoneType::NoDefault && self.is_default(&name) {
            self.remove_zone(&name);
        }
        debug!(zone = %name, kind = kind.as_str(), "local zone added");
        self.zones.insert(name, kind);
    }

    /// Remove a zone together with the data inside it.
    pub fn remove_zone(&mut self, name: &Name) -> bool {
        let removed = self.zones.remove(name).is_some();
        if removed {
            self.data.retain(|owner, _| !owner.is_subdomain_of(name));
        }
        removed
    }

    /// Add a record. Data outside every zone gets a transparent zone of
    /// its own.
    pub fn add_data(&mut self, record: Record) {
        if self.closest_zone(&record.name).is_none() {
            self.zones.insert(record.name.clone(), ZoneType::Transparent);
        }
        self.insert_data(record);
    }

    pub fn add_data_text(&mut self, text: &str) -> Result<(), ConfigError> {
        for record in parse_records(text)? {
            self.add_data(record);
        }
        Ok(())
    }

    fn insert_data(&mut self, record: Record) {
        let records = self.data.entry(record.name.clone()).or_default();
        if !records
            .iter()
            .any(|r| r.rtype == record.rtype && r.rdata == record.rdata)
        {
            records.push(record);
        }
    }

    /// Remove all data owned by `name`.
    pub fn remove_data(&mut self, name: &Name) -> bool {
        self.data.remove(name).is_some()
    }

    pub fn zone_type(&self, name: &Name) -> Option<ZoneType> {
        self.zones.get(name).copied()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    fn is_default(&self, name: &Name) -> bool {
        DEFAULT_ZONE_NAMES
            .iter()
            .any(|zone| zone.parse::<Name>().is_ok_and(|z| z == *name))
    }

    fn closest_zone(&self, name: &Name) -> Option<(&Name, ZoneType)> {
        let mut current = Some(name.clone());
        while let Some(candidate) = current {
            if let Some((zone, kind)) = self.zones.get_key_value(&candidate) {
                return Some((zone, *kind));
            }
            current = candidate.parent();
        }
        None
    }

    /// Answer `question` from local configuration, or `None` to resolve it
    /// normally.
    pub fn answer(&self, question: &Question) -> Option<LocalAnswer> {
        if question.qclass != crate::dns::class::IN {
            return None;
        }
        let (zone, kind) = self.closest_zone(&question.name)?;
        let at_name = self.data.get(&question.name).filter(|r| !r.is_empty());

        match kind {
            ZoneType::AlwaysTransparent | ZoneType::NoDefault => None,
            ZoneType::AlwaysNxdomain => Some(self.negative(zone, rcode::NXDOMAIN)),
            ZoneType::AlwaysRefuse => Some(LocalAnswer::rcode(rcode::REFUSED)),
            ZoneType::Transparent => at_name.map(|records| self.from_data(zone, question, records)),
            ZoneType::TypeTransparent => {
                let records = at_name?;
                let answer = self.from_data(zone, question, records);
                (!answer.answers.is_empty()).then_some(answer)
            }
            ZoneType::Deny | ZoneType::Refuse | ZoneType::Static => match at_name {
                Some(records) => Some(self.from_data(zone, question, records)),
                None if kind == ZoneType::Deny => Some(LocalAnswer::rcode(rcode::SERVFAIL)),
                None if kind == ZoneType::Refuse => Some(LocalAnswer::rcode(rcode::REFUSED)),
                None if self.has_descendants(&question.name) || question.name == *zone => {
                    Some(self.negative(zone, rcode::NOERROR))
                }
                None => Some(self.negative(zone, rcode::NXDOMAIN)),
            },
            ZoneType::Redirect => {
                let apex = self.data.get(zone).map(Vec::as_slice).unwrap_or_default();
                let mut answer = self.from_data(zone, question, apex);
                for record in &mut answer.answers {
                    record.name = question.name.clone();
                }
                Some(answer)
            }
        }
    }

    fn from_data(&self, zone: &Name, question: &Question, records: &[Record]) -> LocalAnswer {
        let matching: Vec<Record> = records
            .iter()
            .filter(|r| r.rtype == question.qtype || question.qtype == rtype::ANY)
            .cloned()
            .collect();
        if !matching.is_empty() {
            return LocalAnswer {
                rcode: rcode::NOERROR,
                answers: matching,
                authority: Vec::new(),
            };
        }
        let aliases: Vec<Record> = records
            .iter()
            .filter(|r| r.rtype == rtype::CNAME)
            .cloned()
            .collect();
        if !aliases.is_empty() {
            return LocalAnswer {
                rcode: rcode::NOERROR,
                answers: aliases,
                authority: Vec::new(),
            };
        }
        self.negative(zone, rcode::NOERROR)
    }

    /// NXDOMAIN or NODATA carrying the zone's SOA, if it has one.
    fn negative(&self, zone: &Name, rcode: u8) -> LocalAnswer {
        let authority = self
            .data
            .get(zone)
            .into_iter()
            .flatten()
            .filter(|r| r.rtype == rtype::SOA)
            .cloned()
            .collect();
        LocalAnswer {
            rcode,
            answers: Vec::new(),
            authority,
        }
    }

    fn has_descendants(&self, name: &Name) -> bool {
        self.data
            .keys()
            .any(|owner| owner != name && owner.is_subdomain_of(name))
    }
}

/// Parse hosts-file text into A/AAAA records for each listed name.
pub fn parse_hosts(text: &str) -> Result<Vec<Record>, ConfigError> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        let Some(address) = fields.next() else {
            continue;
        };
        let data = match address.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V4(v4)) => RData::A(v4),
            Ok(std::net::IpAddr::V6(v6)) => RData::Aaaa(v6),
            Err(_) => {
                return Err(ConfigError::Parse {
                    line: index + 1,
                    reason: format!("invalid address {address:?}"),
                });
            }
        };
        for host in fields {
            let name: Name = host.parse().map_err(|e| ConfigError::Parse {
                line: index + 1,
                reason: format!("invalid host name {host:?}: {e}"),
            })?;
            records.push(Record::from_data(
                name,
                crate::dns::class::IN,
                crate::dns::DEFAULT_TTL,
                &data,
            ));
        }
    }
    Ok(records)
}
