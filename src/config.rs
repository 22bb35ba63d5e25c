//! Resolver configuration.
//!
//! A [`ConfigBuilder`] collects options, upstream servers and trust anchors
//! and checks each one as it is applied. [`ConfigBuilder::build`] turns the
//! result into an immutable [`Config`] for the engine.
//!
//! Option keys use unbound.conf spelling, may carry a trailing `:`, and
//! take `yes`/`no` for booleans.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cache::CacheLimits;
use crate::clock;
use crate::dns::{Name, Record};
use crate::error::ConfigError;
use crate::resolver::{ResolverSettings, StubZone, local};
use crate::transport::TransportOptions;
use crate::trust::{TrustAnchors, ValidatorOptions};

const DNS_PORT: u16 = 53;
const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";
const DEFAULT_HOSTS: &str = "/etc/hosts";
/// Longest accepted option value, in bytes.
pub const MAX_OPTION_VALUE_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Number { min: u64, max: u64 },
    Path,
    /// `YYYYMMDDHHMMSS`, seconds since the epoch, or empty.
    Date,
    /// Space-separated module names.
    Modules,
}

struct OptionDef {
    key: &'static str,
    kind: Kind,
    default: &'static str,
}

const fn opt(key: &'static str, kind: Kind, default: &'static str) -> OptionDef {
    OptionDef { key, kind, default }
}

const fn range(min: u64, max: u64) -> Kind {
    Kind::Number { min, max }
}

const U32_MAX: u64 = u32::MAX as u64;

const OPTIONS: &[OptionDef] = &[
    opt("verbosity", range(0, 5), "0"),
    opt("logfile", Kind::Path, ""),
    opt("use-syslog", Kind::Bool, "no"),
    opt("do-ip4", Kind::Bool, "yes"),
    opt("do-ip6", Kind::Bool, "yes"),
    opt("do-udp", Kind::Bool, "yes"),
    opt("do-tcp", Kind::Bool, "yes"),
    opt("edns-buffer-size", range(512, 65535), "1232"),
    opt("max-udp-size", range(512, 65535), "4096"),
    opt("msg-cache-size", range(1, U32_MAX), "100000"),
    opt("key-cache-size", range(0, U32_MAX), "4194304"),
    opt("neg-cache-size", range(0, U32_MAX), "1048576"),
    opt("cache-min-ttl", range(0, U32_MAX), "0"),
    opt("cache-max-ttl", range(0, U32_MAX), "86400"),
    opt("cache-max-negative-ttl", range(0, U32_MAX), "3600"),
    opt("harden-dnssec-stripped", Kind::Bool, "yes"),
    opt("val-min-algorithm", range(0, 255), "0"),
    opt("val-override-date", Kind::Date, ""),
    opt("outbound-msg-retry", range(0, 10), "3"),
    opt("query-timeout", range(1, 60_000), "1500"),
    opt("num-queries-per-thread", range(1, 65536), "1024"),
    opt("module-config", Kind::Modules, "validator iterator"),
    opt("qname-minimisation", Kind::Bool, "yes"),
    opt("minimal-responses", Kind::Bool, "yes"),
    opt("trust-anchor-signaling", Kind::Bool, "yes"),
];

fn lookup(key: &str) -> Result<&'static OptionDef, ConfigError> {
    let key = key.strip_suffix(':').unwrap_or(key);
    OPTIONS
        .iter()
        .find(|def| def.key == key)
        .ok_or_else(|| ConfigError::UnknownOption(key.to_string()))
}

/// Check `value` against the option's kind and return its stored form.
fn normalize(def: &OptionDef, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::InvalidValue {
        option: def.key.to_string(),
        value: value.to_string(),
    };

    match def.kind {
        Kind::Bool => match value.to_ascii_lowercase().as_str() {
            "yes" => Ok("yes".to_string()),
            "no" => Ok("no".to_string()),
            _ => Err(invalid()),
        },
        Kind::Number { min, max } => {
            let n: u64 = value.parse().map_err(|_| invalid())?;
            if (min..=max).contains(&n) {
                Ok(n.to_string())
            } else {
                Err(invalid())
            }
        }
        Kind::Path => Ok(value.to_string()),
        Kind::Date => {
            if value.is_empty() || value == "0" {
                return Ok(String::new());
            }
            clock::parse_timestamp(value)
                .map(|_| value.to_string())
                .ok_or_else(invalid)
        }
        Kind::Modules => {
            let modules: Vec<&str> = value.split_whitespace().collect();
            let known = modules.iter().all(|m| matches!(*m, "validator" | "iterator"));
            if !known || !modules.contains(&"iterator") {
                return Err(invalid());
            }
            Ok(modules.join(" "))
        }
    }
}

/// Options that cannot both be `no`: at least one address family and one
/// transport must stay usable.
fn counterpart(key: &str) -> Option<&'static str> {
    match key {
        "do-ip4" => Some("do-ip6"),
        "do-ip6" => Some("do-ip4"),
        "do-udp" => Some("do-tcp"),
        "do-tcp" => Some("do-udp"),
        _ => None,
    }
}

/// Parse `addr`, `addr@port` or `ip:port` into a server address.
pub fn parse_server(text: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = || ConfigError::InvalidAddress(text.to_string());
    let text = text.trim();
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let (host, port) = match text.split_once('@') {
        Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
        None => (text, DNS_PORT),
    };
    // Link-local scope ids are not kept.
    let host = host.split('%').next().unwrap_or(host);
    let ip: IpAddr = host.parse().map_err(|_| invalid())?;
    Ok(SocketAddr::new(ip, port))
}

/// `nameserver` entries of a resolv.conf file.
pub fn parse_resolv_conf(text: &str) -> Result<Vec<SocketAddr>, ConfigError> {
    let mut servers = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.split(['#', ';']).next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        if fields.next() != Some("nameserver") {
            continue;
        }
        let Some(addr) = fields.next() else {
            return Err(ConfigError::Parse {
                line: index + 1,
                reason: "nameserver without an address".to_string(),
            });
        };
        let server = parse_server(addr).map_err(|_| ConfigError::Parse {
            line: index + 1,
            reason: format!("invalid nameserver {addr:?}"),
        })?;
        servers.push(server);
    }
    Ok(servers)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Tracing filter directive for a `verbosity` level.
pub fn log_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Everything the engine needs, fixed once queries start.
#[derive(Debug, Clone)]
pub struct Config {
    pub resolver: ResolverSettings,
    pub transport: TransportOptions,
    pub cache: CacheLimits,
    pub validator: ValidatorOptions,
    pub anchors: TrustAnchors,
    /// Records loaded from hosts files, served as local data.
    pub hosts: Vec<Record>,
    pub verbosity: u8,
    pub logfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    values: FxHashMap<&'static str, String>,
    forwarders: Vec<SocketAddr>,
    stubs: Vec<StubZone>,
    anchors: TrustAnchors,
    hosts: Vec<Record>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let def = lookup(key)?;
        if value.len() > MAX_OPTION_VALUE_LEN {
            return Err(ConfigError::InvalidValue {
                option: def.key.to_string(),
                value: format!("{}...", value.chars().take(32).collect::<String>()),
            });
        }
        let value = normalize(def, value)?;
        if value == "no" {
            if let Some(other) = counterpart(def.key) {
                if self.get_option(other)? == "no" {
                    return Err(ConfigError::InvalidValue {
                        option: def.key.to_string(),
                        value,
                    });
                }
            }
        }
        debug!(option = def.key, %value, "option set");
        self.values.insert(def.key, value);
        Ok(())
    }

    /// The option's current value; defaults apply to unset options.
    pub fn get_option(&self, key: &str) -> Result<String, ConfigError> {
        let def = lookup(key)?;
        Ok(self
            .values
            .get(def.key)
            .cloned()
            .unwrap_or_else(|| def.default.to_string()))
    }

    pub fn has_option(&self, key: &str) -> bool {
        lookup(key).is_ok()
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        Ok(self.get_option(key)? == "yes")
    }

    fn number(&self, key: &str) -> Result<u64, ConfigError> {
        let value = self.get_option(key)?;
        value.parse().map_err(|_| ConfigError::InvalidValue {
            option: key.to_string(),
            value,
        })
    }

    pub fn set_forward(&mut self, addr: &str) -> Result<(), ConfigError> {
        let server = parse_server(addr)?;
        if !self.forwarders.contains(&server) {
            self.forwarders.push(server);
        }
        Ok(())
    }

    /// Send queries under `zone` to `addr`. Repeated calls for one zone add
    /// servers to it.
    pub fn set_stub(&mut self, zone: &str, addr: &str, prime: bool) -> Result<(), ConfigError> {
        let zone: Name = zone.parse().map_err(|_| ConfigError::InvalidValue {
            option: "stub-zone".to_string(),
            value: zone.to_string(),
        })?;
        let server = parse_server(addr)?;
        match self.stubs.iter_mut().find(|stub| stub.zone == zone) {
            Some(stub) => {
                if !stub.servers.contains(&server) {
                    stub.servers.push(server);
                }
                stub.prime |= prime;
            }
            None => self.stubs.push(StubZone {
                zone,
                servers: vec![server],
                prime,
            }),
        }
        Ok(())
    }

    /// Use the nameservers of a resolv.conf file (the system one by
    /// default) as forwarders.
    pub fn set_resolv_conf(&mut self, path: Option<&Path>) -> Result<usize, ConfigError> {
        let path = path.unwrap_or(Path::new(DEFAULT_RESOLV_CONF));
        let servers = parse_resolv_conf(&read(path)?)?;
        let count = servers.len();
        for server in servers {
            if !self.forwarders.contains(&server) {
                self.forwarders.push(server);
            }
        }
        debug!(path = %path.display(), count, "resolv.conf loaded");
        Ok(count)
    }

    /// Serve the entries of a hosts file (the system one by default) as
    /// local data.
    pub fn set_hosts(&mut self, path: Option<&Path>) -> Result<usize, ConfigError> {
        let path = path.unwrap_or(Path::new(DEFAULT_HOSTS));
        let records = local::parse_hosts(&read(path)?)?;
        let count = records.len();
        self.hosts.extend(records);
        debug!(path = %path.display(), count, "hosts loaded");
        Ok(count)
    }

    /// Add DS or DNSKEY records in presentation format.
    pub fn add_trust_anchor(&mut self, text: &str) -> Result<usize, ConfigError> {
        self.anchors.add_text(text)
    }

    pub fn add_trust_anchor_file(&mut self, path: &Path, autr: bool) -> Result<usize, ConfigError> {
        self.anchors.add_file(path, autr)
    }

    pub fn add_trusted_keys(&mut self, path: &Path) -> Result<usize, ConfigError> {
        self.anchors.add_trusted_keys_file(path)
    }

    pub fn build(&self) -> Result<Config, ConfigError> {
        let do_ip4 = self.flag("do-ip4")?;
        let do_ip6 = self.flag("do-ip6")?;
        let do_udp = self.flag("do-udp")?;
        let do_tcp = self.flag("do-tcp")?;
        let edns_buffer_size = self.number("edns-buffer-size")? as u16;
        let override_date = match self.get_option("val-override-date")?.as_str() {
            "" => None,
            date => clock::parse_timestamp(date),
        };
        let logfile = match self.get_option("logfile")?.as_str() {
            "" => None,
            path => Some(PathBuf::from(path)),
        };

        Ok(Config {
            resolver: ResolverSettings {
                validate: self
                    .get_option("module-config")?
                    .split_whitespace()
                    .any(|m| m == "validator"),
                do_ip4,
                do_ip6,
                query_timeout: Duration::from_millis(self.number("query-timeout")?),
                edns_buffer_size,
                max_in_flight: self.number("num-queries-per-thread")? as usize,
                forwarders: self.forwarders.clone(),
                stubs: self.stubs.clone(),
                ..ResolverSettings::default()
            },
            transport: TransportOptions {
                do_udp,
                do_tcp,
                edns_buffer_size,
                max_udp_size: self.number("max-udp-size")? as u16,
                retries: self.number("outbound-msg-retry")? as u32,
                ..TransportOptions::default()
            },
            cache: CacheLimits {
                min_ttl: self.number("cache-min-ttl")? as u32,
                max_ttl: self.number("cache-max-ttl")? as u32,
                max_negative_ttl: self.number("cache-max-negative-ttl")? as u32,
                max_entries: self.number("msg-cache-size")? as usize,
            },
            validator: ValidatorOptions {
                harden_dnssec_stripped: self.flag("harden-dnssec-stripped")?,
                min_algorithm: self.number("val-min-algorithm")? as u8,
                override_date,
            },
            anchors: self.anchors.clone(),
            hosts: self.hosts.clone(),
            verbosity: self.number("verbosity")? as u8,
            logfile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{ZoneSigner, name};

    fn temp_file(label: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "anchorage-{label}-{}-{}",
            std::process::id(),
            rand::random::<u32>()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_build() {
        let config = ConfigBuilder::new().build().unwrap();
        assert!(config.resolver.validate);
        assert!(config.resolver.forwarders.is_empty());
        assert_eq!(config.resolver.query_timeout, Duration::from_millis(1500));
        assert_eq!(config.transport.retries, 3);
        assert_eq!(config.cache.max_ttl, 86400);
        assert!(config.validator.harden_dnssec_stripped);
        assert_eq!(config.logfile, None);
        assert_eq!(log_directive(config.verbosity), "error");
        assert_eq!(log_directive(5), "trace");
    }

    #[test]
    fn trailing_colon_and_booleans() {
        let mut builder = ConfigBuilder::new();
        builder.set_option("do-ip6:", "no").unwrap();
        builder.set_option("harden-dnssec-stripped", "NO").unwrap();
        assert_eq!(builder.get_option("do-ip6").unwrap(), "no");
        assert_eq!(builder.get_option("harden-dnssec-stripped:").unwrap(), "no");

        let err = builder.set_option("do-ip4", "true").unwrap_err();
        assert_eq!(err.kind(), "InvalidValue");

        let config = builder.build().unwrap();
        assert!(!config.resolver.do_ip6);
        assert!(!config.validator.harden_dnssec_stripped);
    }

    #[test]
    fn unknown_options_are_rejected() {
        let mut builder = ConfigBuilder::new();
        assert!(builder.has_option("logfile"));
        assert!(builder.has_option("logfile:"));
        assert!(!builder.has_option("foobar"));
        assert_eq!(builder.set_option("foobar", "yes").unwrap_err().kind(), "UnknownOption");
        assert_eq!(builder.get_option("foobar").unwrap_err().kind(), "UnknownOption");
    }

    #[test]
    fn numbers_are_range_checked() {
        let mut builder = ConfigBuilder::new();
        builder.set_option("max-udp-size", "4096").unwrap();
        builder.set_option("cache-min-ttl", " 60 ").unwrap();
        assert_eq!(builder.get_option("cache-min-ttl").unwrap(), "60");
        assert!(builder.set_option("edns-buffer-size", "100").is_err());
        assert!(builder.set_option("verbosity", "9").is_err());
        assert!(builder.set_option("query-timeout", "soon").is_err());
        let long = "x".repeat(MAX_OPTION_VALUE_LEN + 1);
        assert_eq!(builder.set_option("logfile", &long).unwrap_err().kind(), "InvalidValue");

        let config = builder.build().unwrap();
        assert_eq!(config.cache.min_ttl, 60);
        assert_eq!(config.transport.max_udp_size, 4096);
    }

    #[test]
    fn module_config_toggles_validation() {
        let mut builder = ConfigBuilder::new();
        builder.set_option("module-config", "iterator").unwrap();
        assert!(!builder.build().unwrap().resolver.validate);

        builder.set_option("module-config", "validator  iterator").unwrap();
        assert_eq!(builder.get_option("module-config").unwrap(), "validator iterator");
        assert!(builder.build().unwrap().resolver.validate);

        assert!(builder.set_option("module-config", "validator").is_err());
        assert!(builder.set_option("module-config", "python iterator").is_err());
    }

    #[test]
    fn override_date_accepts_both_forms() {
        let mut builder = ConfigBuilder::new();
        builder.set_option("val-override-date", "20231114221320").unwrap();
        assert_eq!(builder.build().unwrap().validator.override_date, Some(1_700_000_000));

        builder.set_option("val-override-date", "1700000000").unwrap();
        assert_eq!(builder.build().unwrap().validator.override_date, Some(1_700_000_000));

        builder.set_option("val-override-date", "").unwrap();
        assert_eq!(builder.build().unwrap().validator.override_date, None);

        assert!(builder.set_option("val-override-date", "2023-11-14").is_err());
    }

    #[test]
    fn one_family_and_one_transport_stay_enabled() {
        let mut builder = ConfigBuilder::new();
        builder.set_option("do-udp", "no").unwrap();
        assert_eq!(builder.set_option("do-tcp", "no").unwrap_err().kind(), "InvalidValue");
        builder.set_option("do-ip4", "no").unwrap();
        assert!(builder.set_option("do-ip6", "no").is_err());

        let config = builder.build().unwrap();
        assert!(!config.transport.do_udp);
        assert!(config.transport.do_tcp);
        assert!(!config.resolver.do_ip4);
    }

    #[test]
    fn server_addresses() {
        assert_eq!(parse_server("192.0.2.1").unwrap(), "192.0.2.1:53".parse().unwrap());
        assert_eq!(parse_server("192.0.2.1@5353").unwrap(), "192.0.2.1:5353".parse().unwrap());
        assert_eq!(parse_server("[2001:db8::1]:54").unwrap(), "[2001:db8::1]:54".parse().unwrap());
        assert_eq!(parse_server("fe80::1%eth0").unwrap(), "[fe80::1]:53".parse().unwrap());
        assert_eq!(parse_server("resolver.local").unwrap_err().kind(), "InvalidAddress");
    }

    #[test]
    fn forwarders_and_stubs() {
        let mut builder = ConfigBuilder::new();
        builder.set_forward("192.0.2.53").unwrap();
        builder.set_forward("192.0.2.53").unwrap();
        builder.set_stub("corp.example", "10.0.0.1", false).unwrap();
        builder.set_stub("corp.example.", "10.0.0.2@5353", true).unwrap();

        let config = builder.build().unwrap();
        assert_eq!(config.resolver.forwarders.len(), 1);
        assert_eq!(config.resolver.stubs.len(), 1);
        let stub = &config.resolver.stubs[0];
        assert_eq!(stub.zone, name("corp.example"));
        assert_eq!(stub.servers.len(), 2);
        assert!(stub.prime);
    }

    #[test]
    fn resolv_conf_nameservers() {
        let text = "\
# generated
search example.com
nameserver 192.0.2.53
nameserver 2001:db8::53 ; secondary
options ndots:2
";
        let servers = parse_resolv_conf(text).unwrap();
        assert_eq!(
            servers,
            vec![
                "192.0.2.53:53".parse::<SocketAddr>().unwrap(),
                "[2001:db8::53]:53".parse().unwrap(),
            ]
        );

        let err = parse_resolv_conf("nameserver\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
    }

    #[test]
    fn resolv_conf_and_hosts_files() {
        let resolv = temp_file("resolv", "nameserver 192.0.2.53\n");
        let hosts = temp_file("hosts", "127.0.0.1 localhost\n10.0.0.5 build.lan build\n");

        let mut builder = ConfigBuilder::new();
        assert_eq!(builder.set_resolv_conf(Some(&resolv)).unwrap(), 1);
        assert_eq!(builder.set_hosts(Some(&hosts)).unwrap(), 3);
        let config = builder.build().unwrap();
        assert_eq!(config.resolver.forwarders, vec!["192.0.2.53:53".parse().unwrap()]);
        assert_eq!(config.hosts.len(), 3);

        let missing = std::env::temp_dir().join("anchorage-missing-resolv.conf");
        assert_eq!(builder.set_resolv_conf(Some(&missing)).unwrap_err().kind(), "Io");

        fs::remove_file(resolv).unwrap();
        fs::remove_file(hosts).unwrap();
    }

    #[test]
    fn trust_anchors_are_collected() {
        let root = ZoneSigner::new(".", 1);
        let mut builder = ConfigBuilder::new();
        assert_eq!(builder.add_trust_anchor(&root.ds_anchor()).unwrap(), 1);
        assert_eq!(builder.add_trust_anchor("nonsense").unwrap_err().kind(), "InvalidRecord");
        assert_eq!(builder.build().unwrap().anchors.len(), 1);
    }
}
