//! DNS query resolution.
//!
//! Handles the query pipeline for one question:
//! 1. Local zones and data
//! 2. Cache lookup
//! 3. Iterative resolution (or forwarding) on a miss
//! 4. DNSSEC validation, then write-through to the cache
//!
//! CNAMEs are chased by repeating the pipeline for the target name.

mod iterate;
pub mod local;
mod validate;

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

pub use iterate::{MAX_DEPENDENCY_DEPTH, MAX_REFERRALS, StubZone, root_hints};
pub use local::{LocalAnswer, LocalZones, ZoneType};

use crate::cache::{Cache, CachedData, Security};
use crate::dns::{Header, Message, Name, Question, RData, Record, RecordSet, rcode, rtype};
use crate::error::ResolveError;
use crate::stats::Stats;
use crate::transport::Transport;
use crate::trust::TrustStore;

/// Longest CNAME chain followed for one query.
pub const MAX_CNAME_CHAIN: usize = 8;

/// The outcome of one query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolutionResult {
    pub qname: Option<String>,
    pub qtype: u16,
    pub qclass: u16,
    /// RDATA of each answer record.
    pub data: Vec<Vec<u8>>,
    /// Final name of a CNAME chain; `None` unless a CNAME was followed.
    pub canonname: Option<String>,
    pub rcode: u8,
    pub answer_packet: Option<Vec<u8>>,
    pub have_data: bool,
    pub nxdomain: bool,
    pub secure: bool,
    pub bogus: bool,
    pub why_bogus: Option<String>,
    /// No rate limiting is done, so this is never set.
    pub was_ratelimited: bool,
    pub ttl: u32,
}

impl ResolutionResult {
    /// Typed view of [`data`](Self::data).
    pub fn records(&self) -> Vec<RData> {
        self.data
            .iter()
            .filter_map(|rdata| RData::from_wire(self.qtype, rdata).ok())
            .collect()
    }
}

/// Resolver knobs that do not belong to the cache, trust store or
/// transport.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Run the validator module.
    pub validate: bool,
    pub do_ip4: bool,
    pub do_ip6: bool,
    pub query_timeout: Duration,
    pub edns_buffer_size: u16,
    /// Distinct questions that may be resolving at once.
    pub max_in_flight: usize,
    pub forwarders: Vec<SocketAddr>,
    pub stubs: Vec<StubZone>,
    pub root_hints: Vec<SocketAddr>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            validate: true,
            do_ip4: true,
            do_ip6: true,
            query_timeout: Duration::from_millis(1500),
            edns_buffer_size: 1232,
            max_in_flight: 1024,
            forwarders: Vec::new(),
            stubs: Vec::new(),
            root_hints: root_hints(),
        }
    }
}

/// What the data for one name/type says.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Answer {
    Positive(RecordSet),
    /// A CNAME at the queried name.
    Alias(RecordSet),
    Negative { nxdomain: bool, authority: Vec<Record> },
}

impl Answer {
    /// Whether any RRSIG came with the data.
    fn is_signed(&self) -> bool {
        match self {
            Answer::Positive(set) | Answer::Alias(set) => !set.signatures.is_empty(),
            Answer::Negative { authority, .. } => {
                authority.iter().any(|r| r.rtype == rtype::RRSIG)
            }
        }
    }

    fn ttl(&self) -> u32 {
        match self {
            Answer::Positive(set) | Answer::Alias(set) => set.min_ttl(),
            Answer::Negative { authority, .. } => negative_ttl(authority),
        }
    }
}

#[derive(Debug, Clone)]
struct Lookup {
    answer: Answer,
    security: Security,
}

/// TTL of a negative answer: the SOA's TTL capped by its minimum field.
fn negative_ttl(authority: &[Record]) -> u32 {
    authority
        .iter()
        .find_map(|r| match r.data() {
            Ok(RData::Soa(soa)) => Some(r.ttl.min(soa.minimum)),
            _ => None,
        })
        .unwrap_or(0)
}

/// Fold one step's security into the running state of a CNAME chain.
fn combine(acc: Security, next: Security) -> Security {
    match (acc, next) {
        (bogus @ Security::Bogus(_), _) => bogus,
        (_, bogus @ Security::Bogus(_)) => bogus,
        (Security::Secure, Security::Secure) => Security::Secure,
        _ => Security::Insecure,
    }
}

pub struct Resolver {
    settings: ResolverSettings,
    cache: Arc<Cache>,
    trust: TrustStore,
    local: RwLock<LocalZones>,
    transport: Arc<dyn Transport>,
    stats: Arc<Stats>,
}

impl Resolver {
    pub fn new(
        settings: ResolverSettings,
        cache: Arc<Cache>,
        trust: TrustStore,
        local: LocalZones,
        transport: Arc<dyn Transport>,
        stats: Arc<Stats>,
    ) -> Self {
        info!(
            validate = settings.validate,
            forwarders = settings.forwarders.len(),
            stubs = settings.stubs.len(),
            anchors = trust.anchors().len(),
            "resolver ready"
        );
        Self {
            settings,
            cache,
            trust,
            local: RwLock::new(local),
            transport,
            stats,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn trust(&self) -> &TrustStore {
        &self.trust
    }

    /// Change local zones and data while queries are running.
    pub fn with_local_zones<R>(&self, f: impl FnOnce(&mut LocalZones) -> R) -> R {
        let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut local)
    }

    fn local_answer(&self, question: &Question) -> Option<LocalAnswer> {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .answer(question)
    }

    /// Resolve one question to completion.
    pub async fn resolve(&self, question: Question) -> Result<ResolutionResult, ResolveError> {
        let started = Instant::now();
        let mut aliases: Vec<RecordSet> = Vec::new();
        let mut security = Security::Secure;
        let mut current = question.name.clone();
        let mut used_network = false;

        loop {
            let step = Question::new(current.clone(), question.qtype, question.qclass);
            let lookup = match self.local_answer(&step) {
                Some(local) => match local_lookup(&step, local) {
                    Ok(lookup) => lookup,
                    Err(local) => {
                        debug!(%question, rcode = rcode::to_str(local.rcode), "answered from local data");
                        self.stats.record_local(started.elapsed());
                        return Ok(from_local(&question, local));
                    }
                },
                None => {
                    used_network = true;
                    self.lookup(&step).await?
                }
            };
            security = combine(security, lookup.security);

            let set = match lookup.answer {
                Answer::Alias(set) => set,
                answer => {
                    let result = assemble(&question, &aliases, &answer, &security);
                    if used_network {
                        self.stats.record_completed(started.elapsed(), &security);
                    } else {
                        self.stats.record_local(started.elapsed());
                    }
                    debug!(
                        %question,
                        rcode = rcode::to_str(result.rcode),
                        secure = result.secure,
                        bogus = result.bogus,
                        local = !used_network,
                        "resolved"
                    );
                    return Ok(result);
                }
            };

            if aliases.len() == MAX_CNAME_CHAIN {
                return Err(ResolveError::TooManyRedirects {
                    limit: MAX_CNAME_CHAIN,
                });
            }
            current = cname_target(&set).ok_or_else(|| {
                ResolveError::server_failure(&current, "CNAME without a target")
            })?;
            aliases.push(set);
        }
    }

    /// Cache, then network. Answers fetched here are validated before they
    /// are cached; infrastructure entries met in the cache are validated on
    /// first use.
    async fn lookup(&self, question: &Question) -> Result<Lookup, ResolveError> {
        if let Some(mut hit) = self.cached(question) {
            let checked = hit.security != Security::Unchecked;
            if checked || !self.settings.validate || hit.answer.is_signed() {
                self.stats.record_cache_hit();
                if !checked {
                    hit.security = self.validate_answer(question, &hit.answer).await;
                    self.store(question, &hit.answer, hit.security.clone());
                }
                return Ok(hit);
            }
            // Unsigned infrastructure data may be the parent's copy from a
            // referral; only the zone itself can vouch for it.
            trace!(%question, "refetching unsigned infrastructure data");
        }
        self.stats.record_cache_miss();

        let reply = self.fetch(question, 0).await?;
        let answer = classify(question, &reply);
        let security = self.validate_answer(question, &answer).await;
        self.store(question, &answer, security.clone());
        Ok(Lookup { answer, security })
    }

    fn cached(&self, question: &Question) -> Option<Lookup> {
        if let Some(hit) = self.cache.lookup(question) {
            let answer = match hit.data {
                CachedData::Positive(set) => Answer::Positive(set),
                CachedData::Negative { nxdomain, authority } => {
                    Answer::Negative { nxdomain, authority }
                }
            };
            return Some(Lookup {
                answer,
                security: hit.security,
            });
        }
        if question.qtype == rtype::CNAME {
            return None;
        }
        let alias = Question::new(question.name.clone(), rtype::CNAME, question.qclass);
        let hit = self.cache.lookup(&alias)?;
        match hit.data {
            CachedData::Positive(set) => Some(Lookup {
                answer: Answer::Alias(set),
                security: hit.security,
            }),
            CachedData::Negative { .. } => None,
        }
    }

    fn store(&self, question: &Question, answer: &Answer, security: Security) {
        let ttl = answer.ttl();
        match answer {
            Answer::Positive(set) => {
                self.cache
                    .store(question.clone(), CachedData::Positive(set.clone()), ttl, security)
            }
            Answer::Alias(set) => self.cache.store(
                Question::new(question.name.clone(), rtype::CNAME, question.qclass),
                CachedData::Positive(set.clone()),
                ttl,
                security,
            ),
            Answer::Negative { nxdomain, authority } => self.cache.store(
                question.clone(),
                CachedData::Negative {
                    nxdomain: *nxdomain,
                    authority: authority.clone(),
                },
                ttl,
                security,
            ),
        }
    }
}

fn cname_target(set: &RecordSet) -> Option<Name> {
    set.records.iter().find_map(|r| match r.data() {
        Ok(RData::Cname(target)) => Some(target),
        _ => None,
    })
}

/// Sort a reply into answer, alias or negative for `question`.
fn classify(question: &Question, reply: &Message) -> Answer {
    let sets = RecordSet::group(&reply.answers);
    let at_name = |rtype: u16| {
        sets.iter()
            .find(|s| s.name() == Some(&question.name) && s.rtype() == Some(rtype))
            .cloned()
    };

    let direct = if question.qtype == rtype::ANY {
        sets.iter()
            .find(|s| s.name() == Some(&question.name))
            .cloned()
    } else {
        at_name(question.qtype)
    };
    if let Some(set) = direct {
        return Answer::Positive(set);
    }
    if let Some(set) = at_name(rtype::CNAME) {
        return Answer::Alias(set);
    }

    let authority = reply
        .authority
        .iter()
        .filter(|r| match r.rtype {
            rtype::SOA | rtype::NSEC | rtype::NSEC3 => true,
            rtype::RRSIG => matches!(
                r.covered_type(),
                Some(rtype::SOA | rtype::NSEC | rtype::NSEC3)
            ),
            _ => false,
        })
        .cloned()
        .collect();
    Answer::Negative {
        nxdomain: reply.header.rcode == rcode::NXDOMAIN,
        authority,
    }
}

fn assemble(
    question: &Question,
    aliases: &[RecordSet],
    answer: &Answer,
    security: &Security,
) -> ResolutionResult {
    let mut answers: Vec<Record> = aliases.iter().flat_map(RecordSet::to_records).collect();
    let mut authority = Vec::new();
    let mut data = Vec::new();
    let mut nxdomain = false;
    let mut ttl = aliases.iter().map(RecordSet::min_ttl).min();

    match answer {
        Answer::Positive(set) | Answer::Alias(set) => {
            data = set.records.iter().map(|r| r.rdata.clone()).collect();
            answers.extend(set.to_records());
            ttl = Some(ttl.map_or(set.min_ttl(), |t| t.min(set.min_ttl())));
        }
        Answer::Negative {
            nxdomain: nx,
            authority: records,
        } => {
            nxdomain = *nx;
            authority = records.clone();
            ttl = Some(ttl.map_or(negative_ttl(records), |t| t.min(negative_ttl(records))));
        }
    }

    let rcode = if nxdomain { rcode::NXDOMAIN } else { rcode::NOERROR };
    let canonname = aliases
        .last()
        .and_then(cname_target)
        .map(|name| name.to_string());

    ResolutionResult {
        qname: Some(question.name.to_string()),
        qtype: question.qtype,
        qclass: question.qclass,
        have_data: !data.is_empty(),
        data,
        canonname,
        rcode,
        answer_packet: Some(answer_packet(question, rcode, security.is_secure(), answers, authority)),
        nxdomain,
        secure: security.is_secure(),
        bogus: security.is_bogus(),
        why_bogus: security.why_bogus().map(str::to_string),
        was_ratelimited: false,
        ttl: ttl.unwrap_or(0),
    }
}

/// Local data as an engine answer, so local CNAMEs are chased like any
/// other. Answers that are neither data nor a denial (refused, denied)
/// are handed back unchanged.
fn local_lookup(question: &Question, local: LocalAnswer) -> Result<Lookup, LocalAnswer> {
    if local.rcode != rcode::NOERROR && local.rcode != rcode::NXDOMAIN {
        return Err(local);
    }
    let matching: Vec<Record> = local
        .answers
        .iter()
        .filter(|r| r.rtype == question.qtype || question.qtype == rtype::ANY)
        .cloned()
        .collect();
    let aliases: Vec<Record> = local
        .answers
        .iter()
        .filter(|r| r.rtype == rtype::CNAME)
        .cloned()
        .collect();

    let answer = if !matching.is_empty() {
        Answer::Positive(RecordSet::new(matching, Vec::new()))
    } else if !aliases.is_empty() {
        Answer::Alias(RecordSet::new(aliases, Vec::new()))
    } else {
        Answer::Negative {
            nxdomain: local.rcode == rcode::NXDOMAIN,
            authority: local.authority,
        }
    };
    Ok(Lookup {
        answer,
        security: Security::Insecure,
    })
}

fn from_local(question: &Question, local: LocalAnswer) -> ResolutionResult {
    let data: Vec<Vec<u8>> = local
        .answers
        .iter()
        .filter(|r| r.rtype == question.qtype || question.qtype == rtype::ANY)
        .map(|r| r.rdata.clone())
        .collect();
    let ttl = local
        .answers
        .iter()
        .chain(&local.authority)
        .map(|r| r.ttl)
        .min()
        .unwrap_or(0);

    ResolutionResult {
        qname: Some(question.name.to_string()),
        qtype: question.qtype,
        qclass: question.qclass,
        have_data: !data.is_empty(),
        data,
        canonname: None,
        rcode: local.rcode,
        answer_packet: Some(answer_packet(
            question,
            local.rcode,
            false,
            local.answers,
            local.authority,
        )),
        nxdomain: local.rcode == rcode::NXDOMAIN,
        secure: false,
        bogus: false,
        why_bogus: None,
        was_ratelimited: false,
        ttl,
    }
}

fn answer_packet(
    question: &Question,
    rcode: u8,
    secure: bool,
    answers: Vec<Record>,
    authority: Vec<Record>,
) -> Vec<u8> {
    Message {
        header: Header {
            qr: true,
            rd: true,
            ra: true,
            ad: secure,
            rcode,
            ..Header::default()
        },
        questions: vec![question.clone()],
        answers,
        authority,
        additional: Vec::new(),
    }
    .encode()
}
