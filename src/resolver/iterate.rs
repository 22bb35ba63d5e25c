//! Iterative resolution: root hints, referrals, glue and server selection.

use std::net::{IpAddr, SocketAddr};

use futures::FutureExt;
use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use tracing::{debug, trace};

use super::{Answer, Lookup, Resolver, classify};
use crate::cache::{CachedData, Security};
use crate::dns::{Message, Name, Question, RData, Record, RecordSet, class, rcode, rtype};
use crate::error::ResolveError;

/// Referrals followed for one question before giving up.
pub const MAX_REFERRALS: usize = 30;

/// How deep resolving a nameserver's own address may nest.
pub const MAX_DEPENDENCY_DEPTH: usize = 4;

const DNS_PORT: u16 = 53;

/// IANA root server addresses.
const ROOT_HINTS: [(&str, &str); 13] = [
    ("198.41.0.4", "2001:503:ba3e::2:30"),
    ("170.247.170.2", "2801:1b8:10::b"),
    ("192.33.4.12", "2001:500:2::c"),
    ("199.7.91.13", "2001:500:2d::d"),
    ("192.203.230.10", "2001:500:a8::e"),
    ("192.5.5.241", "2001:500:2f::f"),
    ("192.112.36.4", "2001:500:12::d0d"),
    ("198.97.190.53", "2001:500:1::53"),
    ("192.36.148.17", "2001:7fe::53"),
    ("192.58.128.30", "2001:503:c27::2:30"),
    ("193.0.14.129", "2001:7fd::1"),
    ("199.7.83.42", "2001:500:9f::42"),
    ("202.12.27.33", "2001:dc3::35"),
];

pub fn root_hints() -> Vec<SocketAddr> {
    ROOT_HINTS
        .iter()
        .flat_map(|(v4, v6)| [v4, v6])
        .filter_map(|addr| addr.parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .collect()
}

/// A zone whose queries go straight to fixed servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubZone {
    pub zone: Name,
    pub servers: Vec<SocketAddr>,
    /// Ask the servers for the zone's NS set and use those instead.
    pub prime: bool,
}

#[derive(Debug)]
enum Reply {
    Answer(Message),
    Referral(Referral),
}

#[derive(Debug)]
struct Referral {
    zone: Name,
    ns: RecordSet,
    /// In-bailiwick addresses of the NS targets.
    glue: Vec<Record>,
    ds: Option<RecordSet>,
    /// NSEC/NSEC3 denying a DS at the cut, with signatures.
    no_ds: Vec<Record>,
}

/// Sort a server's reply, or say why it is unusable.
fn check_reply(
    question: &Question,
    zone: &Name,
    reply: Message,
    forwarding: bool,
) -> Result<Reply, String> {
    if reply.question() != Some(question) {
        return Err("question mismatch".to_string());
    }
    match reply.header.rcode {
        rcode::NOERROR | rcode::NXDOMAIN => {}
        other => return Err(format!("server returned {}", rcode::to_str(other))),
    }
    if forwarding || reply.header.rcode != rcode::NOERROR || !reply.answers.is_empty() {
        return Ok(Reply::Answer(reply));
    }

    let sets = RecordSet::group(&reply.authority);
    let Some(ns) = sets.iter().find(|s| s.rtype() == Some(rtype::NS)) else {
        return Ok(Reply::Answer(reply));
    };
    let Some(cut) = ns.name().cloned() else {
        return Ok(Reply::Answer(reply));
    };

    let downward = cut != *zone && cut.is_subdomain_of(zone) && question.name.is_subdomain_of(&cut);
    if !downward {
        let has_soa = sets.iter().any(|s| s.rtype() == Some(rtype::SOA));
        if !reply.header.aa && !has_soa {
            return Err(format!("lame referral to {cut}"));
        }
        return Ok(Reply::Answer(reply));
    }
    if question.qtype == rtype::DS && question.name == cut {
        return Err(format!("referral instead of DS for {cut}"));
    }

    let targets: Vec<Name> = ns_targets(ns);
    let glue = reply
        .additional
        .iter()
        .filter(|r| matches!(r.rtype, rtype::A | rtype::AAAA))
        .filter(|r| r.name.is_subdomain_of(zone) && targets.contains(&r.name))
        .cloned()
        .collect();
    let ds = sets
        .iter()
        .find(|s| s.rtype() == Some(rtype::DS) && s.name() == Some(&cut))
        .cloned();
    let no_ds = reply
        .authority
        .iter()
        .filter(|r| match r.rtype {
            rtype::NSEC | rtype::NSEC3 => true,
            rtype::RRSIG => matches!(r.covered_type(), Some(rtype::NSEC | rtype::NSEC3)),
            _ => false,
        })
        .cloned()
        .collect();

    Ok(Reply::Referral(Referral {
        zone: cut,
        ns: ns.clone(),
        glue,
        ds,
        no_ds,
    }))
}

fn ns_targets(ns: &RecordSet) -> Vec<Name> {
    ns.records
        .iter()
        .filter_map(|r| match r.data() {
            Ok(RData::Ns(target)) => Some(target),
            _ => None,
        })
        .collect()
}

fn addresses(records: &[Record]) -> Vec<SocketAddr> {
    records
        .iter()
        .filter_map(|r| match r.data() {
            Ok(RData::A(v4)) => Some(SocketAddr::new(v4.into(), DNS_PORT)),
            Ok(RData::Aaaa(v6)) => Some(SocketAddr::new(v6.into(), DNS_PORT)),
            _ => None,
        })
        .collect()
}

impl Resolver {
    /// Cache, then network, without validation. Results are cached as
    /// unchecked infrastructure data.
    pub(super) fn lookup_infra<'a>(
        &'a self,
        question: &'a Question,
        depth: usize,
    ) -> BoxFuture<'a, Result<Lookup, ResolveError>> {
        async move {
            if let Some(hit) = self.cached(question) {
                return Ok(hit);
            }
            if depth > MAX_DEPENDENCY_DEPTH {
                return Err(ResolveError::server_failure(
                    &question.name,
                    "nameserver dependency chain too deep",
                ));
            }
            let reply = self.fetch(question, depth).await?;
            let answer = classify(question, &reply);
            self.store(question, &answer, Security::Unchecked);
            Ok(Lookup {
                answer,
                security: Security::Unchecked,
            })
        }
        .boxed()
    }

    /// Follow referrals from the best known servers until some server
    /// answers.
    pub(super) async fn fetch(
        &self,
        question: &Question,
        depth: usize,
    ) -> Result<Message, ResolveError> {
        let (mut zone, mut servers, forwarding) = self.starting_point(question, depth).await;

        for _ in 0..MAX_REFERRALS {
            if servers.is_empty() {
                return Err(ResolveError::server_failure(&zone, "no usable server addresses"));
            }
            let referral = match self.ask(question, &zone, &servers, forwarding).await? {
                Reply::Answer(message) => return Ok(message),
                Reply::Referral(referral) => referral,
            };
            trace!(%question, from = %zone, to = %referral.zone, "referral");
            self.cache_referral(&referral);
            servers = self
                .server_addresses(&referral.ns, &referral.glue, depth)
                .await;
            zone = referral.zone;
        }
        Err(ResolveError::server_failure(&zone, "too many referrals"))
    }

    /// Where to send the first query: a stub zone, the forwarders, the
    /// closest delegation in the cache, or the root.
    async fn starting_point(&self, question: &Question, depth: usize) -> (Name, Vec<SocketAddr>, bool) {
        // DS records live on the parent side of a zone cut.
        let search = match question.qtype {
            rtype::DS => question.name.parent().unwrap_or_else(Name::root),
            _ => question.name.clone(),
        };

        let stub = self
            .settings
            .stubs
            .iter()
            .filter(|stub| search.is_subdomain_of(&stub.zone))
            .max_by_key(|stub| stub.zone.label_count());
        if let Some(stub) = stub {
            let mut servers = self.usable(&stub.servers);
            if stub.prime {
                if let Some(primed) = self.prime_stub(stub, depth).await {
                    servers = primed;
                }
            }
            return (stub.zone.clone(), servers, false);
        }

        if !self.settings.forwarders.is_empty() {
            return (Name::root(), self.usable(&self.settings.forwarders), true);
        }

        let mut current = Some(search);
        while let Some(zone) = current {
            if let Some(ns) = self.cached_ns(&zone) {
                let servers = self.cached_addresses(&ns_targets(&ns));
                if !servers.is_empty() {
                    return (zone, servers, false);
                }
            }
            current = zone.parent();
        }
        (Name::root(), self.usable(&self.settings.root_hints), false)
    }

    async fn prime_stub(&self, stub: &StubZone, depth: usize) -> Option<Vec<SocketAddr>> {
        if let Some(ns) = self.cached_ns(&stub.zone) {
            let servers = self.cached_addresses(&ns_targets(&ns));
            if !servers.is_empty() {
                return Some(servers);
            }
        }

        let question = Question::new(stub.zone.clone(), rtype::NS, class::IN);
        let servers = self.usable(&stub.servers);
        let reply = match self.ask(&question, &stub.zone, &servers, false).await {
            Ok(Reply::Answer(reply)) => reply,
            Ok(Reply::Referral(_)) => return None,
            Err(e) => {
                debug!(zone = %stub.zone, error = %e, "stub priming failed");
                return None;
            }
        };
        let ns = RecordSet::group(&reply.answers)
            .into_iter()
            .find(|s| s.rtype() == Some(rtype::NS))?;
        let targets = ns_targets(&ns);
        let glue: Vec<Record> = reply
            .additional
            .iter()
            .filter(|r| targets.contains(&r.name))
            .cloned()
            .collect();
        self.cache_infra(question, &ns);
        self.cache_glue(&glue);
        let primed = self.server_addresses(&ns, &glue, depth).await;
        debug!(zone = %stub.zone, servers = primed.len(), "stub primed");
        (!primed.is_empty()).then_some(primed)
    }

    fn cached_ns(&self, zone: &Name) -> Option<RecordSet> {
        let hit = self
            .cache
            .lookup(&Question::new(zone.clone(), rtype::NS, class::IN))?;
        match hit.data {
            CachedData::Positive(set) => Some(set),
            CachedData::Negative { .. } => None,
        }
    }

    fn cached_addresses(&self, names: &[Name]) -> Vec<SocketAddr> {
        let mut found = Vec::new();
        for name in names {
            for qtype in [rtype::A, rtype::AAAA] {
                let question = Question::new(name.clone(), qtype, class::IN);
                if let Some(hit) = self.cache.lookup(&question) {
                    if let CachedData::Positive(set) = hit.data {
                        found.extend(addresses(&set.records));
                    }
                }
            }
        }
        self.usable(&found)
    }

    /// Addresses for a delegation's nameservers: glue, then the cache, then
    /// resolving the names themselves.
    async fn server_addresses(
        &self,
        ns: &RecordSet,
        glue: &[Record],
        depth: usize,
    ) -> Vec<SocketAddr> {
        let targets = ns_targets(ns);
        let mut found = self.usable(&addresses(glue));
        found.extend(self.cached_addresses(&targets));

        if found.is_empty() && depth < MAX_DEPENDENCY_DEPTH {
            let cut = ns.name().cloned().unwrap_or_else(Name::root);
            // Names inside the cut cannot be found without glue.
            for target in targets.iter().filter(|t| !t.is_subdomain_of(&cut)) {
                for qtype in self.address_types() {
                    let question = Question::new(target.clone(), qtype, class::IN);
                    match self.lookup_infra(&question, depth + 1).await {
                        Ok(Lookup {
                            answer: Answer::Positive(set),
                            ..
                        }) => found.extend(self.usable(&addresses(&set.records))),
                        Ok(_) => {}
                        Err(e) => debug!(%target, error = %e, "nameserver address lookup failed"),
                    }
                }
                if !found.is_empty() {
                    break;
                }
            }
        }

        found.sort();
        found.dedup();
        found
    }

    fn address_types(&self) -> Vec<u16> {
        let mut types = Vec::with_capacity(2);
        if self.settings.do_ip4 {
            types.push(rtype::A);
        }
        if self.settings.do_ip6 {
            types.push(rtype::AAAA);
        }
        types
    }

    fn usable(&self, servers: &[SocketAddr]) -> Vec<SocketAddr> {
        servers
            .iter()
            .filter(|addr| match addr {
                SocketAddr::V4(_) => self.settings.do_ip4,
                SocketAddr::V6(_) => self.settings.do_ip6,
            })
            .copied()
            .collect()
    }

    /// Ask each server in turn until one gives a usable reply.
    async fn ask(
        &self,
        question: &Question,
        zone: &Name,
        servers: &[SocketAddr],
        forwarding: bool,
    ) -> Result<Reply, ResolveError> {
        let mut order = servers.to_vec();
        order.shuffle(&mut rand::rng());

        let mut query = Message::query(0, question.clone(), forwarding);
        // Forwarders must hand back data that fails their validation so it
        // can be checked here.
        query.header.cd = forwarding && self.settings.validate;
        query.set_edns(self.settings.edns_buffer_size, self.settings.validate);

        let mut reason = "no servers".to_string();
        for server in order {
            self.stats.record_upstream();
            match self
                .transport
                .send(&query, server, self.settings.query_timeout)
                .await
            {
                Ok(reply) => match check_reply(question, zone, reply, forwarding) {
                    Ok(reply) => return Ok(reply),
                    Err(why) => {
                        debug!(%server, %question, reason = %why, "reply rejected");
                        reason = why;
                    }
                },
                Err(e) => {
                    debug!(%server, %question, error = %e, "server failed");
                    reason = e.to_string();
                }
            }
            self.stats.record_server_failure();
        }
        Err(ResolveError::server_failure(zone, reason))
    }

    fn cache_referral(&self, referral: &Referral) {
        let cut = &referral.zone;
        self.cache_infra(Question::new(cut.clone(), rtype::NS, class::IN), &referral.ns);
        self.cache_glue(&referral.glue);

        let ds_question = Question::new(cut.clone(), rtype::DS, class::IN);
        if let Some(ds) = &referral.ds {
            self.cache_infra(ds_question, ds);
        } else if referral.no_ds.iter().any(|r| r.rtype != rtype::RRSIG)
            && !self.holds_checked(&ds_question)
        {
            let ttl = referral.no_ds.iter().map(|r| r.ttl).min().unwrap_or(0);
            self.cache.store(
                ds_question,
                CachedData::Negative {
                    nxdomain: false,
                    authority: referral.no_ds.clone(),
                },
                ttl,
                Security::Unchecked,
            );
        }
    }

    fn cache_glue(&self, glue: &[Record]) {
        for set in RecordSet::group(glue) {
            if let (Some(name), Some(rtype)) = (set.name(), set.rtype()) {
                self.cache_infra(Question::new(name.clone(), rtype, class::IN), &set);
            }
        }
    }

    /// Whether the cache already holds validated data for `question`.
    /// Referral data never replaces it.
    fn holds_checked(&self, question: &Question) -> bool {
        self.cache
            .lookup(question)
            .is_some_and(|hit| hit.security != Security::Unchecked)
    }

    fn cache_infra(&self, question: Question, set: &RecordSet) {
        if self.holds_checked(&question) {
            return;
        }
        self.cache.store(
            question,
            CachedData::Positive(set.clone()),
            set.min_ttl(),
            Security::Unchecked,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{name, rr};

    fn question(qname: &str, qtype: u16) -> Question {
        Question::new(name(qname), qtype, class::IN)
    }

    fn reply_to(question: &Question) -> Message {
        let mut reply = Message::response_to(&Message::query(1, question.clone(), false));
        reply.header.qr = true;
        reply
    }

    #[test]
    fn root_hints_cover_both_families() {
        let hints = root_hints();
        assert_eq!(hints.len(), 26);
        assert!(hints.iter().any(SocketAddr::is_ipv6));
        assert!(hints.iter().all(|addr| addr.port() == 53));
    }

    #[test]
    fn downward_referral_keeps_in_bailiwick_glue_only() {
        let q = question("www.example.com", rtype::A);
        let mut reply = reply_to(&q);
        reply.authority.push(rr("example.com. 3600 IN NS ns1.example.com."));
        reply.authority.push(rr("example.com. 3600 IN NS ns.other.net."));
        reply.additional.push(rr("ns1.example.com. 3600 IN A 192.0.2.53"));
        reply.additional.push(rr("ns.other.net. 3600 IN A 198.51.100.1"));

        match check_reply(&q, &name("com"), reply, false) {
            Ok(Reply::Referral(referral)) => {
                assert_eq!(referral.zone, name("example.com"));
                assert_eq!(referral.glue, vec![rr("ns1.example.com. 3600 IN A 192.0.2.53")]);
                assert!(referral.ds.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn upward_referral_is_lame() {
        let q = question("www.example.com", rtype::A);
        let mut reply = reply_to(&q);
        reply.authority.push(rr(". 3600 IN NS a.root-servers.net."));
        let err = check_reply(&q, &name("example.com"), reply, false).unwrap_err();
        assert!(err.starts_with("lame referral"));
    }

    #[test]
    fn error_rcodes_and_mismatches_are_rejected() {
        let q = question("www.example.com", rtype::A);
        let mut reply = reply_to(&q);
        reply.header.rcode = rcode::SERVFAIL;
        assert_eq!(
            check_reply(&q, &Name::root(), reply, false).unwrap_err(),
            "server returned SERVFAIL"
        );

        let other = reply_to(&question("www.example.org", rtype::A));
        assert_eq!(
            check_reply(&q, &Name::root(), other, false).unwrap_err(),
            "question mismatch"
        );
    }

    #[test]
    fn nodata_with_zone_ns_is_an_answer() {
        let q = question("www.example.com", rtype::AAAA);
        let mut reply = reply_to(&q);
        reply.header.aa = true;
        reply.authority.push(rr(
            "example.com. 300 IN SOA ns1.example.com. admin.example.com. 1 7200 3600 1209600 300",
        ));
        reply.authority.push(rr("example.com. 3600 IN NS ns1.example.com."));
        assert!(matches!(
            check_reply(&q, &name("example.com"), reply, false),
            Ok(Reply::Answer(_))
        ));
    }

    #[test]
    fn forwarded_replies_are_taken_verbatim() {
        let q = question("www.example.com", rtype::A);
        let mut reply = reply_to(&q);
        reply.authority.push(rr("example.com. 3600 IN NS ns1.example.com."));
        assert!(matches!(
            check_reply(&q, &Name::root(), reply, true),
            Ok(Reply::Answer(_))
        ));
    }
}
