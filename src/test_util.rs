//! Fixtures shared by unit tests: Ed25519 zone signers, record helpers and
//! an in-memory network of authoritative zones.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use ring::signature::{Ed25519KeyPair, KeyPair};
use rustc_hash::FxHashMap;

use crate::dns::rdata::{Dnskey, Ds, Nsec, Rrsig};
use crate::dns::{Message, Name, RData, Record, RecordSet, class, parse_records, rcode, rtype};
use crate::error::{TransportError, WireError};
use crate::transport::Transport;
use crate::trust::crypto::{alg, digest_type, ds_digest, signed_data};

/// Validation clock used by signed fixtures.
pub const NOW: u32 = 1_700_000_000;

pub fn name(s: &str) -> Name {
    s.parse().unwrap()
}

pub fn rr(text: &str) -> Record {
    text.parse().unwrap()
}

pub struct ZoneSigner {
    pub zone: Name,
    pub key: Dnskey,
    pair: Ed25519KeyPair,
}

impl ZoneSigner {
    pub fn new(zone: &str, seed: u8) -> Self {
        let pair = Ed25519KeyPair::from_seed_unchecked(&[seed; 32]).unwrap();
        let key = Dnskey {
            flags: Dnskey::ZONE_KEY | Dnskey::SEP,
            protocol: 3,
            algorithm: alg::ED25519,
            public_key: pair.public_key().as_ref().to_vec(),
        };
        Self {
            zone: name(zone),
            key,
            pair,
        }
    }

    pub fn dnskey_record(&self) -> Record {
        Record::from_data(self.zone.clone(), class::IN, 3600, &RData::Dnskey(self.key.clone()))
    }

    pub fn ds(&self) -> Ds {
        Ds {
            key_tag: self.key.key_tag(),
            algorithm: self.key.algorithm,
            digest_type: digest_type::SHA256,
            digest: ds_digest(&self.zone, &self.key, digest_type::SHA256).unwrap(),
        }
    }

    pub fn ds_record(&self) -> Record {
        Record::from_data(self.zone.clone(), class::IN, 3600, &RData::Ds(self.ds()))
    }

    /// Anchor text for this zone's key.
    pub fn ds_anchor(&self) -> String {
        self.ds_record().to_string()
    }

    pub fn sign(&self, records: &[Record]) -> Record {
        self.sign_with(records, NOW - 3600, NOW + 86400)
    }

    pub fn sign_with(&self, records: &[Record], inception: u32, expiration: u32) -> Record {
        let first = &records[0];
        let labels = first.name.label_count() - usize::from(first.name.is_wildcard());
        let mut sig = Rrsig {
            type_covered: first.rtype,
            algorithm: alg::ED25519,
            labels: labels as u8,
            original_ttl: first.ttl,
            expiration,
            inception,
            key_tag: self.key.key_tag(),
            signer: self.zone.clone(),
            signature: Vec::new(),
        };
        let data = signed_data(&sig, records);
        sig.signature = self.pair.sign(&data).as_ref().to_vec();
        Record::from_data(first.name.clone(), first.class, first.ttl, &RData::Rrsig(sig))
    }

    pub fn signed_set(&self, records: Vec<Record>) -> RecordSet {
        let sig = self.sign(&records);
        RecordSet::new(records, vec![sig])
    }

    pub fn dnskey_set(&self) -> RecordSet {
        self.signed_set(vec![self.dnskey_record()])
    }

    /// A signed NSEC owned by `owner` pointing at `next`.
    pub fn nsec(&self, owner: &str, next: &str, types: &[u16]) -> Vec<Record> {
        self.nsec_for(&name(owner), &name(next), types)
    }

    pub fn nsec_for(&self, owner: &Name, next: &Name, types: &[u16]) -> Vec<Record> {
        let mut types = types.to_vec();
        types.extend([rtype::RRSIG, rtype::NSEC]);
        types.sort_unstable();
        types.dedup();
        let record = Record::from_data(
            owner.clone(),
            class::IN,
            3600,
            &RData::Nsec(Nsec {
                next: next.clone(),
                types,
            }),
        );
        let sig = self.sign(std::slice::from_ref(&record));
        vec![record, sig]
    }
}

/// An authoritative zone answering like a real server would: referrals
/// at cuts, NSEC chains when signed.
pub struct MockZone {
    pub apex: Name,
    records: Vec<Record>,
    signer: Option<ZoneSigner>,
}

impl MockZone {
    pub fn new(apex: &str, text: &str) -> Self {
        Self {
            apex: name(apex),
            records: parse_records(text).unwrap(),
            signer: None,
        }
    }

    pub fn signed(mut self, signer: ZoneSigner) -> Self {
        self.records.push(signer.dnskey_record());
        self.signer = Some(signer);
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    /// Delegation points below the apex.
    fn cuts(&self) -> Vec<Name> {
        let mut cuts: Vec<Name> = self
            .records
            .iter()
            .filter(|r| r.rtype == rtype::NS && r.name != self.apex)
            .map(|r| r.name.clone())
            .collect();
        cuts.sort_by(|a, b| a.canonical_cmp(b));
        cuts.dedup();
        cuts
    }

    fn at(&self, owner: &Name, rtype: u16) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.name == *owner && r.rtype == rtype)
            .cloned()
            .collect()
    }

    /// Records plus their signature, when the zone is signed.
    fn signed_records(&self, records: Vec<Record>) -> Vec<Record> {
        let mut out = Vec::new();
        for set in RecordSet::group(&records) {
            let sig = self.signer.as_ref().map(|signer| signer.sign(&set.records));
            out.extend(set.records);
            out.extend(sig);
        }
        out
    }

    fn nsec_chain(&self) -> Vec<Record> {
        let Some(signer) = &self.signer else {
            return Vec::new();
        };
        let cuts = self.cuts();
        let below_cut = |owner: &Name| cuts.iter().any(|cut| owner != cut && owner.is_subdomain_of(cut));

        let mut owners: Vec<Name> = self
            .records
            .iter()
            .map(|r| r.name.clone())
            .filter(|owner| !below_cut(owner))
            .collect();
        owners.sort_by(|a, b| a.canonical_cmp(b));
        owners.dedup();

        let mut chain = Vec::new();
        for (i, owner) in owners.iter().enumerate() {
            let next = owners.get(i + 1).unwrap_or(&self.apex);
            let mut types: Vec<u16> = self
                .records
                .iter()
                .filter(|r| r.name == *owner)
                .map(|r| r.rtype)
                .collect();
            if cuts.contains(owner) {
                types.retain(|t| matches!(*t, rtype::NS | rtype::DS));
            }
            chain.extend(signer.nsec_for(owner, next, &types));
        }
        chain
    }

    pub fn respond(&self, query: &Message) -> Message {
        let mut reply = Message::response_to(query);
        let Some(question) = query.question() else {
            reply.header.rcode = rcode::FORMERR;
            return reply;
        };
        let qname = &question.name;

        let cut = self
            .cuts()
            .into_iter()
            .filter(|cut| qname.is_subdomain_of(cut))
            .filter(|cut| !(question.qtype == rtype::DS && cut == qname))
            .max_by_key(Name::label_count);
        if let Some(cut) = cut {
            reply.authority = self.at(&cut, rtype::NS);
            let ds = self.at(&cut, rtype::DS);
            if !ds.is_empty() {
                reply.authority.extend(self.signed_records(ds));
            } else {
                reply
                    .authority
                    .extend(self.nsec_chain().into_iter().filter(|r| r.name == cut));
            }
            for ns in self.at(&cut, rtype::NS) {
                if let Ok(RData::Ns(target)) = ns.data() {
                    reply.additional.extend(self.at(&target, rtype::A));
                    reply.additional.extend(self.at(&target, rtype::AAAA));
                }
            }
            return reply;
        }

        reply.header.aa = true;
        let matching: Vec<Record> = self
            .records
            .iter()
            .filter(|r| r.name == *qname && (r.rtype == question.qtype || question.qtype == rtype::ANY))
            .cloned()
            .collect();
        if !matching.is_empty() {
            reply.answers = self.signed_records(matching);
            return reply;
        }
        let alias = self.at(qname, rtype::CNAME);
        if !alias.is_empty() {
            reply.answers = self.signed_records(alias);
            return reply;
        }

        let exists = self.records.iter().any(|r| r.name.is_subdomain_of(qname));
        if !exists {
            reply.header.rcode = rcode::NXDOMAIN;
        }
        reply.authority = self.signed_records(self.at(&self.apex, rtype::SOA));
        reply.authority.extend(self.nsec_chain());
        reply
    }
}

/// Zones reachable at fixed addresses. Unknown addresses time out; known
/// addresses with no zone for the name answer REFUSED; garbled addresses
/// send replies that do not decode.
#[derive(Default)]
pub struct MockNetwork {
    servers: Mutex<FxHashMap<SocketAddr, Vec<Arc<MockZone>>>>,
    garbled: Mutex<Vec<SocketAddr>>,
    log: Mutex<Vec<(SocketAddr, Message)>>,
    delay: Option<Duration>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every reply back by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serve(&self, addr: &str, zone: MockZone) {
        let addr = server(addr);
        let mut servers = self.servers.lock().unwrap();
        servers.entry(addr).or_default().push(Arc::new(zone));
    }

    /// Register an address that refuses everything.
    pub fn refuse(&self, addr: &str) {
        self.servers.lock().unwrap().entry(server(addr)).or_default();
    }

    /// Register an address whose replies are malformed.
    pub fn garble(&self, addr: &str) {
        self.garbled.lock().unwrap().push(server(addr));
    }

    /// Queries sent so far to `addr`.
    pub fn queries_to(&self, addr: &str) -> usize {
        let addr = server(addr);
        self.log.lock().unwrap().iter().filter(|(to, _)| *to == addr).count()
    }

    /// Queries sent so far, in order.
    pub fn queries(&self) -> Vec<(SocketAddr, Message)> {
        self.log.lock().unwrap().clone()
    }

    fn answer(&self, query: &Message, addr: SocketAddr) -> Result<Message, TransportError> {
        self.log.lock().unwrap().push((addr, query.clone()));
        if self.garbled.lock().unwrap().contains(&addr) {
            return Err(TransportError::Malformed(WireError::Truncated));
        }
        let servers = self.servers.lock().unwrap();
        let zones = servers.get(&addr).ok_or(TransportError::Timeout)?;
        let Some(question) = query.question() else {
            return Err(TransportError::Mismatch);
        };

        // DS lives with the parent, so the child apex is not authoritative.
        let zone = zones
            .iter()
            .filter(|zone| question.name.is_subdomain_of(&zone.apex))
            .filter(|zone| !(question.qtype == rtype::DS && zone.apex == question.name))
            .max_by_key(|zone| zone.apex.label_count());
        match zone {
            Some(zone) => Ok(zone.respond(query)),
            None => {
                let mut reply = Message::response_to(query);
                reply.header.rcode = rcode::REFUSED;
                Ok(reply)
            }
        }
    }
}

impl Transport for MockNetwork {
    fn send<'a>(
        &'a self,
        query: &'a Message,
        server: SocketAddr,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Message, TransportError>> {
        async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.answer(query, server)
        }
        .boxed()
    }
}

/// `addr` on port 53.
pub fn server(addr: &str) -> SocketAddr {
    SocketAddr::new(addr.parse().unwrap(), 53)
}
