//! DNSSEC trust store: anchors, chain-of-trust walk and RRset validation.
//!
//! The store is synchronous. The resolver gathers the DS and DNSKEY sets
//! between an anchor and the zone that signed an answer into a
//! [`ChainOfTrust`], then asks the store to walk it and to check the answer
//! against the keys the walk ends with.

pub mod anchor;
pub mod crypto;
pub mod denial;

use tracing::{debug, trace};

pub use anchor::{AnchorKey, TrustAnchor, TrustAnchors};
pub use denial::{DenialKind, Proof};

use crate::cache::Security;
use crate::clock;
use crate::dns::rdata::{Dnskey, Rrsig};
use crate::dns::{Name, RData, Record, RecordSet, rtype};
use crypto::{alg, digest_type, ds_matches, signed_data, verify};

/// Validator behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorOptions {
    /// Treat unsigned data below a trust anchor as bogus.
    pub harden_dnssec_stripped: bool,
    /// Signatures and DS records with a lower algorithm number are ignored.
    pub min_algorithm: u8,
    /// Fixed validation time (seconds since the epoch).
    pub override_date: Option<u64>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            harden_dnssec_stripped: true,
            min_algorithm: 0,
            override_date: None,
        }
    }
}

/// How a zone's keys are vouched for by its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delegation {
    /// The zone holds a configured trust anchor.
    Anchor,
    /// The parent publishes this DS set (with its RRSIGs).
    Signed(RecordSet),
    /// The parent denies a DS exists; NSEC/NSEC3 records with RRSIGs.
    Unsigned(Vec<Record>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub zone: Name,
    pub delegation: Delegation,
    /// The zone's DNSKEY set; empty for an unsigned delegation.
    pub dnskeys: RecordSet,
}

/// Evidence from an anchored zone down to a signer, top-down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainOfTrust {
    pub links: Vec<ChainLink>,
}

impl ChainOfTrust {
    pub fn push(&mut self, link: ChainLink) {
        self.links.push(link);
    }

    pub fn last_zone(&self) -> Option<&Name> {
        self.links.last().map(|link| &link.zone)
    }
}

/// Validated keys of a zone at the end of a secure chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneKeys {
    pub zone: Name,
    pub keys: Vec<Dnskey>,
}

/// Why a chain did not end in trusted keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// A provably unsigned delegation at this zone.
    Insecure(Name),
    Bogus(String),
}

impl ChainOutcome {
    pub fn security(&self) -> Security {
        match self {
            ChainOutcome::Insecure(_) => Security::Insecure,
            ChainOutcome::Bogus(reason) => Security::Bogus(reason.clone()),
        }
    }
}

/// RFC 1982 comparison of 32-bit timestamps.
fn serial_lt(a: u32, b: u32) -> bool {
    a != b && (b.wrapping_sub(a) as i32) > 0
}

#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    anchors: TrustAnchors,
    options: ValidatorOptions,
}

impl TrustStore {
    pub fn new(anchors: TrustAnchors, options: ValidatorOptions) -> Self {
        Self { anchors, options }
    }

    pub fn anchors(&self) -> &TrustAnchors {
        &self.anchors
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// The deepest anchored zone at or above `name`.
    pub fn closest_anchor(&self, name: &Name) -> Option<&Name> {
        self.anchors.closest(name)
    }

    /// Validation time, truncated to the 32-bit RRSIG clock.
    pub fn now(&self) -> u32 {
        self.options.override_date.unwrap_or_else(clock::unix_now) as u32
    }

    /// Walk the chain from its anchor down, returning the keys of the last
    /// link when every step checks out.
    pub fn walk(&self, chain: &ChainOfTrust, now: u32) -> Result<ZoneKeys, ChainOutcome> {
        let mut trusted: Option<ZoneKeys> = None;

        for link in &chain.links {
            if let Some(parent) = &trusted {
                if !link.zone.is_subdomain_of(&parent.zone) || link.zone == parent.zone {
                    return Err(bogus("signer not in chain of trust", &link.zone));
                }
            }

            let keys = match (&link.delegation, &trusted) {
                (Delegation::Anchor, _) => self.trust_anchored(link, now)?,
                (Delegation::Signed(ds_set), Some(parent)) => {
                    self.trust_delegated(link, ds_set, parent, now)?
                }
                (Delegation::Unsigned(proof), Some(parent)) => {
                    return Err(self.check_unsigned(&link.zone, proof, parent, now));
                }
                (_, None) => return Err(bogus("no trust anchor key matched", &link.zone)),
            };
            trace!(zone = %keys.zone, keys = keys.keys.len(), "zone keys trusted");
            trusted = Some(keys);
        }

        trusted.ok_or_else(|| ChainOutcome::Bogus("no trust anchor key matched".to_string()))
    }

    fn trust_anchored(&self, link: &ChainLink, now: u32) -> Result<ZoneKeys, ChainOutcome> {
        let anchors = self
            .anchors
            .get(&link.zone)
            .ok_or_else(|| bogus("no trust anchor key matched", &link.zone))?;
        let usable: Vec<&TrustAnchor> = anchors.iter().filter(|a| a.is_supported()).collect();
        if usable.is_empty() {
            return Err(bogus("unsupported algorithm", &link.zone));
        }
        let usable: Vec<&TrustAnchor> = usable
            .into_iter()
            .filter(|a| a.algorithm() >= self.options.min_algorithm)
            .collect();
        if usable.is_empty() {
            return Err(bogus("algorithm below configured minimum", &link.zone));
        }

        self.trust_dnskeys(link, now, "no trust anchor key matched", |key| {
            usable.iter().any(|anchor| anchor.matches(key))
        })
    }

    fn trust_delegated(
        &self,
        link: &ChainLink,
        ds_set: &RecordSet,
        parent: &ZoneKeys,
        now: u32,
    ) -> Result<ZoneKeys, ChainOutcome> {
        if ds_set.signatures.is_empty() {
            return Err(bogus("DS record is not signed", &link.zone));
        }
        self.verify_rrset(ds_set, parent, now)
            .map_err(ChainOutcome::Bogus)?;

        let all: Vec<_> = ds_set
            .records
            .iter()
            .filter_map(|r| match r.data() {
                Ok(RData::Ds(ds)) => Some(ds),
                _ => None,
            })
            .collect();
        let supported: Vec<_> = all
            .into_iter()
            .filter(|ds| alg::is_supported(ds.algorithm) && digest_type::is_supported(ds.digest_type))
            .collect();
        if supported.is_empty() {
            return Err(bogus("unsupported algorithm", &link.zone));
        }
        let usable: Vec<_> = supported
            .into_iter()
            .filter(|ds| ds.algorithm >= self.options.min_algorithm)
            .collect();
        if usable.is_empty() {
            return Err(bogus("algorithm below configured minimum", &link.zone));
        }

        self.trust_dnskeys(link, now, "no valid DS match", |key| {
            usable.iter().any(|ds| ds_matches(ds, &link.zone, key))
        })
    }

    /// Accept a DNSKEY set when it is self-signed by a key `entry` vouches
    /// for.
    fn trust_dnskeys<F>(
        &self,
        link: &ChainLink,
        now: u32,
        no_match: &str,
        entry: F,
    ) -> Result<ZoneKeys, ChainOutcome>
    where
        F: Fn(&Dnskey) -> bool,
    {
        let keys: Vec<Dnskey> = link
            .dnskeys
            .records
            .iter()
            .filter(|r| r.name == link.zone)
            .filter_map(|r| match r.data() {
                Ok(RData::Dnskey(key)) if key.protocol == 3 => Some(key),
                _ => None,
            })
            .collect();
        if keys.is_empty() {
            return Err(ChainOutcome::Bogus(format!(
                "no DNSKEY for zone {}",
                link.zone
            )));
        }

        let entry_keys: Vec<Dnskey> = keys
            .iter()
            .filter(|key| key.is_zone_key() && !key.is_revoked() && entry(key))
            .cloned()
            .collect();
        if entry_keys.is_empty() {
            return Err(bogus(no_match, &link.zone));
        }

        let entry = ZoneKeys {
            zone: link.zone.clone(),
            keys: entry_keys,
        };
        self.verify_rrset(&link.dnskeys, &entry, now)
            .map_err(ChainOutcome::Bogus)?;

        Ok(ZoneKeys {
            zone: link.zone.clone(),
            keys: keys
                .into_iter()
                .filter(|key| key.is_zone_key() && !key.is_revoked())
                .collect(),
        })
    }

    fn check_unsigned(
        &self,
        zone: &Name,
        proof: &[Record],
        parent: &ZoneKeys,
        now: u32,
    ) -> ChainOutcome {
        if let Err(reason) = self.verify_denial_records(proof, parent, now) {
            return ChainOutcome::Bogus(reason);
        }
        match denial::prove(zone, rtype::DS, DenialKind::NoData, &parent.zone, proof) {
            Some(_) => {
                debug!(%zone, "provably unsigned delegation");
                ChainOutcome::Insecure(zone.clone())
            }
            None => bogus("missing proof of DS absence", zone),
        }
    }

    /// Check a positive answer set against the signer zone's keys.
    pub fn validate(&self, set: &RecordSet, keys: &ZoneKeys, now: u32) -> Security {
        if set.signatures.is_empty() {
            return self.stripped(set.name().unwrap_or(&keys.zone), "no signatures");
        }
        match self.verify_rrset(set, keys, now) {
            Ok(()) => Security::Secure,
            Err(reason) => Security::Bogus(reason),
        }
    }

    /// Check that `proof` (NSEC/NSEC3 records with RRSIGs) denies
    /// `qname`/`qtype` in the zone the keys belong to.
    pub fn validate_denial(
        &self,
        qname: &Name,
        qtype: u16,
        kind: DenialKind,
        proof: &[Record],
        keys: &ZoneKeys,
        now: u32,
    ) -> Security {
        let has_denial = proof
            .iter()
            .any(|r| matches!(r.rtype, rtype::NSEC | rtype::NSEC3));
        if !has_denial {
            return self.stripped(qname, "missing proof of nonexistence");
        }
        if let Err(reason) = self.verify_denial_records(proof, keys, now) {
            return Security::Bogus(reason);
        }
        match denial::prove(qname, qtype, kind, &keys.zone, proof) {
            Some(Proof::Denied) => Security::Secure,
            Some(Proof::OptOut) | Some(Proof::TooManyIterations) => Security::Insecure,
            None => Security::Bogus(format!("missing proof of nonexistence for {qname}")),
        }
    }

    fn stripped(&self, owner: &Name, reason: &str) -> Security {
        if self.options.harden_dnssec_stripped {
            Security::Bogus(format!("{reason} for {owner}"))
        } else {
            Security::Insecure
        }
    }

    fn verify_denial_records(
        &self,
        proof: &[Record],
        keys: &ZoneKeys,
        now: u32,
    ) -> Result<(), String> {
        let sets = RecordSet::group(proof);
        let denials = sets
            .iter()
            .filter(|set| matches!(set.rtype(), Some(rtype::NSEC | rtype::NSEC3)));
        for set in denials {
            self.verify_rrset(set, keys, now)?;
        }
        Ok(())
    }

    /// Accept `set` if any of its RRSIGs verifies with one of `keys`. The
    /// error names the first failure and the owner.
    pub fn verify_rrset(&self, set: &RecordSet, keys: &ZoneKeys, now: u32) -> Result<(), String> {
        let Some(owner) = set.name() else {
            return Ok(());
        };

        let mut failure = None;
        for record in &set.signatures {
            let Ok(RData::Rrsig(sig)) = record.data() else {
                continue;
            };
            match self.check_signature(&sig, set, keys, now) {
                Ok(()) => return Ok(()),
                Err(reason) => {
                    trace!(%owner, key_tag = sig.key_tag, reason, "signature rejected");
                    failure.get_or_insert(reason);
                }
            }
        }
        Err(format!("{} for {owner}", failure.unwrap_or("no signatures")))
    }

    fn check_signature(
        &self,
        sig: &Rrsig,
        set: &RecordSet,
        keys: &ZoneKeys,
        now: u32,
    ) -> Result<(), &'static str> {
        let owner = &set.records[0].name;
        if sig.signer != keys.zone || !owner.is_subdomain_of(&sig.signer) {
            return Err("signer not in chain of trust");
        }
        let owner_labels = owner.label_count() - usize::from(owner.is_wildcard());
        if Some(sig.type_covered) != set.rtype() || usize::from(sig.labels) > owner_labels {
            return Err("signature verification failed");
        }
        if !alg::is_supported(sig.algorithm) {
            return Err("unsupported algorithm");
        }
        if sig.algorithm < self.options.min_algorithm {
            return Err("algorithm below configured minimum");
        }
        if serial_lt(sig.expiration, now) {
            return Err("signature expired");
        }
        if serial_lt(now, sig.inception) {
            return Err("signature not yet valid");
        }

        let data = signed_data(sig, &set.records);
        let verified = keys
            .keys
            .iter()
            .filter(|key| {
                key.algorithm == sig.algorithm
                    && key.key_tag() == sig.key_tag
                    && key.is_zone_key()
                    && !key.is_revoked()
            })
            .any(|key| verify(sig, key, &data).is_ok());
        if verified {
            Ok(())
        } else {
            Err("signature verification failed")
        }
    }
}

fn bogus(reason: &str, name: &Name) -> ChainOutcome {
    ChainOutcome::Bogus(format!("{reason} for {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{NOW, ZoneSigner, name, rr};

    struct Fixture {
        root: ZoneSigner,
        com: ZoneSigner,
        example: ZoneSigner,
        store: TrustStore,
    }

    fn fixture(options: ValidatorOptions) -> Fixture {
        let root = ZoneSigner::new(".", 1);
        let com = ZoneSigner::new("com", 2);
        let example = ZoneSigner::new("example.com", 3);
        let mut anchors = TrustAnchors::new();
        anchors.add_text(&root.ds_anchor()).unwrap();
        Fixture {
            root,
            com,
            example,
            store: TrustStore::new(anchors, options),
        }
    }

    fn anchor_link(zone: &ZoneSigner) -> ChainLink {
        ChainLink {
            zone: zone.zone.clone(),
            delegation: Delegation::Anchor,
            dnskeys: zone.dnskey_set(),
        }
    }

    fn signed_link(parent: &ZoneSigner, child: &ZoneSigner) -> ChainLink {
        ChainLink {
            zone: child.zone.clone(),
            delegation: Delegation::Signed(parent.signed_set(vec![child.ds_record()])),
            dnskeys: child.dnskey_set(),
        }
    }

    fn full_chain(f: &Fixture) -> ChainOfTrust {
        ChainOfTrust {
            links: vec![
                anchor_link(&f.root),
                signed_link(&f.root, &f.com),
                signed_link(&f.com, &f.example),
            ],
        }
    }

    fn www_a(signer: &ZoneSigner) -> RecordSet {
        signer.signed_set(vec![rr("www.example.com. 300 IN A 192.0.2.1")])
    }

    #[test]
    fn serial_arithmetic_wraps() {
        assert!(serial_lt(1, 2));
        assert!(!serial_lt(2, 1));
        assert!(!serial_lt(5, 5));
        assert!(serial_lt(u32::MAX, 1));
    }

    #[test]
    fn secure_chain_validates_answer() {
        let f = fixture(ValidatorOptions::default());
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        assert_eq!(keys.zone, name("example.com"));
        assert_eq!(f.store.validate(&www_a(&f.example), &keys, NOW), Security::Secure);
    }

    #[test]
    fn ds_mismatch_is_bogus() {
        let f = fixture(ValidatorOptions::default());
        let impostor = ZoneSigner::new("example.com", 9);
        let mut chain = full_chain(&f);
        chain.links[2].dnskeys = impostor.dnskey_set();
        match f.store.walk(&chain, NOW) {
            Err(ChainOutcome::Bogus(reason)) => {
                assert_eq!(reason, "no valid DS match for example.com.")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrong_anchor_is_bogus() {
        let f = fixture(ValidatorOptions::default());
        let mut chain = full_chain(&f);
        chain.links[0].dnskeys = ZoneSigner::new(".", 8).dnskey_set();
        let err = f.store.walk(&chain, NOW).unwrap_err();
        assert_eq!(
            err,
            ChainOutcome::Bogus("no trust anchor key matched for .".to_string())
        );
    }

    #[test]
    fn unsigned_ds_set_is_bogus() {
        let f = fixture(ValidatorOptions::default());
        let mut chain = full_chain(&f);
        chain.links[1].delegation = Delegation::Signed(RecordSet::new(vec![f.com.ds_record()], vec![]));
        let err = f.store.walk(&chain, NOW).unwrap_err();
        assert_eq!(
            err,
            ChainOutcome::Bogus("DS record is not signed for com.".to_string())
        );
    }

    #[test]
    fn missing_dnskey_is_bogus() {
        let f = fixture(ValidatorOptions::default());
        let mut chain = full_chain(&f);
        chain.links[2].dnskeys = RecordSet::default();
        match f.store.walk(&chain, NOW) {
            Err(ChainOutcome::Bogus(reason)) => assert!(reason.contains("no DNSKEY for zone")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn expired_signature_is_bogus() {
        let f = fixture(ValidatorOptions::default());
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        let records = vec![rr("www.example.com. 300 IN A 192.0.2.1")];
        let sig = f.example.sign_with(&records, NOW - 7200, NOW - 3600);
        let set = RecordSet::new(records, vec![sig]);
        assert_eq!(
            f.store.validate(&set, &keys, NOW),
            Security::Bogus("signature expired for www.example.com.".to_string())
        );
    }

    #[test]
    fn future_signature_is_not_yet_valid() {
        let f = fixture(ValidatorOptions::default());
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        let records = vec![rr("www.example.com. 300 IN A 192.0.2.1")];
        let sig = f.example.sign_with(&records, NOW + 3600, NOW + 7200);
        let set = RecordSet::new(records, vec![sig]);
        let security = f.store.validate(&set, &keys, NOW);
        assert!(security.why_bogus().unwrap().starts_with("signature not yet valid"));
    }

    #[test]
    fn tampered_answer_fails_verification() {
        let f = fixture(ValidatorOptions::default());
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        let mut set = www_a(&f.example);
        set.records[0] = rr("www.example.com. 300 IN A 192.0.2.66");
        assert_eq!(
            f.store.validate(&set, &keys, NOW),
            Security::Bogus("signature verification failed for www.example.com.".to_string())
        );
    }

    #[test]
    fn signature_from_another_zone_is_rejected() {
        let f = fixture(ValidatorOptions::default());
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        let set = www_a(&f.com);
        let reason = f.store.validate(&set, &keys, NOW);
        assert!(reason.why_bogus().unwrap().starts_with("signer not in chain of trust"));
    }

    #[test]
    fn stripped_signatures_depend_on_hardening() {
        let set = RecordSet::new(vec![rr("www.example.com. 300 IN A 192.0.2.1")], vec![]);

        let f = fixture(ValidatorOptions::default());
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        assert_eq!(
            f.store.validate(&set, &keys, NOW),
            Security::Bogus("no signatures for www.example.com.".to_string())
        );

        let f = fixture(ValidatorOptions {
            harden_dnssec_stripped: false,
            ..ValidatorOptions::default()
        });
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        assert_eq!(f.store.validate(&set, &keys, NOW), Security::Insecure);
    }

    #[test]
    fn minimum_algorithm_rejects_weaker_signatures() {
        let f = fixture(ValidatorOptions {
            min_algorithm: 16,
            ..ValidatorOptions::default()
        });
        match f.store.walk(&full_chain(&f), NOW) {
            Err(ChainOutcome::Bogus(reason)) => {
                assert!(reason.starts_with("algorithm below configured minimum"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unsupported_ds_algorithm_is_bogus() {
        let f = fixture(ValidatorOptions::default());
        let mut chain = full_chain(&f);
        let mut ds = f.example.ds();
        ds.algorithm = 200;
        let ds_record = Record::from_data(name("example.com"), 1, 3600, &RData::Ds(ds));
        chain.links[2].delegation = Delegation::Signed(f.com.signed_set(vec![ds_record]));
        match f.store.walk(&chain, NOW) {
            Err(ChainOutcome::Bogus(reason)) => assert!(reason.starts_with("unsupported algorithm")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn proven_unsigned_delegation_is_insecure() {
        let f = fixture(ValidatorOptions::default());
        let mut chain = full_chain(&f);
        chain.links[2] = ChainLink {
            zone: name("example.com"),
            delegation: Delegation::Unsigned(f.com.nsec(
                "example.com",
                "f.com",
                &[rtype::NS],
            )),
            dnskeys: RecordSet::default(),
        };
        assert_eq!(
            f.store.walk(&chain, NOW),
            Err(ChainOutcome::Insecure(name("example.com")))
        );
    }

    #[test]
    fn unsigned_delegation_without_proof_is_bogus() {
        let f = fixture(ValidatorOptions::default());
        let mut chain = full_chain(&f);
        // The NSEC claims a DS exists.
        chain.links[2] = ChainLink {
            zone: name("example.com"),
            delegation: Delegation::Unsigned(f.com.nsec(
                "example.com",
                "f.com",
                &[rtype::NS, rtype::DS],
            )),
            dnskeys: RecordSet::default(),
        };
        assert_eq!(
            f.store.walk(&chain, NOW),
            Err(ChainOutcome::Bogus(
                "missing proof of DS absence for example.com.".to_string()
            ))
        );
    }

    #[test]
    fn nxdomain_denial_validates() {
        let f = fixture(ValidatorOptions::default());
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        let mut proof = f.example.nsec("example.com", "mail.example.com", &[rtype::SOA, rtype::NS]);
        proof.extend(f.example.nsec("mail.example.com", "example.com", &[rtype::A]));

        let qname = name("nope.example.com");
        assert_eq!(
            f.store
                .validate_denial(&qname, rtype::A, DenialKind::NxDomain, &proof, &keys, NOW),
            Security::Secure
        );

        // The same records do not deny an existing name.
        let existing = name("mail.example.com");
        let security = f.store.validate_denial(
            &existing,
            rtype::A,
            DenialKind::NxDomain,
            &proof,
            &keys,
            NOW,
        );
        assert_eq!(
            security,
            Security::Bogus("missing proof of nonexistence for mail.example.com.".to_string())
        );
    }

    #[test]
    fn nodata_without_proof_is_bogus_when_hardened() {
        let f = fixture(ValidatorOptions::default());
        let keys = f.store.walk(&full_chain(&f), NOW).unwrap();
        let soa = vec![rr(
            "example.com. 300 IN SOA ns.example.com. admin.example.com. 1 7200 3600 1209600 300",
        )];
        let qname = name("www.example.com");
        let security =
            f.store
                .validate_denial(&qname, rtype::AAAA, DenialKind::NoData, &soa, &keys, NOW);
        assert!(security.why_bogus().unwrap().starts_with("missing proof of nonexistence"));
    }

    #[test]
    fn override_date_sets_the_clock() {
        let store = TrustStore::new(
            TrustAnchors::new(),
            ValidatorOptions {
                override_date: Some(NOW as u64),
                ..ValidatorOptions::default()
            },
        );
        assert_eq!(store.now(), NOW);
        assert_eq!(store.closest_anchor(&name("example.com")), None);
    }
}
