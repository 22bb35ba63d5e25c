//! Authenticated denial of existence (NSEC, RFC 4035; NSEC3, RFC 5155).
//!
//! These checks assume the NSEC/NSEC3 records have already been verified
//! against the zone's keys.

use std::cmp::Ordering;

use crate::dns::rdata::{Nsec, Nsec3, base32hex_decode};
use crate::dns::{Name, RData, Record, rtype};

use super::crypto::nsec3_hash;

/// NSEC3 iteration counts above this are not worth validating (RFC 9276).
pub const MAX_NSEC3_ITERATIONS: u16 = 150;

const NSEC3_SHA1: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    NxDomain,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proof {
    /// The name or type provably does not exist.
    Denied,
    /// An opt-out span covers the name; an unsigned delegation may exist.
    OptOut,
    /// NSEC3 parameters too expensive to check.
    TooManyIterations,
}

/// Check that `records` prove `qname`/`qtype` does not exist in `zone`.
pub fn prove(
    qname: &Name,
    qtype: u16,
    kind: DenialKind,
    zone: &Name,
    records: &[Record],
) -> Option<Proof> {
    let mut nsecs = Vec::new();
    let mut nsec3s = Vec::new();
    for record in records.iter().filter(|r| r.name.is_subdomain_of(zone)) {
        match record.data() {
            Ok(RData::Nsec(nsec)) => nsecs.push((record.name.clone(), nsec)),
            Ok(RData::Nsec3(nsec3)) => nsec3s.push((record.name.clone(), nsec3)),
            _ => {}
        }
    }

    if !nsecs.is_empty() {
        let chain = NsecChain { zone, nsecs };
        let proven = match kind {
            DenialKind::NoData => chain.proves_nodata(qname, qtype),
            DenialKind::NxDomain => chain.proves_nxdomain(qname),
        };
        return proven.then_some(Proof::Denied);
    }
    if !nsec3s.is_empty() {
        return Nsec3Chain::new(zone, nsec3s)?.prove(qname, qtype, kind);
    }
    None
}

/// Whether the denial records returned for a DS query at `name` show that
/// `name` is a zone cut: an NSEC or NSEC3 at `name` with the NS bit, or an
/// opt-out span covering it.
pub fn is_delegation(name: &Name, zone: &Name, records: &[Record]) -> bool {
    let mut nsec3s = Vec::new();
    for record in records.iter().filter(|r| r.name.is_subdomain_of(zone)) {
        match record.data() {
            Ok(RData::Nsec(nsec)) if record.name == *name => return nsec.types.contains(&rtype::NS),
            Ok(RData::Nsec3(nsec3)) => nsec3s.push((record.name.clone(), nsec3)),
            _ => {}
        }
    }
    let Some(chain) = Nsec3Chain::new(zone, nsec3s) else {
        return false;
    };
    if chain.iterations > MAX_NSEC3_ITERATIONS {
        return true;
    }
    if let Some(nsec3) = chain.matching(&chain.hash(name)) {
        return nsec3.types.contains(&rtype::NS);
    }
    chain
        .closest_encloser(name)
        .is_some_and(|(_, next_closer)| next_closer.opt_out())
}

/// Whether an NSEC owned by `name` shows it is a delegation point.
fn nsec_shows_delegation(nsec: &Nsec) -> bool {
    nsec.types.contains(&rtype::NS) && !nsec.types.contains(&rtype::SOA)
}

fn type_absent(types: &[u16], qtype: u16) -> bool {
    !types.contains(&qtype) && !types.contains(&rtype::CNAME)
}

/// Longest common ancestor of two names.
fn common_ancestor(a: &Name, b: &Name) -> Name {
    let max = a.label_count().min(b.label_count());
    (0..=max)
        .rev()
        .map(|n| a.suffix(n))
        .find(|candidate| b.is_subdomain_of(candidate))
        .unwrap_or_else(Name::root)
}

struct NsecChain<'a> {
    zone: &'a Name,
    nsecs: Vec<(Name, Nsec)>,
}

impl NsecChain<'_> {
    fn exact(&self, name: &Name) -> Option<&Nsec> {
        self.nsecs.iter().find(|(owner, _)| owner == name).map(|(_, n)| n)
    }

    /// The NSEC whose span strictly contains `name`.
    fn covering(&self, name: &Name) -> Option<(&Name, &Nsec)> {
        self.nsecs
            .iter()
            .find(|(owner, nsec)| {
                if owner.canonical_cmp(name) != Ordering::Less {
                    return false;
                }
                // The last NSEC in the zone points back to the apex.
                let wraps = nsec.next.canonical_cmp(owner) != Ordering::Greater;
                wraps || name.canonical_cmp(&nsec.next) == Ordering::Less
            })
            .map(|(owner, nsec)| (owner, nsec))
    }

    fn closest_encloser(&self, qname: &Name, owner: &Name, nsec: &Nsec) -> Name {
        let by_owner = common_ancestor(qname, owner);
        let by_next = common_ancestor(qname, &nsec.next);
        let ce = if by_owner.label_count() >= by_next.label_count() {
            by_owner
        } else {
            by_next
        };
        if ce.is_subdomain_of(self.zone) {
            ce
        } else {
            self.zone.clone()
        }
    }

    fn proves_nodata(&self, qname: &Name, qtype: u16) -> bool {
        if let Some(nsec) = self.exact(qname) {
            // A parent-side delegation NSEC says nothing about the child.
            if qtype != rtype::DS && nsec_shows_delegation(nsec) {
                return false;
            }
            return type_absent(&nsec.types, qtype);
        }

        let Some((owner, nsec)) = self.covering(qname) else {
            return false;
        };
        // Empty non-terminal: the next name lies beneath qname.
        if nsec.next.is_subdomain_of(qname) && nsec.next != *qname {
            return true;
        }
        // Wildcard NODATA.
        let ce = self.closest_encloser(qname, owner, nsec);
        match ce.prepend(b"*") {
            Ok(wildcard) => self
                .exact(&wildcard)
                .is_some_and(|w| type_absent(&w.types, qtype)),
            Err(_) => false,
        }
    }

    fn proves_nxdomain(&self, qname: &Name) -> bool {
        if self.exact(qname).is_some() {
            return false;
        }
        let Some((owner, nsec)) = self.covering(qname) else {
            return false;
        };
        if nsec.next.is_subdomain_of(qname) {
            // qname has descendants, so it exists.
            return false;
        }
        let ce = self.closest_encloser(qname, owner, nsec);
        match ce.prepend(b"*") {
            Ok(wildcard) => self.exact(&wildcard).is_none() && self.covering(&wildcard).is_some(),
            Err(_) => false,
        }
    }
}

struct Nsec3Chain<'a> {
    zone: &'a Name,
    salt: Vec<u8>,
    iterations: u16,
    entries: Vec<(Vec<u8>, Nsec3)>,
}

impl<'a> Nsec3Chain<'a> {
    fn new(zone: &'a Name, records: Vec<(Name, Nsec3)>) -> Option<Self> {
        let (_, first) = records
            .iter()
            .find(|(_, n)| n.hash_algorithm == NSEC3_SHA1)?;
        let salt = first.salt.clone();
        let iterations = first.iterations;

        let entries = records
            .into_iter()
            .filter(|(owner, n)| {
                n.hash_algorithm == NSEC3_SHA1
                    && n.salt == salt
                    && n.iterations == iterations
                    && owner.parent().as_ref() == Some(zone)
            })
            .filter_map(|(owner, n)| {
                let hash = base32hex_decode(owner.first_label()?)?;
                Some((hash, n))
            })
            .collect();

        Some(Self {
            zone,
            salt,
            iterations,
            entries,
        })
    }

    fn hash(&self, name: &Name) -> Vec<u8> {
        nsec3_hash(name, &self.salt, self.iterations)
    }

    fn matching(&self, hash: &[u8]) -> Option<&Nsec3> {
        self.entries
            .iter()
            .find(|(owner, _)| owner.as_slice() == hash)
            .map(|(_, n)| n)
    }

    fn covering(&self, hash: &[u8]) -> Option<&Nsec3> {
        self.entries
            .iter()
            .find(|(owner, n)| {
                let next = n.next_hashed.as_slice();
                if owner.as_slice() < next {
                    owner.as_slice() < hash && hash < next
                } else {
                    // Last NSEC3 in hash order.
                    hash > owner.as_slice() || hash < next
                }
            })
            .map(|(_, n)| n)
    }

    /// The closest provable encloser of `qname` and the NSEC3 covering the
    /// next closer name (RFC 5155, section 8.3).
    fn closest_encloser(&self, qname: &Name) -> Option<(Name, &Nsec3)> {
        let mut candidate = qname.clone();
        while candidate.is_subdomain_of(self.zone) && candidate != *self.zone {
            let parent = candidate.parent()?;
            if self.matching(&self.hash(&parent)).is_some() {
                let covering = self.covering(&self.hash(&candidate))?;
                return Some((parent, covering));
            }
            candidate = parent;
        }
        None
    }

    fn prove(&self, qname: &Name, qtype: u16, kind: DenialKind) -> Option<Proof> {
        if self.iterations > MAX_NSEC3_ITERATIONS {
            return Some(Proof::TooManyIterations);
        }

        if kind == DenialKind::NoData {
            if let Some(nsec3) = self.matching(&self.hash(qname)) {
                if qtype != rtype::DS
                    && nsec3.types.contains(&rtype::NS)
                    && !nsec3.types.contains(&rtype::SOA)
                {
                    return None;
                }
                return type_absent(&nsec3.types, qtype).then_some(Proof::Denied);
            }
        }

        let (ce, next_closer) = self.closest_encloser(qname)?;
        if next_closer.opt_out() && (kind == DenialKind::NxDomain || qtype == rtype::DS) {
            return Some(Proof::OptOut);
        }

        let wildcard = ce.prepend(b"*").ok()?;
        let wildcard_hash = self.hash(&wildcard);
        match kind {
            DenialKind::NxDomain => self.covering(&wildcard_hash).map(|_| Proof::Denied),
            DenialKind::NoData => self
                .matching(&wildcard_hash)
                .filter(|w| type_absent(&w.types, qtype))
                .map(|_| Proof::Denied),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::rdata::base32hex_encode;
    use crate::dns::class;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn nsec(owner: &str, next: &str, types: &[u16]) -> Record {
        Record::from_data(
            name(owner),
            class::IN,
            300,
            &RData::Nsec(Nsec {
                next: name(next),
                types: types.to_vec(),
            }),
        )
    }

    #[test]
    fn nsec_nodata_at_existing_name() {
        let proof = [nsec("www.example", "zzz.example", &[rtype::A, rtype::RRSIG, rtype::NSEC])];
        let zone = name("example");
        assert_eq!(
            prove(&name("www.example"), rtype::AAAA, DenialKind::NoData, &zone, &proof),
            Some(Proof::Denied)
        );
        assert_eq!(
            prove(&name("www.example"), rtype::A, DenialKind::NoData, &zone, &proof),
            None
        );
    }

    #[test]
    fn nsec_nxdomain_needs_wildcard_denial() {
        let zone = name("example");
        let covering = nsec("a.example", "m.example", &[rtype::A]);
        let apex = nsec("example", "a.example", &[rtype::SOA, rtype::NS]);
        let qname = name("b.example");

        assert_eq!(
            prove(&qname, rtype::A, DenialKind::NxDomain, &zone, &[covering.clone()]),
            None
        );
        // The apex NSEC covers *.example.
        assert_eq!(
            prove(&qname, rtype::A, DenialKind::NxDomain, &zone, &[covering, apex]),
            Some(Proof::Denied)
        );
    }

    #[test]
    fn nsec_last_span_wraps_to_apex() {
        let zone = name("example");
        let last = nsec("x.example", "example", &[rtype::A]);
        let apex = nsec("example", "a.example", &[rtype::SOA, rtype::NS]);
        assert_eq!(
            prove(&name("zz.example"), rtype::A, DenialKind::NxDomain, &zone, &[last, apex]),
            Some(Proof::Denied)
        );
    }

    #[test]
    fn delegation_nsec_only_denies_ds() {
        let zone = name("example");
        let cut = [nsec("sub.example", "z.example", &[rtype::NS, rtype::RRSIG, rtype::NSEC])];
        assert_eq!(
            prove(&name("sub.example"), rtype::DS, DenialKind::NoData, &zone, &cut),
            Some(Proof::Denied)
        );
        assert_eq!(
            prove(&name("sub.example"), rtype::A, DenialKind::NoData, &zone, &cut),
            None
        );
    }

    fn nsec3(zone: &Name, owner_hash: &[u8], next_hash: &[u8], flags: u8, types: &[u16]) -> Record {
        let owner = zone.prepend(base32hex_encode(owner_hash).as_bytes()).unwrap();
        Record::from_data(
            owner,
            class::IN,
            300,
            &RData::Nsec3(Nsec3 {
                hash_algorithm: NSEC3_SHA1,
                flags,
                iterations: 0,
                salt: Vec::new(),
                next_hashed: next_hash.to_vec(),
                types: types.to_vec(),
            }),
        )
    }

    /// Hashes immediately below and above `hash`, so the span between them
    /// covers exactly `hash`.
    fn around(hash: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut below = hash.to_vec();
        for b in below.iter_mut().rev() {
            let (v, borrow) = b.overflowing_sub(1);
            *b = v;
            if !borrow {
                break;
            }
        }
        (below, after(hash))
    }

    fn after(hash: &[u8]) -> Vec<u8> {
        let mut above = hash.to_vec();
        for b in above.iter_mut().rev() {
            let (v, carry) = b.overflowing_add(1);
            *b = v;
            if !carry {
                break;
            }
        }
        above
    }

    #[test]
    fn nsec3_nodata_and_opt_out() {
        let zone = name("example");
        let h = |n: &str| nsec3_hash(&name(n), &[], 0);

        let matching = nsec3(&zone, &h("www.example"), &[0xff; 20], 0, &[rtype::A]);
        assert_eq!(
            prove(&name("www.example"), rtype::AAAA, DenialKind::NoData, &zone, &[matching]),
            Some(Proof::Denied)
        );

        // DS absence for an unsigned delegation inside an opt-out span.
        let apex = nsec3(&zone, &h("example"), &after(&h("example")), 0, &[rtype::SOA, rtype::NS]);
        let (below, above) = around(&h("insecure.example"));
        let span = nsec3(&zone, &below, &above, 1, &[]);
        assert_eq!(
            prove(&name("insecure.example"), rtype::DS, DenialKind::NoData, &zone, &[apex, span]),
            Some(Proof::OptOut)
        );
    }

    #[test]
    fn delegation_is_read_from_the_type_bitmap() {
        let zone = name("example");
        let cut = [nsec("sub.example", "zzz.example", &[rtype::NS, rtype::RRSIG, rtype::NSEC])];
        let plain = [nsec("sub.example", "zzz.example", &[rtype::A, rtype::RRSIG, rtype::NSEC])];
        assert!(is_delegation(&name("sub.example"), &zone, &cut));
        assert!(!is_delegation(&name("sub.example"), &zone, &plain));
        assert!(!is_delegation(&name("sub.example"), &zone, &[]));

        let h = |n: &str| nsec3_hash(&name(n), &[], 0);
        let apex = nsec3(&zone, &h("example"), &after(&h("example")), 0, &[rtype::SOA, rtype::NS]);
        let (below, above) = around(&h("insecure.example"));
        let span = nsec3(&zone, &below, &above, 1, &[]);
        assert!(is_delegation(&name("insecure.example"), &zone, &[apex, span]));
    }

    #[test]
    fn nsec3_nxdomain_closest_encloser_proof() {
        let zone = name("example");
        let h = |n: &str| nsec3_hash(&name(n), &[], 0);

        let apex = nsec3(&zone, &h("example"), &after(&h("example")), 0, &[rtype::SOA, rtype::NS]);
        let (below, above) = around(&h("missing.example"));
        let next_closer = nsec3(&zone, &below, &above, 0, &[]);
        let (wbelow, wabove) = around(&h("*.example"));
        let wildcard = nsec3(&zone, &wbelow, &wabove, 0, &[]);

        let qname = name("missing.example");
        assert_eq!(
            prove(
                &qname,
                rtype::A,
                DenialKind::NxDomain,
                &zone,
                &[apex.clone(), next_closer.clone(), wildcard]
            ),
            Some(Proof::Denied)
        );
        assert_eq!(
            prove(&qname, rtype::A, DenialKind::NxDomain, &zone, &[apex, next_closer]),
            None
        );
    }

    #[test]
    fn nsec3_with_excessive_iterations_is_not_checked() {
        let zone = name("example");
        let mut record = nsec3(&zone, &[0; 20], &[0xff; 20], 0, &[]);
        if let Ok(RData::Nsec3(mut data)) = record.data() {
            data.iterations = 500;
            record = Record::from_data(record.name.clone(), class::IN, 300, &RData::Nsec3(data));
        }
        assert_eq!(
            prove(&name("x.example"), rtype::A, DenialKind::NxDomain, &zone, &[record]),
            Some(Proof::TooManyIterations)
        );
    }
}
