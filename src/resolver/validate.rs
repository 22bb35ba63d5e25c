//! Gathering DS and DNSKEY evidence for the validator.

use tracing::{debug, trace};

use super::{Answer, Lookup, Resolver};
use crate::cache::Security;
use crate::dns::{Name, Question, RData, Record, RecordSet, class, rtype};
use crate::trust::{ChainLink, ChainOfTrust, ChainOutcome, Delegation, DenialKind, ZoneKeys, denial};

/// The zone named by the first RRSIG among `signatures`.
fn signer_of(signatures: &[Record]) -> Option<Name> {
    signatures.iter().find_map(|r| match r.data() {
        Ok(RData::Rrsig(sig)) => Some(sig.signer),
        _ => None,
    })
}

/// Owner and signer to validate a negative answer against. Without any
/// signature the SOA owner stands in for the zone.
fn negative_origin(question: &Question, authority: &[Record]) -> (Name, Option<Name>) {
    let signatures: Vec<Record> = authority
        .iter()
        .filter(|r| r.rtype == rtype::RRSIG)
        .cloned()
        .collect();
    if let Some(signer) = signer_of(&signatures) {
        return (question.name.clone(), Some(signer));
    }
    let soa_owner = authority
        .iter()
        .find(|r| r.rtype == rtype::SOA)
        .map(|r| r.name.clone());
    (soa_owner.unwrap_or_else(|| question.name.clone()), None)
}

impl Resolver {
    /// Security status of `answer`, fetching whatever DS and DNSKEY sets
    /// the chain of trust needs.
    pub(super) async fn validate_answer(&self, question: &Question, answer: &Answer) -> Security {
        if !self.settings.validate {
            return Security::Insecure;
        }
        let now = self.trust.now();

        let security = match answer {
            Answer::Positive(set) | Answer::Alias(set) => {
                let owner = set.name().cloned().unwrap_or_else(|| question.name.clone());
                let signer = signer_of(&set.signatures);
                match self.zone_keys(&owner, signer).await {
                    Ok(keys) => self.trust.validate(set, &keys, now),
                    Err(outcome) => outcome.security(),
                }
            }
            Answer::Negative { nxdomain, authority } => {
                let (owner, signer) = negative_origin(question, authority);
                let kind = if *nxdomain {
                    DenialKind::NxDomain
                } else {
                    DenialKind::NoData
                };
                match self.zone_keys(&owner, signer).await {
                    Ok(keys) => self.trust.validate_denial(
                        &question.name,
                        question.qtype,
                        kind,
                        authority,
                        &keys,
                        now,
                    ),
                    Err(outcome) => outcome.security(),
                }
            }
        };

        if let Security::Bogus(reason) = &security {
            debug!(%question, %reason, "validation failed");
        }
        security
    }

    /// Trusted keys of the zone that signed data at `owner`.
    async fn zone_keys(&self, owner: &Name, signer: Option<Name>) -> Result<ZoneKeys, ChainOutcome> {
        let Some(anchor) = self.trust.closest_anchor(owner).cloned() else {
            return Err(ChainOutcome::Insecure(Name::root()));
        };

        let (target, exact) = match signer {
            Some(signer) => {
                if !signer.is_subdomain_of(&anchor) || !owner.is_subdomain_of(&signer) {
                    return Err(ChainOutcome::Bogus(format!(
                        "signer not in chain of trust for {owner}"
                    )));
                }
                (signer, true)
            }
            None => (owner.clone(), false),
        };

        let chain = self.gather_chain(&anchor, &target, exact).await?;
        self.trust.walk(&chain, self.trust.now())
    }

    /// DS and DNSKEY sets from `anchor` down to `target`. Names with no DS
    /// that are not zone cuts are skipped. The walk stops at the first
    /// provably unsigned delegation.
    async fn gather_chain(
        &self,
        anchor: &Name,
        target: &Name,
        exact: bool,
    ) -> Result<ChainOfTrust, ChainOutcome> {
        let mut chain = ChainOfTrust::default();
        chain.push(ChainLink {
            zone: anchor.clone(),
            delegation: Delegation::Anchor,
            dnskeys: self.dnskeys(anchor).await,
        });

        let below = target
            .ancestors_top_down()
            .into_iter()
            .filter(|name| name.label_count() > anchor.label_count());
        for child in below {
            let question = Question::new(child.clone(), rtype::DS, class::IN);
            let lookup = self.lookup_infra(&question, 0).await.map_err(|e| {
                ChainOutcome::Bogus(format!("no DS response for {child}: {e}"))
            })?;

            match lookup.answer {
                Answer::Positive(ds) => {
                    trace!(zone = %child, "signed delegation");
                    chain.push(ChainLink {
                        dnskeys: self.dnskeys(&child).await,
                        zone: child,
                        delegation: Delegation::Signed(ds),
                    });
                }
                Answer::Negative { authority, .. } => {
                    let parent = chain.last_zone().cloned().unwrap_or_else(Name::root);
                    let is_target = child == *target;
                    if (exact && is_target) || denial::is_delegation(&child, &parent, &authority) {
                        chain.push(ChainLink {
                            zone: child,
                            delegation: Delegation::Unsigned(authority),
                            dnskeys: RecordSet::default(),
                        });
                        break;
                    }
                }
                Answer::Alias(_) => {}
            }
        }
        Ok(chain)
    }

    /// A zone's DNSKEY set, empty when it cannot be fetched.
    async fn dnskeys(&self, zone: &Name) -> RecordSet {
        let question = Question::new(zone.clone(), rtype::DNSKEY, class::IN);
        match self.lookup_infra(&question, 0).await {
            Ok(Lookup {
                answer: Answer::Positive(set),
                ..
            }) => set,
            Ok(_) => RecordSet::default(),
            Err(e) => {
                debug!(%zone, error = %e, "DNSKEY lookup failed");
                RecordSet::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{ZoneSigner, name, rr};

    #[test]
    fn negative_origin_prefers_the_signer() {
        let signer = ZoneSigner::new("example.com", 3);
        let soa = rr("example.com. 300 IN SOA ns1.example.com. admin.example.com. 1 7200 3600 1209600 300");
        let sig = signer.sign(std::slice::from_ref(&soa));
        let question = Question::new(name("nope.example.com"), rtype::A, class::IN);

        let (owner, found) = negative_origin(&question, &[soa.clone(), sig]);
        assert_eq!(owner, name("nope.example.com"));
        assert_eq!(found, Some(name("example.com")));

        let (owner, found) = negative_origin(&question, &[soa]);
        assert_eq!(owner, name("example.com"));
        assert_eq!(found, None);
    }
}
