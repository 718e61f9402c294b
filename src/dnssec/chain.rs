//! Data chain construction.
//!
//! Starting from an answer, the builder walks toward the root collecting, for
//! every zone on the way, the zone's signed DNSKEY set and the DS (or proof of
//! no DS) its parent publishes for it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::constants::MAX_CHAIN_DEPTH;
use super::denial::find_no_ds_proof;
use super::key_tag::key_tag_from_rdata;
use super::verifier::{SignatureVerifier, check_applicable};
use crate::dns::rdata::{DnsKey, Rrsig};
use crate::dns::{DomainName, RecordType, RrSet, SignedRrSet};
use crate::error::{Error, Result};
use crate::resolver::{Answer, ResolveError, Resolver};

/// What a link's RRset is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// The queried data
    Answer,
    /// DS set for the previous link's zone
    Delegation,
    /// Signed NSEC/NSEC3 proving the previous link's zone has no DS
    Denial,
}

/// A zone's DNSKEY set with its signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedKeySet {
    pub rrset: RrSet,
    pub keys: Vec<DnsKey>,
    pub signatures: Vec<Rrsig>,
    pub stale_signatures: Vec<Rrsig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub kind: LinkKind,
    pub rrset: RrSet,
    /// Signatures over `rrset` that are applicable and current
    pub signatures: Vec<Rrsig>,
    /// Applicable signatures outside their validity window
    pub stale_signatures: Vec<Rrsig>,
    /// Zone expected to hold the keys verifying `rrset`
    pub zone: DomainName,
    pub keys: Option<SignedKeySet>,
}

/// How the walk toward the root ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEnd {
    Root,
    /// `zone` has no DS and no proof of its absence
    NoDelegation { zone: DomainName },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChain {
    pub links: Vec<ChainLink>,
    pub end: ChainEnd,
    /// Queries sent while building, in order
    pub queries: Vec<(DomainName, RecordType)>,
}

impl DataChain {
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn answer(&self) -> Option<&ChainLink> {
        self.links.first()
    }
}

/// Builds data chains by querying a resolver.
pub struct ChainBuilder {
    resolver: Arc<dyn Resolver>,
    verifier: SignatureVerifier,
    max_chain_depth: usize,
}

impl ChainBuilder {
    pub fn new(resolver: Arc<dyn Resolver>, verifier: SignatureVerifier) -> Self {
        Self {
            resolver,
            verifier,
            max_chain_depth: MAX_CHAIN_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_chain_depth: usize) -> Self {
        self.max_chain_depth = max_chain_depth.max(1);
        self
    }

    pub async fn build(&self, answer: &Answer) -> Result<DataChain> {
        let mut queries = Vec::new();
        let owner = answer.rrset.name.clone();
        let (signatures, stale_signatures) = self.split_signatures(answer);

        let signer = signatures
            .first()
            .or(stale_signatures.first())
            .map(|sig| sig.signer.clone());

        let mut links = Vec::new();
        let answer_zone = match signer {
            Some(zone) => zone,
            None => {
                debug!("{} {} is unsigned, looking for its zone", owner, answer.rrset.rtype);
                let (zone, denial) = self.locate_unsigned_zone(&owner, &mut queries).await?;
                links.push(ChainLink {
                    kind: LinkKind::Answer,
                    rrset: answer.rrset.clone(),
                    signatures,
                    stale_signatures,
                    zone: zone.clone(),
                    keys: None,
                });
                if let Some(proof) = denial {
                    let link = self.denial_link(&zone, &proof);
                    links.push(link);
                }
                return self.walk(links, queries).await;
            }
        };

        links.push(ChainLink {
            kind: LinkKind::Answer,
            rrset: answer.rrset.clone(),
            signatures,
            stale_signatures,
            zone: answer_zone,
            keys: None,
        });
        self.walk(links, queries).await
    }

    /// Walk up from an unsigned answer's owner asking for DS. Returns the
    /// zone the answer belongs to and, for an insecure delegation, the
    /// signed record proving it.
    async fn locate_unsigned_zone(
        &self,
        owner: &DomainName,
        queries: &mut Vec<(DomainName, RecordType)>,
    ) -> Result<(DomainName, Option<SignedRrSet>)> {
        for ancestor in owner.ancestors() {
            if ancestor.is_root() {
                return Ok((ancestor, None));
            }
            queries.push((ancestor.clone(), RecordType::DS));
            match self.resolver.resolve(&ancestor, RecordType::DS).await {
                Ok(ds) if ds.is_signed() => {
                    debug!("Signed DS found at {}", ancestor);
                    return Ok((ancestor, None));
                }
                Ok(_) => trace!("Unsigned DS at {}, continuing", ancestor),
                Err(ResolveError::NoData {
                    denial: Some(proof),
                }) => {
                    if let Some(record) = find_no_ds_proof(&ancestor, &proof.records) {
                        debug!("{} is an insecure delegation", ancestor);
                        return Ok((ancestor, Some(record.clone())));
                    }
                    trace!("No DS at {}, continuing", ancestor);
                }
                Err(ResolveError::NoData { denial: None }) => {
                    trace!("No DS at {}, continuing", ancestor);
                }
                Err(e) => {
                    return Err(Error::ChainConstructionFailed {
                        zone: ancestor,
                        reason: format!("DS query failed: {}", e),
                    });
                }
            }
        }
        Ok((DomainName::root(), None))
    }

    async fn walk(
        &self,
        mut links: Vec<ChainLink>,
        mut queries: Vec<(DomainName, RecordType)>,
    ) -> Result<DataChain> {
        loop {
            let Some(last) = links.last_mut() else {
                return Err(Error::ChainConstructionFailed {
                    zone: DomainName::root(),
                    reason: "empty chain".to_string(),
                });
            };
            let zone = last.zone.clone();

            queries.push((zone.clone(), RecordType::DNSKEY));
            let key_answer = self
                .resolver
                .resolve(&zone, RecordType::DNSKEY)
                .await
                .map_err(|e| Error::ChainConstructionFailed {
                    zone: zone.clone(),
                    reason: format!("DNSKEY query failed: {}", e),
                })?;
            last.keys = Some(self.key_set(&key_answer));

            if zone.is_root() {
                debug!("Chain reached the root with {} links", links.len());
                return Ok(DataChain {
                    links,
                    end: ChainEnd::Root,
                    queries,
                });
            }
            if links.len() >= self.max_chain_depth {
                return Err(Error::ChainConstructionFailed {
                    zone,
                    reason: format!("chain longer than {} links", self.max_chain_depth),
                });
            }

            queries.push((zone.clone(), RecordType::DS));
            match self.resolver.resolve(&zone, RecordType::DS).await {
                Ok(ds) => {
                    let (signatures, stale_signatures) = self.split_signatures(&ds);
                    let next = parent_zone(&zone, signatures.first().or(stale_signatures.first()));
                    trace!("Delegation {} -> {}", next, zone);
                    links.push(ChainLink {
                        kind: LinkKind::Delegation,
                        rrset: ds.rrset,
                        signatures,
                        stale_signatures,
                        zone: next,
                        keys: None,
                    });
                }
                Err(ResolveError::NoData { denial }) => {
                    let proof = denial
                        .as_ref()
                        .and_then(|proof| find_no_ds_proof(&zone, &proof.records));
                    match proof {
                        Some(record) => {
                            debug!("{} is an insecure delegation", zone);
                            let link = self.denial_link(&zone, record);
                            links.push(link);
                        }
                        None => {
                            debug!("No DS for {}, chain ends", zone);
                            return Ok(DataChain {
                                links,
                                end: ChainEnd::NoDelegation { zone },
                                queries,
                            });
                        }
                    }
                }
                Err(e) => {
                    return Err(Error::ChainConstructionFailed {
                        zone,
                        reason: format!("DS query failed: {}", e),
                    });
                }
            }
        }
    }

    fn denial_link(&self, child: &DomainName, record: &SignedRrSet) -> ChainLink {
        let (signatures, stale_signatures) = self.split_signatures(record);
        ChainLink {
            kind: LinkKind::Denial,
            rrset: record.rrset.clone(),
            zone: parent_zone(child, signatures.first().or(stale_signatures.first())),
            signatures,
            stale_signatures,
            keys: None,
        }
    }

    fn key_set(&self, answer: &Answer) -> SignedKeySet {
        let keys = answer
            .rrset
            .rdata()
            .iter()
            .filter_map(|rdata| match DnsKey::parse(rdata) {
                Ok(key) => Some(key),
                Err(e) => {
                    match key_tag_from_rdata(rdata) {
                        Some(tag) => debug!(
                            "Skipping unreadable DNSKEY {} at {}: {}",
                            tag, answer.rrset.name, e
                        ),
                        None => debug!("Skipping unreadable DNSKEY at {}: {}", answer.rrset.name, e),
                    }
                    None
                }
            })
            .collect();
        let (signatures, stale_signatures) = self.split_signatures(answer);
        SignedKeySet {
            rrset: answer.rrset.clone(),
            keys,
            signatures,
            stale_signatures,
        }
    }

    /// Keep the signatures meant for the set, separating out-of-window ones.
    fn split_signatures(&self, signed: &SignedRrSet) -> (Vec<Rrsig>, Vec<Rrsig>) {
        let mut current = Vec::new();
        let mut stale = Vec::new();
        for sig in &signed.signatures {
            if let Err(e) = check_applicable(&signed.rrset, sig) {
                trace!("Ignoring RRSIG on {}: {}", signed.rrset.name, e);
                continue;
            }
            match self.verifier.check_validity(sig) {
                Ok(()) => current.push(sig.clone()),
                Err(e) => {
                    debug!(
                        "RRSIG {} tag {} on {}: {}",
                        sig.type_covered, sig.key_tag, signed.rrset.name, e
                    );
                    stale.push(sig.clone());
                }
            }
        }
        (current, stale)
    }
}

/// The signer when it is a proper ancestor of `zone`, else the parent.
fn parent_zone(zone: &DomainName, signature: Option<&Rrsig>) -> DomainName {
    match signature {
        Some(sig) if zone.is_proper_subdomain_of(&sig.signer) => sig.signer.clone(),
        _ => zone.parent().unwrap_or_else(DomainName::root),
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Answer => write!(f, "answer"),
            LinkKind::Delegation => write!(f, "delegation"),
            LinkKind::Denial => write!(f, "denial"),
        }
    }
}

impl fmt::Display for DataChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, link) in self.links.iter().enumerate() {
            writeln!(f, "[{}] {} {} (zone {})", i, link.kind, link.rrset, link.zone)?;
            for sig in &link.signatures {
                writeln!(f, "    RRSIG {}", sig)?;
            }
            for sig in &link.stale_signatures {
                writeln!(f, "    RRSIG {} (outside validity window)", sig)?;
            }
            if let Some(keys) = &link.keys {
                for key in &keys.keys {
                    writeln!(f, "    DNSKEY {} (tag {})", key, key.key_tag())?;
                }
                for sig in &keys.signatures {
                    writeln!(f, "    DNSKEY RRSIG {}", sig)?;
                }
            }
        }
        match &self.end {
            ChainEnd::Root => write!(f, "ends at the root"),
            ChainEnd::NoDelegation { zone } => write!(f, "ends at {} (no DS)", zone),
        }
    }
}
