//! Direct RRSIG verification against keys from the key store.
//!
//! Skips the chain entirely: the signature is checked with the ZSK registered
//! for the exact domain, falling back to the KSK.

use std::fmt;

use tracing::{debug, trace};

use super::verifier::{SignatureVerifier, Verification};
use crate::dns::rdata::{KeyRole, Rrsig};
use crate::dns::{DomainName, RrSet};
use crate::error::{Error, Result};
use crate::keys::extract::KeyExtractionError;
use crate::keys::store::{KeyFetch, KeyStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectFailure {
    NoSignatures,
    /// The store knows nothing about the domain
    NoKeys,
    KeyAbsent(KeyRole),
    KeyNotRegistered(KeyRole),
    Extraction(KeyExtractionError),
    Verification { role: KeyRole, result: Verification },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectOutcome {
    Valid {
        role: KeyRole,
        key_tag: u16,
        signature_index: usize,
    },
    Failed(DirectFailure),
}

impl DirectOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, DirectOutcome::Valid { .. })
    }
}

pub struct DirectVerifier<'a> {
    key_store: &'a dyn KeyStore,
    verifier: SignatureVerifier,
}

type CachedKey = std::result::Result<KeyFetch, KeyExtractionError>;

impl<'a> DirectVerifier<'a> {
    pub fn new(key_store: &'a dyn KeyStore, verifier: SignatureVerifier) -> Self {
        Self {
            key_store,
            verifier,
        }
    }

    pub async fn verify(
        &self,
        rrset: &RrSet,
        signatures: &[Rrsig],
        domain: &DomainName,
    ) -> Result<DirectOutcome> {
        if signatures.is_empty() {
            return Ok(DirectOutcome::Failed(DirectFailure::NoSignatures));
        }

        let mut zsk: Option<CachedKey> = None;
        let mut ksk: Option<CachedKey> = None;
        let mut last = DirectFailure::NoKeys;

        for (index, sig) in signatures.iter().enumerate() {
            for role in [KeyRole::Zsk, KeyRole::Ksk] {
                let slot = match role {
                    KeyRole::Zsk => &mut zsk,
                    KeyRole::Ksk => &mut ksk,
                };
                if slot.is_none() {
                    *slot = Some(self.fetch(domain, role).await?);
                }
                let failure = match slot {
                    Some(Ok(KeyFetch::Key(trusted))) => {
                        match self.verifier.verify(rrset, sig, &trusted.key) {
                            Verification::Valid => {
                                debug!(
                                    "{} {} verified directly with {} {}",
                                    rrset.name, rrset.rtype, role, trusted.key_tag()
                                );
                                return Ok(DirectOutcome::Valid {
                                    role,
                                    key_tag: trusted.key_tag(),
                                    signature_index: index,
                                });
                            }
                            result => DirectFailure::Verification { role, result },
                        }
                    }
                    Some(Ok(KeyFetch::NotRegistered)) => DirectFailure::KeyNotRegistered(role),
                    Some(Ok(KeyFetch::Absent)) | None => DirectFailure::KeyAbsent(role),
                    Some(Err(e)) => DirectFailure::Extraction(e.clone()),
                };
                trace!("Direct check of signature {} with {}: {:?}", index, role, failure);
                last = failure;
            }
        }

        if matches!(zsk, Some(Ok(KeyFetch::Absent))) && matches!(ksk, Some(Ok(KeyFetch::Absent))) {
            last = DirectFailure::NoKeys;
        }
        Ok(DirectOutcome::Failed(last))
    }

    async fn fetch(&self, domain: &DomainName, role: KeyRole) -> Result<CachedKey> {
        match self.key_store.fetch_trusted_key(domain, role).await {
            Ok(fetch) => Ok(Ok(fetch)),
            Err(Error::KeyExtraction(e)) => Ok(Err(e)),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for DirectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectFailure::NoSignatures => write!(f, "no signatures"),
            DirectFailure::NoKeys => write!(f, "no keys registered for the domain"),
            DirectFailure::KeyAbsent(role) => write!(f, "no {} in the key store", role),
            DirectFailure::KeyNotRegistered(role) => write!(f, "{} is not registered", role),
            DirectFailure::Extraction(e) => write!(f, "{}", e),
            DirectFailure::Verification { role, result } => match result {
                Verification::Invalid(e) => write!(f, "{}: {}", role, e),
                Verification::AlgorithmMismatch => write!(f, "{}: algorithm mismatch", role),
                Verification::Valid => write!(f, "{}: valid", role),
            },
        }
    }
}

impl fmt::Display for DirectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectOutcome::Valid {
                role,
                key_tag,
                signature_index,
            } => write!(
                f,
                "valid (signature {} with {} {})",
                signature_index, role, key_tag
            ),
            DirectOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
