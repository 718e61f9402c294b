use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::chain::{ChainBuilder, DataChain};
use super::constants::MAX_CHAIN_DEPTH;
use super::direct::{DirectOutcome, DirectVerifier};
use super::evaluator::evaluate;
use super::tree::TrustTree;
use super::trust_anchor::TrustAnchors;
use super::verifier::SignatureVerifier;
use super::Verdict;
use crate::dns::rdata::KeyRole;
use crate::dns::{DomainName, RecordType};
use crate::error::{Error, Result};
use crate::keys::store::{KeyFetch, KeyStore, KeyStoreError};
use crate::resolver::{Answer, Resolver};

/// Per-call validation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Diagnostic detail: 1 signatures, 2 queries and keys, 3 answers,
    /// 4 the full data chain
    pub verbosity: u8,
    /// Unix time to validate at; the system clock when unset
    pub now: Option<u32>,
    /// Add keys from the key store to the anchors before validating
    pub use_key_store: bool,
    pub max_chain_depth: usize,
    pub batch_concurrency: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            verbosity: 0,
            now: None,
            use_key_store: false,
            max_chain_depth: MAX_CHAIN_DEPTH,
            batch_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainReport {
    pub name: DomainName,
    pub rtype: RecordType,
    pub verdict: Verdict,
    pub chain: DataChain,
    pub tree: TrustTree,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectReport {
    pub name: DomainName,
    pub rtype: RecordType,
    pub outcome: DirectOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub name: DomainName,
    pub rtype: RecordType,
    pub result: Result<ChainReport>,
}

/// Runs validations against a resolver and an optional key store.
#[derive(Clone)]
pub struct Validator {
    resolver: Arc<dyn Resolver>,
    key_store: Option<Arc<dyn KeyStore>>,
    options: ValidationOptions,
}

impl Validator {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            key_store: None,
            options: ValidationOptions::default(),
        }
    }

    pub fn with_key_store(mut self, key_store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(key_store);
        self
    }

    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    fn verifier(&self) -> SignatureVerifier {
        match self.options.now {
            Some(now) => SignatureVerifier::at(now),
            None => SignatureVerifier::new(),
        }
    }

    /// Validate `name`/`rtype` through the chain of trust.
    pub async fn validate_chain(
        &self,
        name: &DomainName,
        rtype: RecordType,
        anchors: &TrustAnchors,
    ) -> Result<ChainReport> {
        let start = Instant::now();
        let verifier = self.verifier();

        if self.options.verbosity >= 2 {
            info!("Query {} {}", name, rtype);
        }
        let answer = self.resolver.resolve(name, rtype).await?;
        self.log_answer(&answer);

        let mut anchors = anchors.clone();
        if self.options.use_key_store {
            let added = self.populate_trust_anchors(name, &mut anchors).await?;
            debug!("Added {} trust anchors from the key store", added);
        }

        let chain = ChainBuilder::new(self.resolver.clone(), verifier)
            .with_max_depth(self.options.max_chain_depth)
            .build(&answer)
            .await?;
        if self.options.verbosity >= 2 {
            for (qname, qtype) in &chain.queries {
                info!("Query {} {}", qname, qtype);
            }
        }
        if self.options.verbosity >= 4 {
            info!("Data chain:\n{}", chain);
        }

        let tree = TrustTree::derive(&chain, &verifier, &anchors);
        if self.options.verbosity >= 1 {
            for node in tree.nodes() {
                if let Some((zone, key)) = node.key() {
                    info!("Valid signature by {} key {}", zone, key.key_tag());
                }
                for pruned in &node.pruned {
                    info!("Invalid signature by key {}: {}", pruned.key_tag, pruned.reason);
                }
            }
        }

        let verdict = evaluate(&tree, &anchors);
        debug!("{} {}: {}", name, rtype, verdict);
        Ok(ChainReport {
            name: name.clone(),
            rtype,
            verdict,
            chain,
            tree,
            elapsed: start.elapsed(),
        })
    }

    /// Check the answer's signatures directly with the domain's stored keys.
    pub async fn verify_direct(&self, name: &DomainName, rtype: RecordType) -> Result<DirectReport> {
        let start = Instant::now();
        let key_store = self.key_store.as_deref().ok_or_else(|| {
            Error::KeyStore(KeyStoreError::Backend("no key store configured".to_string()))
        })?;

        if self.options.verbosity >= 2 {
            info!("Query {} {}", name, rtype);
        }
        let answer = self.resolver.resolve(name, rtype).await?;
        self.log_answer(&answer);

        let outcome = DirectVerifier::new(key_store, self.verifier())
            .verify(&answer.rrset, &answer.signatures, name)
            .await?;
        if self.options.verbosity >= 1 {
            info!("Direct verification of {} {}: {}", name, rtype, outcome);
        }
        Ok(DirectReport {
            name: name.clone(),
            rtype,
            outcome,
            elapsed: start.elapsed(),
        })
    }

    /// Validate independent queries concurrently.
    pub async fn validate_batch(
        &self,
        queries: Vec<(DomainName, RecordType)>,
        anchors: &TrustAnchors,
    ) -> Vec<BatchItem> {
        let concurrency = self.options.batch_concurrency.max(1);
        stream::iter(queries)
            .map(|(name, rtype)| async move {
                let result = self.validate_chain(&name, rtype, anchors).await;
                BatchItem {
                    name,
                    rtype,
                    result,
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Add the stored KSK and ZSK of `domain` and each of its ancestors to
    /// `anchors`. Returns how many were new.
    pub async fn populate_trust_anchors(
        &self,
        domain: &DomainName,
        anchors: &mut TrustAnchors,
    ) -> Result<usize> {
        let Some(key_store) = self.key_store.as_deref() else {
            warn!("No key store configured, no anchors added");
            return Ok(0);
        };

        let mut added = 0;
        for zone in domain.ancestors() {
            for role in [KeyRole::Ksk, KeyRole::Zsk] {
                match key_store.fetch_trusted_key(&zone, role).await {
                    Ok(KeyFetch::Key(key)) => {
                        if self.options.verbosity >= 2 {
                            info!("Key store {} for {}: {}", role, zone, key.key);
                        }
                        if anchors.insert(key) {
                            added += 1;
                        }
                    }
                    Ok(KeyFetch::NotRegistered) | Ok(KeyFetch::Absent) => {}
                    Err(Error::KeyExtraction(e)) => {
                        warn!("Ignoring {} certificate for {}: {}", role, zone, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(added)
    }

    fn log_answer(&self, answer: &Answer) {
        if self.options.verbosity >= 3 {
            info!("Answer: {}", answer.rrset);
            for sig in &answer.signatures {
                info!("  RRSIG {}", sig);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ResolveError, StaticResolver};

    #[tokio::test]
    async fn test_resolver_failure_is_an_error() {
        let validator = Validator::new(Arc::new(StaticResolver::new()));
        let err = validator
            .validate_chain(&"example.com".parse().unwrap(), RecordType::A, &TrustAnchors::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Resolve(ResolveError::NoData { denial: None })
        ));
    }

    #[tokio::test]
    async fn test_direct_needs_key_store() {
        let validator = Validator::new(Arc::new(StaticResolver::new()));
        let err = validator
            .verify_direct(&"example.com".parse().unwrap(), RecordType::A)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyStore(_)));
    }

    #[tokio::test]
    async fn test_populate_without_store_adds_nothing() {
        let validator = Validator::new(Arc::new(StaticResolver::new()));
        let mut anchors = TrustAnchors::new();
        let added = validator
            .populate_trust_anchors(&"www.example.com".parse().unwrap(), &mut anchors)
            .await
            .unwrap();
        assert_eq!(added, 0);
        assert!(anchors.is_empty());
    }

    #[test]
    fn test_default_options() {
        let options = ValidationOptions::default();
        assert_eq!(options.max_chain_depth, MAX_CHAIN_DEPTH);
        assert_eq!(options.verbosity, 0);
        assert!(!options.use_key_store);
    }
}
