//! Trust tree derivation.
//!
//! The tree is rooted at the answer RRset. Each path down from the root is a
//! candidate chain of verifications toward a key that may be a trust anchor:
//! the keys signing a set, the keys signing those keys' DNSKEY set, the DS
//! records vouching for them in the parent, and so on. Nodes live in an arena
//! and refer to their children by index.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace};

use super::chain::{DataChain, LinkKind};
use super::constants::MAX_TREE_NODES;
use super::trust_anchor::TrustAnchors;
use super::verifier::{SignatureVerifier, Verification};
use crate::dns::rdata::{DnsKey, Ds, Rrsig};
use crate::dns::{DomainName, RrSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The answer RRset
    RrSet,
    /// A key whose signature over the link's RRset verified
    SigningKey { zone: DomainName, key: DnsKey },
    /// A key whose signature over the zone's DNSKEY set verified
    KeySetSigner { zone: DomainName, key: DnsKey },
    /// A DS in the parent matching the key above
    Delegation { ds: Ds },
    /// A proof that the zone above has no DS
    Denial,
}

/// A verification that failed beneath a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedBranch {
    pub key_tag: u16,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustNode {
    pub kind: NodeKind,
    /// Index of the chain link this node belongs to
    pub link: usize,
    pub children: Vec<NodeId>,
    pub pruned: Vec<PrunedBranch>,
}

impl TrustNode {
    /// The zone and key if this is a key node
    pub fn key(&self) -> Option<(&DomainName, &DnsKey)> {
        match &self.kind {
            NodeKind::SigningKey { zone, key } | NodeKind::KeySetSigner { zone, key } => {
                Some((zone, key))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustTree {
    nodes: Vec<TrustNode>,
    truncated: bool,
}

/// Which signed set of a link is being verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SignedSet {
    Data,
    Keys,
}

/// Pending expansion; `key` indexes the visible keys of the node's link
#[derive(Debug, Clone, Copy)]
struct Pending {
    id: NodeId,
    key: Option<usize>,
}

impl TrustTree {
    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    pub fn node(&self, id: NodeId) -> &TrustNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[TrustNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True if expansion stopped at the node limit
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Build the tree of verification paths over `chain`.
    pub fn derive(chain: &DataChain, verifier: &SignatureVerifier, anchors: &TrustAnchors) -> Self {
        let mut deriver = Deriver::new(chain, verifier, anchors);
        deriver.run();
        debug!(
            "Derived trust tree with {} nodes ({} verifications)",
            deriver.tree.nodes.len(),
            deriver.memo.len()
        );
        deriver.tree
    }

    fn push(&mut self, kind: NodeKind, link: usize, parent: Option<NodeId>) -> Option<NodeId> {
        if self.nodes.len() >= MAX_TREE_NODES {
            self.truncated = true;
            return None;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(TrustNode {
            kind,
            link,
            children: Vec::new(),
            pruned: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        Some(id)
    }
}

struct Deriver<'a> {
    chain: &'a DataChain,
    verifier: &'a SignatureVerifier,
    /// Per link: the zone's DNSKEYs followed by anchors not among them
    visible: Vec<Vec<DnsKey>>,
    /// Per link: how many of `visible` come from the DNSKEY set
    published: Vec<usize>,
    memo: HashMap<(usize, SignedSet, usize, usize), Verification>,
    tree: TrustTree,
}

impl<'a> Deriver<'a> {
    fn new(chain: &'a DataChain, verifier: &'a SignatureVerifier, anchors: &TrustAnchors) -> Self {
        let mut visible = Vec::with_capacity(chain.links.len());
        let mut published = Vec::with_capacity(chain.links.len());
        for link in &chain.links {
            let mut keys: Vec<DnsKey> = link
                .keys
                .as_ref()
                .map(|set| set.keys.clone())
                .unwrap_or_default();
            published.push(keys.len());
            for anchor in anchors.owned_by(&link.zone) {
                if !keys.iter().any(|k| anchor.matches(&link.zone, k)) {
                    keys.push(anchor.key.clone());
                }
            }
            visible.push(keys);
        }
        Self {
            chain,
            verifier,
            visible,
            published,
            memo: HashMap::new(),
            tree: TrustTree::default(),
        }
    }

    fn run(&mut self) {
        if self.chain.links.is_empty() {
            return;
        }
        let Some(root) = self.tree.push(NodeKind::RrSet, 0, None) else {
            return;
        };
        let mut stack = vec![Pending {
            id: root,
            key: None,
        }];

        while let Some(pending) = stack.pop() {
            let node = self.tree.node(pending.id);
            let link = node.link;
            let children = match node.kind.clone() {
                NodeKind::RrSet => {
                    let answer = &self.chain.links[0];
                    let next_is_denial = self
                        .chain
                        .links
                        .get(1)
                        .is_some_and(|l| l.kind == LinkKind::Denial);
                    if answer.signatures.is_empty() && next_is_denial {
                        self.add_denial(pending.id, 1)
                    } else {
                        self.add_signers(pending.id, link, SignedSet::Data)
                    }
                }
                NodeKind::SigningKey { .. } => match pending.key {
                    Some(index) if index < self.published[link] => {
                        self.add_signers(pending.id, link, SignedSet::Keys)
                    }
                    _ => Vec::new(),
                },
                NodeKind::KeySetSigner { zone, key } => self.add_parent(pending.id, link, &zone, &key),
                NodeKind::Delegation { .. } | NodeKind::Denial => {
                    self.add_signers(pending.id, link, SignedSet::Data)
                }
            };
            // Reverse so the first child is expanded first
            stack.extend(children.into_iter().rev());
        }
    }

    /// Children for each visible key that validly signs the link's set.
    fn add_signers(&mut self, parent: NodeId, link: usize, set: SignedSet) -> Vec<Pending> {
        let Some((rrset, signatures)) = self.signed_set(link, set) else {
            return Vec::new();
        };
        let zone = self.chain.links[link].zone.clone();

        let mut signers: Vec<usize> = Vec::new();
        let mut pruned = Vec::new();
        for (sig_index, sig) in signatures.iter().enumerate() {
            // Only the zone's own keys may sign its sets
            if sig.signer != zone {
                trace!("Skipping tag {} signed by {} at {}", sig.key_tag, sig.signer, zone);
                pruned.push(PrunedBranch {
                    key_tag: sig.key_tag,
                    reason: format!("signer {} is not {}", sig.signer, zone),
                });
                continue;
            }
            for key_index in 0..self.visible[link].len() {
                let key = &self.visible[link][key_index];
                let result = self
                    .memo
                    .entry((link, set, sig_index, key_index))
                    .or_insert_with(|| self.verifier.verify(rrset, sig, key))
                    .clone();
                match result {
                    Verification::Valid => {
                        if !signers.contains(&key_index) {
                            signers.push(key_index);
                        }
                    }
                    Verification::Invalid(e) if sig.key_tag == key.key_tag() => {
                        trace!("Pruned tag {} at {}: {}", sig.key_tag, zone, e);
                        pruned.push(PrunedBranch {
                            key_tag: sig.key_tag,
                            reason: e.to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }
        self.tree.nodes[parent.0].pruned.extend(pruned);

        let mut children = Vec::new();
        for key_index in signers {
            let key = self.visible[link][key_index].clone();
            let kind = match set {
                SignedSet::Data => NodeKind::SigningKey {
                    zone: zone.clone(),
                    key,
                },
                SignedSet::Keys => NodeKind::KeySetSigner {
                    zone: zone.clone(),
                    key,
                },
            };
            match self.tree.push(kind, link, Some(parent)) {
                Some(id) => children.push(Pending {
                    id,
                    key: Some(key_index),
                }),
                None => break,
            }
        }
        children
    }

    /// Children linking a key-set signer to the next link up.
    fn add_parent(&mut self, parent: NodeId, link: usize, zone: &DomainName, key: &DnsKey) -> Vec<Pending> {
        let chain: &'a DataChain = self.chain;
        let next = link + 1;
        let Some(next_link) = chain.links.get(next) else {
            return Vec::new();
        };
        match next_link.kind {
            LinkKind::Denial => self.add_denial(parent, next),
            LinkKind::Delegation => {
                let mut children = Vec::new();
                for rdata in next_link.rrset.rdata() {
                    let ds = match Ds::parse(rdata) {
                        Ok(ds) => ds,
                        Err(e) => {
                            debug!("Skipping unreadable DS for {}: {}", zone, e);
                            continue;
                        }
                    };
                    match ds.matches(zone, key) {
                        Ok(true) => {
                            match self.tree.push(NodeKind::Delegation { ds }, next, Some(parent)) {
                                Some(id) => children.push(Pending { id, key: None }),
                                None => break,
                            }
                        }
                        Ok(false) => {}
                        Err(e) => self.tree.nodes[parent.0].pruned.push(PrunedBranch {
                            key_tag: ds.key_tag,
                            reason: e.to_string(),
                        }),
                    }
                }
                children
            }
            LinkKind::Answer => Vec::new(),
        }
    }

    fn add_denial(&mut self, parent: NodeId, link: usize) -> Vec<Pending> {
        self.tree
            .push(NodeKind::Denial, link, Some(parent))
            .map(|id| Pending { id, key: None })
            .into_iter()
            .collect()
    }

    fn signed_set(&self, link: usize, set: SignedSet) -> Option<(&'a RrSet, &'a [Rrsig])> {
        let chain: &'a DataChain = self.chain;
        let chain_link = chain.links.get(link)?;
        match set {
            SignedSet::Data => Some((&chain_link.rrset, chain_link.signatures.as_slice())),
            SignedSet::Keys => chain_link
                .keys
                .as_ref()
                .map(|keys| (&keys.rrset, keys.signatures.as_slice())),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::RrSet => write!(f, "RRset"),
            NodeKind::SigningKey { zone, key } => {
                write!(f, "signed by {} key {} (alg {})", zone, key.key_tag(), key.algorithm)
            }
            NodeKind::KeySetSigner { zone, key } => write!(
                f,
                "{} DNSKEY set signed by key {} (alg {})",
                zone,
                key.key_tag(),
                key.algorithm
            ),
            NodeKind::Delegation { ds } => write!(f, "DS {}", ds),
            NodeKind::Denial => write!(f, "no DS (authenticated denial)"),
        }
    }
}

impl fmt::Display for TrustTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(root) = self.root() else {
            return writeln!(f, "(empty trust tree)");
        };
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            writeln!(f, "{:indent$}{}", "", node.kind, indent = depth * 2)?;
            for pruned in &node.pruned {
                writeln!(
                    f,
                    "{:indent$}x key {}: {}",
                    "",
                    pruned.key_tag,
                    pruned.reason,
                    indent = depth * 2 + 2
                )?;
            }
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        if self.truncated {
            writeln!(f, "(truncated at {} nodes)", MAX_TREE_NODES)?;
        }
        Ok(())
    }
}
