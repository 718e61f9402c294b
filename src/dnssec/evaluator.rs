use tracing::{debug, trace};

use super::Verdict;
use super::tree::{NodeKind, TrustTree};
use super::trust_anchor::TrustAnchors;

/// Evaluate a trust tree against a set of trust anchors.
///
/// The first anchored key reached without crossing a denial node makes the
/// data secure. An anchored key that is only reachable through a denial
/// proves the data insecure.
pub fn evaluate(tree: &TrustTree, anchors: &TrustAnchors) -> Verdict {
    if anchors.is_empty() {
        debug!("No trust anchors, verdict is indeterminate");
        return Verdict::Indeterminate;
    }
    let Some(root) = tree.root() else {
        return Verdict::Bogus;
    };

    let mut insecure = false;
    let mut stack = vec![(root, false)];
    while let Some((id, through_denial)) = stack.pop() {
        let node = tree.node(id);
        let through_denial = through_denial || node.kind == NodeKind::Denial;

        if let Some((zone, key)) = node.key() {
            if anchors.contains(zone, key) {
                if !through_denial {
                    debug!("Anchored key {} at {} reached", key.key_tag(), zone);
                    return Verdict::Secure;
                }
                trace!("Anchored key {} at {} reached through a denial", key.key_tag(), zone);
                insecure = true;
                continue;
            }
        }
        for child in node.children.iter().rev() {
            stack.push((*child, through_denial));
        }
    }

    if insecure {
        Verdict::Insecure
    } else {
        Verdict::Bogus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::rdata::{DnsKey, KeyRole};
    use crate::dnssec::chain::DataChain;
    use crate::dnssec::trust_anchor::TrustedKey;
    use crate::dnssec::verifier::SignatureVerifier;

    #[test]
    fn test_empty_anchors_are_indeterminate() {
        let tree = TrustTree::default();
        assert_eq!(evaluate(&tree, &TrustAnchors::new()), Verdict::Indeterminate);
    }

    #[test]
    fn test_empty_tree_is_bogus() {
        let chain = DataChain {
            links: Vec::new(),
            end: crate::dnssec::chain::ChainEnd::Root,
            queries: Vec::new(),
        };
        let tree = TrustTree::derive(&chain, &SignatureVerifier::new(), &TrustAnchors::new());
        let anchors: TrustAnchors = [TrustedKey::supplied(
            "example.com".parse().unwrap(),
            DnsKey::new(KeyRole::Ksk, 13, vec![1; 64]),
        )]
        .into_iter()
        .collect();
        assert_eq!(evaluate(&tree, &anchors), Verdict::Bogus);
    }
}
