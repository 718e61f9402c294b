pub mod algorithm;
pub mod chain;
pub mod denial;
pub mod digest;
pub mod direct;
pub mod errors;
pub mod evaluator;
pub mod key_tag;
pub mod tree;
pub mod trust_anchor;
pub mod validator;
pub mod verifier;

use std::fmt;

pub use algorithm::DnsSecAlgorithm;
pub use chain::{ChainBuilder, ChainEnd, ChainLink, DataChain, LinkKind};
pub use digest::DigestType;
pub use direct::{DirectFailure, DirectOutcome, DirectVerifier};
pub use errors::DnsSecError;
pub use evaluator::evaluate;
pub use key_tag::calculate_key_tag;
pub use tree::{NodeId, NodeKind, TrustNode, TrustTree};
pub use trust_anchor::{KeyOrigin, TrustAnchors, TrustedKey};
pub use validator::{ChainReport, DirectReport, ValidationOptions, Validator};
pub use verifier::{SignatureVerifier, Verification};

/// DNSSEC validation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// A path from a trust anchor reaches the data
    Secure,
    /// A trust anchor proves the data sits below an unsigned delegation
    Insecure,
    /// Anchors were given but no path reaches the data
    Bogus,
    /// No trust anchors to evaluate against
    Indeterminate,
}

impl Verdict {
    pub fn is_secure(self) -> bool {
        self == Verdict::Secure
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Verdict::Secure => "Secure",
            Verdict::Insecure => "Insecure",
            Verdict::Bogus => "Bogus",
            Verdict::Indeterminate => "Indeterminate",
        };
        f.write_str(text)
    }
}

/// DNSSEC constants
pub mod constants {
    /// Maximum iterations for NSEC3 (RFC 5155)
    pub const MAX_NSEC3_ITERATIONS: u16 = 2500;

    /// Default limit on links in a data chain
    pub const MAX_CHAIN_DEPTH: usize = 32;

    /// Limit on nodes in a derived trust tree
    pub const MAX_TREE_NODES: usize = 4096;
}
