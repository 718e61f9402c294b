use thiserror::Error;

/// Reasons a single DNSSEC check fails.
///
/// These describe one signature, key or digest. They prune a branch of the
/// trust tree; they do not abort a validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsSecError {
    #[error("DNSSEC signature has expired")]
    SignatureExpired,

    #[error("DNSSEC signature is not yet valid")]
    SignatureNotYetValid,

    #[error("Key tag does not match")]
    KeyTagMismatch,

    #[error("Unsupported DNSSEC algorithm: {0}")]
    UnsupportedAlgorithm(u8),

    #[error("Unsupported digest type: {0}")]
    UnsupportedDigestType(u8),

    #[error("DNSSEC signature verification failed")]
    SignatureVerificationFailed,

    #[error("DS record digest does not match DNSKEY")]
    DsDigestMismatch,

    #[error("Invalid DNSKEY public key format")]
    InvalidPublicKey,

    #[error("Invalid RRSIG signature format")]
    InvalidSignature,

    #[error("RRSIG does not apply to this RRset: {0}")]
    NotApplicable(String),

    #[error("DNSKEY is not a zone key (flags {flags}, protocol {protocol})")]
    NotZoneKey { flags: u16, protocol: u8 },

    #[error("Too many NSEC3 iterations: {0}")]
    TooManyIterations(u16),

    #[error("Invalid NSEC3 parameters")]
    InvalidNsec3Parameters,

    #[error("Invalid RRset data: {0}")]
    InvalidRrset(String),
}

pub type Result<T> = std::result::Result<T, DnsSecError>;
