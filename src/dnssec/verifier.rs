use std::time::{SystemTime, UNIX_EPOCH};

use tracing::trace;

use super::DnsSecAlgorithm;
use super::errors::{DnsSecError, Result};
use crate::dns::rdata::{DNSSEC_PROTOCOL, DnsKey, Rrsig, serial_lt};
use crate::dns::{DomainName, RrSet};

/// Outcome of checking one RRSIG with one DNSKEY
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Invalid(DnsSecError),
    /// The key uses a different algorithm than the signature; not a failure
    /// of the key, just not a candidate.
    AlgorithmMismatch,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

/// Checks RRSIGs against DNSKEYs at a fixed or current time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier {
    now: Option<u32>,
}

impl SignatureVerifier {
    /// Verifier using the system clock
    pub fn new() -> Self {
        Self { now: None }
    }

    /// Verifier pinned to `unix_time`
    pub fn at(unix_time: u32) -> Self {
        Self {
            now: Some(unix_time),
        }
    }

    pub fn now(&self) -> u32 {
        self.now.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as u32)
                .unwrap_or_default()
        })
    }

    pub fn verify(&self, rrset: &RrSet, rrsig: &Rrsig, dnskey: &DnsKey) -> Verification {
        if rrsig.algorithm != dnskey.algorithm {
            return Verification::AlgorithmMismatch;
        }
        match self.check(rrset, rrsig, dnskey) {
            Ok(()) => {
                trace!(
                    "RRSIG {} tag {} verified {} {}",
                    rrsig.type_covered, rrsig.key_tag, rrset.name, rrset.rtype
                );
                Verification::Valid
            }
            Err(e) => {
                trace!(
                    "RRSIG {} tag {} rejected for {} {}: {}",
                    rrsig.type_covered, rrsig.key_tag, rrset.name, rrset.rtype, e
                );
                Verification::Invalid(e)
            }
        }
    }

    fn check(&self, rrset: &RrSet, rrsig: &Rrsig, dnskey: &DnsKey) -> Result<()> {
        if rrsig.key_tag != dnskey.key_tag() {
            return Err(DnsSecError::KeyTagMismatch);
        }
        if dnskey.protocol != DNSSEC_PROTOCOL || !dnskey.is_zone_key() {
            return Err(DnsSecError::NotZoneKey {
                flags: dnskey.flags,
                protocol: dnskey.protocol,
            });
        }
        check_applicable(rrset, rrsig)?;
        self.check_validity(rrsig)?;

        let algorithm = DnsSecAlgorithm::from_u8(rrsig.algorithm)
            .filter(DnsSecAlgorithm::is_supported)
            .ok_or(DnsSecError::UnsupportedAlgorithm(rrsig.algorithm))?;
        if rrsig.signature.is_empty() {
            return Err(DnsSecError::InvalidSignature);
        }
        let data = signed_data(rrset, rrsig)?;
        algorithm.verify(&dnskey.public_key, &data, &rrsig.signature)
    }

    /// Check the signature validity window against this verifier's clock.
    pub fn check_validity(&self, rrsig: &Rrsig) -> Result<()> {
        let now = self.now();
        if rrsig.is_current(now) {
            Ok(())
        } else if serial_lt(now, rrsig.inception) {
            Err(DnsSecError::SignatureNotYetValid)
        } else {
            Err(DnsSecError::SignatureExpired)
        }
    }
}

/// Whether `rrsig` is meant for `rrset` (RFC 4035 5.3.1), time aside.
pub fn check_applicable(rrset: &RrSet, rrsig: &Rrsig) -> Result<()> {
    if rrsig.type_covered != rrset.rtype {
        return Err(DnsSecError::NotApplicable(format!(
            "covers {} not {}",
            rrsig.type_covered, rrset.rtype
        )));
    }
    if !rrset.name.is_subdomain_of(&rrsig.signer) {
        return Err(DnsSecError::NotApplicable(format!(
            "signer {} is not an ancestor of {}",
            rrsig.signer, rrset.name
        )));
    }
    if rrsig.labels as usize > owner_label_count(&rrset.name) {
        return Err(DnsSecError::NotApplicable(format!(
            "labels field {} exceeds owner {}",
            rrsig.labels, rrset.name
        )));
    }
    Ok(())
}

/// Label count as RRSIG counts it: root and a leading wildcard excluded.
fn owner_label_count(name: &DomainName) -> usize {
    let count = name.label_count();
    match name.labels().next() {
        Some(b"*") => count - 1,
        _ => count,
    }
}

/// The data an RRSIG signs over `rrset` (RFC 4034 3.1.8.1, 6.2, 6.3).
pub fn signed_data(rrset: &RrSet, rrsig: &Rrsig) -> Result<Vec<u8>> {
    let mut data = rrsig.signed_prefix();

    let owner = if (rrsig.labels as usize) < owner_label_count(&rrset.name) {
        rrset.name.trim_to(rrsig.labels as usize).to_wildcard()
    } else {
        rrset.name.clone()
    };
    let owner = owner.to_canonical_wire();
    let rtype: u16 = rrset.rtype.into();
    let class: u16 = rrset.class.into();

    let rdata = rrset
        .canonical_rdata()
        .map_err(|e| DnsSecError::InvalidRrset(e.to_string()))?;
    for rd in rdata {
        let rdlen = u16::try_from(rd.len())
            .map_err(|_| DnsSecError::InvalidRrset("rdata too long".to_string()))?;
        data.extend_from_slice(&owner);
        data.extend_from_slice(&rtype.to_be_bytes());
        data.extend_from_slice(&class.to_be_bytes());
        data.extend_from_slice(&rrsig.original_ttl.to_be_bytes());
        data.extend_from_slice(&rdlen.to_be_bytes());
        data.extend_from_slice(&rd);
    }
    Ok(data)
}
