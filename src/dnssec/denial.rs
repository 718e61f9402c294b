//! Authenticated denial that a delegation has a DS record.
//!
//! A parent proves an insecure delegation with an NSEC record owned by the
//! child name whose bitmap has NS but neither DS nor SOA, or with an NSEC3
//! record matching the hashed child name with NS and no DS. An opt-out NSEC3
//! whose span covers the hashed child also proves it (RFC 5155 8.6).

use ring::digest;
use tracing::{debug, trace};

use super::constants::MAX_NSEC3_ITERATIONS;
use super::errors::{DnsSecError, Result};
use crate::dns::rdata::{Nsec, Nsec3};
use crate::dns::{DomainName, RecordType, SignedRrSet};

/// NSEC3 hash algorithm number for SHA-1, the only one defined
const NSEC3_SHA1: u8 = 1;

/// Compute the NSEC3 hash of `name` (RFC 5155 5).
pub fn nsec3_hash(name: &DomainName, salt: &[u8], iterations: u16) -> Result<Vec<u8>> {
    if iterations > MAX_NSEC3_ITERATIONS {
        return Err(DnsSecError::TooManyIterations(iterations));
    }

    let mut input = name.to_canonical_wire();
    input.extend_from_slice(salt);
    let mut hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &input);

    for _ in 0..iterations {
        let mut next = hash.as_ref().to_vec();
        next.extend_from_slice(salt);
        hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &next);
    }
    Ok(hash.as_ref().to_vec())
}

/// Base32hex without padding, lower-case, as used in NSEC3 owner labels
pub fn encode_hash_label(hash: &[u8]) -> String {
    base32::encode(base32::Alphabet::Rfc4648Hex { padding: false }, hash).to_ascii_lowercase()
}

pub fn decode_hash_label(label: &str) -> Option<Vec<u8>> {
    base32::decode(
        base32::Alphabet::Rfc4648Hex { padding: false },
        &label.to_ascii_uppercase(),
    )
}

/// True if `hash` falls strictly between `owner` and `next`, wrapping at the
/// end of the hash ring.
fn hash_covered(owner: &[u8], next: &[u8], hash: &[u8]) -> bool {
    if owner < next {
        owner < hash && hash < next
    } else {
        hash > owner || hash < next
    }
}

/// Find the record in `proof` that shows `zone` is delegated without DS.
///
/// Only the records are checked here; their signatures are verified when the
/// trust tree is derived.
pub fn find_no_ds_proof<'a>(zone: &DomainName, proof: &'a [SignedRrSet]) -> Option<&'a SignedRrSet> {
    proof.iter().find(|signed| {
        let rrset = &signed.rrset;
        match rrset.rtype {
            RecordType::NSEC => rrset
                .rdata()
                .iter()
                .filter_map(|rd| Nsec::parse(rd).ok())
                .any(|nsec| nsec_proves_no_ds(&rrset.name, &nsec, zone)),
            RecordType::NSEC3 => rrset
                .rdata()
                .iter()
                .filter_map(|rd| Nsec3::parse(rd).ok())
                .any(|nsec3| nsec3_proves_no_ds(&rrset.name, &nsec3, zone)),
            _ => false,
        }
    })
}

fn nsec_proves_no_ds(owner: &DomainName, nsec: &Nsec, zone: &DomainName) -> bool {
    let proves = owner == zone
        && nsec.has_type(RecordType::NS)
        && !nsec.has_type(RecordType::DS)
        && !nsec.has_type(RecordType::SOA);
    trace!("NSEC {} -> {} for {}: {}", owner, nsec.next, zone, proves);
    proves
}

fn nsec3_proves_no_ds(owner: &DomainName, nsec3: &Nsec3, zone: &DomainName) -> bool {
    if nsec3.hash_algorithm != NSEC3_SHA1 {
        return false;
    }
    // The NSEC3 owner is <hash>.<apex>; the child must sit below that apex
    let Some(apex) = owner.parent() else {
        return false;
    };
    if !zone.is_proper_subdomain_of(&apex) {
        return false;
    }
    let Some(owner_hash) = owner.first_label().and_then(|l| decode_hash_label(&l)) else {
        return false;
    };
    let zone_hash = match nsec3_hash(zone, &nsec3.salt, nsec3.iterations) {
        Ok(hash) => hash,
        Err(e) => {
            debug!("Skipping NSEC3 at {}: {}", owner, e);
            return false;
        }
    };

    if owner_hash == zone_hash {
        return nsec3.has_type(RecordType::NS)
            && !nsec3.has_type(RecordType::DS)
            && !nsec3.has_type(RecordType::SOA);
    }
    nsec3.opt_out() && hash_covered(&owner_hash, &nsec3.next_hashed, &zone_hash)
}
