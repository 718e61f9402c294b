//! Turn a certificate from the key store into a DNSKEY.
//!
//! The certificate's SubjectPublicKeyInfo is re-encoded, and the key material
//! is cut out of it in the layout DNSKEY uses for the key's algorithm.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::{debug, trace};
use x509_parser::parse_x509_certificate;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

use super::store::CertificateLookup;
use crate::dns::DomainName;
use crate::dns::rdata::{DnsKey, KeyRole};
use crate::dnssec::DnsSecAlgorithm;
use crate::dnssec::algorithm::encode_rsa_key;
use crate::dnssec::trust_anchor::{KeyOrigin, TrustedKey};

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_P256: &str = "1.2.840.10045.3.1.7";
const OID_P384: &str = "1.3.132.0.34";
const OID_ED25519: &str = "1.3.101.112";
const OID_RSA: &str = "1.2.840.113549.1.1.1";

/// Uncompressed SEC1 point marker
const EC_POINT_UNCOMPRESSED: u8 = 0x04;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyExtractionError {
    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("Key extraction failed: {0}")]
    KeyExtractionFailed(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Extract the DNSKEY held by a PEM or DER certificate.
pub fn dnskey_from_certificate(
    owner: &DomainName,
    bytes: &[u8],
    role: KeyRole,
) -> Result<TrustedKey, KeyExtractionError> {
    let der = certificate_der(bytes)?;
    let (_, cert) = parse_x509_certificate(&der)
        .map_err(|e| KeyExtractionError::MalformedCertificate(e.to_string()))?;
    let spki = cert.public_key();

    let algorithm = key_algorithm(spki)?;
    let key_bits = locate_key_bits(spki)?;

    let public_key = match algorithm {
        DnsSecAlgorithm::EcdsaP256Sha256 | DnsSecAlgorithm::EcdsaP384Sha384 => {
            match key_bits.split_first() {
                Some((&EC_POINT_UNCOMPRESSED, point)) => point.to_vec(),
                _ => {
                    return Err(KeyExtractionError::EncodingError(
                        "EC point is not uncompressed".to_string(),
                    ));
                }
            }
        }
        DnsSecAlgorithm::Ed25519 => key_bits,
        _ => match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => encode_rsa_key(rsa.exponent, rsa.modulus),
            _ => {
                return Err(KeyExtractionError::KeyExtractionFailed(
                    "unreadable RSA public key".to_string(),
                ));
            }
        },
    };

    if let Some(expected) = algorithm.public_key_len() {
        if public_key.len() != expected {
            return Err(KeyExtractionError::EncodingError(format!(
                "{} key is {} bytes, expected {}",
                algorithm,
                public_key.len(),
                expected
            )));
        }
    }

    let key = DnsKey::new(role, algorithm.to_u8(), public_key);
    debug!(
        "Extracted {} {} for {} (tag {})",
        algorithm,
        role,
        owner,
        key.key_tag()
    );
    Ok(TrustedKey {
        owner: owner.clone(),
        key,
        origin: KeyOrigin::KeyStore { role },
    })
}

/// Map a key store lookup to a trusted key. A null entry means no key is
/// registered, which is not an error.
pub fn dnskey_from_lookup(
    owner: &DomainName,
    lookup: &CertificateLookup,
    role: KeyRole,
) -> Result<Option<TrustedKey>, KeyExtractionError> {
    match lookup {
        CertificateLookup::Found(bytes) => dnskey_from_certificate(owner, bytes, role).map(Some),
        CertificateLookup::Null | CertificateLookup::Absent => Ok(None),
    }
}

fn certificate_der(bytes: &[u8]) -> Result<Vec<u8>, KeyExtractionError> {
    let is_pem = bytes
        .windows(b"-----BEGIN".len())
        .any(|w| w == b"-----BEGIN");
    if !is_pem {
        return Ok(bytes.to_vec());
    }
    let mut cursor = Cursor::new(bytes);
    match rustls_pemfile::certs(&mut cursor).next() {
        Some(Ok(cert)) => Ok(cert.as_ref().to_vec()),
        Some(Err(e)) => Err(KeyExtractionError::MalformedCertificate(e.to_string())),
        None => Err(KeyExtractionError::MalformedCertificate(
            "no CERTIFICATE block in PEM".to_string(),
        )),
    }
}

fn key_algorithm(spki: &SubjectPublicKeyInfo) -> Result<DnsSecAlgorithm, KeyExtractionError> {
    let oid = spki.algorithm.algorithm.to_id_string();
    match oid.as_str() {
        OID_EC_PUBLIC_KEY => {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.as_oid().ok())
                .map(|o| o.to_id_string())
                .ok_or_else(|| {
                    KeyExtractionError::KeyExtractionFailed("EC key without curve".to_string())
                })?;
            match curve.as_str() {
                OID_P256 => Ok(DnsSecAlgorithm::EcdsaP256Sha256),
                OID_P384 => Ok(DnsSecAlgorithm::EcdsaP384Sha384),
                other => Err(KeyExtractionError::KeyExtractionFailed(format!(
                    "unsupported curve {}",
                    other
                ))),
            }
        }
        OID_ED25519 => Ok(DnsSecAlgorithm::Ed25519),
        OID_RSA => Ok(DnsSecAlgorithm::RsaSha256),
        other => Err(KeyExtractionError::KeyExtractionFailed(format!(
            "unsupported key algorithm {}",
            other
        ))),
    }
}

const TAG_SEQUENCE: u8 = 0x30;
const TAG_BIT_STRING: u8 = 0x03;

/// Re-encode the SPKI and cut the BIT STRING payload off its tail.
fn locate_key_bits(spki: &SubjectPublicKeyInfo) -> Result<Vec<u8>, KeyExtractionError> {
    let canonical = canonical_spki(spki.raw)?;
    trace!(
        "SPKI ({} bytes, {} canonical): {}",
        spki.raw.len(),
        canonical.len(),
        STANDARD.encode(&canonical)
    );

    let bits: &[u8] = &spki.subject_public_key.data;
    if bits.is_empty() || !canonical.ends_with(bits) {
        return Err(KeyExtractionError::EncodingError(
            "public key not found in SubjectPublicKeyInfo".to_string(),
        ));
    }
    Ok(canonical[canonical.len() - bits.len()..].to_vec())
}

/// Rebuild `SEQUENCE { algorithm, BIT STRING }` with minimal DER lengths.
fn canonical_spki(raw: &[u8]) -> Result<Vec<u8>, KeyExtractionError> {
    let malformed = |what: &str| KeyExtractionError::EncodingError(format!("SPKI {}", what));

    let (tag, body, _) = read_tlv(raw).ok_or_else(|| malformed("truncated"))?;
    if tag != TAG_SEQUENCE {
        return Err(malformed("is not a SEQUENCE"));
    }
    let (tag, algorithm, rest) = read_tlv(body).ok_or_else(|| malformed("algorithm truncated"))?;
    if tag != TAG_SEQUENCE {
        return Err(malformed("algorithm is not a SEQUENCE"));
    }
    let (tag, key, _) = read_tlv(rest).ok_or_else(|| malformed("key truncated"))?;
    if tag != TAG_BIT_STRING {
        return Err(malformed("key is not a BIT STRING"));
    }
    if key.first() != Some(&0) {
        return Err(malformed("key has unused bits"));
    }

    let mut inner = write_tlv(TAG_SEQUENCE, algorithm);
    inner.extend(write_tlv(TAG_BIT_STRING, key));
    Ok(write_tlv(TAG_SEQUENCE, &inner))
}

/// Split one single-byte-tag TLV off `data`: `(tag, value, rest)`.
fn read_tlv(data: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&tag, rest) = data.split_first()?;
    let (&first, mut rest) = rest.split_first()?;
    let len = if first & 0x80 == 0 {
        usize::from(first)
    } else {
        let count = usize::from(first & 0x7f);
        if count == 0 || count > std::mem::size_of::<usize>() || rest.len() < count {
            return None;
        }
        let (bytes, tail) = rest.split_at(count);
        rest = tail;
        bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
    };
    if rest.len() < len {
        return None;
    }
    let (value, tail) = rest.split_at(len);
    Some((tag, value, tail))
}

fn write_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = value.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(value);
    out
}
