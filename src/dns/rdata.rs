//! Typed views of the rdata that carries DNSSEC material.
//!
//! Each type parses from and composes to uncompressed wire rdata. Anything
//! the engine does not interpret stays as opaque bytes in [`RrSet`].
//!
//! [`RrSet`]: super::record::RrSet

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::DateTime;
use thiserror::Error;

use super::enums::RecordType;
use super::name::{DomainName, NameError};
use crate::dnssec::DnsSecAlgorithm;
use crate::dnssec::digest::DigestType;
use crate::dnssec::errors::DnsSecError;
use crate::dnssec::key_tag::calculate_key_tag;

/// DNSKEY flag: the key is a zone key (RFC 4034 2.1.1)
pub const FLAG_ZONE: u16 = 0x0100;
/// DNSKEY flag: secure entry point
pub const FLAG_SEP: u16 = 0x0001;
/// The only protocol value DNSSEC defines
pub const DNSSEC_PROTOCOL: u8 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RdataError {
    #[error("Truncated {0} rdata")]
    Truncated(RecordType),

    #[error("Invalid name in rdata: {0}")]
    Name(#[from] NameError),

    #[error("Invalid type bitmap")]
    InvalidBitmap,
}

/// Which of a zone's keys is meant: the key signing key (SEP bit set,
/// flags 257) or the zone signing key (flags 256).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyRole {
    Ksk,
    Zsk,
}

impl KeyRole {
    pub fn flags(self) -> u16 {
        match self {
            KeyRole::Ksk => FLAG_ZONE | FLAG_SEP,
            KeyRole::Zsk => FLAG_ZONE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyRole::Ksk => "ksk",
            KeyRole::Zsk => "zsk",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Ksk => f.write_str("KSK"),
            KeyRole::Zsk => f.write_str("ZSK"),
        }
    }
}

fn read_u16(data: &[u8], at: usize, rtype: RecordType) -> Result<u16, RdataError> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(RdataError::Truncated(rtype))
}

fn read_u32(data: &[u8], at: usize, rtype: RecordType) -> Result<u32, RdataError> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(RdataError::Truncated(rtype))
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DnsKey {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

impl DnsKey {
    pub fn new(role: KeyRole, algorithm: u8, public_key: Vec<u8>) -> Self {
        Self {
            flags: role.flags(),
            protocol: DNSSEC_PROTOCOL,
            algorithm,
            public_key,
        }
    }

    pub fn parse(rdata: &[u8]) -> Result<Self, RdataError> {
        if rdata.len() < 4 {
            return Err(RdataError::Truncated(RecordType::DNSKEY));
        }
        Ok(Self {
            flags: u16::from_be_bytes([rdata[0], rdata[1]]),
            protocol: rdata[2],
            algorithm: rdata[3],
            public_key: rdata[4..].to_vec(),
        })
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.public_key.len());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.push(self.protocol);
        out.push(self.algorithm);
        out.extend_from_slice(&self.public_key);
        out
    }

    pub fn key_tag(&self) -> u16 {
        calculate_key_tag(self.flags, self.protocol, self.algorithm, &self.public_key)
    }

    pub fn is_zone_key(&self) -> bool {
        self.flags & FLAG_ZONE != 0
    }

    pub fn is_sep(&self) -> bool {
        self.flags & FLAG_SEP != 0
    }

    /// `None` for keys without the ZONE bit.
    pub fn role(&self) -> Option<KeyRole> {
        match (self.is_zone_key(), self.is_sep()) {
            (true, true) => Some(KeyRole::Ksk),
            (true, false) => Some(KeyRole::Zsk),
            _ => None,
        }
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(&self.public_key)
    }
}

impl fmt::Display for DnsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.flags,
            self.protocol,
            self.algorithm,
            self.public_key_base64()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rrsig {
    pub type_covered: RecordType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer: DomainName,
    pub signature: Vec<u8>,
}

impl Rrsig {
    pub fn parse(rdata: &[u8]) -> Result<Self, RdataError> {
        const RT: RecordType = RecordType::RRSIG;
        if rdata.len() < 18 {
            return Err(RdataError::Truncated(RT));
        }
        let (signer, used) = DomainName::from_wire(&rdata[18..])?;
        Ok(Self {
            type_covered: RecordType::from(read_u16(rdata, 0, RT)?),
            algorithm: rdata[2],
            labels: rdata[3],
            original_ttl: read_u32(rdata, 4, RT)?,
            expiration: read_u32(rdata, 8, RT)?,
            inception: read_u32(rdata, 12, RT)?,
            key_tag: read_u16(rdata, 16, RT)?,
            signer,
            signature: rdata[18 + used..].to_vec(),
        })
    }

    /// The rdata fields that precede the signature, signer name lower-cased.
    /// This is the first part of the data a signature is computed over.
    pub fn signed_prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18 + self.signer.wire_len());
        out.extend_from_slice(&u16::from(self.type_covered).to_be_bytes());
        out.push(self.algorithm);
        out.push(self.labels);
        out.extend_from_slice(&self.original_ttl.to_be_bytes());
        out.extend_from_slice(&self.expiration.to_be_bytes());
        out.extend_from_slice(&self.inception.to_be_bytes());
        out.extend_from_slice(&self.key_tag.to_be_bytes());
        self.signer.write_wire(&mut out, true);
        out
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = self.signed_prefix();
        // signed_prefix lower-cases the signer; the wire form keeps its case
        out.truncate(18);
        self.signer.write_wire(&mut out, false);
        out.extend_from_slice(&self.signature);
        out
    }

    /// Whether `now` lies within `[inception, expiration]`, using serial
    /// number arithmetic (RFC 4034 3.1.5).
    pub fn is_current(&self, now: u32) -> bool {
        !serial_lt(now, self.inception) && !serial_lt(self.expiration, now)
    }
}

/// Presentation form of an RRSIG time, `YYYYMMDDHHmmSS` in UTC
fn timestamp(secs: u32) -> String {
    DateTime::from_timestamp(i64::from(secs), 0)
        .map(|t| t.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// RFC 1982 serial number comparison: `a < b`.
pub fn serial_lt(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) < 0x8000_0000
}

impl fmt::Display for Rrsig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithm = DnsSecAlgorithm::from_u8(self.algorithm)
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.algorithm.to_string());
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            self.type_covered,
            algorithm,
            self.labels,
            self.original_ttl,
            timestamp(self.expiration),
            timestamp(self.inception),
            self.key_tag,
            self.signer
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ds {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

impl Ds {
    pub fn parse(rdata: &[u8]) -> Result<Self, RdataError> {
        if rdata.len() < 4 {
            return Err(RdataError::Truncated(RecordType::DS));
        }
        Ok(Self {
            key_tag: u16::from_be_bytes([rdata[0], rdata[1]]),
            algorithm: rdata[2],
            digest_type: rdata[3],
            digest: rdata[4..].to_vec(),
        })
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.digest.len());
        out.extend_from_slice(&self.key_tag.to_be_bytes());
        out.push(self.algorithm);
        out.push(self.digest_type);
        out.extend_from_slice(&self.digest);
        out
    }

    /// Build the DS for `key` at `owner` using `digest_type`.
    pub fn from_dnskey(
        owner: &DomainName,
        key: &DnsKey,
        digest_type: DigestType,
    ) -> Result<Self, DnsSecError> {
        Ok(Self {
            key_tag: key.key_tag(),
            algorithm: key.algorithm,
            digest_type: digest_type.to_u8(),
            digest: dnskey_digest(owner, key, digest_type)?,
        })
    }

    /// True if this DS designates `key` at `owner`: tag and algorithm match
    /// and the digest over `owner | DNSKEY rdata` is the stored one.
    pub fn matches(&self, owner: &DomainName, key: &DnsKey) -> Result<bool, DnsSecError> {
        if self.key_tag != key.key_tag() || self.algorithm != key.algorithm {
            return Ok(false);
        }
        let digest_type = DigestType::from_u8(self.digest_type)
            .filter(|d| d.is_supported())
            .ok_or(DnsSecError::UnsupportedDigestType(self.digest_type))?;
        Ok(dnskey_digest(owner, key, digest_type)? == self.digest)
    }
}

fn dnskey_digest(
    owner: &DomainName,
    key: &DnsKey,
    digest_type: DigestType,
) -> Result<Vec<u8>, DnsSecError> {
    let mut data = owner.to_canonical_wire();
    data.extend(key.to_rdata());
    digest_type
        .digest(&data)
        .ok_or(DnsSecError::UnsupportedDigestType(digest_type.to_u8()))
}

impl fmt::Display for Ds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.key_tag,
            self.algorithm,
            self.digest_type,
            hex::encode_upper(&self.digest)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec {
    pub next: DomainName,
    pub types: Vec<RecordType>,
}

impl Nsec {
    pub fn parse(rdata: &[u8]) -> Result<Self, RdataError> {
        let (next, used) = DomainName::from_wire(rdata)?;
        Ok(Self {
            next,
            types: parse_type_bitmap(&rdata[used..])?,
        })
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = self.next.to_wire();
        out.extend(compose_type_bitmap(&self.types));
        out
    }

    pub fn has_type(&self, rtype: RecordType) -> bool {
        self.types.contains(&rtype)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec3 {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
    pub next_hashed: Vec<u8>,
    pub types: Vec<RecordType>,
}

impl Nsec3 {
    pub fn parse(rdata: &[u8]) -> Result<Self, RdataError> {
        const RT: RecordType = RecordType::NSEC3;
        let iterations = read_u16(rdata, 2, RT)?;
        let salt_len = *rdata.get(4).ok_or(RdataError::Truncated(RT))? as usize;
        let salt = rdata
            .get(5..5 + salt_len)
            .ok_or(RdataError::Truncated(RT))?
            .to_vec();
        let at = 5 + salt_len;
        let hash_len = *rdata.get(at).ok_or(RdataError::Truncated(RT))? as usize;
        let next_hashed = rdata
            .get(at + 1..at + 1 + hash_len)
            .ok_or(RdataError::Truncated(RT))?
            .to_vec();
        Ok(Self {
            hash_algorithm: rdata[0],
            flags: rdata[1],
            iterations,
            salt,
            next_hashed,
            types: parse_type_bitmap(&rdata[at + 1 + hash_len..])?,
        })
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = vec![self.hash_algorithm, self.flags];
        out.extend_from_slice(&self.iterations.to_be_bytes());
        out.push(self.salt.len() as u8);
        out.extend_from_slice(&self.salt);
        out.push(self.next_hashed.len() as u8);
        out.extend_from_slice(&self.next_hashed);
        out.extend(compose_type_bitmap(&self.types));
        out
    }

    pub fn has_type(&self, rtype: RecordType) -> bool {
        self.types.contains(&rtype)
    }

    /// Opt-out flag (RFC 5155 3.1.2.1)
    pub fn opt_out(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

/// Decode an NSEC/NSEC3 type bitmap (RFC 4034 4.1.2).
pub fn parse_type_bitmap(mut data: &[u8]) -> Result<Vec<RecordType>, RdataError> {
    let mut types = Vec::new();
    while !data.is_empty() {
        if data.len() < 2 {
            return Err(RdataError::InvalidBitmap);
        }
        let window = data[0] as u16;
        let len = data[1] as usize;
        if len == 0 || len > 32 || data.len() < 2 + len {
            return Err(RdataError::InvalidBitmap);
        }
        for (i, byte) in data[2..2 + len].iter().enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    types.push(RecordType::from(window * 256 + (i as u16) * 8 + bit));
                }
            }
        }
        data = &data[2 + len..];
    }
    Ok(types)
}

pub fn compose_type_bitmap(types: &[RecordType]) -> Vec<u8> {
    let mut codes: Vec<u16> = types.iter().map(|t| u16::from(*t)).collect();
    codes.sort_unstable();
    codes.dedup();

    let mut out = Vec::new();
    let mut i = 0;
    while i < codes.len() {
        let window = codes[i] >> 8;
        let mut bits = [0u8; 32];
        let mut used = 0;
        while i < codes.len() && codes[i] >> 8 == window {
            let low = (codes[i] & 0xff) as usize;
            bits[low / 8] |= 0x80 >> (low % 8);
            used = used.max(low / 8 + 1);
            i += 1;
        }
        out.push(window as u8);
        out.push(used as u8);
        out.extend_from_slice(&bits[..used]);
    }
    out
}
