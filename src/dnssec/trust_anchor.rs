use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::dns::rdata::{DNSSEC_PROTOCOL, DnsKey, KeyRole};
use crate::dns::{DomainName, RecordClass, RecordType};
use crate::error::Error;

/// Where a trusted key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOrigin {
    /// Given by the caller (command line or configuration)
    Supplied,
    /// Extracted from a certificate in the key store, requested under `role`
    KeyStore { role: KeyRole },
}

/// A DNSKEY promoted to trust anchor for `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrustedKey {
    pub owner: DomainName,
    pub key: DnsKey,
    pub origin: KeyOrigin,
}

impl TrustedKey {
    pub fn supplied(owner: DomainName, key: DnsKey) -> Self {
        Self {
            owner,
            key,
            origin: KeyOrigin::Supplied,
        }
    }

    /// Build from a base64 key the way `-k ORIGIN -K KEY [--ksk]` does.
    pub fn from_base64(
        owner: DomainName,
        role: KeyRole,
        algorithm: u8,
        key_b64: &str,
    ) -> Result<Self, Error> {
        let public_key = decode_key(key_b64)?;
        Ok(Self::supplied(owner, DnsKey::new(role, algorithm, public_key)))
    }

    pub fn key_tag(&self) -> u16 {
        self.key.key_tag()
    }

    /// True if `key` at `owner` is this anchor. Flags are not compared so a
    /// KSK anchor also vouches for the same key material marked as ZSK.
    pub fn matches(&self, owner: &DomainName, key: &DnsKey) -> bool {
        &self.owner == owner
            && self.key.algorithm == key.algorithm
            && self.key.public_key == key.public_key
    }
}

fn decode_key(text: &str) -> Result<Vec<u8>, Error> {
    let compact: String = text.split_whitespace().collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::MalformedInput(format!("invalid base64 key: {}", e)))
}

impl FromStr for TrustedKey {
    type Err = Error;

    /// `<domain> [ttl] [class] DNSKEY <flags> <protocol> <algorithm> <base64>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |why: &str| Error::MalformedInput(format!("{}: {}", why, s.trim()));
        let mut fields = s.split_whitespace().peekable();

        let owner: DomainName = fields.next().ok_or_else(|| malformed("empty"))?.parse()?;

        if fields.peek().is_some_and(|f| f.parse::<u32>().is_ok()) {
            fields.next();
        }
        if fields.peek().is_some_and(|f| f.parse::<RecordClass>().is_ok()) {
            fields.next();
        }
        match fields.next().map(str::parse::<RecordType>) {
            Some(Ok(RecordType::DNSKEY)) => {}
            _ => return Err(malformed("expected DNSKEY")),
        }

        let mut number = |what: &str| -> Result<u16, Error> {
            fields
                .next()
                .and_then(|f| f.parse::<u16>().ok())
                .ok_or_else(|| malformed(what))
        };
        let flags = number("bad flags")?;
        let protocol = number("bad protocol")?;
        let algorithm = number("bad algorithm")?;
        if protocol != DNSSEC_PROTOCOL as u16 {
            return Err(malformed("protocol must be 3"));
        }
        let algorithm = u8::try_from(algorithm).map_err(|_| malformed("bad algorithm"))?;

        let rest: String = fields.collect();
        if rest.is_empty() {
            return Err(malformed("missing key"));
        }
        let key = DnsKey {
            flags,
            protocol: DNSSEC_PROTOCOL,
            algorithm,
            public_key: decode_key(&rest)?,
        };
        Ok(Self::supplied(owner, key))
    }
}

impl fmt::Display for TrustedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} DNSKEY {}", self.owner, self.key)
    }
}

/// The trust anchors used for one validation.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    keys: Vec<TrustedKey>,
    seen: HashSet<(DomainName, u8, Vec<u8>)>,
}

impl TrustAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an anchor. Returns false if the same key was already present.
    pub fn insert(&mut self, anchor: TrustedKey) -> bool {
        let id = (
            anchor.owner.clone(),
            anchor.key.algorithm,
            anchor.key.public_key.clone(),
        );
        if !self.seen.insert(id) {
            return false;
        }
        self.keys.push(anchor);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustedKey> {
        self.keys.iter()
    }

    /// Anchors whose owner is `owner`
    pub fn owned_by<'a>(&'a self, owner: &'a DomainName) -> impl Iterator<Item = &'a TrustedKey> {
        self.keys.iter().filter(move |k| &k.owner == owner)
    }

    pub fn contains(&self, owner: &DomainName, key: &DnsKey) -> bool {
        self.keys.iter().any(|anchor| anchor.matches(owner, key))
    }

    pub fn extend<I: IntoIterator<Item = TrustedKey>>(&mut self, anchors: I) {
        for anchor in anchors {
            self.insert(anchor);
        }
    }
}

impl FromIterator<TrustedKey> for TrustAnchors {
    fn from_iter<I: IntoIterator<Item = TrustedKey>>(iter: I) -> Self {
        let mut anchors = Self::new();
        anchors.extend(iter);
        anchors
    }
}
