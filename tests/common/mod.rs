//! Shared fixtures for trustwalk integration tests
//!
//! Builds small signed zone hierarchies served by a `StaticResolver`, with
//! keys that can also be issued as X.509 certificates for the key store.

#![allow(dead_code)] // Not every test file uses every helper

use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};
use trustwalk::dns::rdata::{DnsKey, Ds, KeyRole, Rrsig};
use trustwalk::dns::{DomainName, RecordClass, RecordType, RrSet, SignedRrSet};
use trustwalk::dnssec::DigestType;
use trustwalk::dnssec::trust_anchor::{TrustAnchors, TrustedKey};
use trustwalk::dnssec::verifier::signed_data;
use trustwalk::resolver::StaticResolver;

/// Fixed validation time used by all fixtures
pub const NOW: u32 = 1_700_000_000;

pub fn name(s: &str) -> DomainName {
    s.parse().unwrap()
}

/// An ECDSA P-256 zone key
pub struct ZoneKey {
    pkcs8: Vec<u8>,
    pair: EcdsaKeyPair,
    pub key: DnsKey,
}

impl ZoneKey {
    pub fn generate(role: KeyRole) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .unwrap();
        // DNSKEY holds the point without the 0x04 prefix
        let key = DnsKey::new(role, 13, pair.public_key().as_ref()[1..].to_vec());
        Self {
            pkcs8: pkcs8.as_ref().to_vec(),
            pair,
            key,
        }
    }

    pub fn sign(&self, rrset: &RrSet, signer: &DomainName) -> Rrsig {
        self.sign_within(rrset, signer, NOW - 3600, NOW + 3600)
    }

    pub fn sign_within(
        &self,
        rrset: &RrSet,
        signer: &DomainName,
        inception: u32,
        expiration: u32,
    ) -> Rrsig {
        let mut rrsig = Rrsig {
            type_covered: rrset.rtype,
            algorithm: 13,
            labels: rrset.name.label_count() as u8,
            original_ttl: rrset.ttl,
            expiration,
            inception,
            key_tag: self.key.key_tag(),
            signer: signer.clone(),
            signature: Vec::new(),
        };
        let data = signed_data(rrset, &rrsig).unwrap();
        let rng = SystemRandom::new();
        rrsig.signature = self.pair.sign(&rng, &data).unwrap().as_ref().to_vec();
        rrsig
    }

    pub fn anchor(&self, owner: &DomainName) -> TrustedKey {
        TrustedKey::supplied(owner.clone(), self.key.clone())
    }

    /// Self-signed certificate carrying this key, PEM encoded
    pub fn certificate_pem(&self, subject: &str) -> String {
        let key_pair = rcgen::KeyPair::try_from(self.pkcs8.as_slice()).unwrap();
        rcgen::CertificateParams::new(vec![subject.to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap()
            .pem()
    }
}

/// A signed zone with one ZSK and one or more KSKs
pub struct Zone {
    pub name: DomainName,
    pub zsk: ZoneKey,
    pub ksks: Vec<ZoneKey>,
}

impl Zone {
    pub fn new(zone: &str) -> Self {
        Self::with_ksks(zone, 1)
    }

    pub fn with_ksks(zone: &str, count: usize) -> Self {
        Self {
            name: name(zone),
            zsk: ZoneKey::generate(KeyRole::Zsk),
            ksks: (0..count).map(|_| ZoneKey::generate(KeyRole::Ksk)).collect(),
        }
    }

    pub fn ksk(&self) -> &ZoneKey {
        &self.ksks[0]
    }

    /// The DNSKEY set, signed by every KSK
    pub fn dnskey_set(&self) -> SignedRrSet {
        let rrset = RrSet::new(self.name.clone(), RecordType::DNSKEY, RecordClass::IN, 3600)
            .with_rdata(
                std::iter::once(&self.zsk)
                    .chain(self.ksks.iter())
                    .map(|k| k.key.to_rdata()),
            );
        let signatures = self.ksks.iter().map(|k| k.sign(&rrset, &self.name)).collect();
        SignedRrSet { rrset, signatures }
    }

    /// DS records for every KSK, unsigned
    pub fn ds_rrset(&self) -> RrSet {
        RrSet::new(self.name.clone(), RecordType::DS, RecordClass::IN, 3600).with_rdata(
            self.ksks.iter().map(|k| {
                Ds::from_dnskey(&self.name, &k.key, DigestType::Sha256)
                    .unwrap()
                    .to_rdata()
            }),
        )
    }

    /// Sign `rrset` with the ZSK
    pub fn sign(&self, rrset: RrSet) -> SignedRrSet {
        let signatures = vec![self.zsk.sign(&rrset, &self.name)];
        SignedRrSet { rrset, signatures }
    }
}

/// Zones from the root down, served by a static resolver
pub struct Hierarchy {
    pub zones: Vec<Zone>,
    pub resolver: StaticResolver,
}

impl Hierarchy {
    /// `zones` lists the zone names root first, e.g. `[".", "com", "example.com"]`.
    pub fn new(zones: &[&str]) -> Self {
        Self::from_zones(zones.iter().map(|z| Zone::new(z)).collect())
    }

    pub fn from_zones(zones: Vec<Zone>) -> Self {
        let mut resolver = StaticResolver::new();
        for zone in &zones {
            resolver.insert(zone.dnskey_set());
        }
        for pair in zones.windows(2) {
            resolver.insert(pair[0].sign(pair[1].ds_rrset()));
        }
        Self { zones, resolver }
    }

    pub fn zone(&self, zone: &str) -> &Zone {
        let wanted = name(zone);
        self.zones.iter().find(|z| z.name == wanted).unwrap()
    }

    pub fn root(&self) -> &Zone {
        &self.zones[0]
    }

    /// Anchors holding the root KSK
    pub fn root_anchor(&self) -> TrustAnchors {
        [self.root().ksk().anchor(&DomainName::root())]
            .into_iter()
            .collect()
    }

    /// Add an A record at `owner` signed by `zone`, returning it.
    pub fn add_a_record(&mut self, owner: &str, zone: &str) -> SignedRrSet {
        let signed = self.zone(zone).sign(a_rrset(owner));
        self.resolver.insert(signed.clone());
        signed
    }
}

pub fn a_rrset(owner: &str) -> RrSet {
    RrSet::new(name(owner), RecordType::A, RecordClass::IN, 300).with_rdata([vec![192, 0, 2, 1]])
}
