mod common;

use std::sync::Arc;

use common::{Hierarchy, NOW, Zone, ZoneKey, a_rrset, name};
use trustwalk::dns::rdata::{KeyRole, Nsec};
use trustwalk::dns::{DomainName, RecordClass, RecordType, RrSet, SignedRrSet};
use trustwalk::dnssec::chain::{ChainEnd, LinkKind};
use trustwalk::dnssec::trust_anchor::TrustAnchors;
use trustwalk::dnssec::verifier::{SignatureVerifier, Verification};
use trustwalk::dnssec::{DnsSecError, ValidationOptions, Validator, Verdict};
use trustwalk::keys::MemoryKeyStore;
use trustwalk::resolver::{DenialProof, ResolveError, StaticResolver};
use trustwalk::Error;

fn validator(resolver: StaticResolver) -> Validator {
    Validator::new(Arc::new(resolver)).with_options(ValidationOptions {
        now: Some(NOW),
        ..ValidationOptions::default()
    })
}

async fn verdict(hierarchy: Hierarchy, owner: &str, anchors: &TrustAnchors) -> Verdict {
    validator(hierarchy.resolver)
        .validate_chain(&name(owner), RecordType::A, anchors)
        .await
        .unwrap()
        .verdict
}

#[tokio::test]
async fn test_single_chain_with_root_anchor_is_secure() {
    let mut hierarchy = Hierarchy::new(&[".", "example"]);
    hierarchy.add_a_record("example", "example");
    let anchors = hierarchy.root_anchor();

    let report = validator(hierarchy.resolver)
        .validate_chain(&name("example"), RecordType::A, &anchors)
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::Secure);
    assert_eq!(report.chain.end, ChainEnd::Root);
    assert_eq!(report.chain.len(), 2);
    assert!(!report.tree.is_empty());
}

#[tokio::test]
async fn test_empty_anchor_set_is_indeterminate() {
    let mut hierarchy = Hierarchy::new(&[".", "example"]);
    hierarchy.add_a_record("example", "example");

    assert_eq!(
        verdict(hierarchy, "example", &TrustAnchors::new()).await,
        Verdict::Indeterminate
    );
}

#[tokio::test]
async fn test_expired_signature_is_bogus() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    let anchors = hierarchy.root_anchor();

    let zone = hierarchy.zone("example.com");
    let rrset = a_rrset("www.example.com");
    let rrsig = zone
        .zsk
        .sign_within(&rrset, &zone.name, NOW - 7200, NOW - 3600);
    assert_eq!(
        SignatureVerifier::at(NOW).verify(&rrset, &rrsig, &zone.zsk.key),
        Verification::Invalid(DnsSecError::SignatureExpired)
    );
    hierarchy.resolver.insert(SignedRrSet {
        rrset,
        signatures: vec![rrsig],
    });

    let report = validator(hierarchy.resolver)
        .validate_chain(&name("www.example.com"), RecordType::A, &anchors)
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Bogus);
    assert_eq!(report.chain.links[0].stale_signatures.len(), 1);
}

#[tokio::test]
async fn test_failure_fetching_parent_keys_aborts() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    hierarchy.add_a_record("www.example.com", "example.com");
    let anchors = hierarchy.root_anchor();
    hierarchy
        .resolver
        .insert_error(name("com"), RecordType::DNSKEY, ResolveError::Timeout);

    let err = validator(hierarchy.resolver)
        .validate_chain(&name("www.example.com"), RecordType::A, &anchors)
        .await
        .unwrap_err();
    match err {
        Error::ChainConstructionFailed { zone, reason } => {
            assert_eq!(zone, name("com"));
            assert!(reason.contains("timed out"));
        }
        other => panic!("expected ChainConstructionFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_three_level_chain_is_secure() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    hierarchy.add_a_record("www.example.com", "example.com");
    let anchors = hierarchy.root_anchor();

    let report = validator(hierarchy.resolver)
        .validate_chain(&name("www.example.com"), RecordType::A, &anchors)
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Secure);
    let kinds: Vec<LinkKind> = report.chain.links.iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![LinkKind::Answer, LinkKind::Delegation, LinkKind::Delegation]
    );
}

#[tokio::test]
async fn test_tampered_data_is_bogus() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    let anchors = hierarchy.root_anchor();
    let mut signed = hierarchy.zone("example.com").sign(a_rrset("www.example.com"));
    signed.rrset = RrSet::new(name("www.example.com"), RecordType::A, RecordClass::IN, 300)
        .with_rdata([vec![198, 51, 100, 7]]);
    hierarchy.resolver.insert(signed);

    assert_eq!(
        verdict(hierarchy, "www.example.com", &anchors).await,
        Verdict::Bogus
    );
}

#[tokio::test]
async fn test_unrelated_anchor_is_bogus() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    hierarchy.add_a_record("www.example.com", "example.com");
    let stranger = ZoneKey::generate(KeyRole::Ksk);
    let anchors: TrustAnchors = [stranger.anchor(&DomainName::root())].into_iter().collect();

    assert_eq!(
        verdict(hierarchy, "www.example.com", &anchors).await,
        Verdict::Bogus
    );
}

#[tokio::test]
async fn test_anchor_below_root_is_secure() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    hierarchy.add_a_record("www.example.com", "example.com");
    let zone = hierarchy.zone("example.com");
    let anchors: TrustAnchors = [zone.ksk().anchor(&zone.name)].into_iter().collect();

    assert_eq!(
        verdict(hierarchy, "www.example.com", &anchors).await,
        Verdict::Secure
    );
}

#[tokio::test]
async fn test_rollover_with_one_anchored_ksk_is_secure() {
    let zones = vec![
        Zone::with_ksks(".", 2),
        Zone::new("com"),
        Zone::new("example.com"),
    ];
    let mut hierarchy = Hierarchy::from_zones(zones);
    hierarchy.add_a_record("www.example.com", "example.com");
    let new_ksk = &hierarchy.root().ksks[1];
    let anchors: TrustAnchors = [new_ksk.anchor(&DomainName::root())].into_iter().collect();

    assert_eq!(
        verdict(hierarchy, "www.example.com", &anchors).await,
        Verdict::Secure
    );
}

#[tokio::test]
async fn test_insecure_delegation_proven_by_nsec() {
    let mut hierarchy = Hierarchy::new(&[".", "com"]);
    let anchors = hierarchy.root_anchor();

    let nsec = Nsec {
        next: name("example2.com"),
        types: vec![RecordType::NS, RecordType::RRSIG, RecordType::NSEC],
    };
    let proof = hierarchy.zone("com").sign(
        RrSet::new(name("example.com"), RecordType::NSEC, RecordClass::IN, 3600)
            .with_rdata([nsec.to_rdata()]),
    );
    hierarchy.resolver.insert_error(
        name("example.com"),
        RecordType::DS,
        ResolveError::NoData {
            denial: Some(DenialProof {
                records: vec![proof],
            }),
        },
    );
    hierarchy.resolver.insert(SignedRrSet {
        rrset: a_rrset("www.example.com"),
        signatures: Vec::new(),
    });

    let report = validator(hierarchy.resolver)
        .validate_chain(&name("www.example.com"), RecordType::A, &anchors)
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Insecure);
    assert_eq!(report.chain.links[1].kind, LinkKind::Denial);
}

#[tokio::test]
async fn test_unsigned_answer_in_signed_zone_is_bogus() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    let anchors = hierarchy.root_anchor();
    hierarchy.resolver.insert(SignedRrSet {
        rrset: a_rrset("www.example.com"),
        signatures: Vec::new(),
    });

    let report = validator(hierarchy.resolver)
        .validate_chain(&name("www.example.com"), RecordType::A, &anchors)
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Bogus);
    assert_eq!(report.chain.links[0].zone, name("example.com"));
}

#[tokio::test]
async fn test_batch_validates_each_query() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    hierarchy.add_a_record("www.example.com", "example.com");
    hierarchy.add_a_record("mail.example.com", "example.com");
    let anchors = hierarchy.root_anchor();

    let queries = vec![
        (name("www.example.com"), RecordType::A),
        (name("mail.example.com"), RecordType::A),
        (name("missing.example.com"), RecordType::A),
    ];
    let items = validator(hierarchy.resolver)
        .validate_batch(queries, &anchors)
        .await;

    assert_eq!(items.len(), 3);
    for item in items {
        if item.name == name("missing.example.com") {
            assert!(matches!(item.result, Err(Error::Resolve(_))));
        } else {
            assert_eq!(item.result.unwrap().verdict, Verdict::Secure);
        }
    }
}

#[tokio::test]
async fn test_anchors_from_key_store() {
    let mut hierarchy = Hierarchy::new(&[".", "com", "example.com"]);
    hierarchy.add_a_record("www.example.com", "example.com");

    let mut store = MemoryKeyStore::new();
    store.insert(
        DomainName::root(),
        KeyRole::Ksk,
        hierarchy.root().ksk().certificate_pem("root").into_bytes(),
    );
    store.insert_null(name("example.com"), KeyRole::Zsk);

    let validator = Validator::new(Arc::new(hierarchy.resolver))
        .with_key_store(Arc::new(store))
        .with_options(ValidationOptions {
            now: Some(NOW),
            use_key_store: true,
            ..ValidationOptions::default()
        });

    let report = validator
        .validate_chain(&name("www.example.com"), RecordType::A, &TrustAnchors::new())
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Secure);
}
