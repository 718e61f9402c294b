use trustwalk::dns::DomainName;
use trustwalk::dns::rdata::{DnsKey, Ds, KeyRole};
use trustwalk::dnssec::trust_anchor::{KeyOrigin, TrustAnchors, TrustedKey};
use trustwalk::dnssec::{DigestType, DnsSecAlgorithm, DnsSecError, Verdict, calculate_key_tag};

/// DNSKEY from RFC 4034 section 5.4 (key tag 60485)
const DSKEY_B64: &str = "AQOeiiR0GOMYkDshWoSKz9XzfwJr1AYtsmx3TGkJaNXVbfi/2pHm822aJ5iI9BMzNXxeYCmZDRD99WYwYqUSdjMmmAphXdvxegXd/M5+X7OrzKBaMbCVdFLUUh6DhweJBjEVv5f2wwjM9XzcnOf+EPbtG9DMBmADjFDc2w/rljwvFw==";

fn dskey() -> TrustedKey {
    format!("dskey.example.com. 86400 IN DNSKEY 256 3 5 {}", DSKEY_B64)
        .parse()
        .unwrap()
}

#[test]
fn test_dnssec_algorithm_conversion() {
    assert_eq!(DnsSecAlgorithm::from_u8(5), Some(DnsSecAlgorithm::RsaSha1));
    assert_eq!(
        DnsSecAlgorithm::from_u8(8),
        Some(DnsSecAlgorithm::RsaSha256)
    );
    assert_eq!(
        DnsSecAlgorithm::from_u8(13),
        Some(DnsSecAlgorithm::EcdsaP256Sha256)
    );
    assert_eq!(DnsSecAlgorithm::from_u8(15), Some(DnsSecAlgorithm::Ed25519));
    assert_eq!(DnsSecAlgorithm::from_u8(200), None);

    assert_eq!(DnsSecAlgorithm::RsaSha256.to_u8(), 8);
    assert_eq!(DnsSecAlgorithm::Ed25519.to_u8(), 15);

    assert_eq!(
        "ecdsap384sha384".parse::<DnsSecAlgorithm>(),
        Ok(DnsSecAlgorithm::EcdsaP384Sha384)
    );
    assert_eq!("10".parse::<DnsSecAlgorithm>(), Ok(DnsSecAlgorithm::RsaSha512));
}

#[test]
fn test_dnssec_algorithm_support() {
    assert!(DnsSecAlgorithm::RsaSha256.is_supported());
    assert!(DnsSecAlgorithm::EcdsaP256Sha256.is_supported());
    assert!(DnsSecAlgorithm::Ed25519.is_supported());

    assert!(!DnsSecAlgorithm::RsaMd5.is_supported());
    assert!(!DnsSecAlgorithm::EccGost.is_supported());
    assert!(!DnsSecAlgorithm::Ed448.is_supported());
}

#[test]
fn test_digest_type_support() {
    assert_eq!(DigestType::from_u8(1), Some(DigestType::Sha1));
    assert_eq!(DigestType::from_u8(2), Some(DigestType::Sha256));
    assert_eq!(DigestType::from_u8(4), Some(DigestType::Sha384));
    assert_eq!(DigestType::from_u8(10), None);

    assert!(DigestType::Sha1.is_supported());
    assert!(DigestType::Sha256.is_supported());
    assert!(DigestType::Sha384.is_supported());
    assert!(!DigestType::Gost94.is_supported());
}

#[test]
fn test_digest_computation() {
    let data = b"test data";

    assert_eq!(DigestType::Sha1.digest(data).unwrap().len(), 20);

    let sha256_digest = DigestType::Sha256.digest(data).unwrap();
    assert_eq!(
        hex::encode(&sha256_digest),
        "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
    );

    assert_eq!(DigestType::Sha384.digest(data).unwrap().len(), 48);
    assert_eq!(DigestType::Gost94.digest(data), None);
}

#[test]
fn test_key_tag_calculation_standard() {
    // Test vector from RFC 4034 Appendix B.5
    let public_key = hex::decode(
        "030101a80020a95566ba42e886bb804cda84e47ef56dbd7aec612615552cec906d3e9b72dc4f90d3fc09b8e9d0ff2ae8ee5ed8cd61d7622c39ee2d76a2153bc0ac8b9e254125c46e0a224507fb358d7f6b5d7a42f75e60b9748e7c0747e2447f4bd7d10ca24bb1498de34a504406bbeb3b041fe48d0ad2b1de5adadb87d0c8824e7cc4dc3e5b7f0b3e8ac72c3d3d8aa7251abcaad82ad5ececed8cd83825d19ffd95e93bca729fdd88901b20fc598fb6a0779ddfa95e3e42ca9d0a7739d3c4ad3a7a5a30b3c60a73a6f09fdb812746e0d69edfba06754465f2e1dd5e3802e6d05bd6148e38fd8ca1632b71f6559fe9b6e18d73c5a750e3e2f2f205972e7b28ae04ddae5e27915a08d217db5ce090c119d23f79fb"
    ).unwrap();

    assert_eq!(calculate_key_tag(0x0101, 3, 5, &public_key), 55495);
}

#[test]
fn test_key_tag_calculation_rsamd5() {
    // RSAMD5 takes the tag from the key material
    assert_eq!(calculate_key_tag(0x0101, 3, 1, &[0x12, 0x34, 0x56, 0x78]), 0x5678);
}

#[test]
fn test_ds_matches_rfc_example() {
    let anchor = dskey();
    assert_eq!(anchor.key_tag(), 60485);

    let ds = Ds {
        key_tag: 60485,
        algorithm: 5,
        digest_type: 1,
        digest: hex::decode("2BB183AF5F22588179A53B0A98631FAD1A292118").unwrap(),
    };
    assert_eq!(ds.matches(&anchor.owner, &anchor.key), Ok(true));

    let computed = Ds::from_dnskey(&anchor.owner, &anchor.key, DigestType::Sha1).unwrap();
    assert_eq!(computed, ds);
    assert_eq!(
        computed.to_string(),
        "60485 5 1 2BB183AF5F22588179A53B0A98631FAD1A292118"
    );

    // Same digest under another owner does not match
    let other: DomainName = "other.example.com".parse().unwrap();
    assert_eq!(ds.matches(&other, &anchor.key), Ok(false));
}

#[test]
fn test_ds_unsupported_digest() {
    let anchor = dskey();
    let ds = Ds {
        key_tag: 60485,
        algorithm: 5,
        digest_type: 3,
        digest: vec![0; 32],
    };
    assert_eq!(
        ds.matches(&anchor.owner, &anchor.key),
        Err(DnsSecError::UnsupportedDigestType(3))
    );
}

#[test]
fn test_trust_anchor_text_forms() {
    let anchor = dskey();
    assert_eq!(anchor.owner, "dskey.example.com".parse::<DomainName>().unwrap());
    assert_eq!(anchor.key.role(), Some(KeyRole::Zsk));
    assert_eq!(anchor.key.algorithm, 5);
    assert_eq!(anchor.origin, KeyOrigin::Supplied);

    let bare: TrustedKey = format!("dskey.example.com DNSKEY 256 3 5 {}", DSKEY_B64)
        .parse()
        .unwrap();
    assert_eq!(bare, anchor);

    assert!("example.com. DS 1 2 3 AA".parse::<TrustedKey>().is_err());
    assert!("example.com. DNSKEY 257 2 13 AAAA".parse::<TrustedKey>().is_err());
    assert!("example.com. DNSKEY 257 3 13".parse::<TrustedKey>().is_err());
}

#[test]
fn test_trust_anchor_set_dedups() {
    let anchor = dskey();
    let mut anchors = TrustAnchors::new();
    assert!(anchors.insert(anchor.clone()));
    assert!(!anchors.insert(anchor.clone()));

    // Same key material marked as KSK is the same anchor
    let as_ksk = TrustedKey::supplied(
        anchor.owner.clone(),
        DnsKey::new(KeyRole::Ksk, 5, anchor.key.public_key.clone()),
    );
    assert!(!anchors.insert(as_ksk));
    assert_eq!(anchors.len(), 1);
    assert!(anchors.contains(&anchor.owner, &anchor.key));
    assert!(!anchors.contains(&DomainName::root(), &anchor.key));
}

#[test]
fn test_dnssec_error_display() {
    let errors = vec![
        (
            DnsSecError::SignatureExpired,
            "DNSSEC signature has expired",
        ),
        (
            DnsSecError::SignatureNotYetValid,
            "DNSSEC signature is not yet valid",
        ),
        (DnsSecError::KeyTagMismatch, "Key tag does not match"),
        (
            DnsSecError::UnsupportedAlgorithm(99),
            "Unsupported DNSSEC algorithm: 99",
        ),
        (
            DnsSecError::UnsupportedDigestType(99),
            "Unsupported digest type: 99",
        ),
        (
            DnsSecError::SignatureVerificationFailed,
            "DNSSEC signature verification failed",
        ),
        (
            DnsSecError::InvalidPublicKey,
            "Invalid DNSKEY public key format",
        ),
    ];

    for (error, expected) in errors {
        assert_eq!(error.to_string(), expected);
    }
}

#[test]
fn test_verdict_display() {
    assert_eq!(Verdict::Secure.to_string(), "Secure");
    assert_eq!(Verdict::Insecure.to_string(), "Insecure");
    assert_eq!(Verdict::Bogus.to_string(), "Bogus");
    assert_eq!(Verdict::Indeterminate.to_string(), "Indeterminate");
    assert!(Verdict::Secure.is_secure());
    assert!(!Verdict::Insecure.is_secure());
}
