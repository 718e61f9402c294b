use std::fmt;
use std::str::FromStr;

use ring::signature;

use super::errors::{DnsSecError, Result};

/// DNSSEC algorithm numbers (RFC 4034, 5702, 6605, 8080, 8624)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DnsSecAlgorithm {
    /// RSA/MD5 (deprecated, not verifiable)
    RsaMd5 = 1,
    /// DSA/SHA1 (not verifiable)
    Dsa = 3,
    /// RSA/SHA-1 (RFC 3110)
    RsaSha1 = 5,
    /// DSA-NSEC3-SHA1 (not verifiable)
    DsaNsec3Sha1 = 6,
    /// RSASHA1-NSEC3-SHA1 (RFC 5155)
    RsaSha1Nsec3Sha1 = 7,
    /// RSA/SHA-256 (RFC 5702)
    RsaSha256 = 8,
    /// RSA/SHA-512 (RFC 5702)
    RsaSha512 = 10,
    /// GOST R 34.10-2001 (not verifiable)
    EccGost = 12,
    /// ECDSA Curve P-256 with SHA-256 (RFC 6605)
    EcdsaP256Sha256 = 13,
    /// ECDSA Curve P-384 with SHA-384 (RFC 6605)
    EcdsaP384Sha384 = 14,
    /// Ed25519 (RFC 8080)
    Ed25519 = 15,
    /// Ed448 (not verifiable)
    Ed448 = 16,
}

impl DnsSecAlgorithm {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::RsaMd5),
            3 => Some(Self::Dsa),
            5 => Some(Self::RsaSha1),
            6 => Some(Self::DsaNsec3Sha1),
            7 => Some(Self::RsaSha1Nsec3Sha1),
            8 => Some(Self::RsaSha256),
            10 => Some(Self::RsaSha512),
            12 => Some(Self::EccGost),
            13 => Some(Self::EcdsaP256Sha256),
            14 => Some(Self::EcdsaP384Sha384),
            15 => Some(Self::Ed25519),
            16 => Some(Self::Ed448),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if signatures made with this algorithm can be verified here
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::RsaSha1
                | Self::RsaSha1Nsec3Sha1
                | Self::RsaSha256
                | Self::RsaSha512
                | Self::EcdsaP256Sha256
                | Self::EcdsaP384Sha384
                | Self::Ed25519
        )
    }

    /// Length of the DNSKEY public key field, for fixed-size key formats
    pub fn public_key_len(&self) -> Option<usize> {
        match self {
            Self::EcdsaP256Sha256 => Some(64),
            Self::EcdsaP384Sha384 => Some(96),
            Self::Ed25519 => Some(32),
            _ => None,
        }
    }

    /// Verify `sig` over `message` with a key in DNSKEY wire format.
    pub fn verify(&self, public_key: &[u8], message: &[u8], sig: &[u8]) -> Result<()> {
        match self {
            Self::EcdsaP256Sha256 | Self::EcdsaP384Sha384 | Self::Ed25519 => {
                let expected = self.public_key_len().unwrap_or_default();
                if public_key.len() != expected {
                    return Err(DnsSecError::InvalidPublicKey);
                }
            }
            _ => {}
        }

        match self {
            Self::EcdsaP256Sha256 => {
                verify_ec(&signature::ECDSA_P256_SHA256_FIXED, public_key, message, sig)
            }
            Self::EcdsaP384Sha384 => {
                verify_ec(&signature::ECDSA_P384_SHA384_FIXED, public_key, message, sig)
            }
            Self::Ed25519 => signature::UnparsedPublicKey::new(&signature::ED25519, public_key)
                .verify(message, sig)
                .map_err(|_| DnsSecError::SignatureVerificationFailed),
            Self::RsaSha1 | Self::RsaSha1Nsec3Sha1 => verify_rsa(
                &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
                public_key,
                message,
                sig,
            ),
            Self::RsaSha256 => verify_rsa(
                &signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY,
                public_key,
                message,
                sig,
            ),
            Self::RsaSha512 => verify_rsa(
                &signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY,
                public_key,
                message,
                sig,
            ),
            _ => Err(DnsSecError::UnsupportedAlgorithm(self.to_u8())),
        }
    }
}

/// DNSKEY stores the bare `x | y` point; ring wants the SEC1 uncompressed form.
fn verify_ec(
    alg: &'static signature::EcdsaVerificationAlgorithm,
    public_key: &[u8],
    message: &[u8],
    sig: &[u8],
) -> Result<()> {
    let mut point = Vec::with_capacity(public_key.len() + 1);
    point.push(0x04);
    point.extend_from_slice(public_key);
    signature::UnparsedPublicKey::new(alg, &point)
        .verify(message, sig)
        .map_err(|_| DnsSecError::SignatureVerificationFailed)
}

fn verify_rsa(
    params: &'static signature::RsaParameters,
    public_key: &[u8],
    message: &[u8],
    sig: &[u8],
) -> Result<()> {
    let (e, n) = split_rsa_key(public_key)?;
    signature::RsaPublicKeyComponents { n, e }
        .verify(params, message, sig)
        .map_err(|_| DnsSecError::SignatureVerificationFailed)
}

/// Split an RFC 3110 RSA key into `(exponent, modulus)`.
pub fn split_rsa_key(public_key: &[u8]) -> Result<(&[u8], &[u8])> {
    let (exp_len, rest) = match public_key {
        [0, hi, lo, rest @ ..] => (u16::from_be_bytes([*hi, *lo]) as usize, rest),
        [len, rest @ ..] => (*len as usize, rest),
        [] => return Err(DnsSecError::InvalidPublicKey),
    };
    if exp_len == 0 || rest.len() <= exp_len {
        return Err(DnsSecError::InvalidPublicKey);
    }
    Ok(rest.split_at(exp_len))
}

/// Encode an RSA key in RFC 3110 form. Leading zero octets are removed.
pub fn encode_rsa_key(exponent: &[u8], modulus: &[u8]) -> Vec<u8> {
    let strip = |b: &[u8]| -> Vec<u8> {
        let start = b.iter().position(|&x| x != 0).unwrap_or(b.len());
        b[start..].to_vec()
    };
    let e = strip(exponent);
    let n = strip(modulus);
    let mut out = Vec::with_capacity(3 + e.len() + n.len());
    if e.len() > 255 {
        out.push(0);
        out.extend_from_slice(&(e.len() as u16).to_be_bytes());
    } else {
        out.push(e.len() as u8);
    }
    out.extend_from_slice(&e);
    out.extend_from_slice(&n);
    out
}

impl FromStr for DnsSecAlgorithm {
    type Err = DnsSecError;

    /// Accepts the mnemonic (`ECDSAP256SHA256`) or the number (`13`).
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(n) = s.trim().parse::<u8>() {
            return Self::from_u8(n).ok_or(DnsSecError::UnsupportedAlgorithm(n));
        }
        let alg = match s.trim().to_ascii_uppercase().as_str() {
            "RSAMD5" => Self::RsaMd5,
            "DSA" => Self::Dsa,
            "RSASHA1" => Self::RsaSha1,
            "DSA-NSEC3-SHA1" => Self::DsaNsec3Sha1,
            "RSASHA1-NSEC3-SHA1" => Self::RsaSha1Nsec3Sha1,
            "RSASHA256" => Self::RsaSha256,
            "RSASHA512" => Self::RsaSha512,
            "ECC-GOST" => Self::EccGost,
            "ECDSAP256SHA256" => Self::EcdsaP256Sha256,
            "ECDSAP384SHA384" => Self::EcdsaP384Sha384,
            "ED25519" => Self::Ed25519,
            "ED448" => Self::Ed448,
            _ => return Err(DnsSecError::UnsupportedAlgorithm(0)),
        };
        Ok(alg)
    }
}

impl fmt::Display for DnsSecAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaMd5 => write!(f, "RSAMD5"),
            Self::Dsa => write!(f, "DSA"),
            Self::RsaSha1 => write!(f, "RSASHA1"),
            Self::DsaNsec3Sha1 => write!(f, "DSA-NSEC3-SHA1"),
            Self::RsaSha1Nsec3Sha1 => write!(f, "RSASHA1-NSEC3-SHA1"),
            Self::RsaSha256 => write!(f, "RSASHA256"),
            Self::RsaSha512 => write!(f, "RSASHA512"),
            Self::EccGost => write!(f, "ECC-GOST"),
            Self::EcdsaP256Sha256 => write!(f, "ECDSAP256SHA256"),
            Self::EcdsaP384Sha384 => write!(f, "ECDSAP384SHA384"),
            Self::Ed25519 => write!(f, "ED25519"),
            Self::Ed448 => write!(f, "ED448"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};

    #[test]
    fn test_parse_mnemonic_and_number() {
        assert_eq!(
            "ecdsap256sha256".parse::<DnsSecAlgorithm>().unwrap(),
            DnsSecAlgorithm::EcdsaP256Sha256
        );
        assert_eq!(
            "8".parse::<DnsSecAlgorithm>().unwrap(),
            DnsSecAlgorithm::RsaSha256
        );
        assert!("99".parse::<DnsSecAlgorithm>().is_err());
        assert_eq!(DnsSecAlgorithm::EcdsaP384Sha384.to_string(), "ECDSAP384SHA384");
    }

    #[test]
    fn test_ecdsa_p256_verify() {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng).unwrap();
        // Drop the 0x04 point prefix to get the DNSKEY form
        let dnskey = &pair.public_key().as_ref()[1..];
        let sig = pair.sign(&rng, b"signed data").unwrap();

        let alg = DnsSecAlgorithm::EcdsaP256Sha256;
        assert!(alg.verify(dnskey, b"signed data", sig.as_ref()).is_ok());
        assert_eq!(
            alg.verify(dnskey, b"other data", sig.as_ref()),
            Err(DnsSecError::SignatureVerificationFailed)
        );
        assert_eq!(
            alg.verify(&dnskey[1..], b"signed data", sig.as_ref()),
            Err(DnsSecError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        assert_eq!(
            DnsSecAlgorithm::Ed448.verify(&[0; 57], b"x", b"y"),
            Err(DnsSecError::UnsupportedAlgorithm(16))
        );
        assert!(!DnsSecAlgorithm::Ed448.is_supported());
    }

    #[test]
    fn test_rsa_key_encoding() {
        let exponent = [0x01, 0x00, 0x01];
        let modulus = [0x00, 0xC5, 0x11, 0x22];
        let encoded = encode_rsa_key(&exponent, &modulus);
        assert_eq!(encoded, vec![3, 0x01, 0x00, 0x01, 0xC5, 0x11, 0x22]);

        let (e, n) = split_rsa_key(&encoded).unwrap();
        assert_eq!(e, &exponent);
        assert_eq!(n, &[0xC5, 0x11, 0x22]);
        assert!(split_rsa_key(&[3, 1, 0]).is_err());
        assert!(split_rsa_key(&[]).is_err());
    }
}
