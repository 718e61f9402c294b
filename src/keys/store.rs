use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, trace};

use super::extract::dnskey_from_lookup;
use crate::dns::DomainName;
use crate::dns::rdata::KeyRole;
use crate::dnssec::trust_anchor::TrustedKey;
use crate::error::Result;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    #[error("Key store IO error: {0}")]
    Io(String),

    #[error("Key store backend error: {0}")]
    Backend(String),
}

/// Result of asking the store for a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateLookup {
    /// A certificate is registered for the name and role
    Found(Vec<u8>),
    /// The name is known but no certificate is registered for the role
    Null,
    /// Nothing is known about the name
    Absent,
}

/// Outcome of turning a lookup into a trust anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFetch {
    Key(TrustedKey),
    NotRegistered,
    Absent,
}

/// Certificate database keyed by domain and key role.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get_certificate(
        &self,
        name: &DomainName,
        role: KeyRole,
    ) -> std::result::Result<CertificateLookup, KeyStoreError>;

    /// Look up the certificate and extract its key.
    async fn fetch_trusted_key(&self, name: &DomainName, role: KeyRole) -> Result<KeyFetch> {
        let lookup = self.get_certificate(name, role).await?;
        trace!("Key store lookup {} {}: {:?}", name, role, lookup_kind(&lookup));
        match dnskey_from_lookup(name, &lookup, role)? {
            Some(key) => Ok(KeyFetch::Key(key)),
            None if lookup == CertificateLookup::Null => Ok(KeyFetch::NotRegistered),
            None => Ok(KeyFetch::Absent),
        }
    }
}

fn lookup_kind(lookup: &CertificateLookup) -> &'static str {
    match lookup {
        CertificateLookup::Found(_) => "found",
        CertificateLookup::Null => "null",
        CertificateLookup::Absent => "absent",
    }
}

/// Key store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    entries: HashMap<(DomainName, KeyRole), Option<Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a certificate (PEM or DER)
    pub fn insert(&mut self, name: DomainName, role: KeyRole, certificate: Vec<u8>) {
        self.entries.insert((name, role), Some(certificate));
    }

    /// Record the name with no certificate for `role`
    pub fn insert_null(&mut self, name: DomainName, role: KeyRole) {
        self.entries.insert((name, role), None);
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_certificate(
        &self,
        name: &DomainName,
        role: KeyRole,
    ) -> std::result::Result<CertificateLookup, KeyStoreError> {
        Ok(match self.entries.get(&(name.clone(), role)) {
            Some(Some(cert)) => CertificateLookup::Found(cert.clone()),
            Some(None) => CertificateLookup::Null,
            None => CertificateLookup::Absent,
        })
    }
}

/// Key store backed by a directory of `<name>.<ksk|zsk>.pem` files.
///
/// The root zone uses `_root`. A missing file is absent, an empty file is a
/// null entry.
#[derive(Debug, Clone)]
pub struct DirectoryKeyStore {
    dir: PathBuf,
}

impl DirectoryKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &DomainName, role: KeyRole) -> PathBuf {
        let stem = if name.is_root() {
            "_root".to_string()
        } else {
            // Keep every name inside the store directory
            let text = name.to_lowercase().to_string().replace('/', "\\047");
            text.trim_end_matches('.').to_string()
        };
        self.dir.join(format!("{}.{}.pem", stem, role.as_str()))
    }
}

#[async_trait]
impl KeyStore for DirectoryKeyStore {
    async fn get_certificate(
        &self,
        name: &DomainName,
        role: KeyRole,
    ) -> std::result::Result<CertificateLookup, KeyStoreError> {
        let path = self.path_for(name, role);
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                debug!("Empty certificate file {}", path.display());
                Ok(CertificateLookup::Null)
            }
            Ok(bytes) => Ok(CertificateLookup::Found(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CertificateLookup::Absent),
            Err(e) => Err(KeyStoreError::Io(format!("{}: {}", path.display(), e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DomainName {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_lookups() {
        let mut store = MemoryKeyStore::new();
        store.insert(name("example.com"), KeyRole::Ksk, b"cert".to_vec());
        store.insert_null(name("example.com"), KeyRole::Zsk);

        assert_eq!(
            store.get_certificate(&name("Example.COM"), KeyRole::Ksk).await,
            Ok(CertificateLookup::Found(b"cert".to_vec()))
        );
        assert_eq!(
            store.get_certificate(&name("example.com"), KeyRole::Zsk).await,
            Ok(CertificateLookup::Null)
        );
        assert_eq!(
            store.get_certificate(&name("example.net"), KeyRole::Zsk).await,
            Ok(CertificateLookup::Absent)
        );
    }

    #[tokio::test]
    async fn test_fetch_distinguishes_null_from_absent() {
        let mut store = MemoryKeyStore::new();
        store.insert_null(name("example.com"), KeyRole::Zsk);

        assert_eq!(
            store
                .fetch_trusted_key(&name("example.com"), KeyRole::Zsk)
                .await
                .unwrap(),
            KeyFetch::NotRegistered
        );
        assert_eq!(
            store
                .fetch_trusted_key(&name("example.org"), KeyRole::Zsk)
                .await
                .unwrap(),
            KeyFetch::Absent
        );
    }

    #[test]
    fn test_directory_paths() {
        let store = DirectoryKeyStore::new("/keys");
        assert_eq!(
            store.path_for(&name("Example.com."), KeyRole::Ksk),
            PathBuf::from("/keys/example.com.ksk.pem")
        );
        assert_eq!(
            store.path_for(&DomainName::root(), KeyRole::Zsk),
            PathBuf::from("/keys/_root.zsk.pem")
        );
    }

    #[tokio::test]
    async fn test_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryKeyStore::new(dir.path());
        std::fs::write(store.path_for(&name("example.com"), KeyRole::Ksk), b"PEM").unwrap();
        std::fs::write(store.path_for(&name("example.com"), KeyRole::Zsk), b"\n").unwrap();

        assert_eq!(
            store.get_certificate(&name("example.com"), KeyRole::Ksk).await,
            Ok(CertificateLookup::Found(b"PEM".to_vec()))
        );
        assert_eq!(
            store.get_certificate(&name("example.com"), KeyRole::Zsk).await,
            Ok(CertificateLookup::Null)
        );
        assert_eq!(
            store.get_certificate(&DomainName::root(), KeyRole::Ksk).await,
            Ok(CertificateLookup::Absent)
        );
    }

    #[test]
    fn test_path_for_escaped_labels() {
        let store = DirectoryKeyStore::new("/keys");
        assert_eq!(
            store.path_for(&name("a\\.b.example.com"), KeyRole::Zsk),
            PathBuf::from("/keys/a\\.b.example.com.zsk.pem")
        );

        let slash = DomainName::from_labels([&b"..\x2f"[..]]).unwrap();
        let path = store.path_for(&slash, KeyRole::Ksk);
        assert_eq!(path.parent(), Some(std::path::Path::new("/keys")));
    }
}
