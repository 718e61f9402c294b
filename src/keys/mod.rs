pub mod extract;
pub mod store;

pub use extract::{KeyExtractionError, dnskey_from_certificate, dnskey_from_lookup};
pub use store::{
    CertificateLookup, DirectoryKeyStore, KeyFetch, KeyStore, KeyStoreError, MemoryKeyStore,
};
